use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use swayroom_shared::protocol::{ClientMsg, HelloMsg, RosterMsg, Role, ServerMsg};

use super::lifecycle::Lifecycle;
use super::observable::{next_change, StateCell};
use super::types::{ConnectionState, ParticipantState};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(40);
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(1500);
const CLOSE_TIMEOUT: Duration = Duration::from_millis(500);

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Inbound traffic surfaced to the owner of a channel.
#[derive(Debug, Clone, PartialEq)]
pub enum NetEvent {
    Roster(RosterMsg),
    ConfigChanged { room: String },
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("invalid aggregator url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("unsupported url scheme {0:?}, expected ws or wss")]
    UnsupportedScheme(String),
    #[error("room id must not be empty")]
    EmptyRoom,
}

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub url: String,
    pub room_id: String,
    pub participant_id: Option<String>,
    pub secret: Option<String>,
    pub debounce: Duration,
    pub reconnect_delay: Duration,
}

impl ChannelConfig {
    pub fn new(url: impl Into<String>, room_id: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            room_id: room_id.into(),
            participant_id: None,
            secret: None,
            debounce: DEFAULT_DEBOUNCE,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }

    pub fn with_participant_id(mut self, id: impl Into<String>) -> Self {
        self.participant_id = Some(id.into());
        self
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn validate(&self) -> Result<(), ChannelError> {
        let url = Url::parse(&self.url)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ChannelError::UnsupportedScheme(url.scheme().to_string()));
        }
        if self.room_id.trim().is_empty() {
            return Err(ChannelError::EmptyRoom);
        }
        Ok(())
    }
}

#[derive(Debug)]
enum ChannelCommand {
    Destroy,
}

/// Handle shared by both channel kinds. Dropping it destroys the channel.
struct LinkHandle {
    cmd_tx: mpsc::UnboundedSender<ChannelCommand>,
    status: watch::Receiver<ConnectionState>,
    task: JoinHandle<()>,
}

impl LinkHandle {
    fn spawn(
        config: ChannelConfig,
        role: Role,
        outbound: Option<watch::Receiver<ParticipantState>>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<NetEvent>), ChannelError> {
        config.validate()?;

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (lifecycle, status) = Lifecycle::new();

        let task = tokio::spawn(
            ChannelTask {
                config,
                role,
                outbound,
                cmd_rx,
                event_tx,
                lifecycle,
            }
            .run(),
        );

        Ok((
            Self {
                cmd_tx,
                status,
                task,
            },
            event_rx,
        ))
    }

    fn destroy(&self) {
        let _ = self.cmd_tx.send(ChannelCommand::Destroy);
    }
}

/// Participant side: keeps the aggregator informed of the local
/// [`ParticipantState`], reconnecting after unexpected loss.
pub struct ParticipantChannel {
    state: StateCell<ParticipantState>,
    link: LinkHandle,
}

impl ParticipantChannel {
    pub fn spawn(
        config: ChannelConfig,
        initial: ParticipantState,
    ) -> Result<(Self, mpsc::UnboundedReceiver<NetEvent>), ChannelError> {
        let state = StateCell::new(initial);
        let (link, events) = LinkHandle::spawn(config, Role::Participant, Some(state.subscribe()))?;
        Ok((Self { state, link }, events))
    }

    /// The state this channel transmits. Writes schedule a debounced send.
    pub fn local_state(&self) -> &StateCell<ParticipantState> {
        &self.state
    }

    pub fn status(&self) -> watch::Receiver<ConnectionState> {
        self.link.status.clone()
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.link.status.borrow()
    }

    /// Close the socket and never reconnect. Idempotent.
    pub fn destroy(&self) {
        self.link.destroy();
    }

    /// Wait for the background task to finish after `destroy`.
    pub async fn closed(&mut self) {
        let _ = (&mut self.link.task).await;
    }
}

/// Display side: same connection loop, read-only.
pub struct DisplayLink {
    link: LinkHandle,
}

impl DisplayLink {
    pub fn spawn(
        config: ChannelConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<NetEvent>), ChannelError> {
        let (link, events) = LinkHandle::spawn(config, Role::Display, None)?;
        Ok((Self { link }, events))
    }

    pub fn status(&self) -> watch::Receiver<ConnectionState> {
        self.link.status.clone()
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.link.status.borrow()
    }

    pub fn destroy(&self) {
        self.link.destroy();
    }

    pub async fn closed(&mut self) {
        let _ = (&mut self.link.task).await;
    }
}

struct ChannelTask {
    config: ChannelConfig,
    role: Role,
    outbound: Option<watch::Receiver<ParticipantState>>,
    cmd_rx: mpsc::UnboundedReceiver<ChannelCommand>,
    event_tx: mpsc::UnboundedSender<NetEvent>,
    lifecycle: Lifecycle,
}

impl ChannelTask {
    async fn run(mut self) {
        while self.lifecycle.begin_connect() {
            let connect = tokio::select! {
                cmd = self.cmd_rx.recv() => {
                    tracing::debug!("channel destroyed while connecting ({:?})", cmd);
                    self.lifecycle.destroy();
                    return;
                }
                res = tokio_tungstenite::connect_async(self.config.url.as_str()) => res,
            };

            let reconnect = match connect {
                Ok((ws, _)) => {
                    self.lifecycle.opened();
                    tracing::info!(room = %self.config.room_id, role = ?self.role, "connected to {}", self.config.url);
                    self.session(ws).await
                }
                Err(e) => {
                    tracing::warn!("connect to {} failed: {}", self.config.url, e);
                    self.lifecycle.lost(true)
                }
            };
            if !reconnect {
                break;
            }

            tokio::select! {
                _ = self.cmd_rx.recv() => {
                    self.lifecycle.destroy();
                    break;
                }
                _ = tokio::time::sleep(self.config.reconnect_delay) => {}
            }
        }
        tracing::debug!(
            room = %self.config.room_id,
            destroyed = self.lifecycle.is_destroyed(),
            "channel task finished"
        );
    }

    /// Drive one open socket. Returns true if a reconnect should follow.
    async fn session(&mut self, ws: WebSocketStream<MaybeTlsStream<TcpStream>>) -> bool {
        let (mut write, mut read) = ws.split();

        let hello = ClientMsg::Hello(self.hello());
        send_msg(&mut write, &hello).await;
        self.flush(&mut write).await;

        let mut deadline: Option<Instant> = None;

        loop {
            tokio::select! {
                _ = self.cmd_rx.recv() => {
                    self.lifecycle.destroy();
                    let _ = tokio::time::timeout(CLOSE_TIMEOUT, write.close()).await;
                    return false;
                }

                _ = next_change(&mut self.outbound) => {
                    // Window opens on the first change and is not extended
                    if deadline.is_none() {
                        deadline = Some(Instant::now() + self.config.debounce);
                    }
                }

                _ = sleep_until_opt(deadline) => {
                    deadline = None;
                    self.flush(&mut write).await;
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => self.dispatch(&text),
                        Some(Ok(Message::Close(_))) | None => {
                            tracing::info!(room = %self.config.room_id, "connection closed by aggregator");
                            return self.lifecycle.lost(false);
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            tracing::warn!(room = %self.config.room_id, "socket error: {}", e);
                            let _ = tokio::time::timeout(CLOSE_TIMEOUT, write.close()).await;
                            return self.lifecycle.lost(true);
                        }
                    }
                }
            }
        }
    }

    fn hello(&self) -> HelloMsg {
        let nickname = self
            .outbound
            .as_ref()
            .map(|rx| rx.borrow().nickname.trim().to_string())
            .filter(|n| !n.is_empty());
        HelloMsg {
            role: self.role,
            room_id: self.config.room_id.clone(),
            participant_id: self.config.participant_id.clone(),
            nickname,
            secret: self.config.secret.clone(),
        }
    }

    /// Send the latest local state, if this channel has any.
    async fn flush(&mut self, write: &mut WsSink) {
        if !self.lifecycle.is_open() {
            return;
        }
        let Some(rx) = self.outbound.as_mut() else {
            return;
        };
        let update = rx.borrow_and_update().to_update();
        send_msg(write, &ClientMsg::Update(update)).await;
    }

    fn dispatch(&self, text: &str) {
        let event = match serde_json::from_str::<ServerMsg>(text) {
            Ok(ServerMsg::State(roster)) => NetEvent::Roster(roster),
            Ok(ServerMsg::ConfigChanged(msg)) => NetEvent::ConfigChanged { room: msg.room },
            Err(e) => {
                tracing::debug!("dropping malformed message: {}", e);
                return;
            }
        };
        let _ = self.event_tx.send(event);
    }
}

async fn send_msg(write: &mut WsSink, msg: &ClientMsg) {
    let Ok(json) = serde_json::to_string(msg) else {
        return;
    };
    if let Err(e) = write.send(Message::Text(json.into())).await {
        tracing::debug!("send failed: {}", e);
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_accepts_ws_urls() {
        assert!(ChannelConfig::new("ws://127.0.0.1:9002/ws", "lobby")
            .validate()
            .is_ok());
        assert!(ChannelConfig::new("wss://example.org/ws", "lobby")
            .validate()
            .is_ok());
    }

    #[test]
    fn config_rejects_bad_urls() {
        assert!(matches!(
            ChannelConfig::new("http://example.org", "lobby").validate(),
            Err(ChannelError::UnsupportedScheme(_))
        ));
        assert!(matches!(
            ChannelConfig::new("not a url", "lobby").validate(),
            Err(ChannelError::InvalidUrl(_))
        ));
        assert!(matches!(
            ChannelConfig::new("ws://127.0.0.1/ws", "  ").validate(),
            Err(ChannelError::EmptyRoom)
        ));
    }

    #[test]
    fn builders_set_fields() {
        let config = ChannelConfig::new("ws://h/ws", "r")
            .with_participant_id("p1")
            .with_secret("s")
            .with_debounce(Duration::from_millis(10))
            .with_reconnect_delay(Duration::from_millis(20));
        assert_eq!(config.participant_id.as_deref(), Some("p1"));
        assert_eq!(config.secret.as_deref(), Some("s"));
        assert_eq!(config.debounce, Duration::from_millis(10));
        assert_eq!(config.reconnect_delay, Duration::from_millis(20));
    }

    #[tokio::test]
    async fn spawn_rejects_invalid_config() {
        let result = DisplayLink::spawn(ChannelConfig::new("ftp://x", "lobby"));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn destroy_while_unreachable_stops_the_task() {
        // Nothing listens on port 9 locally; the task loops on reconnect
        let config = ChannelConfig::new("ws://127.0.0.1:9/ws", "lobby")
            .with_reconnect_delay(Duration::from_millis(20));
        let (mut link, _events) = DisplayLink::spawn(config).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        link.destroy();
        tokio::time::timeout(Duration::from_secs(2), link.closed())
            .await
            .expect("task should stop after destroy");
        assert_eq!(link.connection_state(), ConnectionState::Closed);
    }
}
