//! Participant channel and display link against a scripted aggregator.
//!
//! Each test binds an ephemeral port, plays the aggregator side by hand
//! and checks what the channel puts on the wire.

use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use swayroom_client::shared::connection::{
    ChannelConfig, DisplayLink, NetEvent, ParticipantChannel,
};
use swayroom_client::shared::types::{ColorRef, ConnectionState, ParticipantState};

type PeerStream = WebSocketStream<TcpStream>;

const QUIET: Duration = Duration::from_millis(300);

async fn listen() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/ws", listener.local_addr().unwrap());
    (listener, url)
}

async fn accept(listener: &TcpListener) -> PeerStream {
    let (stream, _) = tokio::time::timeout(Duration::from_secs(3), listener.accept())
        .await
        .expect("channel should connect")
        .unwrap();
    tokio_tungstenite::accept_async(stream).await.unwrap()
}

async fn no_connection_within(listener: &TcpListener, window: Duration) -> bool {
    tokio::time::timeout(window, listener.accept()).await.is_err()
}

async fn next_json(ws: &mut PeerStream) -> serde_json::Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(3), ws.next())
            .await
            .expect("expected a message")
            .expect("stream ended")
            .unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn next_json_within(ws: &mut PeerStream, window: Duration) -> Option<serde_json::Value> {
    match tokio::time::timeout(window, ws.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => serde_json::from_str(&text).ok(),
        _ => None,
    }
}

fn config(url: &str) -> ChannelConfig {
    ChannelConfig::new(url, "lobby")
        .with_participant_id("p-1")
        .with_debounce(Duration::from_millis(100))
        .with_reconnect_delay(Duration::from_millis(50))
}

fn initial() -> ParticipantState {
    ParticipantState::new("ada", ColorRef::Index(3))
}

#[tokio::test]
async fn test_open_sends_hello_then_state() {
    let (listener, url) = listen().await;
    let (_channel, _events) = ParticipantChannel::spawn(config(&url).with_secret("s3"), initial()).unwrap();
    let mut peer = accept(&listener).await;

    let hello = next_json(&mut peer).await;
    assert_eq!(hello["type"], "hello");
    assert_eq!(hello["role"], "participant");
    assert_eq!(hello["roomId"], "lobby");
    assert_eq!(hello["participantId"], "p-1");
    assert_eq!(hello["nickname"], "ada");
    assert_eq!(hello["secret"], "s3");

    let update = next_json(&mut peer).await;
    assert_eq!(update["type"], "update");
    assert_eq!(update["x"], 0.5);
    assert_eq!(update["color"], 3);
}

#[tokio::test]
async fn test_debounce_coalesces_mutations() {
    let (listener, url) = listen().await;
    let (channel, _events) = ParticipantChannel::spawn(config(&url), initial()).unwrap();
    let mut peer = accept(&listener).await;
    let _hello = next_json(&mut peer).await;
    let _flush = next_json(&mut peer).await;

    let state = channel.local_state();
    state.update(|s| s.set_position(0.1, 0.5));
    state.update(|s| s.set_position(0.2, 0.5));
    state.update(|s| {
        s.set_position(0.3, 0.4);
        s.set_theta(-7.5, 30.0);
    });

    let update = next_json(&mut peer).await;
    assert_eq!(update["type"], "update");
    assert_eq!(update["x"], 0.3);
    assert_eq!(update["y"], 0.4);
    assert_eq!(update["theta"], -7.5);

    assert!(
        next_json_within(&mut peer, QUIET).await.is_none(),
        "three mutations in one window must produce one send"
    );
}

#[tokio::test]
async fn test_unchanged_writes_send_nothing() {
    let (listener, url) = listen().await;
    let (channel, _events) = ParticipantChannel::spawn(config(&url), initial()).unwrap();
    let mut peer = accept(&listener).await;
    let _hello = next_json(&mut peer).await;
    let _flush = next_json(&mut peer).await;

    channel.local_state().update(|s| s.set_position(0.5, 0.5));
    assert!(next_json_within(&mut peer, QUIET).await.is_none());
}

#[tokio::test]
async fn test_unexpected_close_reconnects_once() {
    let (listener, url) = listen().await;
    let (channel, _events) = ParticipantChannel::spawn(config(&url), initial()).unwrap();

    let mut first = accept(&listener).await;
    let _hello = next_json(&mut first).await;
    first.close(None).await.unwrap();

    let mut second = accept(&listener).await;
    let hello = next_json(&mut second).await;
    assert_eq!(hello["type"], "hello", "reconnect identifies again");

    assert!(no_connection_within(&listener, QUIET).await);
    assert_eq!(channel.connection_state(), ConnectionState::Open);
}

#[tokio::test]
async fn test_socket_error_reports_error_and_reconnects_once() {
    let (listener, url) = listen().await;
    let config = config(&url).with_reconnect_delay(Duration::from_millis(300));
    let (channel, _events) = ParticipantChannel::spawn(config, initial()).unwrap();
    let mut status = channel.status();

    let mut first = accept(&listener).await;
    let _hello = next_json(&mut first).await;
    let _flush = next_json(&mut first).await;

    // Unmasked final frame with reserved opcode 0x3
    first.get_mut().write_all(&[0x83, 0x00]).await.unwrap();
    first.get_mut().flush().await.unwrap();

    tokio::time::timeout(Duration::from_secs(2), async {
        while *status.borrow_and_update() != ConnectionState::Error {
            status.changed().await.unwrap();
        }
    })
    .await
    .expect("status should report the socket error");

    let mut second = accept(&listener).await;
    let hello = next_json(&mut second).await;
    assert_eq!(hello["type"], "hello");

    assert!(no_connection_within(&listener, QUIET).await);
    assert_eq!(channel.connection_state(), ConnectionState::Open);
}

#[tokio::test]
async fn test_reconnect_flushes_changes_made_while_down() {
    let (listener, url) = listen().await;
    let config = config(&url).with_reconnect_delay(Duration::from_millis(200));
    let (channel, _events) = ParticipantChannel::spawn(config, initial()).unwrap();

    let mut first = accept(&listener).await;
    let _hello = next_json(&mut first).await;
    let _flush = next_json(&mut first).await;
    drop(first);

    let mut status = channel.status();
    tokio::time::timeout(Duration::from_secs(2), async {
        while *status.borrow_and_update() == ConnectionState::Open {
            status.changed().await.unwrap();
        }
    })
    .await
    .expect("channel should notice the drop");

    channel.local_state().update(|s| s.set_position(0.9, 0.1));

    let mut second = accept(&listener).await;
    let _hello = next_json(&mut second).await;
    let flush = next_json(&mut second).await;
    assert_eq!(flush["x"], 0.9);
    assert_eq!(flush["y"], 0.1);
}

#[tokio::test]
async fn test_destroy_closes_and_never_reconnects() {
    let (listener, url) = listen().await;
    let (mut channel, _events) = ParticipantChannel::spawn(config(&url), initial()).unwrap();
    let mut peer = accept(&listener).await;
    let _hello = next_json(&mut peer).await;

    channel.destroy();
    tokio::time::timeout(Duration::from_secs(2), channel.closed())
        .await
        .expect("channel task should finish");

    let closed = matches!(
        tokio::time::timeout(Duration::from_secs(1), peer.next()).await,
        Ok(Some(Ok(Message::Close(_)))) | Ok(None) | Ok(Some(Err(_)))
    );
    assert!(closed, "peer should see the socket close");
    assert!(no_connection_within(&listener, QUIET).await);
    assert_eq!(channel.connection_state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_destroy_during_reconnect_wait() {
    let (listener, url) = listen().await;
    let config = config(&url).with_reconnect_delay(Duration::from_millis(400));
    let (mut channel, _events) = ParticipantChannel::spawn(config, initial()).unwrap();

    let first = accept(&listener).await;
    drop(first);
    tokio::time::sleep(Duration::from_millis(100)).await;

    channel.destroy();
    tokio::time::timeout(Duration::from_secs(2), channel.closed())
        .await
        .expect("channel task should finish");
    assert!(no_connection_within(&listener, Duration::from_millis(700)).await);
}

#[tokio::test]
async fn test_dropping_the_handle_destroys() {
    let (listener, url) = listen().await;
    let (channel, _events) = ParticipantChannel::spawn(config(&url), initial()).unwrap();
    let mut peer = accept(&listener).await;
    let _hello = next_json(&mut peer).await;

    drop(channel);
    let closed = matches!(
        tokio::time::timeout(Duration::from_secs(1), peer.next()).await,
        Ok(Some(Ok(Message::Close(_)))) | Ok(None) | Ok(Some(Err(_)))
    );
    assert!(closed);
    assert!(no_connection_within(&listener, QUIET).await);
}

#[tokio::test]
async fn test_display_link_surfaces_rosters_and_drops_garbage() {
    let (listener, url) = listen().await;
    let (_link, mut events) = DisplayLink::spawn(config(&url)).unwrap();
    let mut peer = accept(&listener).await;

    let hello = next_json(&mut peer).await;
    assert_eq!(hello["role"], "display");
    assert!(next_json_within(&mut peer, QUIET).await.is_none(), "displays never send updates");

    peer.send(Message::Text("not json".into())).await.unwrap();
    peer.send(Message::Text(r#"{"type":"mystery"}"#.into())).await.unwrap();
    let roster = serde_json::json!({
        "type": "state",
        "room": "lobby",
        "users": [{ "x": 0.2, "y": 0.3, "theta": 4.0, "color": "#00ff00", "nickname": "bob" }]
    });
    peer.send(Message::Text(roster.to_string().into())).await.unwrap();
    peer.send(Message::Text(r#"{"type":"config_changed","room":"lobby"}"#.into()))
        .await
        .unwrap();

    let first = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .unwrap()
        .unwrap();
    match first {
        NetEvent::Roster(roster) => {
            assert_eq!(roster.users.len(), 1);
            assert_eq!(roster.users[0].nickname, "bob");
        }
        other => panic!("expected roster, got {:?}", other),
    }

    let second = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        second,
        NetEvent::ConfigChanged {
            room: "lobby".to_string()
        }
    );
}

#[tokio::test]
async fn test_status_reports_error_when_unreachable() {
    let (listener, url) = listen().await;
    drop(listener);

    let (link, _events) = DisplayLink::spawn(config(&url)).unwrap();
    let mut status = link.status();
    let reached = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if *status.borrow_and_update() == ConnectionState::Error {
                return;
            }
            status.changed().await.unwrap();
        }
    })
    .await;
    assert!(reached.is_ok());
    link.destroy();
}
