use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use swayroom_shared::protocol::{ClientMsg, HelloMsg, Role, ServerMsg};
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::config::ServerConfig;
use crate::hub::{HubBroadcast, HubCommand};

/// Shared app state passed to each WebSocket handler
#[derive(Clone)]
pub struct AppState {
    pub hub_tx: mpsc::Sender<HubCommand>,
    pub broadcast_tx: broadcast::Sender<HubBroadcast>,
    pub max_message_bytes: usize,
    pub max_parse_errors: u32,
    pub hello_timeout: Duration,
}

impl AppState {
    pub fn new(
        config: &ServerConfig,
        hub_tx: mpsc::Sender<HubCommand>,
        broadcast_tx: broadcast::Sender<HubBroadcast>,
    ) -> Self {
        Self {
            hub_tx,
            broadcast_tx,
            max_message_bytes: config.max_message_bytes,
            max_parse_errors: config.max_parse_errors,
            hello_timeout: config.hello_timeout,
        }
    }
}

/// `/ws` for sockets and `/rooms/{room}/config-changed` for the configuration provider.
pub fn router(app_state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/rooms/{room}/config-changed", post(config_changed_handler))
        .with_state(app_state)
}

/// HTTP handler for WebSocket upgrade
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, app_state))
}

/// Tell every socket in `room` to reload its room configuration.
pub async fn config_changed_handler(
    Path(room): Path<String>,
    State(app_state): State<AppState>,
) -> StatusCode {
    match app_state
        .hub_tx
        .send(HubCommand::ConfigChanged { room })
        .await
    {
        Ok(()) => StatusCode::ACCEPTED,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

async fn handle_socket(socket: WebSocket, app_state: AppState) {
    let (mut sink, mut stream) = socket.split();

    let hello = match tokio::time::timeout(
        app_state.hello_timeout,
        read_hello(&mut stream, app_state.max_message_bytes),
    )
    .await
    {
        Ok(Some(hello)) => hello,
        Ok(None) | Err(_) => {
            tracing::debug!("Socket closed without a valid hello");
            let _ = sink.close().await;
            return;
        }
    };
    let role = hello.role;
    let room = hello.room_id.trim().to_string();

    // Subscribe before joining so no roster is missed in between
    let mut broadcast_rx = app_state.broadcast_tx.subscribe();

    let (resp_tx, resp_rx) = oneshot::channel();
    if app_state
        .hub_tx
        .send(HubCommand::Join {
            hello,
            response: resp_tx,
        })
        .await
        .is_err()
    {
        tracing::error!("Failed to send Join command");
        return;
    }

    let ack = match resp_rx.await {
        Ok(Ok(ack)) => ack,
        Ok(Err(_)) => {
            let _ = sink.close().await;
            return;
        }
        Err(_) => {
            tracing::error!("Failed to receive join reply");
            return;
        }
    };
    let my_id = ack.id;

    if role == Role::Display {
        if let Ok(json) = serde_json::to_string(&ServerMsg::State(ack.roster)) {
            if sink.send(Message::Text(json.into())).await.is_err() {
                let _ = app_state.hub_tx.send(HubCommand::Leave { id: my_id }).await;
                return;
            }
        }
    }

    let mut parse_errors = 0u32;

    loop {
        tokio::select! {
            // Client -> Server
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if text.len() > app_state.max_message_bytes {
                            tracing::warn!("Connection {} sent oversized frame ({} bytes)", my_id, text.len());
                            break;
                        }
                        match serde_json::from_str::<ClientMsg>(&text) {
                            Ok(ClientMsg::Update(update)) => {
                                if role == Role::Participant {
                                    let _ = app_state.hub_tx.send(HubCommand::Update { id: my_id, update }).await;
                                }
                            }
                            Ok(ClientMsg::Hello(_)) => {} // Already identified
                            Err(_) => {
                                parse_errors += 1;
                                if parse_errors > app_state.max_parse_errors {
                                    tracing::warn!("Connection {} exceeded parse error limit", my_id);
                                    break;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        if bytes.len() > app_state.max_message_bytes {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    _ => {} // Ignore ping/pong
                }
            }

            // Server -> Client (broadcast)
            result = broadcast_rx.recv() => {
                match result {
                    Ok(broadcast) => {
                        let json = match broadcast {
                            HubBroadcast::Roster(roster) => {
                                if role != Role::Display || roster.room != room {
                                    continue;
                                }
                                serde_json::to_string(&ServerMsg::State(roster))
                            }
                            HubBroadcast::ConfigChanged(changed) => {
                                if changed.room != room {
                                    continue;
                                }
                                serde_json::to_string(&ServerMsg::ConfigChanged(changed))
                            }
                        };

                        if let Ok(json) = json {
                            if sink.send(Message::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("Connection {} lagged by {} messages", my_id, n);
                        // Continue - every roster is a full snapshot, dropping is fine
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    // Cleanup on disconnect
    let _ = sink.close().await;
    let _ = app_state
        .hub_tx
        .send(HubCommand::Leave { id: my_id })
        .await;
}

/// Wait for the first text frame and require it to be a hello.
async fn read_hello(
    stream: &mut SplitStream<WebSocket>,
    max_message_bytes: usize,
) -> Option<HelloMsg> {
    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                if text.len() > max_message_bytes {
                    return None;
                }
                return match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(ClientMsg::Hello(hello)) => Some(hello),
                    _ => None,
                };
            }
            Ok(Message::Close(_)) | Err(_) => return None,
            _ => {}
        }
    }
    None
}
