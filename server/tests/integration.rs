//! Integration tests for the room aggregator.
//!
//! These tests start a real server instance and connect via WebSocket
//! to verify end-to-end behavior.

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use swayroom_server::config::ServerConfig;
use swayroom_server::hub::{run_hub, HubBroadcast, HubCommand};
use swayroom_server::ws::{router, AppState};

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

// Re-create minimal protocol types for testing
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ServerMsg {
    #[serde(rename = "state")]
    State { room: String, users: Vec<serde_json::Value> },
    #[serde(rename = "config_changed")]
    ConfigChanged { room: String },
}

struct TestServer {
    ws_url: String,
    addr: std::net::SocketAddr,
}

/// Start a test server on a random available port.
async fn start_test_server(config: ServerConfig) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (hub_tx, hub_rx) = mpsc::channel::<HubCommand>(256);
    let (broadcast_tx, _) = broadcast::channel::<HubBroadcast>(64);
    let app_state = AppState::new(&config, hub_tx, broadcast_tx.clone());

    tokio::spawn(async move {
        run_hub(hub_rx, broadcast_tx, config).await;
    });

    let app = router(app_state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        ws_url: format!("ws://{}/ws", addr),
        addr,
    }
}

fn test_config() -> ServerConfig {
    ServerConfig {
        listen_addr: "127.0.0.1:0".to_string(),
        broadcast_rate_hz: 50,
        ..Default::default()
    }
}

async fn connect(url: &str) -> WsStream {
    let (ws, _) = connect_async(url).await.expect("Failed to connect");
    ws
}

async fn send_json(ws: &mut WsStream, value: serde_json::Value) {
    ws.send(Message::Text(value.to_string().into()))
        .await
        .unwrap();
}

async fn hello(ws: &mut WsStream, role: &str, room: &str, nickname: &str) {
    send_json(
        ws,
        serde_json::json!({ "type": "hello", "role": role, "roomId": room, "nickname": nickname }),
    )
    .await;
}

/// Read the next text message and parse as ServerMsg.
async fn recv_msg(ws: &mut WsStream) -> ServerMsg {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => {
                return serde_json::from_str(&text).expect("Failed to parse server message");
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => panic!("WebSocket error: {}", e),
            None => panic!("WebSocket closed unexpectedly"),
        }
    }
}

async fn recv_msg_timeout(ws: &mut WsStream, timeout: Duration) -> Option<ServerMsg> {
    tokio::time::timeout(timeout, recv_msg(ws)).await.ok()
}

/// Wait for a roster matching `pred`.
async fn wait_for_roster(
    ws: &mut WsStream,
    pred: impl Fn(&[serde_json::Value]) -> bool,
) -> Option<Vec<serde_json::Value>> {
    for _ in 0..20 {
        if let Some(ServerMsg::State { users, .. }) =
            recv_msg_timeout(ws, Duration::from_millis(200)).await
        {
            if pred(&users) {
                return Some(users);
            }
        }
    }
    None
}

/// True once the server has closed the socket.
async fn wait_for_close(ws: &mut WsStream) -> bool {
    for _ in 0..10 {
        match tokio::time::timeout(Duration::from_millis(200), ws.next()).await {
            Ok(Some(Ok(Message::Close(_)))) | Ok(None) | Ok(Some(Err(_))) => return true,
            Ok(Some(Ok(_))) => continue,
            Err(_) => {
                if ws.send(Message::Ping(vec![].into())).await.is_err() {
                    return true;
                }
            }
        }
    }
    false
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_display_receives_roster_after_hello() {
    let server = start_test_server(test_config()).await;
    let mut display = connect(&server.ws_url).await;
    hello(&mut display, "display", "lobby", "wall").await;

    match recv_msg(&mut display).await {
        ServerMsg::State { room, users } => {
            assert_eq!(room, "lobby");
            assert!(users.is_empty());
        }
        other => panic!("Expected State, got {:?}", other),
    }
}

#[tokio::test]
async fn test_participant_update_reaches_display() {
    let server = start_test_server(test_config()).await;
    let mut display = connect(&server.ws_url).await;
    hello(&mut display, "display", "lobby", "wall").await;
    let _initial = recv_msg(&mut display).await;

    let mut participant = connect(&server.ws_url).await;
    hello(&mut participant, "participant", "lobby", "ada").await;
    send_json(
        &mut participant,
        serde_json::json!({ "type": "update", "x": 0.25, "y": 1.5, "theta": -12.0, "color": "#ff6600" }),
    )
    .await;

    let users = wait_for_roster(&mut display, |users| {
        users.len() == 1 && users[0]["x"].as_f64() == Some(0.25)
    })
    .await
    .expect("update should appear in a roster");

    assert_eq!(users[0]["nickname"], "ada");
    assert_eq!(users[0]["y"].as_f64(), Some(1.0), "y is clamped");
    assert_eq!(users[0]["theta"].as_f64(), Some(-12.0));
    assert_eq!(users[0]["color"], "#ff6600");
}

#[tokio::test]
async fn test_rooms_are_isolated() {
    let server = start_test_server(test_config()).await;
    let mut display = connect(&server.ws_url).await;
    hello(&mut display, "display", "lobby", "wall").await;
    let _initial = recv_msg(&mut display).await;

    let mut elsewhere = connect(&server.ws_url).await;
    hello(&mut elsewhere, "participant", "other-room", "bob").await;

    let leaked = wait_for_roster(&mut display, |users| !users.is_empty()).await;
    assert!(leaked.is_none(), "Participants of other rooms must not appear");
}

#[tokio::test]
async fn test_participant_disconnect_removes_from_roster() {
    let server = start_test_server(test_config()).await;
    let mut display = connect(&server.ws_url).await;
    hello(&mut display, "display", "lobby", "wall").await;
    let _initial = recv_msg(&mut display).await;

    let mut participant = connect(&server.ws_url).await;
    hello(&mut participant, "participant", "lobby", "ada").await;
    assert!(wait_for_roster(&mut display, |users| users.len() == 1)
        .await
        .is_some());

    participant.close(None).await.unwrap();

    assert!(
        wait_for_roster(&mut display, |users| users.is_empty())
            .await
            .is_some(),
        "Disconnected participant should be removed from the roster"
    );
}

#[tokio::test]
async fn test_wrong_secret_is_rejected() {
    let mut config = test_config();
    config
        .room_secrets
        .insert("vip".to_string(), "open-sesame".to_string());
    let server = start_test_server(config).await;

    let mut ws = connect(&server.ws_url).await;
    send_json(
        &mut ws,
        serde_json::json!({ "type": "hello", "role": "display", "roomId": "vip", "secret": "guess" }),
    )
    .await;
    assert!(wait_for_close(&mut ws).await);

    let mut ok = connect(&server.ws_url).await;
    send_json(
        &mut ok,
        serde_json::json!({ "type": "hello", "role": "display", "roomId": "vip", "secret": "open-sesame" }),
    )
    .await;
    assert!(matches!(recv_msg(&mut ok).await, ServerMsg::State { .. }));
}

#[tokio::test]
async fn test_first_frame_must_be_hello() {
    let server = start_test_server(test_config()).await;
    let mut ws = connect(&server.ws_url).await;
    send_json(
        &mut ws,
        serde_json::json!({ "type": "update", "x": 0.5, "y": 0.5, "theta": 0, "color": 0 }),
    )
    .await;
    assert!(wait_for_close(&mut ws).await);
}

#[tokio::test]
async fn test_config_changed_push_reaches_room() {
    let server = start_test_server(test_config()).await;

    let mut display = connect(&server.ws_url).await;
    hello(&mut display, "display", "lobby", "wall").await;
    let _initial = recv_msg(&mut display).await;

    let mut participant = connect(&server.ws_url).await;
    hello(&mut participant, "participant", "lobby", "ada").await;

    let mut outsider = connect(&server.ws_url).await;
    hello(&mut outsider, "display", "other-room", "wall-2").await;
    let _initial = recv_msg(&mut outsider).await;

    // Let the joins settle before triggering
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut http = TcpStream::connect(server.addr).await.unwrap();
    http.write_all(
        b"POST /rooms/lobby/config-changed HTTP/1.1\r\nHost: localhost\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
    )
    .await
    .unwrap();
    let mut response = String::new();
    http.read_to_string(&mut response).await.unwrap();
    assert!(response.starts_with("HTTP/1.1 202"), "got {response}");

    let mut participant_notified = false;
    for _ in 0..10 {
        match recv_msg_timeout(&mut participant, Duration::from_millis(200)).await {
            Some(ServerMsg::ConfigChanged { room }) => {
                assert_eq!(room, "lobby");
                participant_notified = true;
                break;
            }
            Some(_) => continue,
            None => break,
        }
    }
    assert!(participant_notified);

    let mut display_notified = false;
    for _ in 0..10 {
        match recv_msg_timeout(&mut display, Duration::from_millis(200)).await {
            Some(ServerMsg::ConfigChanged { .. }) => {
                display_notified = true;
                break;
            }
            Some(_) => continue,
            None => break,
        }
    }
    assert!(display_notified);

    let mut outsider_notified = false;
    while let Some(msg) = recv_msg_timeout(&mut outsider, Duration::from_millis(200)).await {
        if matches!(msg, ServerMsg::ConfigChanged { .. }) {
            outsider_notified = true;
        }
    }
    assert!(!outsider_notified, "Other rooms must not be told to reload");
}

#[tokio::test]
async fn test_oversized_message_disconnects_client() {
    let server = start_test_server(test_config()).await;
    let mut ws = connect(&server.ws_url).await;
    hello(&mut ws, "participant", "lobby", "ada").await;

    let huge_payload = "x".repeat(2000);
    let msg = format!(
        r#"{{"type":"update","x":0.5,"y":0.5,"theta":0,"color":0,"extra":"{}"}}"#,
        huge_payload
    );
    let _ = ws.send(Message::Text(msg.into())).await;

    assert!(
        wait_for_close(&mut ws).await,
        "Client should be disconnected after oversized message"
    );
}

#[tokio::test]
async fn test_parse_spam_disconnects_client() {
    let server = start_test_server(test_config()).await;
    let mut ws = connect(&server.ws_url).await;
    hello(&mut ws, "participant", "lobby", "ada").await;

    for _ in 0..10 {
        let _ = ws.send(Message::Text("not valid json".into())).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert!(
        wait_for_close(&mut ws).await,
        "Client should be disconnected after too many parse errors"
    );
}
