//! Load test for the room aggregator.
//!
//! Spawns fake WebSocket participants that:
//! - Join one room
//! - Periodically send update messages along a wobbling path
//!
//! plus one display that counts roster broadcasts.
//!
//! Usage: cargo run --bin loadtest -- [OPTIONS]
//!
//! Options:
//!   --clients N      Number of participants to spawn (default: 100)
//!   --duration S     Test duration in seconds (default: 30)
//!   --update-rate R  Updates per second per participant (default: 10)
//!   --room ROOM      Room id (default: loadtest)
//!   --url URL        Server URL (default: ws://127.0.0.1:9002/ws)

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message};

// === Protocol types (minimal subset) ===

#[derive(Serialize)]
struct HelloOut<'a> {
    #[serde(rename = "type")]
    msg_type: &'static str,
    role: &'static str,
    #[serde(rename = "roomId")]
    room_id: &'a str,
    nickname: String,
}

#[derive(Serialize)]
struct UpdateOut {
    #[serde(rename = "type")]
    msg_type: &'static str,
    x: f64,
    y: f64,
    theta: f64,
    color: u32,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
#[allow(dead_code)]
enum ServerMsg {
    #[serde(rename = "state")]
    State { users: Vec<serde_json::Value> },
    #[serde(rename = "config_changed")]
    ConfigChanged {},
}

// === Metrics ===

struct Metrics {
    connected: AtomicU64,
    updates_sent: AtomicU64,
    rosters_received: AtomicU64,
    total_users_seen: AtomicU64,
    errors: AtomicU64,
    latency_sum_ms: AtomicU64,
    latency_count: AtomicU64,
}

impl Metrics {
    fn new() -> Self {
        Self {
            connected: AtomicU64::new(0),
            updates_sent: AtomicU64::new(0),
            rosters_received: AtomicU64::new(0),
            total_users_seen: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            latency_sum_ms: AtomicU64::new(0),
            latency_count: AtomicU64::new(0),
        }
    }
}

// === Participant task ===

async fn run_participant(
    client_id: u32,
    url: String,
    room: String,
    update_rate: f64,
    duration: Duration,
    metrics: Arc<Metrics>,
) {
    let connect_start = Instant::now();

    let (mut ws, _) = match connect_async(&url).await {
        Ok(conn) => conn,
        Err(e) => {
            if client_id < 5 {
                eprintln!("Client {} failed to connect: {}", client_id, e);
            }
            metrics.errors.fetch_add(1, Ordering::Relaxed);
            return;
        }
    };

    metrics
        .latency_sum_ms
        .fetch_add(connect_start.elapsed().as_millis() as u64, Ordering::Relaxed);
    metrics.latency_count.fetch_add(1, Ordering::Relaxed);
    metrics.connected.fetch_add(1, Ordering::Relaxed);

    let hello = HelloOut {
        msg_type: "hello",
        role: "participant",
        room_id: &room,
        nickname: format!("load-{client_id}"),
    };
    let Ok(json) = serde_json::to_string(&hello) else {
        return;
    };
    if ws.send(Message::Text(json.into())).await.is_err() {
        metrics.errors.fetch_add(1, Ordering::Relaxed);
        metrics.connected.fetch_sub(1, Ordering::Relaxed);
        return;
    }

    let update_interval = if update_rate > 0.0 {
        Duration::from_secs_f64(1.0 / update_rate)
    } else {
        Duration::from_secs(3600) // Effectively never
    };
    let mut update_timer = tokio::time::interval(update_interval);
    update_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let start = Instant::now();
    let test_end = start + duration;
    let phase = client_id as f64 * 0.37;

    loop {
        if Instant::now() >= test_end {
            break;
        }

        tokio::select! {
            _ = update_timer.tick() => {
                let t = start.elapsed().as_secs_f64();
                let msg = UpdateOut {
                    msg_type: "update",
                    x: 0.5 + 0.4 * (t * 0.9 + phase).sin(),
                    y: 0.5 + 0.3 * (t * 0.5 + phase).cos(),
                    theta: 20.0 * (t * 2.0 + phase).sin(),
                    color: client_id % 8,
                };
                let Ok(json) = serde_json::to_string(&msg) else { continue };
                if ws.send(Message::Text(json.into())).await.is_ok() {
                    metrics.updates_sent.fetch_add(1, Ordering::Relaxed);
                } else {
                    metrics.errors.fetch_add(1, Ordering::Relaxed);
                    break;
                }
            }

            msg = ws.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        if client_id < 3 {
                            eprintln!("Client {} error: {}", client_id, e);
                        }
                        metrics.errors.fetch_add(1, Ordering::Relaxed);
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    let _ = ws.close(None).await;
    metrics.connected.fetch_sub(1, Ordering::Relaxed);
}

// === Display task ===

async fn run_display(url: String, room: String, duration: Duration, metrics: Arc<Metrics>) {
    let (mut ws, _) = match connect_async(&url).await {
        Ok(conn) => conn,
        Err(e) => {
            eprintln!("Display failed to connect: {}", e);
            metrics.errors.fetch_add(1, Ordering::Relaxed);
            return;
        }
    };

    let hello = serde_json::json!({ "type": "hello", "role": "display", "roomId": room });
    if ws
        .send(Message::Text(hello.to_string().into()))
        .await
        .is_err()
    {
        metrics.errors.fetch_add(1, Ordering::Relaxed);
        return;
    }

    let _ = tokio::time::timeout(duration, async {
        while let Some(msg) = ws.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    if let Ok(ServerMsg::State { users }) = serde_json::from_str::<ServerMsg>(&text)
                    {
                        metrics.rosters_received.fetch_add(1, Ordering::Relaxed);
                        metrics
                            .total_users_seen
                            .fetch_add(users.len() as u64, Ordering::Relaxed);
                    }
                }
                Ok(Message::Close(_)) | Err(_) => break,
                _ => {}
            }
        }
    })
    .await;

    let _ = ws.close(None).await;
}

// === Main ===

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();

    let mut num_clients: u32 = 100;
    let mut duration_secs: u64 = 30;
    let mut update_rate: f64 = 10.0;
    let mut room = "loadtest".to_string();
    let mut url = "ws://127.0.0.1:9002/ws".to_string();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--clients" => {
                i += 1;
                num_clients = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(100);
            }
            "--duration" => {
                i += 1;
                duration_secs = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(30);
            }
            "--update-rate" => {
                i += 1;
                update_rate = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(10.0);
            }
            "--room" => {
                i += 1;
                room = args.get(i).cloned().unwrap_or(room);
            }
            "--url" => {
                i += 1;
                url = args.get(i).cloned().unwrap_or(url);
            }
            _ => {}
        }
        i += 1;
    }

    println!("=== Room Aggregator Load Test ===");
    println!("Participants: {}", num_clients);
    println!("Duration: {}s", duration_secs);
    println!("Update rate: {}/s per participant", update_rate);
    println!("Room: {}", room);
    println!("URL: {}", url);
    println!();

    let metrics = Arc::new(Metrics::new());
    let duration = Duration::from_secs(duration_secs);

    let display_handle = {
        let url = url.clone();
        let room = room.clone();
        let metrics = Arc::clone(&metrics);
        tokio::spawn(async move { run_display(url, room, duration, metrics).await })
    };

    let mut handles = Vec::with_capacity(num_clients as usize);
    let spawn_start = Instant::now();

    for client_id in 0..num_clients {
        let url = url.clone();
        let room = room.clone();
        let metrics = Arc::clone(&metrics);

        handles.push(tokio::spawn(async move {
            run_participant(client_id, url, room, update_rate, duration, metrics).await;
        }));

        // Stagger spawns slightly to avoid thundering herd
        if client_id % 50 == 49 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    println!("All participants spawned in {:?}", spawn_start.elapsed());
    println!();

    let metrics_clone = Arc::clone(&metrics);
    let stats_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        let start = Instant::now();

        loop {
            interval.tick().await;
            let elapsed = start.elapsed().as_secs();
            if elapsed >= duration_secs + 5 {
                break;
            }

            let connected = metrics_clone.connected.load(Ordering::Relaxed);
            let updates = metrics_clone.updates_sent.load(Ordering::Relaxed);
            let rosters = metrics_clone.rosters_received.load(Ordering::Relaxed);
            let errors = metrics_clone.errors.load(Ordering::Relaxed);

            println!(
                "[{:3}s] connected={}, updates={}, rosters={}, errors={}",
                elapsed, connected, updates, rosters, errors
            );
        }
    });

    for handle in handles {
        let _ = handle.await;
    }
    let _ = display_handle.await;
    stats_handle.abort();

    println!();
    println!("=== Final Results ===");
    let updates = metrics.updates_sent.load(Ordering::Relaxed);
    let rosters = metrics.rosters_received.load(Ordering::Relaxed);
    let users = metrics.total_users_seen.load(Ordering::Relaxed);
    let errors = metrics.errors.load(Ordering::Relaxed);
    let latency_sum = metrics.latency_sum_ms.load(Ordering::Relaxed);
    let latency_count = metrics.latency_count.load(Ordering::Relaxed);

    println!("Total updates sent: {}", updates);
    println!("Total rosters received by display: {}", rosters);
    println!("Total errors: {}", errors);
    println!(
        "Average roster size: {}",
        if rosters > 0 { users / rosters } else { 0 }
    );
    if latency_count > 0 {
        println!("Average connect latency: {}ms", latency_sum / latency_count);
    }

    let rosters_per_sec = rosters as f64 / duration_secs.max(1) as f64;
    println!();
    println!("Rosters/sec at display: {:.1}", rosters_per_sec);
    println!("Expected rosters/sec: {:.1}", 20.0); // 20 Hz broadcast while the room is busy
}
