//! Demo client.
//!
//! Usage: swayroom-client [OPTIONS]
//!
//! Options:
//!   --role R          participant | display (default: participant)
//!   --room ROOM       Room id (default: lobby)
//!   --url URL         Aggregator URL (default: $SWAYROOM_WS_URL or ws://127.0.0.1:9002/ws)
//!   --nickname N      Participant nickname (default: demo)
//!   --secret S        Room secret, if the room requires one
//!   --config-dir DIR  Directory of <room>.json configuration files

use std::sync::Arc;
use std::time::Duration;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use swayroom_client::display::controller::DEFAULT_REFRESH_PERIOD;
use swayroom_client::display::{pump_events, DisplayController, StageSize};
use swayroom_client::motion::{LeanConfig, MotionDriver};
use swayroom_client::room_config::{
    participant_color, pump_participant_events, ConfigWatcher, FileConfigProvider,
    MemoryConfigProvider, RoomConfigProvider,
};
use swayroom_client::shared::connection::{ChannelConfig, DisplayLink, ParticipantChannel};
use swayroom_client::shared::types::ParticipantState;

struct Args {
    role: String,
    room: String,
    url: String,
    nickname: String,
    secret: Option<String>,
    config_dir: Option<String>,
}

fn parse_args() -> Args {
    let argv: Vec<String> = std::env::args().collect();
    let mut args = Args {
        role: "participant".to_string(),
        room: "lobby".to_string(),
        url: std::env::var("SWAYROOM_WS_URL")
            .unwrap_or_else(|_| "ws://127.0.0.1:9002/ws".to_string()),
        nickname: "demo".to_string(),
        secret: None,
        config_dir: None,
    };

    let mut i = 1;
    while i < argv.len() {
        let value = argv.get(i + 1).cloned();
        match argv[i].as_str() {
            "--role" => args.role = value.unwrap_or(args.role),
            "--room" => args.room = value.unwrap_or(args.room),
            "--url" => args.url = value.unwrap_or(args.url),
            "--nickname" => args.nickname = value.unwrap_or(args.nickname),
            "--secret" => args.secret = value,
            "--config-dir" => args.config_dir = value,
            other => {
                eprintln!("Unknown argument: {}", other);
                std::process::exit(2);
            }
        }
        i += 2;
    }
    args
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let args = parse_args();
    let mut channel = ChannelConfig::new(&args.url, &args.room);
    if let Some(secret) = &args.secret {
        channel = channel.with_secret(secret);
    }

    match args.role.as_str() {
        "participant" => run_participant(channel, &args).await,
        "display" => run_display(channel, &args).await,
        other => {
            eprintln!("Unknown role {:?}, expected participant or display", other);
            std::process::exit(2);
        }
    }
}

/// Palette slot the demo participant asks for
const PREFERRED_COLOR: u32 = 0;

fn config_watcher(args: &Args) -> ConfigWatcher {
    let provider: Arc<dyn RoomConfigProvider> = match &args.config_dir {
        Some(dir) => Arc::new(FileConfigProvider::new(dir)),
        None => Arc::new(MemoryConfigProvider::new()),
    };
    ConfigWatcher::new(&args.room, provider)
}

async fn run_participant(config: ChannelConfig, args: &Args) {
    let watcher = config_watcher(args);
    let color = participant_color(&watcher.config().get(), PREFERRED_COLOR);
    let initial = ParticipantState::new(&args.nickname, color);
    let config = config.with_participant_id(&args.nickname);
    let (channel, events) = match ParticipantChannel::spawn(config, initial) {
        Ok(spawned) => spawned,
        Err(e) => {
            eprintln!("Invalid channel configuration: {}", e);
            std::process::exit(1);
        }
    };

    let driver = MotionDriver::start(channel.local_state().clone(), LeanConfig::default());
    let mut status = channel.status();
    let mut pointer = tokio::time::interval(Duration::from_millis(16));
    let start = tokio::time::Instant::now();
    let local = channel.local_state().clone();
    let pump = pump_participant_events(events, &watcher, &local, PREFERRED_COLOR);
    tokio::pin!(pump);

    loop {
        tokio::select! {
            _ = pointer.tick() => {
                // Synthetic pointer: a slow figure eight
                let t = start.elapsed().as_secs_f64();
                driver.pointer(0.5 + 0.35 * (t * 0.8).sin(), 0.5 + 0.2 * (t * 1.6).sin());
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                tracing::info!("connection {:?}", *status.borrow_and_update());
            }
            _ = &mut pump => break,
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    driver.shutdown();
    channel.destroy();
}

async fn run_display(config: ChannelConfig, args: &Args) {
    let watcher = config_watcher(args);

    let (link, events) = match DisplayLink::spawn(config) {
        Ok(spawned) => spawned,
        Err(e) => {
            eprintln!("Invalid channel configuration: {}", e);
            std::process::exit(1);
        }
    };

    let controller = DisplayController::spawn(
        watcher.config().subscribe(),
        StageSize::default(),
        DEFAULT_REFRESH_PERIOD,
        ChaCha8Rng::from_entropy(),
    );
    let mut slots = controller.slots();

    let report = async {
        while slots.changed().await.is_ok() {
            let current = slots.borrow_and_update();
            let duplicates = current.iter().filter(|s| s.opacity < 1.0).count();
            tracing::info!(
                slots = current.len(),
                duplicates,
                "display updated"
            );
        }
    };

    tokio::select! {
        _ = pump_events(events, &watcher, &controller) => {}
        _ = report => {}
        _ = tokio::signal::ctrl_c() => {}
    }

    controller.teardown();
    link.destroy();
}
