use swayroom_server::config::ServerConfig;
use swayroom_server::hub::{run_hub, HubBroadcast, HubCommand};
use swayroom_server::ws::{router, AppState};
use swayroom_shared::protocol::PROTOCOL_VERSION;
use tokio::sync::{broadcast, mpsc};
use tower_http::cors::CorsLayer;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = ServerConfig::from_env();

    // Validate configuration before starting
    if let Err(e) = config.validate() {
        eprintln!("Invalid server configuration: {}", e);
        std::process::exit(1);
    }

    let listen_addr = config.listen_addr.clone();

    let (hub_tx, hub_rx) = mpsc::channel::<HubCommand>(256);
    let (broadcast_tx, _) = broadcast::channel::<HubBroadcast>(64);

    let app_state = AppState::new(&config, hub_tx, broadcast_tx.clone());

    // Spawn room hub
    tokio::spawn(async move {
        run_hub(hub_rx, broadcast_tx, config).await;
    });

    let app = router(app_state).layer(CorsLayer::permissive());

    tracing::info!(
        "Starting room aggregator on {} (protocol v{})",
        listen_addr,
        PROTOCOL_VERSION
    );

    let listener = match tokio::net::TcpListener::bind(&listen_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("Failed to bind {}: {}", listen_addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
    }
}
