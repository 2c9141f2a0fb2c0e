use crate::config::ServerConfig;
use crate::state::{ConnId, HubState, JoinError};
use std::time::Duration;
use swayroom_shared::protocol::{ConfigChangedMsg, HelloMsg, RosterMsg, UpdateMsg};
use tokio::sync::{broadcast, mpsc, oneshot};

/// Reply to a successful join: the connection id and the room as it is right now.
#[derive(Debug, Clone)]
pub struct JoinAck {
    pub id: ConnId,
    pub roster: RosterMsg,
}

/// Commands from socket handlers to the hub
pub enum HubCommand {
    Join {
        hello: HelloMsg,
        response: oneshot::Sender<Result<JoinAck, JoinError>>,
    },
    Leave {
        id: ConnId,
    },
    Update {
        id: ConnId,
        update: UpdateMsg,
    },
    ConfigChanged {
        room: String,
    },
}

/// Broadcasts from the hub to all socket handlers; each handler filters by room.
#[derive(Debug, Clone)]
pub enum HubBroadcast {
    Roster(RosterMsg),
    ConfigChanged(ConfigChangedMsg),
}

/// Run the room hub. Owns all room state.
pub async fn run_hub(
    mut cmd_rx: mpsc::Receiver<HubCommand>,
    broadcast_tx: broadcast::Sender<HubBroadcast>,
    config: ServerConfig,
) {
    let mut state = HubState::new(&config);

    let period = Duration::from_secs_f64(1.0 / config.broadcast_rate_hz.max(1) as f64);
    let mut broadcast_interval = tokio::time::interval(period);
    broadcast_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = broadcast_interval.tick() => {
                // Rosters go out at a fixed rate, and only for rooms that changed
                for roster in state.take_dirty_rosters() {
                    let _ = broadcast_tx.send(HubBroadcast::Roster(roster));
                }
            }

            cmd = cmd_rx.recv() => {
                // All senders gone: no socket handler can reach us anymore
                let Some(cmd) = cmd else { break };
                match cmd {
                    HubCommand::Join { hello, response } => {
                        let result = state.join(&hello).map(|id| JoinAck {
                            id,
                            roster: state.roster(hello.room_id.trim()),
                        });
                        match &result {
                            Ok(ack) => tracing::info!(
                                "Connection {} joined room {} as {:?}",
                                ack.id,
                                ack.roster.room,
                                hello.role
                            ),
                            Err(e) => tracing::info!("Join rejected: {}", e),
                        }
                        let _ = response.send(result);
                    }
                    HubCommand::Leave { id } => {
                        if let Some(room) = state.leave(id) {
                            tracing::info!("Connection {} left room {}", id, room);
                        }
                    }
                    HubCommand::Update { id, update } => {
                        if !state.apply_update(id, &update) {
                            tracing::debug!("Dropped update from connection {}", id);
                        }
                    }
                    HubCommand::ConfigChanged { room } => {
                        tracing::info!("Configuration changed for room {}", room);
                        let _ = broadcast_tx.send(HubBroadcast::ConfigChanged(ConfigChangedMsg { room }));
                    }
                }
            }
        }
    }

    tracing::info!("Room hub ended");
}
