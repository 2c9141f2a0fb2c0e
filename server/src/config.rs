use std::collections::HashMap;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ServerConfigError {
    #[error("broadcast_rate_hz must be between 1 and 120, got {0}")]
    BroadcastRate(u32),
    #[error("max_message_bytes must be >= 64, got {0}")]
    MessageSize(usize),
    #[error("max_participants_per_room must be >= 1")]
    RoomSize,
    #[error("secret for room {0:?} must not be empty")]
    EmptySecret(String),
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
    /// Rate at which dirty rooms broadcast a full roster
    pub broadcast_rate_hz: u32,
    /// Frames larger than this close the socket
    pub max_message_bytes: usize,
    /// Malformed frames tolerated before the socket is closed
    pub max_parse_errors: u32,
    pub max_participants_per_room: usize,
    /// Time a new socket has to send its hello
    pub hello_timeout: Duration,
    /// Rooms that require a secret in the hello message
    pub room_secrets: HashMap<String, String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:9002".to_string(),
            broadcast_rate_hz: 20,
            max_message_bytes: 1024,
            max_parse_errors: 5,
            max_participants_per_room: 500,
            hello_timeout: Duration::from_secs(5),
            room_secrets: HashMap::new(),
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `SWAYROOM_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(addr) = lookup("SWAYROOM_LISTEN_ADDR") {
            config.listen_addr = addr;
        }
        if let Some(hz) = lookup("SWAYROOM_BROADCAST_HZ").and_then(|v| v.parse().ok()) {
            config.broadcast_rate_hz = hz;
        }
        if let Some(n) = lookup("SWAYROOM_MAX_PARTICIPANTS").and_then(|v| v.parse().ok()) {
            config.max_participants_per_room = n;
        }
        if let Some(secrets) = lookup("SWAYROOM_ROOM_SECRETS") {
            config.room_secrets = parse_room_secrets(&secrets);
        }
        config
    }

    pub fn validate(&self) -> Result<(), ServerConfigError> {
        if self.broadcast_rate_hz == 0 || self.broadcast_rate_hz > 120 {
            return Err(ServerConfigError::BroadcastRate(self.broadcast_rate_hz));
        }
        if self.max_message_bytes < 64 {
            return Err(ServerConfigError::MessageSize(self.max_message_bytes));
        }
        if self.max_participants_per_room == 0 {
            return Err(ServerConfigError::RoomSize);
        }
        if let Some((room, _)) = self.room_secrets.iter().find(|(_, s)| s.is_empty()) {
            return Err(ServerConfigError::EmptySecret(room.clone()));
        }
        Ok(())
    }
}

/// Parse `room=secret,other=secret2`. Entries without `=` are skipped.
fn parse_room_secrets(raw: &str) -> HashMap<String, String> {
    raw.split(',')
        .filter_map(|pair| {
            let (room, secret) = pair.split_once('=')?;
            let room = room.trim();
            if room.is_empty() {
                return None;
            }
            Some((room.to_string(), secret.trim().to_string()))
        })
        .collect()
}
