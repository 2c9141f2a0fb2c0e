//! Read-only access to per-room configuration.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use swayroom_shared::config::{ConfigError, RoomConfig};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::shared::connection::NetEvent;
use crate::shared::observable::StateCell;
use crate::shared::types::{ColorRef, ParticipantState};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("no configuration for room {0:?}")]
    UnknownRoom(String),
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed room configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid room configuration: {0}")]
    Invalid(#[from] ConfigError),
}

pub trait RoomConfigProvider: Send + Sync {
    fn load(&self, room_id: &str) -> Result<RoomConfig, ProviderError>;
}

/// In-process provider; the embedding application edits it directly.
#[derive(Default)]
pub struct MemoryConfigProvider {
    rooms: RwLock<HashMap<String, RoomConfig>>,
}

impl MemoryConfigProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, room_id: impl Into<String>, config: RoomConfig) {
        if let Ok(mut rooms) = self.rooms.write() {
            rooms.insert(room_id.into(), config);
        }
    }
}

impl RoomConfigProvider for MemoryConfigProvider {
    fn load(&self, room_id: &str) -> Result<RoomConfig, ProviderError> {
        let config = self
            .rooms
            .read()
            .ok()
            .and_then(|rooms| rooms.get(room_id).cloned())
            .ok_or_else(|| ProviderError::UnknownRoom(room_id.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

/// Reads `<dir>/<room>.json`. Missing fields take their defaults.
pub struct FileConfigProvider {
    dir: PathBuf,
}

impl FileConfigProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl RoomConfigProvider for FileConfigProvider {
    fn load(&self, room_id: &str) -> Result<RoomConfig, ProviderError> {
        let safe = !room_id.is_empty()
            && !room_id.contains(['/', '\\'])
            && !room_id.contains("..");
        if !safe {
            return Err(ProviderError::UnknownRoom(room_id.to_string()));
        }

        let path = self.dir.join(format!("{room_id}.json"));
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ProviderError::UnknownRoom(room_id.to_string()));
            }
            Err(source) => return Err(ProviderError::Io { path, source }),
        };
        let config: RoomConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }
}

/// Current configuration of one room, reloaded on config-changed pushes.
pub struct ConfigWatcher {
    room_id: String,
    provider: Arc<dyn RoomConfigProvider>,
    config: StateCell<RoomConfig>,
}

impl ConfigWatcher {
    /// Loads immediately. Falls back to the default configuration if the
    /// provider has nothing usable yet.
    pub fn new(room_id: impl Into<String>, provider: Arc<dyn RoomConfigProvider>) -> Self {
        let room_id = room_id.into();
        let initial = provider.load(&room_id).unwrap_or_else(|e| {
            tracing::warn!(room = %room_id, "using default room configuration: {}", e);
            RoomConfig::default()
        });
        Self {
            room_id,
            provider,
            config: StateCell::new(initial),
        }
    }

    pub fn config(&self) -> &StateCell<RoomConfig> {
        &self.config
    }

    /// Fetch again from the provider. The previous configuration stays in
    /// place on failure. Returns whether anything changed.
    pub fn reload(&self) -> Result<bool, ProviderError> {
        let next = self.provider.load(&self.room_id)?;
        Ok(self.config.set(next))
    }

    pub fn handle(&self, event: &NetEvent) {
        let NetEvent::ConfigChanged { room } = event else {
            return;
        };
        if *room != self.room_id {
            tracing::debug!(room = %room, "ignoring config push for another room");
            return;
        }
        match self.reload() {
            Ok(changed) => tracing::info!(room = %self.room_id, changed, "room configuration reloaded"),
            Err(e) => tracing::warn!(room = %self.room_id, "room configuration reload failed: {}", e),
        }
    }
}

/// Color a participant transmits for its preferred palette slot. An empty
/// palette means the room's theme color.
pub fn participant_color(config: &RoomConfig, preferred: u32) -> ColorRef {
    if config.palette.is_empty() {
        ColorRef::Hex(config.theme_color.clone())
    } else {
        ColorRef::Index(preferred % config.palette.len() as u32)
    }
}

/// Route a participant channel's inbound traffic until it ends. Config pushes
/// reload `watcher` and re-pick the transmitted color; rosters are ignored.
pub async fn pump_participant_events(
    mut events: mpsc::UnboundedReceiver<NetEvent>,
    watcher: &ConfigWatcher,
    state: &StateCell<ParticipantState>,
    preferred: u32,
) {
    while let Some(event) = events.recv().await {
        if !matches!(event, NetEvent::ConfigChanged { .. }) {
            continue;
        }
        watcher.handle(&event);
        let color = participant_color(&watcher.config().get(), preferred);
        state.update(|s| s.color = color);
    }
}
