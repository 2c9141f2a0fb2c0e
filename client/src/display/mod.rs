//! Display side: rosters in, positioned slots out.

pub mod admission;
pub mod controller;
pub mod palette;
pub mod transform;

pub use admission::{AdmissionController, DisplaySlot, SlotKey};
pub use controller::DisplayController;
pub use transform::{placement_rect, ScreenTransform, StageSize};

use tokio::sync::mpsc;

use crate::room_config::ConfigWatcher;
use crate::shared::connection::NetEvent;

/// Route inbound display traffic until the link's event stream ends.
pub async fn pump_events(
    mut events: mpsc::UnboundedReceiver<NetEvent>,
    watcher: &ConfigWatcher,
    controller: &DisplayController,
) {
    while let Some(event) = events.recv().await {
        match event {
            NetEvent::Roster(roster) => controller.push_roster(roster),
            other => watcher.handle(&other),
        }
    }
}
