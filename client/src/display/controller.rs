use std::time::Duration;

use rand::Rng;
use swayroom_shared::config::RoomConfig;
use swayroom_shared::protocol::RosterMsg;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::admission::{AdmissionController, DisplaySlot};
use super::transform::StageSize;
use crate::shared::observable::next_change;

pub const DEFAULT_REFRESH_PERIOD: Duration = Duration::from_millis(1000);

enum ControllerInput {
    Roster(RosterMsg),
    Resize(StageSize),
}

/// Runs an [`AdmissionController`] on its own task and publishes the slot
/// list whenever rosters, configuration, stage size or the refresh timer
/// change it.
pub struct DisplayController {
    input_tx: mpsc::UnboundedSender<ControllerInput>,
    slots: watch::Receiver<Vec<DisplaySlot>>,
    task: JoinHandle<()>,
}

impl DisplayController {
    pub fn spawn<R>(
        config: watch::Receiver<RoomConfig>,
        stage: StageSize,
        refresh_period: Duration,
        rng: R,
    ) -> Self
    where
        R: Rng + Send + 'static,
    {
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (slots_tx, slots) = watch::channel(Vec::new());
        let task = tokio::spawn(run_controller(
            config,
            stage,
            refresh_period,
            rng,
            input_rx,
            slots_tx,
        ));
        Self {
            input_tx,
            slots,
            task,
        }
    }

    /// Hand over a roster broadcast. Replaces the previous roster entirely.
    pub fn push_roster(&self, roster: RosterMsg) {
        let _ = self.input_tx.send(ControllerInput::Roster(roster));
    }

    pub fn resize(&self, stage: StageSize) {
        let _ = self.input_tx.send(ControllerInput::Resize(stage));
    }

    pub fn slots(&self) -> watch::Receiver<Vec<DisplaySlot>> {
        self.slots.clone()
    }

    pub fn current_slots(&self) -> Vec<DisplaySlot> {
        self.slots.borrow().clone()
    }

    /// Stop the refresh timer and release the roster.
    pub fn teardown(&self) {
        self.task.abort();
    }
}

impl Drop for DisplayController {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_controller<R: Rng>(
    config: watch::Receiver<RoomConfig>,
    mut stage: StageSize,
    refresh_period: Duration,
    rng: R,
    mut input_rx: mpsc::UnboundedReceiver<ControllerInput>,
    slots_tx: watch::Sender<Vec<DisplaySlot>>,
) {
    let initial = config.borrow().clone();
    let mut config = Some(config);
    let mut admission = AdmissionController::new(initial, rng);

    let mut refresh = tokio::time::interval(refresh_period);
    refresh.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // First tick completes immediately
    refresh.tick().await;

    loop {
        tokio::select! {
            _ = refresh.tick() => admission.refresh(),

            input = input_rx.recv() => {
                match input {
                    Some(ControllerInput::Roster(roster)) => {
                        tracing::trace!(room = %roster.room, users = roster.users.len(), "roster");
                        admission.replace_roster(roster.users);
                    }
                    Some(ControllerInput::Resize(size)) => stage = size,
                    None => break,
                }
            }

            _ = next_change(&mut config) => {
                if let Some(rx) = config.as_mut() {
                    let next = rx.borrow_and_update().clone();
                    tracing::debug!(capacity = next.capacity, "room configuration applied");
                    admission.reconfigure(next);
                }
            }
        }

        let next = admission.slots(stage);
        slots_tx.send_if_modified(|current| {
            if *current != next {
                *current = next;
                true
            } else {
                false
            }
        });
    }
}
