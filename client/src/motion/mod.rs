//! Participant-side motion: pointer input in, lean angle out.

pub mod engine;
pub mod lean_logic;

pub use engine::LeanEngine;
pub use lean_logic::{LeanConfig, LeanConfigError, LeanModel};

use crate::shared::observable::StateCell;
use crate::shared::types::ParticipantState;

/// Connects pointer input and a [`LeanEngine`] to a participant state cell.
/// The engine writes `theta`, the pointer writes `x` and `y`.
pub struct MotionDriver {
    state: StateCell<ParticipantState>,
    engine: LeanEngine,
}

impl MotionDriver {
    pub fn start(state: StateCell<ParticipantState>, config: LeanConfig) -> Self {
        let max_angle = config.max_angle_deg;
        let sampled = state.clone();
        let target = state.clone();
        let engine = LeanEngine::start(
            config,
            move || sampled.with(|s| s.x),
            move |theta| {
                target.update(|s| s.set_theta(theta, max_angle));
            },
        );
        Self { state, engine }
    }

    /// Pointer moved to normalized `(x, y)`.
    pub fn pointer(&self, x: f64, y: f64) {
        self.state.update(|s| s.set_position(x, y));
        self.engine.trigger();
    }

    pub fn state(&self) -> &StateCell<ParticipantState> {
        &self.state
    }

    pub fn shutdown(&self) {
        self.engine.shutdown();
    }
}
