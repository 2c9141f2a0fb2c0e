pub use swayroom_shared::protocol::ColorRef;

use swayroom_shared::protocol::{clamp_unit, round4, UpdateMsg};

/// Local state of one participant. Written by the input/physics loop,
/// read by the channel that transmits it.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantState {
    pub x: f64,
    pub y: f64,
    /// Lean angle in degrees
    pub theta: f64,
    pub color: ColorRef,
    pub nickname: String,
}

impl Default for ParticipantState {
    fn default() -> Self {
        Self {
            x: 0.5,
            y: 0.5,
            theta: 0.0,
            color: ColorRef::default(),
            nickname: String::new(),
        }
    }
}

impl ParticipantState {
    pub fn new(nickname: impl Into<String>, color: ColorRef) -> Self {
        Self {
            nickname: nickname.into(),
            color,
            ..Default::default()
        }
    }

    pub fn set_position(&mut self, x: f64, y: f64) {
        self.x = clamp_unit(x);
        self.y = clamp_unit(y);
    }

    pub fn set_theta(&mut self, theta: f64, max_angle_deg: f64) {
        self.theta = if theta.is_finite() {
            theta.clamp(-max_angle_deg, max_angle_deg)
        } else {
            0.0
        };
    }

    pub fn to_update(&self) -> UpdateMsg {
        UpdateMsg {
            x: round4(self.x),
            y: round4(self.y),
            theta: round4(self.theta),
            color: self.color.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closed,
    Error,
}
