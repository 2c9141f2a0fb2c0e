use swayroom_shared::config::{Anchor, DisplayPlacement};

use super::admission::DisplaySlot;

/// Display stage dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageSize {
    pub width: f64,
    pub height: f64,
}

impl Default for StageSize {
    fn default() -> Self {
        Self {
            width: 1920.0,
            height: 1080.0,
        }
    }
}

impl StageSize {
    /// Degenerate sizes collapse to 1x1 so normalization never divides by zero.
    pub fn new(width: f64, height: f64) -> Self {
        let sane = |v: f64| if v.is_finite() && v >= 1.0 { v } else { 1.0 };
        Self {
            width: sane(width),
            height: sane(height),
        }
    }

    pub fn min_side(&self) -> f64 {
        self.width.min(self.height)
    }
}

/// What a renderer applies to one avatar element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenTransform {
    pub left_px: f64,
    pub top_px: f64,
    pub rotate_deg: f64,
    pub opacity: f64,
}

impl ScreenTransform {
    pub fn for_slot(slot: &DisplaySlot, stage: StageSize) -> Self {
        Self {
            left_px: slot.x * stage.width,
            top_px: slot.y * stage.height,
            rotate_deg: slot.theta,
            opacity: slot.opacity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

/// Square box for the auxiliary element, pinned to its anchor corner.
pub fn placement_rect(placement: &DisplayPlacement, stage: StageSize) -> Rect {
    let size = placement.size_px.min(stage.min_side());
    let margin = placement.margin_px;
    let (left, top) = match placement.anchor {
        Anchor::TopLeft => (margin, margin),
        Anchor::TopRight => (stage.width - margin - size, margin),
        Anchor::BottomLeft => (margin, stage.height - margin - size),
        Anchor::BottomRight => (stage.width - margin - size, stage.height - margin - size),
    };
    Rect {
        left: left.max(0.0),
        top: top.max(0.0),
        width: size,
        height: size,
    }
}
