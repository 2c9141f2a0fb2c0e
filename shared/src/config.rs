use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("capacity must be >= 1")]
    ZeroCapacity,
    #[error("duplicate_opacity must be within (0, 1], got {0}")]
    DuplicateOpacity(f64),
    #[error("color {0:?} is not a #rgb or #rrggbb hex string")]
    InvalidColor(String),
    #[error("placement {0} must be finite and >= 0")]
    Placement(&'static str),
}

/// Corner of the display stage an auxiliary element is pinned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize, ts_rs::TS)]
#[ts(export, export_to = "../../web/src/generated/")]
#[serde(rename_all = "kebab-case")]
pub enum Anchor {
    TopLeft,
    TopRight,
    BottomLeft,
    #[default]
    BottomRight,
}

/// Where the display places its auxiliary element (join code, logo).
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize, ts_rs::TS)]
#[ts(export, export_to = "../../web/src/generated/")]
#[serde(rename_all = "camelCase")]
pub struct DisplayPlacement {
    pub anchor: Anchor,
    pub margin_px: f64,
    pub size_px: f64,
}

impl Default for DisplayPlacement {
    fn default() -> Self {
        Self {
            anchor: Anchor::BottomRight,
            margin_px: 24.0,
            size_px: 160.0,
        }
    }
}

/// Room configuration as supplied by the configuration provider.
/// Read-only to the synchronization core.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize, ts_rs::TS)]
#[ts(export, export_to = "../../web/src/generated/")]
#[serde(rename_all = "camelCase", default)]
pub struct RoomConfig {
    /// Ordered palette; participants may reference entries by index.
    pub palette: Vec<String>,
    /// Used when the palette is empty or a color cannot be resolved.
    pub theme_color: String,
    /// Maximum participants rendered at once
    pub capacity: usize,
    pub duplicate_users: bool,
    /// Rooms with fewer participants than this get duplicated entries
    pub duplicate_threshold: usize,
    pub duplicate_opacity: f64,
    pub placement: DisplayPlacement,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            palette: Vec::new(),
            theme_color: "#ffffff".to_string(),
            capacity: 30,
            duplicate_users: false,
            duplicate_threshold: 5,
            duplicate_opacity: 0.8,
            placement: DisplayPlacement::default(),
        }
    }
}

impl RoomConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if !self.duplicate_opacity.is_finite()
            || self.duplicate_opacity <= 0.0
            || self.duplicate_opacity > 1.0
        {
            return Err(ConfigError::DuplicateOpacity(self.duplicate_opacity));
        }
        if !is_hex_color(&self.theme_color) {
            return Err(ConfigError::InvalidColor(self.theme_color.clone()));
        }
        if let Some(bad) = self.palette.iter().find(|c| !is_hex_color(c)) {
            return Err(ConfigError::InvalidColor(bad.clone()));
        }
        if !self.placement.margin_px.is_finite() || self.placement.margin_px < 0.0 {
            return Err(ConfigError::Placement("margin_px"));
        }
        if !self.placement.size_px.is_finite() || self.placement.size_px < 0.0 {
            return Err(ConfigError::Placement("size_px"));
        }
        Ok(())
    }
}

/// `#rgb` or `#rrggbb`
pub fn is_hex_color(s: &str) -> bool {
    match s.strip_prefix('#') {
        Some(hex) => (hex.len() == 3 || hex.len() == 6) && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}
