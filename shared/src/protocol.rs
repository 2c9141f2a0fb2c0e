use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use ts_rs::TS;

/// Protocol version - increment when making breaking changes.
pub const PROTOCOL_VERSION: u32 = 1;

/// Which side of the room a socket speaks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Participant,
    Display,
}

/// A participant color: either an index into the room palette or a literal hex string.
///
/// Decoding never fails. Whole non-negative numbers (`2` or `2.0`) become an
/// index; anything else is kept as text, which resolves to the theme color.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
#[serde(untagged)]
pub enum ColorRef {
    Index(u32),
    Hex(String),
}

impl ColorRef {
    fn from_wire(value: Value) -> Self {
        match value {
            Value::String(s) => ColorRef::Hex(s),
            Value::Number(n) => {
                let index = n
                    .as_f64()
                    .filter(|f| f.fract() == 0.0 && (0.0..=u32::MAX as f64).contains(f));
                match index {
                    Some(f) => ColorRef::Index(f as u32),
                    None => ColorRef::Hex(n.to_string()),
                }
            }
            other => ColorRef::Hex(other.to_string()),
        }
    }
}

impl<'de> Deserialize<'de> for ColorRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(ColorRef::from_wire)
    }
}

impl Default for ColorRef {
    fn default() -> Self {
        ColorRef::Index(0)
    }
}

// === Client -> Server ===

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
#[serde(tag = "type")]
pub enum ClientMsg {
    #[serde(rename = "hello")]
    Hello(HelloMsg),
    #[serde(rename = "update")]
    Update(UpdateMsg),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
#[serde(rename_all = "camelCase")]
pub struct HelloMsg {
    pub role: Role,
    pub room_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub participant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub nickname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub secret: Option<String>,
}

impl HelloMsg {
    /// Name shown on the display; falls back to the participant id.
    pub fn display_name(&self) -> String {
        [self.nickname.as_deref(), self.participant_id.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|s| !s.is_empty())
            .unwrap_or("anonymous")
            .to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
pub struct UpdateMsg {
    pub x: f64,
    pub y: f64,
    /// Lean angle in degrees
    pub theta: f64,
    pub color: ColorRef,
}

// === Server -> Client ===

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
#[serde(tag = "type")]
pub enum ServerMsg {
    #[serde(rename = "state")]
    State(RosterMsg),
    #[serde(rename = "config_changed")]
    ConfigChanged(ConfigChangedMsg),
}

/// Full roster snapshot. Always replaces whatever the receiver held before.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
pub struct RosterMsg {
    pub room: String,
    pub users: Vec<UserWire>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
pub struct UserWire {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
    pub color: ColorRef,
    pub nickname: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
pub struct ConfigChangedMsg {
    pub room: String,
}

// === Conversion helpers ===

/// Round to 4 decimal places (plenty for normalized coordinates, keeps JSON small)
#[inline]
pub fn round4(v: f64) -> f64 {
    (v * 10000.0).round() / 10000.0
}

/// Clamp a normalized coordinate to [0, 1]. Non-finite input maps to the center.
#[inline]
pub fn clamp_unit(v: f64) -> f64 {
    if v.is_finite() {
        v.clamp(0.0, 1.0)
    } else {
        0.5
    }
}
