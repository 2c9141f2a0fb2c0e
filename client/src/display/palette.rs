use swayroom_shared::config::{is_hex_color, RoomConfig};
use swayroom_shared::protocol::ColorRef;

/// Resolve a participant color against the room palette.
/// Indices wrap; an empty palette or an unusable hex string yields the theme color.
pub fn resolve_color(color: &ColorRef, config: &RoomConfig) -> String {
    match color {
        ColorRef::Index(i) if !config.palette.is_empty() => {
            config.palette[*i as usize % config.palette.len()].clone()
        }
        ColorRef::Hex(hex) if is_hex_color(hex) => hex.clone(),
        _ => config.theme_color.clone(),
    }
}
