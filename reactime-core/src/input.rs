use crate::stimulus::{Direction, StroopColor, TrailItem};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Discrete response keys recognized by the battery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyCode {
    Space,
    ArrowLeft,
    ArrowRight,
    KeyR,
    KeyY,
    KeyG,
    KeyB,
    Escape,
    Other,
}

impl KeyCode {
    /// Parses a DOM-style `KeyboardEvent.code` string.
    pub fn from_code(code: &str) -> Self {
        match code {
            "Space" => KeyCode::Space,
            "ArrowLeft" => KeyCode::ArrowLeft,
            "ArrowRight" => KeyCode::ArrowRight,
            "KeyR" => KeyCode::KeyR,
            "KeyY" => KeyCode::KeyY,
            "KeyG" => KeyCode::KeyG,
            "KeyB" => KeyCode::KeyB,
            "Escape" => KeyCode::Escape,
            _ => KeyCode::Other,
        }
    }

    pub fn for_direction(direction: Direction) -> Self {
        match direction {
            Direction::Left => KeyCode::ArrowLeft,
            Direction::Right => KeyCode::ArrowRight,
        }
    }

    pub fn for_color(color: StroopColor) -> Self {
        match color {
            StroopColor::Red => KeyCode::KeyR,
            StroopColor::Yellow => KeyCode::KeyY,
            StroopColor::Green => KeyCode::KeyG,
            StroopColor::Blue => KeyCode::KeyB,
        }
    }

    pub fn color(self) -> Option<StroopColor> {
        match self {
            KeyCode::KeyR => Some(StroopColor::Red),
            KeyCode::KeyY => Some(StroopColor::Yellow),
            KeyCode::KeyG => Some(StroopColor::Green),
            KeyCode::KeyB => Some(StroopColor::Blue),
            _ => None,
        }
    }
}

impl fmt::Display for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Raw input forwarded by the presentation surface, stamped with the
/// engine clock in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "input", rename_all = "snake_case")]
pub enum InputEvent {
    Key { key: KeyCode, at_ms: u64 },
    Select { item: TrailItem, at_ms: u64 },
}

impl InputEvent {
    pub fn key(key: KeyCode, at_ms: u64) -> Self {
        InputEvent::Key { key, at_ms }
    }

    pub fn select(item: TrailItem, at_ms: u64) -> Self {
        InputEvent::Select { item, at_ms }
    }

    pub fn at_ms(&self) -> u64 {
        match self {
            InputEvent::Key { at_ms, .. } | InputEvent::Select { at_ms, .. } => *at_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dom_codes_map_to_keys() {
        assert_eq!(KeyCode::from_code("Space"), KeyCode::Space);
        assert_eq!(KeyCode::from_code("KeyG"), KeyCode::KeyG);
        assert_eq!(KeyCode::from_code("KeyQ"), KeyCode::Other);
    }

    #[test]
    fn color_keys_round_trip() {
        for color in StroopColor::ALL {
            assert_eq!(KeyCode::for_color(color).color(), Some(color));
        }
        assert_eq!(KeyCode::Space.color(), None);
    }
}
