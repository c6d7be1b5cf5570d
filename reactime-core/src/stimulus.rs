use serde::{Deserialize, Serialize};
use std::fmt;

/// Payload shown during the `StimulusVisible` phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Stimulus {
    /// Go/no-go colored square.
    Square { color: SquareColor },
    /// PVT millisecond counter starting at zero on onset.
    Counter,
    /// N-back letter.
    Letter { letter: char },
    /// Flanker arrow row: the target in the middle, two flankers each side.
    Arrows { target: Direction, flankers: FlankerKind },
    /// Stroop color word (or patch) in a given ink.
    ColorWord { word: StroopColor, ink: StroopInk },
    /// Stroop color patch without a word.
    ColorPatch { color: StroopColor },
    /// Posner peripheral target.
    Target { side: Side },
}

impl Stimulus {
    pub fn is_text(&self) -> bool {
        matches!(
            self,
            Stimulus::Letter { .. } | Stimulus::Arrows { .. } | Stimulus::ColorWord { .. }
        )
    }

    /// Short human-readable form, also used in recorded data points.
    pub fn label(&self) -> String {
        match self {
            Stimulus::Square { color } => color.to_string(),
            Stimulus::Counter => "counter".to_string(),
            Stimulus::Letter { letter } => letter.to_string(),
            Stimulus::Arrows { target, flankers } => {
                let flank = match flankers {
                    FlankerKind::Congruent => target.arrow(),
                    FlankerKind::Incongruent => target.opposite().arrow(),
                    FlankerKind::Neutral => '□',
                };
                let t = target.arrow();
                format!("{flank} {flank} {t} {flank} {flank}")
            }
            Stimulus::ColorWord { word, .. } => word.to_string(),
            Stimulus::ColorPatch { color } => format!("{color} patch"),
            Stimulus::Target { side } => format!("target {side}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SquareColor {
    Orange,
    Blue,
}

impl fmt::Display for SquareColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SquareColor::Orange => "orange",
            SquareColor::Blue => "blue",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Left,
    Right,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }

    pub fn arrow(self) -> char {
        match self {
            Direction::Left => '←',
            Direction::Right => '→',
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Left => "Left",
            Direction::Right => "Right",
        })
    }
}

/// Posner target side. Same geometry as [`Direction`] but kept distinct in data.
pub type Side = Direction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlankerKind {
    Congruent,
    Incongruent,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CueSide {
    Left,
    Right,
    Both,
}

impl From<Side> for CueSide {
    fn from(side: Side) -> Self {
        match side {
            Direction::Left => CueSide::Left,
            Direction::Right => CueSide::Right,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StroopColor {
    Red,
    Yellow,
    Green,
    Blue,
}

impl StroopColor {
    pub const ALL: [StroopColor; 4] = [
        StroopColor::Red,
        StroopColor::Yellow,
        StroopColor::Green,
        StroopColor::Blue,
    ];

    pub fn rgba(self) -> [u8; 4] {
        match self {
            StroopColor::Red => [0xe7, 0x4c, 0x3c, 0xff],
            StroopColor::Yellow => [0xf3, 0x9c, 0x12, 0xff],
            StroopColor::Green => [0x27, 0xae, 0x60, 0xff],
            StroopColor::Blue => [0x34, 0x98, 0xdb, 0xff],
        }
    }
}

impl fmt::Display for StroopColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StroopColor::Red => "RED",
            StroopColor::Yellow => "YELLOW",
            StroopColor::Green => "GREEN",
            StroopColor::Blue => "BLUE",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StroopInk {
    Black,
    Color(StroopColor),
}

/// One selectable circle of the trail-making sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum TrailItem {
    Number(u32),
    Letter(char),
}

impl fmt::Display for TrailItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrailItem::Number(n) => write!(f, "{n}"),
            TrailItem::Letter(c) => write!(f, "{c}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flanker_labels_place_target_in_the_middle() {
        let s = Stimulus::Arrows {
            target: Direction::Left,
            flankers: FlankerKind::Incongruent,
        };
        assert_eq!(s.label(), "→ → ← → →");

        let s = Stimulus::Arrows {
            target: Direction::Right,
            flankers: FlankerKind::Neutral,
        };
        assert_eq!(s.label(), "□ □ → □ □");
    }

    #[test]
    fn trail_items_serialize_with_type_tag() {
        let json = serde_json::to_string(&TrailItem::Letter('C')).unwrap();
        assert_eq!(json, r#"{"type":"letter","value":"C"}"#);
    }
}
