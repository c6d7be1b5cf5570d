use crate::input::KeyCode;
use crate::stimulus::{CueSide, Stimulus};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Condition tag used to stratify aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Go,
    NoGo,
    Vigilance,
    Target,
    NonTarget,
    Congruent,
    Incongruent,
    Neutral,
    Valid,
    Invalid,
    WordReading,
    ColorNaming,
    Interference,
    Tap,
    Trail,
}

impl Condition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Condition::Go => "go",
            Condition::NoGo => "no_go",
            Condition::Vigilance => "vigilance",
            Condition::Target => "target",
            Condition::NonTarget => "non_target",
            Condition::Congruent => "congruent",
            Condition::Incongruent => "incongruent",
            Condition::Neutral => "neutral",
            Condition::Valid => "valid",
            Condition::Invalid => "invalid",
            Condition::WordReading => "word_reading",
            Condition::ColorNaming => "color_naming",
            Condition::Interference => "interference",
            Condition::Tap => "tap",
            Condition::Trail => "trail",
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What counts as the correct behavior on a trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "expect", content = "key", rename_all = "snake_case")]
pub enum Expected {
    /// Target: any accepted key is a hit.
    Go,
    /// Non-target: the participant must not respond.
    Withhold,
    /// Discrete choice: only this key is correct.
    Key(KeyCode),
}

impl Expected {
    pub fn is_target(&self) -> bool {
        !matches!(self, Expected::Withhold)
    }
}

/// One generated trial. Immutable once the sequence is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialSpec {
    pub condition: Condition,
    pub stimulus: Stimulus,
    pub expected: Expected,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cue: Option<CueSide>,
}

impl TrialSpec {
    pub fn new(condition: Condition, stimulus: Stimulus, expected: Expected) -> Self {
        Self {
            condition,
            stimulus,
            expected,
            cue: None,
        }
    }

    pub fn with_cue(mut self, cue: CueSide) -> Self {
        self.cue = Some(cue);
        self
    }
}

/// When a response happened relative to stimulus onset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "timing", content = "rt_ms", rename_all = "snake_case")]
pub enum ResponseTiming {
    /// Pressed before the stimulus appeared.
    Anticipatory,
    /// Milliseconds after stimulus onset.
    Reaction(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub key: KeyCode,
    pub timing: ResponseTiming,
}

impl Response {
    pub fn reaction(key: KeyCode, rt_ms: u64) -> Self {
        Self {
            key,
            timing: ResponseTiming::Reaction(rt_ms),
        }
    }

    pub fn anticipatory(key: KeyCode) -> Self {
        Self {
            key,
            timing: ResponseTiming::Anticipatory,
        }
    }

    pub fn reaction_time_ms(&self) -> Option<u64> {
        match self.timing {
            ResponseTiming::Reaction(rt) => Some(rt),
            ResponseTiming::Anticipatory => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Classification {
    Hit,
    Miss,
    Correct,
    Incorrect,
    FalseAlarm,
    FalseStart,
    CorrectRejection,
    NoResponse,
}

impl Classification {
    pub const ALL: [Classification; 8] = [
        Classification::Hit,
        Classification::Miss,
        Classification::Correct,
        Classification::Incorrect,
        Classification::FalseAlarm,
        Classification::FalseStart,
        Classification::CorrectRejection,
        Classification::NoResponse,
    ];

    pub fn is_correct(self) -> bool {
        matches!(
            self,
            Classification::Hit | Classification::Correct | Classification::CorrectRejection
        )
    }

    /// A keypress was registered but it was the wrong one.
    pub fn is_error_response(self) -> bool {
        matches!(
            self,
            Classification::Incorrect | Classification::FalseAlarm | Classification::FalseStart
        )
    }

    pub fn is_omission(self) -> bool {
        matches!(self, Classification::Miss | Classification::NoResponse)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Classification::Hit => "hit",
            Classification::Miss => "miss",
            Classification::Correct => "correct",
            Classification::Incorrect => "incorrect",
            Classification::FalseAlarm => "falseAlarm",
            Classification::FalseStart => "falseStart",
            Classification::CorrectRejection => "correctRejection",
            Classification::NoResponse => "noResponse",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exactly one per completed trial; never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialOutcome {
    pub trial_index: usize,
    pub condition: Condition,
    pub response: Option<KeyCode>,
    pub reaction_time_ms: Option<u64>,
    pub classification: Classification,
    pub timestamp_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correct_set_covers_hits_and_rejections() {
        let correct: Vec<_> = Classification::ALL
            .into_iter()
            .filter(|c| c.is_correct())
            .collect();
        assert_eq!(
            correct,
            vec![
                Classification::Hit,
                Classification::Correct,
                Classification::CorrectRejection
            ]
        );
    }

    #[test]
    fn outcome_serializes_camel_case() {
        let outcome = TrialOutcome {
            trial_index: 3,
            condition: Condition::Go,
            response: Some(KeyCode::Space),
            reaction_time_ms: Some(312),
            classification: Classification::Hit,
            timestamp_ms: 4_000,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["trialIndex"], 3);
        assert_eq!(json["reactionTimeMs"], 312);
        assert_eq!(json["classification"], "hit");
    }

    #[test]
    fn anticipatory_response_has_no_reaction_time() {
        assert_eq!(Response::anticipatory(KeyCode::Space).reaction_time_ms(), None);
        assert_eq!(Response::reaction(KeyCode::Space, 250).reaction_time_ms(), Some(250));
    }
}
