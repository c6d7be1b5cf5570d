use crate::config::TaskKind;

/// Invalid counts, ratios or timing windows. Always raised before a round starts.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("{task}: a round needs at least one trial")]
    EmptyRound { task: TaskKind },

    #[error("{task}: no rounds configured")]
    NoRounds { task: TaskKind },

    #[error("n-back sequence of {trials} trials is too short for a lookback of {lookback}")]
    SequenceTooShort { trials: usize, lookback: usize },

    #[error("{field} must be within [0, 1], got {value}")]
    RatioOutOfRange { field: &'static str, value: f64 },

    #[error("condition ratios must sum to 1, got {sum}")]
    RatiosDoNotSum { sum: f64 },

    #[error("{field}: {reason}")]
    InvalidTiming { field: &'static str, reason: String },

    #[error("alphabet needs at least two distinct symbols, got {0:?}")]
    AlphabetTooSmall(String),

    #[error("target symbol {0:?} is not in the alphabet")]
    TargetNotInAlphabet(char),

    #[error("trail round {0} is not defined (expected 0 or 1)")]
    UnknownTrailRound(usize),
}

#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error("i/o error writing session: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize session: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParticipantError {
    #[error("participant name is required")]
    MissingName,

    #[error("participant must be at least 18 years old (got {0})")]
    Underage(u32),

    #[error("consent is required to take part")]
    NoConsent,
}

#[derive(Debug, thiserror::Error)]
pub enum ExperimentError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Recorder(#[from] RecorderError),

    #[error(transparent)]
    Participant(#[from] ParticipantError),
}
