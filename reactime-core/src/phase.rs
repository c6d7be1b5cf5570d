use serde::{Deserialize, Serialize};

/// Common behavior of the phase enums the engine moves through.
pub trait Phase: Copy + Clone + PartialEq + Send + Sync + std::fmt::Debug + Default {
    /// Whether a keypress in this phase can produce a scored response.
    fn allows_input(&self) -> bool;

    /// Whether the phase is terminal and no timer may be pending.
    fn is_terminal(&self) -> bool;

    /// Input that arrives here is scored against the early-input policy of the task.
    fn is_anticipatory(&self) -> bool {
        false
    }
}

/// Per-trial state machine of the Trial Clock.
///
/// `Idle -> Fixation -> [Cue -> CueTargetInterval ->] StimulusVisible ->
/// ResponseWindowClosed -> InterTrialInterval -> (Fixation | RoundComplete)`
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialPhase {
    #[default]
    Idle,
    Fixation,
    Cue,
    CueTargetInterval,
    StimulusVisible,
    ResponseWindowClosed,
    InterTrialInterval,
    RoundComplete,
    Aborted,
}

impl Phase for TrialPhase {
    fn allows_input(&self) -> bool {
        matches!(self, Self::StimulusVisible)
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::RoundComplete | Self::Aborted)
    }

    fn is_anticipatory(&self) -> bool {
        matches!(self, Self::Fixation | Self::Cue | Self::CueTargetInterval)
    }
}

/// Where a task runner is within its practice/round/rest schedule.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "stage", content = "round")]
pub enum RunnerStage {
    #[default]
    NotStarted,
    Practice,
    Round(usize),
    Rest(usize),
    Finished,
    Aborted,
}

impl Phase for RunnerStage {
    fn allows_input(&self) -> bool {
        matches!(self, Self::Practice | Self::Round(_))
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Aborted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_stimulus_phase_accepts_responses() {
        use TrialPhase::*;
        for phase in [
            Idle,
            Fixation,
            Cue,
            CueTargetInterval,
            ResponseWindowClosed,
            InterTrialInterval,
            RoundComplete,
            Aborted,
        ] {
            assert!(!phase.allows_input(), "{phase:?} should not accept input");
        }
        assert!(StimulusVisible.allows_input());
    }

    #[test]
    fn pre_stimulus_phases_are_anticipatory() {
        assert!(TrialPhase::Fixation.is_anticipatory());
        assert!(TrialPhase::Cue.is_anticipatory());
        assert!(!TrialPhase::InterTrialInterval.is_anticipatory());
    }

    #[test]
    fn runner_stage_serializes_with_round_index() {
        let json = serde_json::to_string(&RunnerStage::Round(2)).unwrap();
        assert_eq!(json, r#"{"stage":"round","round":2}"#);
    }
}
