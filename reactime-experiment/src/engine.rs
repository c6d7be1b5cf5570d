use crate::presentation::RenderCommand;
use reactime_core::{InputEvent, KeyCode, TrialOutcome, TrialPhase, TrialSpec};

/// Everything a round engine reports back to its driver.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Render(RenderCommand),
    PhaseEntered {
        trial: usize,
        phase: TrialPhase,
        at_ms: u64,
    },
    TrialStarted {
        trial: usize,
        spec: TrialSpec,
    },
    StimulusShown {
        trial: usize,
        at_ms: u64,
    },
    ResponseCaptured {
        trial: usize,
        key: KeyCode,
        rt_ms: Option<u64>,
        at_ms: u64,
    },
    Outcome(TrialOutcome),
    /// Press while nothing was on screen to respond to. Scored against the
    /// round but never produces an outcome.
    FalseStart {
        trial: usize,
        key: KeyCode,
        at_ms: u64,
    },
    /// Input that arrived outside any response window. Not an error.
    InputIgnored {
        input: InputEvent,
        phase: TrialPhase,
    },
    RoundComplete {
        at_ms: u64,
    },
    Aborted {
        at_ms: u64,
    },
}

impl EngineEvent {
    pub fn outcome(&self) -> Option<&TrialOutcome> {
        match self {
            EngineEvent::Outcome(o) => Some(o),
            _ => None,
        }
    }
}

/// One round of trials driven cooperatively by the host loop.
///
/// Time only moves when the host calls [`advance`](RoundEngine::advance) or
/// delivers input; nothing here blocks or spawns.
pub trait RoundEngine {
    fn start(&mut self, now_ms: u64) -> Vec<EngineEvent>;

    /// Fires every transition whose deadline is `<= now_ms`.
    fn advance(&mut self, now_ms: u64) -> Vec<EngineEvent>;

    /// Fires every transition whose deadline is `< now_ms`. An input stamped
    /// `now_ms` is judged before transitions due at the same instant.
    fn advance_before(&mut self, now_ms: u64) -> Vec<EngineEvent>;

    fn handle_input(&mut self, input: InputEvent) -> Vec<EngineEvent>;

    /// Cancels every pending timer and drops the in-flight trial.
    fn abort(&mut self, now_ms: u64) -> Vec<EngineEvent>;

    fn next_deadline(&self) -> Option<u64>;

    fn pending_timers(&self) -> usize;

    fn is_finished(&self) -> bool;

    /// Number of outcomes a completed round produces, when known upfront.
    /// The runner checks it against [`outcomes`](RoundEngine::outcomes) once
    /// the round completes.
    fn trial_count(&self) -> Option<usize>;

    fn outcomes(&self) -> &[TrialOutcome];
}
