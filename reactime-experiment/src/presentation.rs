use reactime_core::{CueSide, Stimulus, TrailItem};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackTone {
    Positive,
    Negative,
    Neutral,
}

/// Display instructions emitted by the engine. The engine never draws; a
/// [`Presentation`] turns these into pixels (or into nothing, headless).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum RenderCommand {
    Clear,
    ShowInstructions {
        title: String,
        text: String,
    },
    ShowFixation,
    ShowCue {
        side: CueSide,
    },
    ClearCue,
    ShowStimulus {
        trial: usize,
        stimulus: Stimulus,
    },
    ShowFeedback {
        text: String,
        tone: FeedbackTone,
    },
    ShowRest {
        next_round: String,
        duration_ms: u64,
    },
    ShowTrail {
        items: Vec<TrailItem>,
    },
    MarkTrailItem {
        item: TrailItem,
        correct: bool,
    },
    ShowTapCount {
        count: usize,
        remaining_ms: u64,
    },
    ShowSummary {
        title: String,
        metrics: Vec<(String, f64)>,
    },
}

pub trait Presentation {
    fn present(&mut self, command: &RenderCommand);
}

/// Collects commands, for tests and headless runs.
impl Presentation for Vec<RenderCommand> {
    fn present(&mut self, command: &RenderCommand) {
        self.push(command.clone());
    }
}
