use super::{
    RoundKind, TaskProtocol, difference, percent_difference, plan_round, timed_round,
    validate_plan,
};
use crate::config::{Delay, EarlyInputPolicy, RoundPlan, RtPolicy, TaskKind, TrialTiming};
use crate::engine::RoundEngine;
use crate::error::ConfigurationError;
use crate::generator::{self, SequenceConfig, StroopBlock};
use crate::presentation::FeedbackTone;
use crate::session::{DerivedMetrics, TaskSession};
use rand::rngs::StdRng;
use reactime_core::{Classification, Condition, Expected, KeyCode, TrialOutcome, TrialSpec};
use serde::{Deserialize, Serialize};

const KEYS: [KeyCode; 4] = [KeyCode::KeyR, KeyCode::KeyY, KeyCode::KeyG, KeyCode::KeyB];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StroopConfig {
    pub blocks: Vec<StroopBlock>,
    pub items_per_block: usize,
    /// Practice runs the first block type.
    pub practice_trials: usize,
    pub rest_ms: u64,
    pub feedback_in_main: bool,
    pub timing: TrialTiming,
}

impl Default for StroopConfig {
    fn default() -> Self {
        Self {
            blocks: vec![
                StroopBlock::WordReading,
                StroopBlock::ColorNaming,
                StroopBlock::Interference,
            ],
            items_per_block: 12,
            practice_trials: 5,
            rest_ms: 10_000,
            feedback_in_main: false,
            timing: TrialTiming {
                fixation: Delay::Fixed(500),
                cue: None,
                response_window_ms: 3000,
                end_on_response: true,
                hide_on_response: false,
                feedback_ms: 0,
                inter_trial: Delay::Fixed(1000),
                min_valid_rt_ms: None,
                early_input: EarlyInputPolicy::Ignore,
            },
        }
    }
}

impl StroopConfig {
    fn plan(&self) -> RoundPlan {
        RoundPlan {
            practice_trials: self.practice_trials,
            trials_per_round: self.items_per_block,
            rounds: self.blocks.len(),
            rest_ms: self.rest_ms,
            feedback_in_main: self.feedback_in_main,
        }
    }

    fn block(&self, round: RoundKind) -> StroopBlock {
        let index = match round {
            RoundKind::Practice => 0,
            RoundKind::Main(r) => r,
        };
        self.blocks
            .get(index)
            .copied()
            .unwrap_or(StroopBlock::WordReading)
    }
}

fn feedback(spec: &TrialSpec, o: &TrialOutcome) -> Option<(String, FeedbackTone)> {
    match (o.classification, spec.expected) {
        (Classification::Correct, _) => Some((
            format!("Correct! ({}ms)", o.reaction_time_ms.unwrap_or_default()),
            FeedbackTone::Positive,
        )),
        (Classification::NoResponse, _) => {
            Some(("Too slow! Please respond faster.".into(), FeedbackTone::Negative))
        }
        (_, Expected::Key(key)) => key.color().map(|color| {
            (
                format!("Incorrect. Expected: {color}"),
                FeedbackTone::Negative,
            )
        }),
        _ => None,
    }
}

impl TaskProtocol for StroopConfig {
    fn kind(&self) -> TaskKind {
        TaskKind::Stroop
    }

    fn round_count(&self) -> usize {
        self.blocks.len()
    }

    fn practice_enabled(&self) -> bool {
        self.practice_trials > 0
    }

    fn rest_ms(&self) -> u64 {
        self.rest_ms
    }

    fn game_name(&self, round: usize) -> String {
        format!("stroop_{}", self.block(RoundKind::Main(round)).short_name())
    }

    fn round_label(&self, round: RoundKind) -> String {
        let name = match self.block(round) {
            StroopBlock::WordReading => "Word Reading",
            StroopBlock::ColorNaming => "Color Naming",
            StroopBlock::Interference => "Interference",
        };
        match round {
            RoundKind::Practice => format!("Practice: {name}"),
            RoundKind::Main(r) => format!("Block {}: {name}", r + 1),
        }
    }

    fn instructions(&self, round: RoundKind) -> String {
        let text = match self.block(round) {
            StroopBlock::WordReading => "Read the word and press the corresponding key",
            StroopBlock::ColorNaming => {
                "Name the color of the square and press the corresponding key"
            }
            StroopBlock::Interference => {
                "Name the INK COLOR (not the word) and press the corresponding key"
            }
        };
        format!("{text} (R = red, Y = yellow, G = green, B = blue)")
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        validate_plan(self.kind(), &self.plan(), &self.timing)
    }

    fn build_round(
        &self,
        round: RoundKind,
        rng: &mut StdRng,
    ) -> Result<Box<dyn RoundEngine>, ConfigurationError> {
        let (trials, formatter) = plan_round(&self.plan(), round, feedback);
        let sequence = generator::generate(trials, &SequenceConfig::Stroop(self.block(round)), rng)?;
        Ok(timed_round(&self.timing, sequence, &KEYS, formatter, rng))
    }

    fn rt_policy(&self) -> RtPolicy {
        RtPolicy::ValidResponses
    }

    fn task_metrics(&self, session: &TaskSession) -> DerivedMetrics {
        let color = session.pooled_condition_rt(Condition::ColorNaming);
        let interference = session.pooled_condition_rt(Condition::Interference);

        let mut m = DerivedMetrics::new();
        for (summary, block) in session.rounds.iter().zip(&self.blocks) {
            let name = block.short_name();
            m.insert(format!("{name}_completion_ms"), summary.duration_ms as f64);
            m.insert(format!("{name}_errors"), summary.wrong as f64);
            m.insert_opt(format!("{name}_mean_rt_ms"), summary.mean_rt_ms);
        }
        m.insert_opt("interference_effect_ms", difference(interference, color));
        m.insert_opt(
            "interference_effect_percent",
            percent_difference(interference, color),
        );
        m
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reactime_core::{Stimulus, StroopColor, StroopInk};

    #[test]
    fn incorrect_feedback_names_expected_color() {
        let spec = TrialSpec::new(
            Condition::Interference,
            Stimulus::ColorWord {
                word: StroopColor::Blue,
                ink: StroopInk::Color(StroopColor::Red),
            },
            Expected::Key(KeyCode::KeyR),
        );
        let o = TrialOutcome {
            trial_index: 0,
            condition: Condition::Interference,
            response: Some(KeyCode::KeyB),
            reaction_time_ms: Some(900),
            classification: Classification::Incorrect,
            timestamp_ms: 0,
        };
        assert_eq!(feedback(&spec, &o).unwrap().0, "Incorrect. Expected: RED");
    }

    #[test]
    fn game_names_use_block_types() {
        let c = StroopConfig::default();
        let names: Vec<_> = (0..3).map(|r| c.game_name(r)).collect();
        assert_eq!(names, ["stroop_word", "stroop_color", "stroop_interference"]);
    }
}
