use super::{RoundKind, TaskProtocol, difference};
use crate::aggregator::{RoundAggregator, RoundSummary};
use crate::config::TaskKind;
use crate::engine::{EngineEvent, RoundEngine};
use crate::error::ConfigurationError;
use crate::generator;
use crate::presentation::{FeedbackTone, RenderCommand};
use crate::session::{DerivedMetrics, TaskSession};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use reactime_core::{
    Classification, Condition, InputEvent, Phase, TrailItem, TrialOutcome, TrialPhase,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrailMakingConfig {
    /// Length of the numbers-only practice sheet; 0 skips practice.
    pub practice_items: usize,
}

impl Default for TrailMakingConfig {
    fn default() -> Self {
        Self { practice_items: 8 }
    }
}

/// One sheet of circles to be visited in order.
///
/// There is no response window: the round lasts until the last item is
/// selected. Every selection is one outcome; only correct ones move the
/// cursor forward.
pub struct TrailRound {
    order: Vec<TrailItem>,
    layout: Vec<TrailItem>,
    cursor: usize,
    phase: TrialPhase,
    last_correct_ms: u64,
    feedback: bool,
    outcomes: Vec<TrialOutcome>,
}

impl TrailRound {
    pub fn new(order: Vec<TrailItem>, layout: Vec<TrailItem>) -> Self {
        Self {
            order,
            layout,
            cursor: 0,
            phase: TrialPhase::Idle,
            last_correct_ms: 0,
            feedback: false,
            outcomes: Vec::new(),
        }
    }

    pub fn with_feedback(mut self) -> Self {
        self.feedback = true;
        self
    }

    /// The item that has to be selected next.
    pub fn expected_item(&self) -> Option<TrailItem> {
        self.order.get(self.cursor).copied()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn layout(&self) -> &[TrailItem] {
        &self.layout
    }

    fn select(&mut self, item: TrailItem, at_ms: u64, events: &mut Vec<EngineEvent>) {
        let Some(expected) = self.expected_item() else {
            return;
        };
        let correct = item == expected;
        let outcome = TrialOutcome {
            trial_index: self.outcomes.len(),
            condition: Condition::Trail,
            response: None,
            reaction_time_ms: Some(at_ms.saturating_sub(self.last_correct_ms)),
            classification: if correct {
                Classification::Correct
            } else {
                Classification::Incorrect
            },
            timestamp_ms: at_ms,
        };
        debug!(%item, %expected, correct, "trail selection");
        events.push(EngineEvent::Render(RenderCommand::MarkTrailItem { item, correct }));
        if self.feedback {
            let (text, tone) = if correct {
                ("Correct! Click the next item.", FeedbackTone::Positive)
            } else {
                ("Wrong! Try again.", FeedbackTone::Negative)
            };
            events.push(EngineEvent::Render(RenderCommand::ShowFeedback {
                text: text.into(),
                tone,
            }));
        }
        self.outcomes.push(outcome.clone());
        events.push(EngineEvent::Outcome(outcome));

        if correct {
            self.cursor += 1;
            self.last_correct_ms = at_ms;
            if self.cursor == self.order.len() {
                self.phase = TrialPhase::RoundComplete;
                info!(selections = self.outcomes.len(), "trail complete");
                events.push(EngineEvent::RoundComplete { at_ms });
            }
        }
    }
}

impl RoundEngine for TrailRound {
    fn start(&mut self, now_ms: u64) -> Vec<EngineEvent> {
        if self.phase != TrialPhase::Idle {
            return Vec::new();
        }
        self.last_correct_ms = now_ms;
        if self.order.is_empty() {
            self.phase = TrialPhase::RoundComplete;
            return vec![EngineEvent::RoundComplete { at_ms: now_ms }];
        }
        self.phase = TrialPhase::StimulusVisible;
        vec![
            EngineEvent::PhaseEntered {
                trial: 0,
                phase: self.phase,
                at_ms: now_ms,
            },
            EngineEvent::Render(RenderCommand::ShowTrail {
                items: self.layout.clone(),
            }),
        ]
    }

    fn advance(&mut self, _: u64) -> Vec<EngineEvent> {
        Vec::new()
    }

    fn advance_before(&mut self, _: u64) -> Vec<EngineEvent> {
        Vec::new()
    }

    fn handle_input(&mut self, input: InputEvent) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        match input {
            InputEvent::Select { item, at_ms } if self.phase.allows_input() => {
                self.select(item, at_ms, &mut events)
            }
            _ => events.push(EngineEvent::InputIgnored {
                input,
                phase: self.phase,
            }),
        }
        events
    }

    fn abort(&mut self, now_ms: u64) -> Vec<EngineEvent> {
        if self.phase.is_terminal() {
            return Vec::new();
        }
        self.phase = TrialPhase::Aborted;
        vec![EngineEvent::Aborted { at_ms: now_ms }]
    }

    fn next_deadline(&self) -> Option<u64> {
        None
    }

    fn pending_timers(&self) -> usize {
        0
    }

    fn is_finished(&self) -> bool {
        self.phase.is_terminal()
    }

    fn trial_count(&self) -> Option<usize> {
        None
    }

    fn outcomes(&self) -> &[TrialOutcome] {
        &self.outcomes
    }
}

fn completion(summary: Option<&RoundSummary>) -> Option<f64> {
    summary.map(|s| s.duration_ms as f64)
}

impl TaskProtocol for TrailMakingConfig {
    fn kind(&self) -> TaskKind {
        TaskKind::TrailMaking
    }

    fn round_count(&self) -> usize {
        2
    }

    fn practice_enabled(&self) -> bool {
        self.practice_items > 0
    }

    fn rest_ms(&self) -> u64 {
        2000
    }

    fn game_name(&self, round: usize) -> String {
        format!("trail_making_round_{}", round + 1)
    }

    fn round_label(&self, round: RoundKind) -> String {
        match round {
            RoundKind::Practice => "Trail Making Practice".into(),
            RoundKind::Main(0) => "Round 1: Numbers".into(),
            RoundKind::Main(_) => "Round 2: Numbers and Letters".into(),
        }
    }

    fn instructions(&self, round: RoundKind) -> String {
        match round {
            RoundKind::Main(1) => {
                "Click the circles alternating between numbers and letters: 1-A-2-B-3-C...".into()
            }
            _ => "Click the circles in ascending order: 1-2-3...".into(),
        }
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        if self.practice_items > generator::TRAIL_LENGTH {
            return Err(ConfigurationError::InvalidTiming {
                field: "practice_items",
                reason: format!(
                    "practice sheet has at most {} items, got {}",
                    generator::TRAIL_LENGTH,
                    self.practice_items
                ),
            });
        }
        Ok(())
    }

    fn build_round(
        &self,
        round: RoundKind,
        rng: &mut StdRng,
    ) -> Result<Box<dyn RoundEngine>, ConfigurationError> {
        match round {
            RoundKind::Practice => {
                let mut order = generator::trail_order(0)?;
                order.truncate(self.practice_items);
                let mut layout = order.clone();
                if let Some(rest) = layout.get_mut(1..) {
                    rest.shuffle(rng);
                }
                Ok(Box::new(TrailRound::new(order, layout).with_feedback()))
            }
            RoundKind::Main(r) => {
                let order = generator::trail_order(r)?;
                let layout = generator::trail_layout(r, rng)?;
                Ok(Box::new(TrailRound::new(order, layout)))
            }
        }
    }

    fn round_metrics(&self, round: &RoundAggregator) -> DerivedMetrics {
        let summary = round.summary();
        let mut m = DerivedMetrics::new();
        m.insert("completion_ms", summary.duration_ms as f64);
        m.insert("correct_moves", summary.correct as f64);
        m.insert("errors", summary.wrong as f64);
        m.insert("total_moves", summary.trials as f64);
        m
    }

    fn task_metrics(&self, session: &TaskSession) -> DerivedMetrics {
        let a = completion(session.rounds.first());
        let b = completion(session.rounds.get(1));
        let mut m = DerivedMetrics::new();
        m.insert_opt("round_a_completion_ms", a);
        m.insert_opt("round_b_completion_ms", b);
        m.insert("total_time_ms", session.total_duration_ms() as f64);
        m.insert_opt("b_minus_a_ms", difference(b, a));
        if let (Some(a), Some(b)) = (a, b) {
            if a > 0.0 {
                m.insert("b_to_a_ratio", b / a);
            }
        }
        m
    }
}
