use super::{RoundKind, TaskProtocol, plan_round, timed_round, validate_plan};
use crate::aggregator::{RoundAggregator, mean, median};
use crate::config::{Delay, EarlyInputPolicy, RoundPlan, TaskKind, TrialTiming};
use crate::engine::RoundEngine;
use crate::error::ConfigurationError;
use crate::generator::{self, SequenceConfig};
use crate::presentation::FeedbackTone;
use crate::session::{DerivedMetrics, TaskSession};
use rand::rngs::StdRng;
use reactime_core::{Classification, Condition, KeyCode, TrialOutcome, TrialSpec};
use serde::{Deserialize, Serialize};

/// Reaction times at or above this are lapses.
pub const LAPSE_MS: u64 = 500;
/// Lower bound of a minor lapse.
pub const MINOR_LAPSE_MS: u64 = 355;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PvtConfig {
    #[serde(flatten)]
    pub plan: RoundPlan,
    pub timing: TrialTiming,
}

impl Default for PvtConfig {
    fn default() -> Self {
        Self {
            plan: RoundPlan {
                practice_trials: 5,
                trials_per_round: 20,
                rounds: 2,
                rest_ms: 2000,
                feedback_in_main: false,
            },
            timing: TrialTiming {
                fixation: Delay::Uniform { min: 1000, max: 3000 },
                cue: None,
                response_window_ms: 1000,
                end_on_response: true,
                hide_on_response: false,
                feedback_ms: 500,
                inter_trial: Delay::Uniform { min: 2000, max: 10000 },
                min_valid_rt_ms: Some(100),
                early_input: EarlyInputPolicy::FalseStart,
            },
        }
    }
}

fn feedback(_: &TrialSpec, o: &TrialOutcome) -> Option<(String, FeedbackTone)> {
    match (o.classification, o.reaction_time_ms) {
        (Classification::Hit, Some(rt)) => {
            Some((format!("Reaction time: {rt}ms"), FeedbackTone::Neutral))
        }
        (Classification::FalseStart, Some(_)) => {
            Some(("False start! (<100ms)".into(), FeedbackTone::Negative))
        }
        (Classification::FalseStart, None) => Some((
            "False start! No stimulus present".into(),
            FeedbackTone::Negative,
        )),
        (Classification::Miss, _) => Some(("Too slow!".into(), FeedbackTone::Negative)),
        _ => None,
    }
}

fn lapse_counts(rts: &[u64]) -> (usize, usize) {
    let lapses = rts.iter().filter(|&&rt| rt >= LAPSE_MS).count();
    let minor = rts
        .iter()
        .filter(|&&rt| (MINOR_LAPSE_MS..LAPSE_MS).contains(&rt))
        .count();
    (lapses, minor)
}

impl TaskProtocol for PvtConfig {
    fn kind(&self) -> TaskKind {
        TaskKind::Pvt
    }

    fn round_count(&self) -> usize {
        self.plan.rounds
    }

    fn practice_enabled(&self) -> bool {
        self.plan.practice_trials > 0
    }

    fn rest_ms(&self) -> u64 {
        self.plan.rest_ms
    }

    fn game_name(&self, round: usize) -> String {
        format!("pvt_round_{}", round + 1)
    }

    fn round_label(&self, round: RoundKind) -> String {
        match round {
            RoundKind::Practice => "PVT Practice".into(),
            RoundKind::Main(r) => format!("PVT Round {}/{}", r + 1, self.plan.rounds),
        }
    }

    fn instructions(&self, _: RoundKind) -> String {
        "Watch the box. Press SPACE as soon as the counter starts. \
         Pressing before it appears is a false start."
            .into()
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        validate_plan(self.kind(), &self.plan, &self.timing)
    }

    fn build_round(
        &self,
        round: RoundKind,
        rng: &mut StdRng,
    ) -> Result<Box<dyn RoundEngine>, ConfigurationError> {
        let (trials, formatter) = plan_round(&self.plan, round, feedback);
        let sequence = generator::generate(trials, &SequenceConfig::Pvt, rng)?;
        Ok(timed_round(
            &self.timing,
            sequence,
            &[KeyCode::Space],
            formatter,
            rng,
        ))
    }

    fn round_metrics(&self, round: &RoundAggregator) -> DerivedMetrics {
        let rts = round.valid_reaction_times();
        let hits = rts.len();
        let false_starts = round.false_starts();
        let too_fast = round
            .outcomes()
            .iter()
            .filter(|o| o.classification == Classification::FalseStart && o.reaction_time_ms.is_some())
            .count();
        let anticipations = false_starts - too_fast;
        let (lapses, minor) = lapse_counts(&rts);

        let mut m = DerivedMetrics::new();
        m.insert_opt("mean_rt_ms", mean(&rts));
        m.insert_opt("median_rt_ms", median(&rts));
        m.insert("lapses", lapses as f64);
        m.insert("minor_lapses", minor as f64);
        m.insert("false_starts", false_starts as f64);
        m.insert("anticipations", anticipations as f64);
        if hits + false_starts > 0 {
            m.insert(
                "success_rate",
                hits as f64 / (hits + false_starts) as f64 * 100.0,
            );
        }
        m
    }

    fn task_metrics(&self, session: &TaskSession) -> DerivedMetrics {
        let mut m = DerivedMetrics::new();
        let hits: usize = session.rounds.iter().map(|r| r.counts.hit).sum();
        let false_starts: usize = session.rounds.iter().map(|r| r.total_false_starts()).sum();
        let misses: usize = session.rounds.iter().map(|r| r.counts.miss).sum();
        m.insert_opt(
            "mean_rt_ms",
            session.pooled_condition_rt(Condition::Vigilance),
        );
        m.insert("total_false_starts", false_starts as f64);
        m.insert("total_misses", misses as f64);
        if hits + false_starts > 0 {
            m.insert(
                "success_rate",
                hits as f64 / (hits + false_starts) as f64 * 100.0,
            );
        }
        m
    }
}
