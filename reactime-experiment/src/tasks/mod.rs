//! The eight tasks of the battery, each a configuration struct plus a
//! [`TaskProtocol`] that turns it into round engines and derived metrics.

mod finger_tapping;
mod flanker;
mod go_no_go;
mod n_back;
mod posner;
mod pvt;
mod stroop;
mod trail_making;

pub use finger_tapping::{FingerTappingConfig, TappingRound};
pub use flanker::FlankerConfig;
pub use go_no_go::GoNoGoConfig;
pub use n_back::NBackConfig;
pub use posner::PosnerConfig;
pub use pvt::PvtConfig;
pub use stroop::StroopConfig;
pub use trail_making::{TrailMakingConfig, TrailRound};

use crate::aggregator::RoundAggregator;
use crate::clock::{FeedbackFormatter, TrialClock};
use crate::config::{RoundPlan, RtPolicy, TaskKind, TrialTiming};
use crate::engine::RoundEngine;
use crate::error::ConfigurationError;
use crate::session::{DerivedMetrics, TaskSession};
use rand::SeedableRng;
use rand::rngs::StdRng;
use reactime_core::{KeyCode, TrialSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoundKind {
    Practice,
    Main(usize),
}

impl RoundKind {
    pub fn is_practice(self) -> bool {
        matches!(self, RoundKind::Practice)
    }
}

/// Strategy object the runner drives one task through.
pub trait TaskProtocol {
    fn kind(&self) -> TaskKind;

    fn round_count(&self) -> usize;

    fn practice_enabled(&self) -> bool;

    /// Pause shown before each round after the first.
    fn rest_ms(&self) -> u64;

    /// Key under which a main round is recorded, e.g. `pvt_round_2`.
    fn game_name(&self, round: usize) -> String;

    /// Title shown to the participant.
    fn round_label(&self, round: RoundKind) -> String;

    fn instructions(&self, round: RoundKind) -> String;

    fn validate(&self) -> Result<(), ConfigurationError>;

    fn build_round(
        &self,
        round: RoundKind,
        rng: &mut StdRng,
    ) -> Result<Box<dyn RoundEngine>, ConfigurationError>;

    fn rt_policy(&self) -> RtPolicy {
        RtPolicy::CorrectOnly
    }

    /// Per-round metrics beyond the generic summary.
    fn round_metrics(&self, _round: &RoundAggregator) -> DerivedMetrics {
        DerivedMetrics::default()
    }

    /// Cross-round effects, computed once when the task is finalized.
    fn task_metrics(&self, session: &TaskSession) -> DerivedMetrics;
}

/// Builds a Trial Clock round with its own rng stream.
pub(crate) fn timed_round(
    timing: &TrialTiming,
    sequence: Vec<TrialSpec>,
    accepted: &[KeyCode],
    feedback: Option<FeedbackFormatter>,
    rng: &mut StdRng,
) -> Box<dyn RoundEngine> {
    let clock = TrialClock::new(
        timing.clone(),
        sequence,
        accepted.to_vec(),
        StdRng::from_rng(rng),
    );
    match feedback {
        Some(f) => Box::new(clock.with_feedback(f)),
        None => Box::new(clock),
    }
}

/// Trial count and feedback for a timed round under `plan`.
pub(crate) fn plan_round(
    plan: &RoundPlan,
    round: RoundKind,
    formatter: FeedbackFormatter,
) -> (usize, Option<FeedbackFormatter>) {
    match round {
        RoundKind::Practice => (plan.practice_trials, Some(formatter)),
        RoundKind::Main(_) => (
            plan.trials_per_round,
            plan.feedback_in_main.then_some(formatter),
        ),
    }
}

pub(crate) fn validate_plan(
    kind: TaskKind,
    plan: &RoundPlan,
    timing: &TrialTiming,
) -> Result<(), ConfigurationError> {
    plan.validate(kind)?;
    timing.validate()
}

/// `a - b` when both means exist.
pub(crate) fn difference(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    Some(a? - b?)
}

/// `(a - b) / b * 100` when both means exist and `b` is non-zero.
pub(crate) fn percent_difference(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    let (a, b) = (a?, b?);
    (b != 0.0).then(|| (a - b) / b * 100.0)
}
