use super::{RoundKind, TaskProtocol, plan_round, timed_round, validate_plan};
use crate::config::{Delay, EarlyInputPolicy, RoundPlan, TaskKind, TrialTiming};
use crate::engine::RoundEngine;
use crate::error::ConfigurationError;
use crate::generator::{self, SequenceConfig};
use crate::presentation::FeedbackTone;
use crate::session::{DerivedMetrics, TaskSession};
use rand::rngs::StdRng;
use reactime_core::{Classification, Condition, KeyCode, TrialOutcome, TrialSpec};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GoNoGoConfig {
    #[serde(flatten)]
    pub plan: RoundPlan,
    pub timing: TrialTiming,
    pub go_ratio: f64,
}

impl Default for GoNoGoConfig {
    fn default() -> Self {
        Self {
            plan: RoundPlan {
                practice_trials: 10,
                trials_per_round: 30,
                rounds: 2,
                rest_ms: 2000,
                feedback_in_main: false,
            },
            timing: TrialTiming {
                fixation: Delay::Uniform { min: 500, max: 1000 },
                cue: None,
                response_window_ms: 1000,
                end_on_response: false,
                hide_on_response: true,
                feedback_ms: 0,
                inter_trial: Delay::Uniform { min: 500, max: 1500 },
                min_valid_rt_ms: None,
                early_input: EarlyInputPolicy::FalseStart,
            },
            go_ratio: 0.7,
        }
    }
}

fn feedback(_: &TrialSpec, o: &TrialOutcome) -> Option<(String, FeedbackTone)> {
    match o.classification {
        Classification::Hit => Some((
            format!("Correct! ({}ms)", o.reaction_time_ms.unwrap_or_default()),
            FeedbackTone::Positive,
        )),
        Classification::FalseAlarm => Some((
            "Wrong! Shouldn't press for blue".into(),
            FeedbackTone::Negative,
        )),
        Classification::FalseStart => Some((
            "Too early! Wait for the square".into(),
            FeedbackTone::Negative,
        )),
        _ => None,
    }
}

impl TaskProtocol for GoNoGoConfig {
    fn kind(&self) -> TaskKind {
        TaskKind::GoNoGo
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
        format!("go_no_go_round_{}", round + 1)
    }

    fn round_label(&self, round: RoundKind) -> String {
        match round {
            RoundKind::Practice => "Go/No-Go Practice".into(),
            RoundKind::Main(r) => format!("Go/No-Go Round {}", r + 1),
        }
    }

    fn instructions(&self, _: RoundKind) -> String {
        "Press SPACE as fast as you can when an orange square appears. \
         Do not press for blue squares."
            .into()
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        validate_plan(self.kind(), &self.plan, &self.timing)?;
        generator::check_ratio("go_ratio", self.go_ratio)
    }

    fn build_round(
        &self,
        round: RoundKind,
        rng: &mut StdRng,
    ) -> Result<Box<dyn RoundEngine>, ConfigurationError> {
        let (trials, formatter) = plan_round(&self.plan, round, feedback);
        let sequence = generator::generate(
            trials,
            &SequenceConfig::GoNoGo {
                go_ratio: self.go_ratio,
            },
            rng,
        )?;
        Ok(timed_round(
            &self.timing,
            sequence,
            &[KeyCode::Space],
            formatter,
            rng,
        ))
    }

    fn task_metrics(&self, session: &TaskSession) -> DerivedMetrics {
        let mut m = DerivedMetrics::new();
        m.insert_opt("go_mean_rt_ms", session.pooled_condition_rt(Condition::Go));
        m.insert_opt(
            "go_accuracy",
            session.pooled_condition_accuracy(Condition::Go),
        );
        m.insert_opt(
            "no_go_accuracy",
            session.pooled_condition_accuracy(Condition::NoGo),
        );
        let false_alarms: usize = session.rounds.iter().map(|r| r.counts.false_alarm).sum();
        let false_starts: usize = session.rounds.iter().map(|r| r.total_false_starts()).sum();
        m.insert("false_alarms", false_alarms as f64);
        m.insert("false_starts", false_starts as f64);
        m
    }
}
