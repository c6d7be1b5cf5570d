use super::{RoundKind, TaskProtocol, difference, plan_round, timed_round, validate_plan};
use crate::config::{CueTiming, Delay, EarlyInputPolicy, RoundPlan, TaskKind, TrialTiming};
use crate::engine::RoundEngine;
use crate::error::ConfigurationError;
use crate::generator::{self, SequenceConfig};
use crate::presentation::FeedbackTone;
use crate::session::{DerivedMetrics, TaskSession};
use rand::rngs::StdRng;
use reactime_core::{Classification, Condition, KeyCode, Stimulus, TrialOutcome, TrialSpec};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PosnerConfig {
    #[serde(flatten)]
    pub plan: RoundPlan,
    pub timing: TrialTiming,
    pub valid_ratio: f64,
    pub invalid_ratio: f64,
    pub neutral_ratio: f64,
}

impl Default for PosnerConfig {
    fn default() -> Self {
        Self {
            plan: RoundPlan {
                practice_trials: 12,
                trials_per_round: 40,
                rounds: 3,
                rest_ms: 2000,
                feedback_in_main: false,
            },
            timing: TrialTiming {
                fixation: Delay::Uniform { min: 500, max: 1000 },
                cue: Some(CueTiming {
                    cue_ms: 100,
                    cue_target_interval_ms: 100,
                }),
                response_window_ms: 1500,
                end_on_response: true,
                hide_on_response: false,
                feedback_ms: 0,
                inter_trial: Delay::Fixed(1000),
                min_valid_rt_ms: None,
                early_input: EarlyInputPolicy::Ignore,
            },
            valid_ratio: 0.8,
            invalid_ratio: 0.1,
            neutral_ratio: 0.1,
        }
    }
}

impl PosnerConfig {
    fn sequence_config(&self) -> SequenceConfig {
        SequenceConfig::Posner {
            valid: self.valid_ratio,
            invalid: self.invalid_ratio,
            neutral: self.neutral_ratio,
        }
    }
}

fn feedback(spec: &TrialSpec, o: &TrialOutcome) -> Option<(String, FeedbackTone)> {
    match o.classification {
        Classification::NoResponse => Some((
            "Too slow! Please respond faster.".into(),
            FeedbackTone::Negative,
        )),
        Classification::Correct => {
            let cue = match spec.condition {
                Condition::Valid => "Valid cue",
                Condition::Invalid => "Invalid cue",
                _ => "Neutral cue",
            };
            Some((
                format!(
                    "Correct! ({}ms) - {cue}",
                    o.reaction_time_ms.unwrap_or_default()
                ),
                FeedbackTone::Positive,
            ))
        }
        _ => {
            let Stimulus::Target { side } = spec.stimulus else {
                return None;
            };
            Some((
                format!("Incorrect. Target was on the {side}."),
                FeedbackTone::Negative,
            ))
        }
    }
}

impl TaskProtocol for PosnerConfig {
    fn kind(&self) -> TaskKind {
        TaskKind::Posner
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
        format!("posner_block_{}", round + 1)
    }

    fn round_label(&self, round: RoundKind) -> String {
        match round {
            RoundKind::Practice => "Posner Practice".into(),
            RoundKind::Main(r) => format!("Block {}/{}", r + 1, self.plan.rounds),
        }
    }

    fn instructions(&self, _: RoundKind) -> String {
        "Keep your eyes on the center cross. Press LEFT or RIGHT as soon as the \
         target appears on that side."
            .into()
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        validate_plan(self.kind(), &self.plan, &self.timing)?;
        generator::check_ratio("valid_ratio", self.valid_ratio)?;
        generator::check_ratio("invalid_ratio", self.invalid_ratio)?;
        generator::check_ratio("neutral_ratio", self.neutral_ratio)?;
        generator::ratio_counts(
            self.plan.trials_per_round,
            &[self.valid_ratio, self.invalid_ratio, self.neutral_ratio],
        )
        .map(|_| ())
    }

    fn build_round(
        &self,
        round: RoundKind,
        rng: &mut StdRng,
    ) -> Result<Box<dyn RoundEngine>, ConfigurationError> {
        let (trials, formatter) = plan_round(&self.plan, round, feedback);
        let sequence = generator::generate(trials, &self.sequence_config(), rng)?;
        Ok(timed_round(
            &self.timing,
            sequence,
            &[KeyCode::ArrowLeft, KeyCode::ArrowRight],
            formatter,
            rng,
        ))
    }

    fn task_metrics(&self, session: &TaskSession) -> DerivedMetrics {
        let valid = session.pooled_condition_rt(Condition::Valid);
        let invalid = session.pooled_condition_rt(Condition::Invalid);
        let neutral = session.pooled_condition_rt(Condition::Neutral);

        let mut m = DerivedMetrics::new();
        m.insert_opt("valid_mean_rt_ms", valid);
        m.insert_opt("invalid_mean_rt_ms", invalid);
        m.insert_opt("neutral_mean_rt_ms", neutral);
        m.insert_opt("cueing_benefit_ms", difference(neutral, valid));
        m.insert_opt("cueing_cost_ms", difference(invalid, neutral));
        m.insert_opt("cueing_effect_ms", difference(invalid, valid));
        for (name, c) in [
            ("valid_accuracy", Condition::Valid),
            ("invalid_accuracy", Condition::Invalid),
            ("neutral_accuracy", Condition::Neutral),
        ] {
            m.insert_opt(name, session.pooled_condition_accuracy(c));
        }
        m
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::RoundAggregator;
    use crate::config::RtPolicy;

    #[test]
    fn cueing_metrics() {
        let mut agg = RoundAggregator::new(0, "posner_block_1", RtPolicy::CorrectOnly, 0);
        for (i, (condition, rt)) in [
            (Condition::Valid, 300),
            (Condition::Valid, 320),
            (Condition::Neutral, 340),
            (Condition::Invalid, 400),
        ]
        .into_iter()
        .enumerate()
        {
            agg.record(TrialOutcome {
                trial_index: i,
                condition,
                response: Some(KeyCode::ArrowRight),
                reaction_time_ms: Some(rt),
                classification: Classification::Correct,
                timestamp_ms: 0,
            });
        }
        let mut session = TaskSession::new(TaskKind::Posner);
        session.push_round(agg.summary());

        let m = PosnerConfig::default().task_metrics(&session);
        assert_eq!(m.get("cueing_benefit_ms"), Some(30.0));
        assert_eq!(m.get("cueing_cost_ms"), Some(60.0));
        assert_eq!(m.get("cueing_effect_ms"), Some(90.0));
    }

    #[test]
    fn ratios_that_do_not_sum_are_rejected() {
        let c = PosnerConfig {
            neutral_ratio: 0.3,
            ..Default::default()
        };
        assert!(matches!(
            c.validate(),
            Err(ConfigurationError::RatiosDoNotSum { .. })
        ));
    }
}
