use super::{
    RoundKind, TaskProtocol, difference, percent_difference, plan_round, timed_round,
    validate_plan,
};
use crate::config::{Delay, EarlyInputPolicy, RoundPlan, TaskKind, TrialTiming};
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
pub struct FlankerConfig {
    #[serde(flatten)]
    pub plan: RoundPlan,
    pub timing: TrialTiming,
}

impl Default for FlankerConfig {
    fn default() -> Self {
        Self {
            plan: RoundPlan {
                practice_trials: 10,
                trials_per_round: 40,
                rounds: 3,
                rest_ms: 2000,
                feedback_in_main: false,
            },
            timing: TrialTiming {
                fixation: Delay::Fixed(500),
                cue: None,
                response_window_ms: 1500,
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

fn feedback(spec: &TrialSpec, o: &TrialOutcome) -> Option<(String, FeedbackTone)> {
    match o.classification {
        Classification::NoResponse => Some((
            "Too slow! Please respond faster.".into(),
            FeedbackTone::Negative,
        )),
        Classification::Correct => Some((
            format!("Correct! ({}ms)", o.reaction_time_ms.unwrap_or_default()),
            FeedbackTone::Positive,
        )),
        _ => {
            let Stimulus::Arrows { target, .. } = spec.stimulus else {
                return None;
            };
            Some((
                format!("Incorrect. Center arrow pointed {target}."),
                FeedbackTone::Negative,
            ))
        }
    }
}

impl TaskProtocol for FlankerConfig {
    fn kind(&self) -> TaskKind {
        TaskKind::Flanker
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
        format!("flanker_block_{}", round + 1)
    }

    fn round_label(&self, round: RoundKind) -> String {
        match round {
            RoundKind::Practice => "Flanker Practice".into(),
            RoundKind::Main(r) => format!("Block {}/{}", r + 1, self.plan.rounds),
        }
    }

    fn instructions(&self, _: RoundKind) -> String {
        "Press the LEFT or RIGHT arrow key to match the direction of the CENTER arrow. \
         Ignore the arrows around it."
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
        let sequence = generator::generate(trials, &SequenceConfig::Flanker, rng)?;
        Ok(timed_round(
            &self.timing,
            sequence,
            &[KeyCode::ArrowLeft, KeyCode::ArrowRight],
            formatter,
            rng,
        ))
    }

    fn task_metrics(&self, session: &TaskSession) -> DerivedMetrics {
        let congruent = session.pooled_condition_rt(Condition::Congruent);
        let incongruent = session.pooled_condition_rt(Condition::Incongruent);
        let neutral = session.pooled_condition_rt(Condition::Neutral);

        let mut m = DerivedMetrics::new();
        m.insert_opt("congruent_mean_rt_ms", congruent);
        m.insert_opt("incongruent_mean_rt_ms", incongruent);
        m.insert_opt("neutral_mean_rt_ms", neutral);
        m.insert_opt("flanker_effect_ms", difference(incongruent, congruent));
        m.insert_opt(
            "flanker_effect_percent",
            percent_difference(incongruent, congruent),
        );
        for (name, c) in [
            ("congruent_accuracy", Condition::Congruent),
            ("incongruent_accuracy", Condition::Incongruent),
            ("neutral_accuracy", Condition::Neutral),
        ] {
            m.insert_opt(name, session.pooled_condition_accuracy(c));
        }
        m
    }
}
