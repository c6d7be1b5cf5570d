use super::{RoundKind, TaskProtocol, plan_round, timed_round, validate_plan};
use crate::config::{Delay, EarlyInputPolicy, RoundPlan, TaskKind, TrialTiming};
use crate::engine::RoundEngine;
use crate::error::ConfigurationError;
use crate::generator::{self, SequenceConfig};
use crate::presentation::FeedbackTone;
use crate::session::{DerivedMetrics, TaskSession};
use rand::rngs::StdRng;
use reactime_core::{Classification, KeyCode, TrialOutcome, TrialSpec};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NBackConfig {
    /// Lookback of each block, in order. `0` means "respond to the target symbol".
    pub levels: Vec<usize>,
    pub trials_per_block: usize,
    /// Practice runs at the first level.
    pub practice_trials: usize,
    pub target_ratio: f64,
    pub alphabet: String,
    pub zero_back_target: char,
    pub rest_ms: u64,
    pub feedback_in_main: bool,
    pub timing: TrialTiming,
}

impl Default for NBackConfig {
    fn default() -> Self {
        Self {
            levels: vec![0, 2, 3],
            trials_per_block: 30,
            practice_trials: 10,
            target_ratio: 0.3,
            alphabet: "ABCDEFGHJKLNPQRSTXYZ".into(),
            zero_back_target: 'X',
            rest_ms: 30_000,
            feedback_in_main: false,
            timing: TrialTiming {
                fixation: Delay::Fixed(500),
                cue: None,
                response_window_ms: 500,
                end_on_response: false,
                hide_on_response: false,
                feedback_ms: 0,
                inter_trial: Delay::Fixed(2000),
                min_valid_rt_ms: None,
                early_input: EarlyInputPolicy::Ignore,
            },
        }
    }
}

impl NBackConfig {
    fn plan(&self) -> RoundPlan {
        RoundPlan {
            practice_trials: self.practice_trials,
            trials_per_round: self.trials_per_block,
            rounds: self.levels.len(),
            rest_ms: self.rest_ms,
            feedback_in_main: self.feedback_in_main,
        }
    }

    fn level(&self, round: RoundKind) -> usize {
        match round {
            RoundKind::Practice => self.levels.first().copied().unwrap_or(0),
            RoundKind::Main(r) => self.levels.get(r).copied().unwrap_or(0),
        }
    }

    fn sequence_config(&self, n: usize) -> SequenceConfig {
        SequenceConfig::NBack {
            n,
            target_ratio: self.target_ratio,
            alphabet: self.alphabet.chars().collect(),
            zero_back_target: self.zero_back_target,
        }
    }
}

fn feedback(_: &TrialSpec, o: &TrialOutcome) -> Option<(String, FeedbackTone)> {
    match o.classification {
        Classification::Hit => Some((
            format!("Correct! ({}ms)", o.reaction_time_ms.unwrap_or_default()),
            FeedbackTone::Positive,
        )),
        Classification::Miss => Some(("Missed target!".into(), FeedbackTone::Negative)),
        Classification::FalseAlarm => Some(("False alarm!".into(), FeedbackTone::Negative)),
        _ => None,
    }
}

impl TaskProtocol for NBackConfig {
    fn kind(&self) -> TaskKind {
        TaskKind::NBack
    }

    fn round_count(&self) -> usize {
        self.levels.len()
    }

    fn practice_enabled(&self) -> bool {
        self.practice_trials > 0
    }

    fn rest_ms(&self) -> u64 {
        self.rest_ms
    }

    fn game_name(&self, round: usize) -> String {
        format!("n_back_{}_back", self.level(RoundKind::Main(round)))
    }

    fn round_label(&self, round: RoundKind) -> String {
        let n = self.level(round);
        match round {
            RoundKind::Practice => format!("{n}-Back Practice"),
            RoundKind::Main(_) => format!("{n}-Back"),
        }
    }

    fn instructions(&self, round: RoundKind) -> String {
        match self.level(round) {
            0 => format!(
                "Press SPACEBAR when you see the letter {}",
                self.zero_back_target
            ),
            n => format!("Press SPACEBAR when the letter matches {n} positions back"),
        }
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        validate_plan(self.kind(), &self.plan(), &self.timing)?;
        generator::check_ratio("target_ratio", self.target_ratio)?;
        // Generating once per level surfaces alphabet and length problems upfront.
        let mut rng = <StdRng as rand::SeedableRng>::seed_from_u64(0);
        for &n in &self.levels {
            generator::generate(self.trials_per_block, &self.sequence_config(n), &mut rng)?;
        }
        if self.practice_trials > 0 {
            let n = self.level(RoundKind::Practice);
            generator::generate(self.practice_trials, &self.sequence_config(n), &mut rng)?;
        }
        Ok(())
    }

    fn build_round(
        &self,
        round: RoundKind,
        rng: &mut StdRng,
    ) -> Result<Box<dyn RoundEngine>, ConfigurationError> {
        let (trials, formatter) = plan_round(&self.plan(), round, feedback);
        let sequence = generator::generate(trials, &self.sequence_config(self.level(round)), rng)?;
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
        let mut totals = [0usize; 4];
        for (summary, n) in session.rounds.iter().zip(&self.levels) {
            m.insert(format!("{n}_back_accuracy"), summary.accuracy * 100.0);
            m.insert_opt(format!("{n}_back_mean_rt_ms"), summary.mean_rt_ms);
            totals[0] += summary.counts.hit;
            totals[1] += summary.counts.miss;
            totals[2] += summary.counts.false_alarm;
            totals[3] += summary.counts.correct_rejection;
        }
        m.insert("total_hits", totals[0] as f64);
        m.insert("total_misses", totals[1] as f64);
        m.insert("total_false_alarms", totals[2] as f64);
        m.insert("total_correct_rejections", totals[3] as f64);
        m
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn game_names_follow_levels() {
        let c = NBackConfig::default();
        assert_eq!(c.game_name(0), "n_back_0_back");
        assert_eq!(c.game_name(2), "n_back_3_back");
        assert_eq!(c.round_label(RoundKind::Practice), "0-Back Practice");
    }

    #[test]
    fn lookback_longer_than_block_is_rejected() {
        let c = NBackConfig {
            levels: vec![0, 5],
            trials_per_block: 5,
            ..Default::default()
        };
        assert_eq!(
            c.validate(),
            Err(ConfigurationError::SequenceTooShort {
                trials: 5,
                lookback: 5
            })
        );
    }

    #[test]
    fn empty_levels_mean_no_rounds() {
        let c = NBackConfig {
            levels: Vec::new(),
            ..Default::default()
        };
        assert_eq!(
            c.validate(),
            Err(ConfigurationError::NoRounds {
                task: TaskKind::NBack
            })
        );
    }

    #[test]
    fn zero_back_instruction_names_target() {
        let c = NBackConfig::default();
        assert_eq!(
            c.instructions(RoundKind::Main(0)),
            "Press SPACEBAR when you see the letter X"
        );
    }
}
