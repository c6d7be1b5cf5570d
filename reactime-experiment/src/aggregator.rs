//! Round/Block Aggregator.
//!
//! A round keeps its ordered outcomes plus a running tally updated per trial.
//! [`RoundAggregator::summary`] recomputes everything from the outcome list;
//! [`RoundAggregator::summary_from_tally`] reads the running tally. Both must
//! always agree.

use crate::config::RtPolicy;
use reactime_core::{Classification, Condition, TrialOutcome};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationCounts {
    pub hit: usize,
    pub miss: usize,
    pub correct: usize,
    pub incorrect: usize,
    pub false_alarm: usize,
    pub false_start: usize,
    pub correct_rejection: usize,
    pub no_response: usize,
}

impl ClassificationCounts {
    pub fn add(&mut self, c: Classification) {
        *self.slot(c) += 1;
    }

    pub fn get(&self, c: Classification) -> usize {
        match c {
            Classification::Hit => self.hit,
            Classification::Miss => self.miss,
            Classification::Correct => self.correct,
            Classification::Incorrect => self.incorrect,
            Classification::FalseAlarm => self.false_alarm,
            Classification::FalseStart => self.false_start,
            Classification::CorrectRejection => self.correct_rejection,
            Classification::NoResponse => self.no_response,
        }
    }

    fn slot(&mut self, c: Classification) -> &mut usize {
        match c {
            Classification::Hit => &mut self.hit,
            Classification::Miss => &mut self.miss,
            Classification::Correct => &mut self.correct,
            Classification::Incorrect => &mut self.incorrect,
            Classification::FalseAlarm => &mut self.false_alarm,
            Classification::FalseStart => &mut self.false_start,
            Classification::CorrectRejection => &mut self.correct_rejection,
            Classification::NoResponse => &mut self.no_response,
        }
    }

    pub fn total(&self) -> usize {
        Classification::ALL.iter().map(|&c| self.get(c)).sum()
    }

    fn matching(&self, pred: fn(Classification) -> bool) -> usize {
        Classification::ALL
            .iter()
            .filter(|&&c| pred(c))
            .map(|&c| self.get(c))
            .sum()
    }
}

/// Whether an outcome's reaction time feeds the mean under `policy`.
pub fn counts_towards_rt(outcome: &TrialOutcome, policy: RtPolicy) -> bool {
    if outcome.reaction_time_ms.is_none() {
        return false;
    }
    match policy {
        RtPolicy::CorrectOnly => outcome.classification.is_correct(),
        RtPolicy::ValidResponses => outcome.classification != Classification::FalseStart,
    }
}

pub fn mean(values: &[u64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().map(|&v| v as f64).sum::<f64>() / values.len() as f64)
}

pub fn median(values: &[u64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) as f64 / 2.0
    } else {
        sorted[mid] as f64
    })
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Tally {
    counts: ClassificationCounts,
    rt_sum: f64,
    rt_n: usize,
}

impl Tally {
    fn push(&mut self, outcome: &TrialOutcome, policy: RtPolicy) {
        self.counts.add(outcome.classification);
        if counts_towards_rt(outcome, policy) {
            if let Some(rt) = outcome.reaction_time_ms {
                self.rt_sum += rt as f64;
                self.rt_n += 1;
            }
        }
    }

    fn mean_rt(&self) -> Option<f64> {
        (self.rt_n > 0).then(|| self.rt_sum / self.rt_n as f64)
    }
}

/// Incrementally updated counterpart of a recomputed [`RoundSummary`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunningTally {
    overall: Tally,
    by_condition: BTreeMap<Condition, Tally>,
}

impl RunningTally {
    pub fn push(&mut self, outcome: &TrialOutcome, policy: RtPolicy) {
        self.overall.push(outcome, policy);
        self.by_condition
            .entry(outcome.condition)
            .or_default()
            .push(outcome, policy);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionSummary {
    pub trials: usize,
    pub correct: usize,
    pub errors: usize,
    pub omissions: usize,
    pub accuracy: f64,
    pub mean_rt_ms: Option<f64>,
    /// Reaction times behind `mean_rt_ms`, used to pool means across rounds.
    pub rt_count: usize,
}

impl ConditionSummary {
    fn from_tally(t: &Tally) -> Self {
        let trials = t.counts.total();
        let correct = t.counts.matching(Classification::is_correct);
        Self {
            trials,
            correct,
            errors: t.counts.matching(Classification::is_error_response),
            omissions: t.counts.matching(Classification::is_omission),
            accuracy: ratio(correct, trials),
            mean_rt_ms: t.mean_rt(),
            rt_count: t.rt_n,
        }
    }
}

impl RoundSummary {
    pub fn total_false_starts(&self) -> usize {
        self.counts.false_start + self.false_starts_between_trials
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundSummary {
    pub round_id: usize,
    pub label: String,
    pub trials: usize,
    pub counts: ClassificationCounts,
    pub correct: usize,
    /// Responses that were registered but wrong (incorrect key, false alarm, false start).
    pub wrong: usize,
    pub omissions: usize,
    pub accuracy: f64,
    pub mean_rt_ms: Option<f64>,
    pub by_condition: BTreeMap<Condition, ConditionSummary>,
    /// Presses made while no stimulus was up. They belong to no trial.
    #[serde(default)]
    pub false_starts_between_trials: usize,
    pub started_at_ms: u64,
    pub ended_at_ms: u64,
    pub duration_ms: u64,
}

#[derive(Debug, Clone)]
pub struct RoundAggregator {
    round_id: usize,
    label: String,
    policy: RtPolicy,
    started_at_ms: u64,
    ended_at_ms: Option<u64>,
    outcomes: Vec<TrialOutcome>,
    tally: RunningTally,
    between_trial_false_starts: usize,
}

impl RoundAggregator {
    pub fn new(round_id: usize, label: impl Into<String>, policy: RtPolicy, started_at_ms: u64) -> Self {
        Self {
            round_id,
            label: label.into(),
            policy,
            started_at_ms,
            ended_at_ms: None,
            outcomes: Vec::new(),
            tally: RunningTally::default(),
            between_trial_false_starts: 0,
        }
    }

    pub fn record(&mut self, outcome: TrialOutcome) {
        self.tally.push(&outcome, self.policy);
        self.outcomes.push(outcome);
    }

    pub fn record_false_start(&mut self) {
        self.between_trial_false_starts += 1;
    }

    /// False starts with and without a trial of their own.
    pub fn false_starts(&self) -> usize {
        self.tally.overall.counts.false_start + self.between_trial_false_starts
    }

    pub fn finish(&mut self, at_ms: u64) {
        self.ended_at_ms.get_or_insert(at_ms);
    }

    pub fn round_id(&self) -> usize {
        self.round_id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn outcomes(&self) -> &[TrialOutcome] {
        &self.outcomes
    }

    /// Every measured reaction time in trial order, whatever the classification.
    pub fn raw_reaction_times(&self) -> Vec<u64> {
        self.outcomes
            .iter()
            .filter_map(|o| o.reaction_time_ms)
            .collect()
    }

    /// Reaction times that feed the mean.
    pub fn valid_reaction_times(&self) -> Vec<u64> {
        self.outcomes
            .iter()
            .filter(|o| counts_towards_rt(o, self.policy))
            .filter_map(|o| o.reaction_time_ms)
            .collect()
    }

    fn ended_at(&self) -> u64 {
        self.ended_at_ms
            .or_else(|| self.outcomes.last().map(|o| o.timestamp_ms))
            .unwrap_or(self.started_at_ms)
    }

    /// Recomputes the summary from the ordered outcome list.
    pub fn summary(&self) -> RoundSummary {
        let mut counts = ClassificationCounts::default();
        for o in &self.outcomes {
            counts.add(o.classification);
        }
        let rts = self.valid_reaction_times();

        let mut conditions: Vec<Condition> = self.outcomes.iter().map(|o| o.condition).collect();
        conditions.sort_unstable();
        conditions.dedup();
        let by_condition = conditions
            .into_iter()
            .map(|cond| {
                let subset: Vec<&TrialOutcome> =
                    self.outcomes.iter().filter(|o| o.condition == cond).collect();
                let correct = subset.iter().filter(|o| o.classification.is_correct()).count();
                let rts: Vec<u64> = subset
                    .iter()
                    .filter(|o| counts_towards_rt(o, self.policy))
                    .filter_map(|o| o.reaction_time_ms)
                    .collect();
                let summary = ConditionSummary {
                    trials: subset.len(),
                    correct,
                    errors: subset
                        .iter()
                        .filter(|o| o.classification.is_error_response())
                        .count(),
                    omissions: subset
                        .iter()
                        .filter(|o| o.classification.is_omission())
                        .count(),
                    accuracy: ratio(correct, subset.len()),
                    mean_rt_ms: mean(&rts),
                    rt_count: rts.len(),
                };
                (cond, summary)
            })
            .collect();

        let trials = self.outcomes.len();
        let correct = self
            .outcomes
            .iter()
            .filter(|o| o.classification.is_correct())
            .count();
        self.assemble(
            trials,
            counts,
            correct,
            self.outcomes
                .iter()
                .filter(|o| o.classification.is_error_response())
                .count(),
            self.outcomes
                .iter()
                .filter(|o| o.classification.is_omission())
                .count(),
            mean(&rts),
            by_condition,
        )
    }

    /// Builds the summary from the running tally without revisiting outcomes.
    pub fn summary_from_tally(&self) -> RoundSummary {
        let t = &self.tally.overall;
        let by_condition = self
            .tally
            .by_condition
            .iter()
            .map(|(&c, t)| (c, ConditionSummary::from_tally(t)))
            .collect();
        self.assemble(
            t.counts.total(),
            t.counts,
            t.counts.matching(Classification::is_correct),
            t.counts.matching(Classification::is_error_response),
            t.counts.matching(Classification::is_omission),
            t.mean_rt(),
            by_condition,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        &self,
        trials: usize,
        counts: ClassificationCounts,
        correct: usize,
        wrong: usize,
        omissions: usize,
        mean_rt_ms: Option<f64>,
        by_condition: BTreeMap<Condition, ConditionSummary>,
    ) -> RoundSummary {
        let ended_at_ms = self.ended_at();
        RoundSummary {
            round_id: self.round_id,
            label: self.label.clone(),
            trials,
            counts,
            correct,
            wrong,
            omissions,
            accuracy: ratio(correct, trials),
            mean_rt_ms,
            by_condition,
            false_starts_between_trials: self.between_trial_false_starts,
            started_at_ms: self.started_at_ms,
            ended_at_ms,
            duration_ms: ended_at_ms.saturating_sub(self.started_at_ms),
        }
    }
}

/// What follows a completed round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuation {
    Rest { next_round: usize },
    Finish,
}

impl Continuation {
    pub fn decide(completed_rounds: usize, total_rounds: usize) -> Self {
        if completed_rounds < total_rounds {
            Continuation::Rest {
                next_round: completed_rounds,
            }
        } else {
            Continuation::Finish
        }
    }
}
