use crate::aggregator::RoundSummary;
use crate::config::TaskKind;
use reactime_core::Condition;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    InProgress,
    Completed,
    Aborted,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Completed => "completed",
            SessionStatus::Aborted => "aborted",
        }
    }
}

/// Named derived values (effects, lapses, completion times).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DerivedMetrics(BTreeMap<String, f64>);

impl DerivedMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.0.insert(name.into(), value);
    }

    /// Skips metrics that could not be computed (missing means).
    pub fn insert_opt(&mut self, name: impl Into<String>, value: Option<f64>) {
        if let Some(v) = value {
            self.insert(name, v);
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// All recorded rounds of one task. Terminal once completed or aborted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSession {
    pub task: TaskKind,
    pub rounds: Vec<RoundSummary>,
    pub status: SessionStatus,
    pub derived: DerivedMetrics,
}

impl TaskSession {
    pub fn new(task: TaskKind) -> Self {
        Self {
            task,
            rounds: Vec::new(),
            status: SessionStatus::InProgress,
            derived: DerivedMetrics::default(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status != SessionStatus::InProgress
    }

    /// Appends a finished round; ignored once the session is terminal.
    pub fn push_round(&mut self, summary: RoundSummary) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.rounds.push(summary);
        true
    }

    /// Mean RT of `condition` pooled over every round, weighted by response count.
    pub fn pooled_condition_rt(&self, condition: Condition) -> Option<f64> {
        let (sum, n) = self
            .rounds
            .iter()
            .filter_map(|r| r.by_condition.get(&condition))
            .filter_map(|c| c.mean_rt_ms.map(|m| (m * c.rt_count as f64, c.rt_count)))
            .fold((0.0, 0), |(s, n), (m, k)| (s + m, n + k));
        (n > 0).then(|| sum / n as f64)
    }

    pub fn pooled_condition_accuracy(&self, condition: Condition) -> Option<f64> {
        let (correct, trials) = self
            .rounds
            .iter()
            .filter_map(|r| r.by_condition.get(&condition))
            .fold((0, 0), |(c, t), s| (c + s.correct, t + s.trials));
        (trials > 0).then(|| correct as f64 / trials as f64)
    }

    pub fn total_duration_ms(&self) -> u64 {
        self.rounds.iter().map(|r| r.duration_ms).sum()
    }

    /// Stores the task-level metrics and closes the session.
    pub fn finalize(&mut self, derived: DerivedMetrics) {
        if self.is_terminal() {
            return;
        }
        self.derived = derived;
        self.status = SessionStatus::Completed;
    }

    pub fn abort(&mut self) {
        if !self.is_terminal() {
            self.status = SessionStatus::Aborted;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::RoundAggregator;
    use crate::config::RtPolicy;
    use reactime_core::{Classification, KeyCode, TrialOutcome};

    fn round(id: usize, rts: &[(Condition, u64)]) -> RoundSummary {
        let mut agg = RoundAggregator::new(id, format!("flanker_block_{}", id + 1), RtPolicy::CorrectOnly, 0);
        for (i, &(condition, rt)) in rts.iter().enumerate() {
            agg.record(TrialOutcome {
                trial_index: i,
                condition,
                response: Some(KeyCode::ArrowLeft),
                reaction_time_ms: Some(rt),
                classification: Classification::Correct,
                timestamp_ms: rt,
            });
        }
        agg.summary()
    }

    #[test]
    fn pooled_mean_weights_by_response_count() {
        let mut s = TaskSession::new(TaskKind::Flanker);
        s.push_round(round(0, &[(Condition::Congruent, 400)]));
        s.push_round(round(
            1,
            &[(Condition::Congruent, 500), (Condition::Congruent, 600)],
        ));
        assert_eq!(s.pooled_condition_rt(Condition::Congruent), Some(500.0));
        assert_eq!(s.pooled_condition_rt(Condition::Incongruent), None);
        assert_eq!(s.pooled_condition_accuracy(Condition::Congruent), Some(1.0));
    }

    #[test]
    fn finalized_session_rejects_rounds() {
        let mut s = TaskSession::new(TaskKind::Flanker);
        let mut derived = DerivedMetrics::new();
        derived.insert("flanker_effect_ms", 42.0);
        s.finalize(derived);
        assert_eq!(s.status, SessionStatus::Completed);
        assert!(!s.push_round(round(0, &[])));
        s.abort();
        assert_eq!(s.status, SessionStatus::Completed);
        assert_eq!(s.derived.get("flanker_effect_ms"), Some(42.0));
    }

    #[test]
    fn derived_metrics_serialize_as_plain_map() {
        let mut m = DerivedMetrics::new();
        m.insert("b", 2.0);
        m.insert_opt("skipped", None);
        m.insert("a", 1.0);
        assert_eq!(serde_json::to_string(&m).unwrap(), r#"{"a":1.0,"b":2.0}"#);
    }
}
