use super::{RoundKind, TaskProtocol};
use crate::aggregator::{RoundAggregator, mean};
use crate::config::TaskKind;
use crate::engine::{EngineEvent, RoundEngine};
use crate::error::ConfigurationError;
use crate::presentation::RenderCommand;
use crate::session::{DerivedMetrics, TaskSession};
use rand::rngs::StdRng;
use reactime_core::{
    Classification, Condition, InputEvent, KeyCode, Phase, TrialOutcome, TrialPhase,
};
use reactime_timing::{TimerId, TimerQueue};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const TICK_MS: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FingerTappingConfig {
    pub duration_ms: u64,
    /// 0 skips practice.
    pub practice_ms: u64,
}

impl Default for FingerTappingConfig {
    fn default() -> Self {
        Self {
            duration_ms: 30_000,
            practice_ms: 5_000,
        }
    }
}

/// A fixed-length window in which every Space press counts as one tap.
///
/// Each tap yields a `hit` outcome whose reaction time is the interval since
/// the previous tap (or since the round started, for the first one).
pub struct TappingRound {
    duration_ms: u64,
    timers: TimerQueue<()>,
    live: Option<TimerId>,
    phase: TrialPhase,
    started_at_ms: u64,
    last_tap_ms: u64,
    outcomes: Vec<TrialOutcome>,
}

impl TappingRound {
    pub fn new(duration_ms: u64) -> Self {
        Self {
            duration_ms,
            timers: TimerQueue::new(),
            live: None,
            phase: TrialPhase::Idle,
            started_at_ms: 0,
            last_tap_ms: 0,
            outcomes: Vec::new(),
        }
    }

    pub fn taps(&self) -> usize {
        self.outcomes.len()
    }

    fn ends_at(&self) -> u64 {
        self.started_at_ms + self.duration_ms
    }

    fn remaining(&self, now_ms: u64) -> u64 {
        self.ends_at().saturating_sub(now_ms)
    }

    fn schedule_tick(&mut self, now_ms: u64) {
        if let Some(id) = self.live.take() {
            self.timers.cancel(id);
        }
        let next = (now_ms + TICK_MS).min(self.ends_at());
        self.live = Some(self.timers.schedule(next, ()));
    }

    fn drain(&mut self, now_ms: u64, before_only: bool) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        loop {
            let due = if before_only {
                self.timers.pop_due_before(now_ms)
            } else {
                self.timers.pop_due(now_ms)
            };
            let Some((id, ())) = due else {
                break;
            };
            if self.live != Some(id) {
                continue;
            }
            self.live = None;
            if self.remaining(now_ms) == 0 {
                self.phase = TrialPhase::RoundComplete;
                info!(taps = self.taps(), "tapping round complete");
                events.push(self.tap_count(now_ms));
                events.push(EngineEvent::PhaseEntered {
                    trial: self.taps(),
                    phase: self.phase,
                    at_ms: now_ms,
                });
                events.push(EngineEvent::RoundComplete { at_ms: now_ms });
            } else {
                events.push(self.tap_count(now_ms));
                self.schedule_tick(now_ms);
            }
        }
        events
    }

    fn tap_count(&self, now_ms: u64) -> EngineEvent {
        EngineEvent::Render(RenderCommand::ShowTapCount {
            count: self.taps(),
            remaining_ms: self.remaining(now_ms),
        })
    }
}

impl RoundEngine for TappingRound {
    fn start(&mut self, now_ms: u64) -> Vec<EngineEvent> {
        if self.phase != TrialPhase::Idle {
            return Vec::new();
        }
        self.phase = TrialPhase::StimulusVisible;
        self.started_at_ms = now_ms;
        self.last_tap_ms = now_ms;
        self.schedule_tick(now_ms);
        debug!(duration_ms = self.duration_ms, "tapping started");
        vec![
            EngineEvent::PhaseEntered {
                trial: 0,
                phase: self.phase,
                at_ms: now_ms,
            },
            self.tap_count(now_ms),
        ]
    }

    fn advance(&mut self, now_ms: u64) -> Vec<EngineEvent> {
        self.drain(now_ms, false)
    }

    fn advance_before(&mut self, now_ms: u64) -> Vec<EngineEvent> {
        self.drain(now_ms, true)
    }

    fn handle_input(&mut self, input: InputEvent) -> Vec<EngineEvent> {
        let at_ms = input.at_ms();
        let mut events = self.advance_before(at_ms);
        match input {
            InputEvent::Key {
                key: KeyCode::Space,
                ..
            } if self.phase.allows_input() => {
                let interval = at_ms.saturating_sub(self.last_tap_ms);
                self.last_tap_ms = at_ms;
                let outcome = TrialOutcome {
                    trial_index: self.outcomes.len(),
                    condition: Condition::Tap,
                    response: Some(KeyCode::Space),
                    reaction_time_ms: Some(interval),
                    classification: Classification::Hit,
                    timestamp_ms: at_ms,
                };
                events.push(EngineEvent::ResponseCaptured {
                    trial: outcome.trial_index,
                    key: KeyCode::Space,
                    rt_ms: Some(interval),
                    at_ms,
                });
                self.outcomes.push(outcome.clone());
                events.push(EngineEvent::Outcome(outcome));
                events.push(self.tap_count(at_ms));
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
        self.timers.cancel_all();
        self.live = None;
        self.phase = TrialPhase::Aborted;
        vec![EngineEvent::Aborted { at_ms: now_ms }]
    }

    fn next_deadline(&self) -> Option<u64> {
        self.timers.next_deadline()
    }

    fn pending_timers(&self) -> usize {
        self.timers.len()
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

impl TaskProtocol for FingerTappingConfig {
    fn kind(&self) -> TaskKind {
        TaskKind::FingerTapping
    }

    fn round_count(&self) -> usize {
        1
    }

    fn practice_enabled(&self) -> bool {
        self.practice_ms > 0
    }

    fn rest_ms(&self) -> u64 {
        1000
    }

    fn game_name(&self, _: usize) -> String {
        "finger_tapping".into()
    }

    fn round_label(&self, round: RoundKind) -> String {
        match round {
            RoundKind::Practice => "Practice Round - Tap the SPACE BAR quickly!".into(),
            RoundKind::Main(_) => "Real Test - Tap as fast as you can!".into(),
        }
    }

    fn instructions(&self, round: RoundKind) -> String {
        let secs = match round {
            RoundKind::Practice => self.practice_ms,
            RoundKind::Main(_) => self.duration_ms,
        } / 1000;
        format!("Tap the SPACE bar as many times as you can in {secs} seconds.")
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        if self.duration_ms == 0 {
            return Err(ConfigurationError::InvalidTiming {
                field: "duration_ms",
                reason: "tapping window must be longer than 0 ms".into(),
            });
        }
        Ok(())
    }

    fn build_round(
        &self,
        round: RoundKind,
        _: &mut StdRng,
    ) -> Result<Box<dyn RoundEngine>, ConfigurationError> {
        let duration = match round {
            RoundKind::Practice => self.practice_ms,
            RoundKind::Main(_) => self.duration_ms,
        };
        Ok(Box::new(TappingRound::new(duration)))
    }

    fn round_metrics(&self, round: &RoundAggregator) -> DerivedMetrics {
        let taps = round.outcomes().len();
        let mut m = DerivedMetrics::new();
        m.insert("total_taps", taps as f64);
        m.insert(
            "taps_per_second",
            taps as f64 / (self.duration_ms as f64 / 1000.0),
        );
        m.insert_opt("mean_interval_ms", mean(&round.raw_reaction_times()));
        m.insert("test_duration_ms", self.duration_ms as f64);
        m
    }

    fn task_metrics(&self, session: &TaskSession) -> DerivedMetrics {
        let taps: usize = session.rounds.iter().map(|r| r.trials).sum();
        let mut m = DerivedMetrics::new();
        m.insert("total_taps", taps as f64);
        m.insert(
            "taps_per_second",
            taps as f64 / (self.duration_ms as f64 / 1000.0),
        );
        m
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taps_are_counted_until_time_runs_out() {
        let mut round = TappingRound::new(3_000);
        round.start(1_000);
        for at in [1_200, 1_500, 2_100, 3_900] {
            round.handle_input(InputEvent::key(KeyCode::Space, at));
        }
        assert_eq!(round.taps(), 4);
        let intervals: Vec<_> = round
            .outcomes()
            .iter()
            .filter_map(|o| o.reaction_time_ms)
            .collect();
        assert_eq!(intervals, vec![200, 300, 600, 1_800]);

        let events = round.handle_input(InputEvent::key(KeyCode::Space, 4_100));
        assert!(events.contains(&EngineEvent::RoundComplete { at_ms: 4_100 }));
        assert!(matches!(events.last(), Some(EngineEvent::InputIgnored { .. })));
        assert_eq!(round.taps(), 4);
    }

    #[test]
    fn countdown_keeps_a_single_timer() {
        let mut round = TappingRound::new(2_500);
        round.start(0);
        let mut ticks = Vec::new();
        while let Some(deadline) = round.next_deadline() {
            assert_eq!(round.pending_timers(), 1);
            ticks.push(deadline);
            round.advance(deadline);
        }
        assert_eq!(ticks, vec![1_000, 2_000, 2_500]);
        assert!(round.is_finished());
    }

    #[test]
    fn other_keys_do_not_count() {
        let mut round = TappingRound::new(1_000);
        round.start(0);
        round.handle_input(InputEvent::key(KeyCode::KeyR, 100));
        assert_eq!(round.taps(), 0);
    }
}
