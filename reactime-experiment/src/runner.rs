//! Drives one task from practice through its rounds, rest screens between
//! them, and finalization into a [`TaskSession`].

use crate::aggregator::{Continuation, RoundAggregator, RoundSummary};
use crate::config::{TaskConfig, TaskKind};
use crate::engine::{EngineEvent, RoundEngine};
use crate::error::ConfigurationError;
use crate::presentation::RenderCommand;
use crate::recorder::{DataPoint, RoundRecord, SessionRecorder};
use crate::session::TaskSession;
use crate::tasks::{RoundKind, TaskProtocol};
use rand::rngs::StdRng;
use reactime_core::{InputEvent, KeyCode, Phase, RunnerStage, TrialOutcome, TrialSpec};
use reactime_timing::{TimerId, TimerQueue};
use serde_json::json;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum RunnerEvent {
    Render(RenderCommand),
    StageChanged(RunnerStage),
    TrialStarted {
        round: RoundKind,
        trial: usize,
        spec: TrialSpec,
    },
    StimulusShown {
        round: RoundKind,
        trial: usize,
        at_ms: u64,
    },
    Outcome {
        round: RoundKind,
        outcome: TrialOutcome,
    },
    RoundFinished {
        game_name: String,
        summary: RoundSummary,
    },
    TaskFinished(TaskSession),
    InputIgnored(InputEvent),
    FalseStart {
        round: RoundKind,
        trial: usize,
        at_ms: u64,
    },
    Aborted {
        at_ms: u64,
    },
}

pub struct TaskRunner {
    protocol: Box<dyn TaskProtocol>,
    practice: Option<Box<dyn RoundEngine>>,
    rounds: Vec<Option<Box<dyn RoundEngine>>>,
    current: Option<(RoundKind, Box<dyn RoundEngine>)>,
    aggregator: Option<RoundAggregator>,
    session: TaskSession,
    stage: RunnerStage,
    timers: TimerQueue<usize>,
    rest: Option<TimerId>,
}

impl TaskRunner {
    /// Validates the task and generates every round up front, so a bad
    /// configuration fails before anything is shown.
    pub fn prepare(config: &TaskConfig, rng: &mut StdRng) -> Result<Self, ConfigurationError> {
        Self::from_protocol(config.protocol(), rng)
    }

    pub fn from_protocol(
        protocol: Box<dyn TaskProtocol>,
        rng: &mut StdRng,
    ) -> Result<Self, ConfigurationError> {
        protocol.validate()?;
        let practice = if protocol.practice_enabled() {
            Some(protocol.build_round(RoundKind::Practice, rng)?)
        } else {
            None
        };
        let rounds = (0..protocol.round_count())
            .map(|r| protocol.build_round(RoundKind::Main(r), rng).map(Some))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(
            task = %protocol.kind(),
            rounds = rounds.len(),
            practice = practice.is_some(),
            "task prepared"
        );
        Ok(Self {
            session: TaskSession::new(protocol.kind()),
            protocol,
            practice,
            rounds,
            current: None,
            aggregator: None,
            stage: RunnerStage::NotStarted,
            timers: TimerQueue::new(),
            rest: None,
        })
    }

    pub fn kind(&self) -> TaskKind {
        self.protocol.kind()
    }

    pub fn stage(&self) -> RunnerStage {
        self.stage
    }

    pub fn session(&self) -> &TaskSession {
        &self.session
    }

    pub fn is_finished(&self) -> bool {
        self.stage.is_terminal()
    }

    pub fn next_deadline(&self) -> Option<u64> {
        let engine = self.current.as_ref().and_then(|(_, e)| e.next_deadline());
        match (engine, self.timers.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len() + self.current.as_ref().map_or(0, |(_, e)| e.pending_timers())
    }

    pub fn start(&mut self, now_ms: u64, recorder: &mut dyn SessionRecorder) -> Vec<RunnerEvent> {
        let mut events = Vec::new();
        if self.stage != RunnerStage::NotStarted {
            return events;
        }
        info!(task = %self.kind(), "task started");
        match self.practice.take() {
            Some(engine) => self.enter_round(RoundKind::Practice, engine, now_ms, recorder, &mut events),
            None => self.start_main(0, now_ms, recorder, &mut events),
        }
        events
    }

    pub fn advance(&mut self, now_ms: u64, recorder: &mut dyn SessionRecorder) -> Vec<RunnerEvent> {
        self.drain(now_ms, false, recorder)
    }

    /// Fires what is due at or before `now_ms`, or strictly before it when an
    /// input stamped `now_ms` is about to be delivered.
    fn drain(
        &mut self,
        now_ms: u64,
        before_only: bool,
        recorder: &mut dyn SessionRecorder,
    ) -> Vec<RunnerEvent> {
        let mut events = Vec::new();
        if self.stage.is_terminal() {
            return events;
        }
        if let Some((_, engine)) = self.current.as_mut() {
            let engine_events = if before_only {
                engine.advance_before(now_ms)
            } else {
                engine.advance(now_ms)
            };
            self.absorb(engine_events, recorder, &mut events);
        }
        loop {
            let due = if before_only {
                self.timers.pop_due_before(now_ms)
            } else {
                self.timers.pop_due(now_ms)
            };
            let Some((id, next_round)) = due else {
                break;
            };
            if self.rest != Some(id) {
                continue;
            }
            self.rest = None;
            self.start_main(next_round, now_ms, recorder, &mut events);
        }
        events
    }

    pub fn handle_input(
        &mut self,
        input: InputEvent,
        recorder: &mut dyn SessionRecorder,
    ) -> Vec<RunnerEvent> {
        let at_ms = input.at_ms();
        if matches!(input, InputEvent::Key { key: KeyCode::Escape, .. }) {
            return self.abort(at_ms, recorder);
        }
        let mut events = self.drain(at_ms, true, recorder);
        match self.current.as_mut() {
            Some((_, engine)) if self.stage.allows_input() => {
                let engine_events = engine.handle_input(input);
                self.absorb(engine_events, recorder, &mut events);
            }
            _ => {
                debug!(stage = ?self.stage, "input outside of a round");
                events.push(RunnerEvent::InputIgnored(input));
            }
        }
        events
    }

    /// Cancels every pending timer synchronously. The partial round is dropped;
    /// the session is handed over with status `aborted`.
    pub fn abort(&mut self, now_ms: u64, recorder: &mut dyn SessionRecorder) -> Vec<RunnerEvent> {
        if self.stage.is_terminal() {
            return Vec::new();
        }
        if let Some((kind, mut engine)) = self.current.take() {
            engine.abort(now_ms);
            if let RoundKind::Main(r) = kind {
                recorder.discard_round(&self.protocol.game_name(r));
            }
        }
        let cancelled = self.timers.cancel_all();
        self.rest = None;
        self.aggregator = None;
        self.session.abort();
        self.stage = RunnerStage::Aborted;
        info!(task = %self.kind(), cancelled, "task aborted");
        recorder.finish_task(self.session.clone());
        vec![
            RunnerEvent::StageChanged(self.stage),
            RunnerEvent::Aborted { at_ms: now_ms },
        ]
    }

    fn set_stage(&mut self, stage: RunnerStage, events: &mut Vec<RunnerEvent>) {
        self.stage = stage;
        events.push(RunnerEvent::StageChanged(stage));
    }

    fn start_main(
        &mut self,
        round: usize,
        now_ms: u64,
        recorder: &mut dyn SessionRecorder,
        events: &mut Vec<RunnerEvent>,
    ) {
        match self.rounds.get_mut(round).and_then(Option::take) {
            Some(engine) => {
                self.aggregator = Some(RoundAggregator::new(
                    round,
                    self.protocol.game_name(round),
                    self.protocol.rt_policy(),
                    now_ms,
                ));
                self.enter_round(RoundKind::Main(round), engine, now_ms, recorder, events);
            }
            None => self.finish_task(now_ms, recorder, events),
        }
    }

    fn enter_round(
        &mut self,
        kind: RoundKind,
        mut engine: Box<dyn RoundEngine>,
        now_ms: u64,
        recorder: &mut dyn SessionRecorder,
        events: &mut Vec<RunnerEvent>,
    ) {
        let stage = match kind {
            RoundKind::Practice => RunnerStage::Practice,
            RoundKind::Main(r) => RunnerStage::Round(r),
        };
        self.set_stage(stage, events);
        events.push(RunnerEvent::Render(RenderCommand::ShowInstructions {
            title: self.protocol.round_label(kind),
            text: self.protocol.instructions(kind),
        }));
        if let RoundKind::Main(r) = kind {
            recorder.record(
                &self.protocol.game_name(r),
                DataPoint::new(now_ms, "round_started", json!({ "round": r + 1 })),
            );
        }
        let started = engine.start(now_ms);
        self.current = Some((kind, engine));
        self.absorb(started, recorder, events);
    }

    fn absorb(
        &mut self,
        engine_events: Vec<EngineEvent>,
        recorder: &mut dyn SessionRecorder,
        events: &mut Vec<RunnerEvent>,
    ) {
        let Some((kind, _)) = self.current.as_ref() else {
            return;
        };
        let kind = *kind;
        let game = match kind {
            RoundKind::Main(r) => Some(self.protocol.game_name(r)),
            RoundKind::Practice => None,
        };
        let mut record = |point: DataPoint| {
            if let Some(game) = &game {
                recorder.record(game, point);
            }
        };

        let mut completed_at = None;
        for event in engine_events {
            match event {
                EngineEvent::Render(cmd) => events.push(RunnerEvent::Render(cmd)),
                EngineEvent::PhaseEntered { .. } | EngineEvent::Aborted { .. } => {}
                EngineEvent::TrialStarted { trial, spec } => events.push(RunnerEvent::TrialStarted {
                    round: kind,
                    trial,
                    spec,
                }),
                EngineEvent::StimulusShown { trial, at_ms } => {
                    record(DataPoint::new(
                        at_ms,
                        "stimulus_shown",
                        json!({ "trial": trial }),
                    ));
                    events.push(RunnerEvent::StimulusShown {
                        round: kind,
                        trial,
                        at_ms,
                    });
                }
                EngineEvent::ResponseCaptured {
                    trial,
                    key,
                    rt_ms,
                    at_ms,
                } => record(DataPoint::new(
                    at_ms,
                    "response",
                    json!({ "trial": trial, "key": key, "reactionTimeMs": rt_ms }),
                )),
                EngineEvent::Outcome(outcome) => {
                    record(DataPoint::new(
                        outcome.timestamp_ms,
                        "trial_outcome",
                        json!({
                            "trial": outcome.trial_index,
                            "condition": outcome.condition,
                            "classification": outcome.classification.as_str(),
                            "reactionTimeMs": outcome.reaction_time_ms,
                        }),
                    ));
                    if let Some(agg) = self.aggregator.as_mut() {
                        agg.record(outcome.clone());
                    }
                    events.push(RunnerEvent::Outcome {
                        round: kind,
                        outcome,
                    });
                }
                EngineEvent::FalseStart { trial, key, at_ms } => {
                    record(DataPoint::new(
                        at_ms,
                        "false_start",
                        json!({ "trial": trial, "key": key, "type": "no_stimulus" }),
                    ));
                    if let Some(agg) = self.aggregator.as_mut() {
                        agg.record_false_start();
                    }
                    events.push(RunnerEvent::FalseStart {
                        round: kind,
                        trial,
                        at_ms,
                    });
                }
                EngineEvent::InputIgnored { input, .. } => {
                    events.push(RunnerEvent::InputIgnored(input))
                }
                EngineEvent::RoundComplete { at_ms } => completed_at = Some(at_ms),
            }
        }
        if let Some(at_ms) = completed_at {
            self.finish_round(kind, at_ms, recorder, events);
        }
    }

    fn finish_round(
        &mut self,
        kind: RoundKind,
        at_ms: u64,
        recorder: &mut dyn SessionRecorder,
        events: &mut Vec<RunnerEvent>,
    ) {
        if let Some((_, engine)) = self.current.take() {
            let recorded = engine.outcomes().len();
            if let Some(expected) = engine.trial_count() {
                if recorded != expected {
                    warn!(task = %self.kind(), expected, recorded, "round finished with missing outcomes");
                }
                debug_assert_eq!(recorded, expected, "one outcome per trial");
            }
        }
        let completed = match kind {
            RoundKind::Practice => {
                info!(task = %self.kind(), "practice complete");
                0
            }
            RoundKind::Main(r) => {
                if let Some(mut agg) = self.aggregator.take() {
                    agg.finish(at_ms);
                    let summary = agg.summary();
                    let game_name = agg.label().to_string();
                    info!(
                        task = %self.kind(),
                        round = r + 1,
                        trials = summary.trials,
                        accuracy = summary.accuracy,
                        "round complete"
                    );
                    recorder.finish_round(RoundRecord {
                        game_name: game_name.clone(),
                        round_summary: summary.clone(),
                        raw_reaction_times: agg.raw_reaction_times(),
                        derived_metrics: self.protocol.round_metrics(&agg),
                        data_points: Vec::new(),
                        started_at_ms: summary.started_at_ms,
                        ended_at_ms: summary.ended_at_ms,
                    });
                    self.session.push_round(summary.clone());
                    events.push(RunnerEvent::RoundFinished { game_name, summary });
                }
                r + 1
            }
        };

        match Continuation::decide(completed, self.rounds.len()) {
            Continuation::Rest { next_round } => {
                let rest_ms = self.protocol.rest_ms();
                self.set_stage(RunnerStage::Rest(next_round), events);
                events.push(RunnerEvent::Render(RenderCommand::ShowRest {
                    next_round: self.protocol.round_label(RoundKind::Main(next_round)),
                    duration_ms: rest_ms,
                }));
                self.rest = Some(self.timers.schedule(at_ms + rest_ms, next_round));
            }
            Continuation::Finish => self.finish_task(at_ms, recorder, events),
        }
    }

    fn finish_task(
        &mut self,
        at_ms: u64,
        recorder: &mut dyn SessionRecorder,
        events: &mut Vec<RunnerEvent>,
    ) {
        let derived = self.protocol.task_metrics(&self.session);
        let metrics = derived.iter().map(|(k, v)| (k.to_string(), v)).collect();
        self.session.finalize(derived);
        info!(task = %self.kind(), at_ms, rounds = self.session.rounds.len(), "task complete");
        self.set_stage(RunnerStage::Finished, events);
        events.push(RunnerEvent::Render(RenderCommand::ShowSummary {
            title: format!("{} complete", self.kind()),
            metrics,
        }));
        recorder.finish_task(self.session.clone());
        events.push(RunnerEvent::TaskFinished(self.session.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::MemoryRecorder;
    use crate::session::SessionStatus;
    use crate::tasks::{FingerTappingConfig, GoNoGoConfig};
    use rand::SeedableRng;

    fn tapping(practice_ms: u64) -> TaskConfig {
        TaskConfig::FingerTapping(FingerTappingConfig {
            duration_ms: 2_000,
            practice_ms,
        })
    }

    fn run_to_end(runner: &mut TaskRunner, rec: &mut MemoryRecorder) -> Vec<RunnerEvent> {
        let mut events = Vec::new();
        while let Some(deadline) = runner.next_deadline() {
            events.extend(runner.advance(deadline, rec));
        }
        events
    }

    #[test]
    fn practice_rest_then_main_round() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut rec = MemoryRecorder::default();
        let mut runner = TaskRunner::prepare(&tapping(1_000), &mut rng).unwrap();

        runner.start(0, &mut rec);
        assert_eq!(runner.stage(), RunnerStage::Practice);
        runner.handle_input(InputEvent::key(KeyCode::Space, 300), &mut rec);
        runner.advance(1_000, &mut rec);
        assert_eq!(runner.stage(), RunnerStage::Rest(0));

        runner.advance(2_000, &mut rec);
        assert_eq!(runner.stage(), RunnerStage::Round(0));
        for at in [2_100, 2_300, 2_600] {
            runner.handle_input(InputEvent::key(KeyCode::Space, at), &mut rec);
        }
        let events = run_to_end(&mut runner, &mut rec);
        assert!(events.iter().any(|e| matches!(e, RunnerEvent::TaskFinished(_))));

        let file = rec.session();
        let round = &file.games["finger_tapping"];
        assert_eq!(round.round_summary.trials, 3);
        assert_eq!(round.derived_metrics.get("total_taps"), Some(3.0));
        assert!(round.data_points.iter().any(|p| p.action == "round_started"));
        assert_eq!(file.tasks[0].status, SessionStatus::Completed);
    }

    #[test]
    fn escape_aborts_and_cancels_timers() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut rec = MemoryRecorder::default();
        let mut runner = TaskRunner::prepare(&tapping(0), &mut rng).unwrap();
        runner.start(0, &mut rec);
        assert!(runner.pending_timers() > 0);
        runner.handle_input(InputEvent::key(KeyCode::Space, 200), &mut rec);
        assert!(!rec.pending("finger_tapping").is_empty());

        let events = runner.handle_input(InputEvent::key(KeyCode::Escape, 500), &mut rec);
        assert!(events.contains(&RunnerEvent::Aborted { at_ms: 500 }));
        assert_eq!(runner.pending_timers(), 0);
        assert_eq!(runner.next_deadline(), None);
        assert!(runner.advance(10_000, &mut rec).is_empty());
        assert_eq!(rec.session().tasks[0].status, SessionStatus::Aborted);
        assert!(rec.session().games.is_empty());
        assert!(rec.pending("finger_tapping").is_empty());
    }

    #[test]
    fn invalid_config_fails_before_start() {
        let mut rng = StdRng::seed_from_u64(3);
        let cfg = GoNoGoConfig {
            go_ratio: 1.5,
            ..Default::default()
        };
        assert!(TaskRunner::prepare(&TaskConfig::GoNoGo(cfg), &mut rng).is_err());
    }

    #[test]
    fn input_during_rest_is_ignored() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut rec = MemoryRecorder::default();
        let mut runner = TaskRunner::prepare(&tapping(1_000), &mut rng).unwrap();
        runner.start(0, &mut rec);
        runner.advance(1_000, &mut rec);
        let events = runner.handle_input(InputEvent::key(KeyCode::Space, 1_200), &mut rec);
        assert!(matches!(events.as_slice(), [RunnerEvent::InputIgnored(_)]));
    }
}
