//! Sequencing of whole tasks: the battery a participant works through.

use crate::config::{BatteryConfig, TaskConfig, TaskKind, TaskOrder};
use crate::error::ConfigurationError;
use crate::recorder::SessionRecorder;
use crate::runner::{RunnerEvent, TaskRunner};
use crate::session::SessionStatus;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use reactime_core::InputEvent;
use std::collections::VecDeque;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum BatteryEvent {
    TaskStarted {
        task: TaskKind,
        position: usize,
    },
    Runner {
        task: TaskKind,
        event: RunnerEvent,
    },
    TaskSkipped {
        task: TaskKind,
        error: ConfigurationError,
    },
    TaskFinished {
        task: TaskKind,
        status: SessionStatus,
    },
    Completed {
        at_ms: u64,
    },
    Aborted {
        at_ms: u64,
    },
}

pub struct BatteryDriver {
    queue: VecDeque<TaskConfig>,
    current: Option<TaskRunner>,
    rng: StdRng,
    started: usize,
    skipped: Vec<TaskKind>,
    done: bool,
}

impl BatteryDriver {
    pub fn new(config: BatteryConfig) -> Self {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let mut tasks = config.tasks;
        if config.order == TaskOrder::Shuffled {
            tasks.shuffle(&mut rng);
        }
        Self {
            queue: tasks.into(),
            current: None,
            rng,
            started: 0,
            skipped: Vec::new(),
            done: false,
        }
    }

    /// Tasks still waiting to run, in order.
    pub fn upcoming(&self) -> impl Iterator<Item = TaskKind> + '_ {
        self.queue.iter().map(TaskConfig::kind)
    }

    pub fn current(&self) -> Option<&TaskRunner> {
        self.current.as_ref()
    }

    pub fn skipped(&self) -> &[TaskKind] {
        &self.skipped
    }

    pub fn is_finished(&self) -> bool {
        self.done
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.current.as_ref().and_then(TaskRunner::next_deadline)
    }

    pub fn pending_timers(&self) -> usize {
        self.current.as_ref().map_or(0, TaskRunner::pending_timers)
    }

    pub fn start(&mut self, now_ms: u64, recorder: &mut dyn SessionRecorder) -> Vec<BatteryEvent> {
        let mut events = Vec::new();
        if self.current.is_none() && !self.done {
            self.next_task(now_ms, recorder, &mut events);
        }
        events
    }

    pub fn advance(&mut self, now_ms: u64, recorder: &mut dyn SessionRecorder) -> Vec<BatteryEvent> {
        let mut events = Vec::new();
        if let Some(runner) = self.current.as_mut() {
            let task = runner.kind();
            let runner_events = runner.advance(now_ms, recorder);
            self.forward(task, runner_events, now_ms, recorder, &mut events);
        }
        events
    }

    pub fn handle_input(
        &mut self,
        input: InputEvent,
        recorder: &mut dyn SessionRecorder,
    ) -> Vec<BatteryEvent> {
        let mut events = Vec::new();
        if let Some(runner) = self.current.as_mut() {
            let task = runner.kind();
            let runner_events = runner.handle_input(input, recorder);
            self.forward(task, runner_events, input.at_ms(), recorder, &mut events);
        }
        events
    }

    /// Stops the running task and drops the rest of the queue.
    pub fn abort(&mut self, now_ms: u64, recorder: &mut dyn SessionRecorder) -> Vec<BatteryEvent> {
        let mut events = Vec::new();
        if self.done {
            return events;
        }
        if let Some(mut runner) = self.current.take() {
            let task = runner.kind();
            events.extend(
                runner
                    .abort(now_ms, recorder)
                    .into_iter()
                    .map(|event| BatteryEvent::Runner { task, event }),
            );
            events.push(BatteryEvent::TaskFinished {
                task,
                status: SessionStatus::Aborted,
            });
        }
        self.queue.clear();
        self.done = true;
        info!(at_ms = now_ms, "battery aborted");
        events.push(BatteryEvent::Aborted { at_ms: now_ms });
        events
    }

    fn forward(
        &mut self,
        task: TaskKind,
        runner_events: Vec<RunnerEvent>,
        now_ms: u64,
        recorder: &mut dyn SessionRecorder,
        events: &mut Vec<BatteryEvent>,
    ) {
        let mut finished = None;
        for event in runner_events {
            match &event {
                RunnerEvent::TaskFinished(session) => finished = Some(session.status),
                RunnerEvent::Aborted { .. } => finished = Some(SessionStatus::Aborted),
                _ => {}
            }
            events.push(BatteryEvent::Runner { task, event });
        }
        let Some(status) = finished else {
            return;
        };
        self.current = None;
        events.push(BatteryEvent::TaskFinished { task, status });
        if status == SessionStatus::Aborted {
            // Escape inside a task ends the whole battery.
            self.queue.clear();
            self.done = true;
            events.push(BatteryEvent::Aborted { at_ms: now_ms });
        } else {
            self.next_task(now_ms, recorder, events);
        }
    }

    fn next_task(
        &mut self,
        now_ms: u64,
        recorder: &mut dyn SessionRecorder,
        events: &mut Vec<BatteryEvent>,
    ) {
        while let Some(config) = self.queue.pop_front() {
            let task = config.kind();
            match TaskRunner::prepare(&config, &mut self.rng) {
                Ok(mut runner) => {
                    self.started += 1;
                    info!(task = %task, position = self.started, "starting task");
                    events.push(BatteryEvent::TaskStarted {
                        task,
                        position: self.started,
                    });
                    let runner_events = runner.start(now_ms, recorder);
                    self.current = Some(runner);
                    self.forward(task, runner_events, now_ms, recorder, events);
                    return;
                }
                Err(error) => {
                    warn!(task = %task, %error, "skipping task with invalid configuration");
                    self.skipped.push(task);
                    events.push(BatteryEvent::TaskSkipped { task, error });
                }
            }
        }
        self.done = true;
        info!(tasks = self.started, skipped = self.skipped.len(), "battery complete");
        events.push(BatteryEvent::Completed { at_ms: now_ms });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::MemoryRecorder;
    use crate::tasks::{FingerTappingConfig, GoNoGoConfig};
    use reactime_core::KeyCode;

    fn tapping() -> TaskConfig {
        TaskConfig::FingerTapping(FingerTappingConfig {
            duration_ms: 1_000,
            practice_ms: 0,
        })
    }

    fn broken() -> TaskConfig {
        TaskConfig::GoNoGo(GoNoGoConfig {
            go_ratio: -0.2,
            ..Default::default()
        })
    }

    #[test]
    fn invalid_task_is_skipped_and_battery_completes() {
        let mut driver = BatteryDriver::new(BatteryConfig {
            tasks: vec![broken(), tapping()],
            order: TaskOrder::Fixed,
            seed: Some(9),
        });
        let mut rec = MemoryRecorder::default();
        let mut events = driver.start(0, &mut rec);
        assert!(matches!(
            events.first(),
            Some(BatteryEvent::TaskSkipped {
                task: TaskKind::GoNoGo,
                ..
            })
        ));
        while let Some(deadline) = driver.next_deadline() {
            events.extend(driver.advance(deadline, &mut rec));
        }
        assert!(driver.is_finished());
        assert!(events.contains(&BatteryEvent::Completed { at_ms: 1_000 }));
        assert_eq!(driver.skipped(), &[TaskKind::GoNoGo]);
        assert_eq!(rec.session().tasks.len(), 1);
    }

    #[test]
    fn shuffled_order_is_reproducible_from_seed() {
        let config = BatteryConfig {
            order: TaskOrder::Shuffled,
            seed: Some(42),
            ..Default::default()
        };
        let a: Vec<_> = BatteryDriver::new(config.clone()).upcoming().collect();
        let b: Vec<_> = BatteryDriver::new(config).upcoming().collect();
        assert_eq!(a, b);
        assert_eq!(a.len(), TaskKind::ALL.len());
        for kind in TaskKind::ALL {
            assert!(a.contains(&kind));
        }
    }

    #[test]
    fn escape_ends_the_battery() {
        let mut driver = BatteryDriver::new(BatteryConfig {
            tasks: vec![tapping(), tapping()],
            order: TaskOrder::Fixed,
            seed: Some(1),
        });
        let mut rec = MemoryRecorder::default();
        driver.start(0, &mut rec);
        let events = driver.handle_input(InputEvent::key(KeyCode::Escape, 200), &mut rec);
        assert!(events.contains(&BatteryEvent::Aborted { at_ms: 200 }));
        assert!(driver.is_finished());
        assert_eq!(driver.pending_timers(), 0);
        assert_eq!(driver.upcoming().count(), 0);
    }
}
