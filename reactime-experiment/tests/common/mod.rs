#![allow(dead_code)]

use reactime_core::{Expected, InputEvent, KeyCode, TrialOutcome, TrialSpec};
use reactime_experiment::{EngineEvent, RoundEngine, RunnerEvent, SessionRecorder, TaskRunner};

/// Runs `engine` in virtual time until nothing is pending. `respond` sees every
/// event and may schedule one input in reply; inputs and timer deadlines are
/// delivered in time order, inputs first on ties.
pub fn drive_engine(
    engine: &mut dyn RoundEngine,
    mut respond: impl FnMut(&EngineEvent) -> Option<InputEvent>,
) -> Vec<TrialOutcome> {
    let mut outcomes = Vec::new();
    let mut pending: Vec<InputEvent> = Vec::new();
    let mut events = engine.start(0);
    loop {
        assert!(engine.pending_timers() <= 1, "more than one live timer");
        for event in &events {
            if let Some(o) = event.outcome() {
                outcomes.push(o.clone());
            }
            if let Some(input) = respond(event) {
                pending.push(input);
            }
        }
        pending.sort_by_key(InputEvent::at_ms);
        let next_input = pending.first().map(InputEvent::at_ms);
        events = match (next_input, engine.next_deadline()) {
            (Some(t), Some(d)) if t <= d => engine.handle_input(pending.remove(0)),
            (Some(_), None) => engine.handle_input(pending.remove(0)),
            (_, Some(d)) => engine.advance(d),
            (None, None) => break,
        };
    }
    outcomes
}

/// Same as [`drive_engine`] for a whole task, including rest screens.
pub fn drive_runner(
    runner: &mut TaskRunner,
    recorder: &mut dyn SessionRecorder,
    mut respond: impl FnMut(&RunnerEvent) -> Option<InputEvent>,
) -> Vec<RunnerEvent> {
    let mut all = Vec::new();
    let mut pending: Vec<InputEvent> = Vec::new();
    let mut events = runner.start(0, recorder);
    loop {
        for event in &events {
            if let Some(input) = respond(event) {
                pending.push(input);
            }
        }
        all.extend(events);
        pending.sort_by_key(InputEvent::at_ms);
        let next_input = pending.first().map(InputEvent::at_ms);
        events = match (next_input, runner.next_deadline()) {
            (Some(t), Some(d)) if t <= d => runner.handle_input(pending.remove(0), recorder),
            (Some(_), None) => runner.handle_input(pending.remove(0), recorder),
            (_, Some(d)) => runner.advance(d, recorder),
            (None, None) => break,
        };
    }
    all
}

/// The key a perfect participant presses for `spec`, if any.
pub fn correct_key(spec: &TrialSpec) -> Option<KeyCode> {
    match spec.expected {
        Expected::Go => Some(KeyCode::Space),
        Expected::Key(key) => Some(key),
        Expected::Withhold => None,
    }
}

/// Responder that answers every trial correctly `rt_ms` after onset.
pub fn perfect_participant(rt_ms: u64) -> impl FnMut(&EngineEvent) -> Option<InputEvent> {
    let mut key = None;
    move |event| match event {
        EngineEvent::TrialStarted { spec, .. } => {
            key = correct_key(spec);
            None
        }
        EngineEvent::StimulusShown { at_ms, .. } => {
            key.take().map(|k| InputEvent::key(k, at_ms + rt_ms))
        }
        _ => None,
    }
}

/// [`perfect_participant`] at the task level; practice rounds included.
pub fn perfect_runner_participant(rt_ms: u64) -> impl FnMut(&RunnerEvent) -> Option<InputEvent> {
    let mut key = None;
    move |event| match event {
        RunnerEvent::TrialStarted { spec, .. } => {
            key = correct_key(spec);
            None
        }
        RunnerEvent::StimulusShown { at_ms, .. } => {
            key.take().map(|k| InputEvent::key(k, at_ms + rt_ms))
        }
        _ => None,
    }
}
