//! Trial Clock: the per-trial phase machine shared by every timed task.
//!
//! `Idle -> Fixation -> [Cue -> CueTargetInterval ->] StimulusVisible ->
//! ResponseWindowClosed -> InterTrialInterval -> (Fixation | RoundComplete)`
//!
//! Each phase owns exactly one timer. Entering a phase cancels whatever timer
//! the previous phase left behind before scheduling its own, so at most one
//! transition is ever pending.

use crate::classifier;
use crate::config::{EarlyInputPolicy, TrialTiming};
use crate::engine::{EngineEvent, RoundEngine};
use crate::presentation::{FeedbackTone, RenderCommand};
use rand::Rng;
use reactime_core::{
    Classification, InputEvent, KeyCode, Phase, Response, TrialOutcome, TrialPhase, TrialSpec,
};
use reactime_timing::{TimerId, TimerQueue};
use tracing::{debug, info};

/// Turns a finished trial into optional feedback text.
pub type FeedbackFormatter = fn(&TrialSpec, &TrialOutcome) -> Option<(String, FeedbackTone)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PhaseTimer {
    FixationEnd,
    CueEnd,
    CueTargetEnd,
    WindowEnd,
    FeedbackEnd,
    InterTrialEnd,
}

pub struct TrialClock<R: Rng> {
    timing: TrialTiming,
    sequence: Vec<TrialSpec>,
    accepted: Vec<KeyCode>,
    feedback: Option<FeedbackFormatter>,
    rng: R,
    timers: TimerQueue<PhaseTimer>,
    live: Option<TimerId>,
    phase: TrialPhase,
    index: usize,
    onset_ms: Option<u64>,
    response: Option<Response>,
    outcomes: Vec<TrialOutcome>,
}

impl<R: Rng> TrialClock<R> {
    pub fn new(timing: TrialTiming, sequence: Vec<TrialSpec>, accepted: Vec<KeyCode>, rng: R) -> Self {
        Self {
            timing,
            sequence,
            accepted,
            feedback: None,
            rng,
            timers: TimerQueue::new(),
            live: None,
            phase: TrialPhase::Idle,
            index: 0,
            onset_ms: None,
            response: None,
            outcomes: Vec::new(),
        }
    }

    pub fn with_feedback(mut self, formatter: FeedbackFormatter) -> Self {
        self.feedback = Some(formatter);
        self
    }

    pub fn phase(&self) -> TrialPhase {
        self.phase
    }

    pub fn current_trial(&self) -> usize {
        self.index
    }

    pub fn current_spec(&self) -> Option<&TrialSpec> {
        self.sequence.get(self.index)
    }

    fn enter(&mut self, phase: TrialPhase, now_ms: u64, events: &mut Vec<EngineEvent>) {
        if let Some(id) = self.live.take() {
            self.timers.cancel(id);
        }
        self.phase = phase;
        debug!(trial = self.index, phase = ?phase, at_ms = now_ms, "phase entered");
        events.push(EngineEvent::PhaseEntered {
            trial: self.index,
            phase,
            at_ms: now_ms,
        });
    }

    fn schedule(&mut self, deadline_ms: u64, timer: PhaseTimer) {
        debug_assert!(self.live.is_none());
        self.live = Some(self.timers.schedule(deadline_ms, timer));
    }

    fn begin_trial(&mut self, now_ms: u64, events: &mut Vec<EngineEvent>) {
        let Some(spec) = self.sequence.get(self.index).cloned() else {
            self.finish(now_ms, events);
            return;
        };
        self.onset_ms = None;
        self.response = None;
        events.push(EngineEvent::TrialStarted {
            trial: self.index,
            spec,
        });
        self.enter(TrialPhase::Fixation, now_ms, events);
        events.push(EngineEvent::Render(RenderCommand::ShowFixation));
        let fixation = self.timing.fixation.sample(&mut self.rng);
        self.schedule(now_ms + fixation, PhaseTimer::FixationEnd);
    }

    fn after_fixation(&mut self, now_ms: u64, events: &mut Vec<EngineEvent>) {
        let cue = self.current_spec().and_then(|s| s.cue);
        match (self.timing.cue, cue) {
            (Some(cue_timing), Some(side)) => {
                self.enter(TrialPhase::Cue, now_ms, events);
                events.push(EngineEvent::Render(RenderCommand::ShowCue { side }));
                self.schedule(now_ms + cue_timing.cue_ms, PhaseTimer::CueEnd);
            }
            _ => self.show_stimulus(now_ms, events),
        }
    }

    fn show_stimulus(&mut self, now_ms: u64, events: &mut Vec<EngineEvent>) {
        let Some(stimulus) = self.current_spec().map(|s| s.stimulus.clone()) else {
            return;
        };
        self.enter(TrialPhase::StimulusVisible, now_ms, events);
        self.onset_ms = Some(now_ms);
        events.push(EngineEvent::Render(RenderCommand::ShowStimulus {
            trial: self.index,
            stimulus,
        }));
        events.push(EngineEvent::StimulusShown {
            trial: self.index,
            at_ms: now_ms,
        });
        self.schedule(now_ms + self.timing.response_window_ms, PhaseTimer::WindowEnd);
    }

    fn close_window(&mut self, now_ms: u64, events: &mut Vec<EngineEvent>) {
        let Some(spec) = self.sequence.get(self.index).cloned() else {
            return;
        };
        self.enter(TrialPhase::ResponseWindowClosed, now_ms, events);
        let outcome = classifier::outcome(
            self.index,
            &spec,
            self.response.as_ref(),
            self.timing.min_valid_rt_ms,
            now_ms,
        );
        debug!(
            trial = self.index,
            classification = %outcome.classification,
            rt_ms = ?outcome.reaction_time_ms,
            "trial classified"
        );
        events.push(EngineEvent::Render(RenderCommand::Clear));
        if let Some((text, tone)) = self.feedback.and_then(|f| f(&spec, &outcome)) {
            events.push(EngineEvent::Render(RenderCommand::ShowFeedback { text, tone }));
        }
        self.outcomes.push(outcome.clone());
        events.push(EngineEvent::Outcome(outcome));
        self.schedule(now_ms + self.timing.feedback_ms, PhaseTimer::FeedbackEnd);
    }

    fn finish(&mut self, now_ms: u64, events: &mut Vec<EngineEvent>) {
        self.enter(TrialPhase::RoundComplete, now_ms, events);
        info!(trials = self.outcomes.len(), at_ms = now_ms, "round complete");
        events.push(EngineEvent::RoundComplete { at_ms: now_ms });
    }

    fn fire(&mut self, timer: PhaseTimer, now_ms: u64, events: &mut Vec<EngineEvent>) {
        match timer {
            PhaseTimer::FixationEnd => self.after_fixation(now_ms, events),
            PhaseTimer::CueEnd => {
                self.enter(TrialPhase::CueTargetInterval, now_ms, events);
                events.push(EngineEvent::Render(RenderCommand::ClearCue));
                let interval = self.timing.cue.map_or(0, |c| c.cue_target_interval_ms);
                self.schedule(now_ms + interval, PhaseTimer::CueTargetEnd);
            }
            PhaseTimer::CueTargetEnd => self.show_stimulus(now_ms, events),
            PhaseTimer::WindowEnd => self.close_window(now_ms, events),
            PhaseTimer::FeedbackEnd => {
                self.enter(TrialPhase::InterTrialInterval, now_ms, events);
                let iti = self.timing.inter_trial.sample(&mut self.rng);
                self.schedule(now_ms + iti, PhaseTimer::InterTrialEnd);
            }
            PhaseTimer::InterTrialEnd => {
                self.index += 1;
                self.begin_trial(now_ms, events);
            }
        }
    }

    /// Press with nothing on screen to answer. It counts as a false start for
    /// the round without touching the trial's own outcome.
    fn stray_press(&self, key: KeyCode, at_ms: u64, events: &mut Vec<EngineEvent>) {
        debug!(trial = self.index, phase = ?self.phase, at_ms, "false start between stimuli");
        events.push(EngineEvent::FalseStart {
            trial: self.index,
            key,
            at_ms,
        });
        let Some(spec) = self.current_spec() else {
            return;
        };
        let shown = TrialOutcome {
            trial_index: self.index,
            condition: spec.condition,
            response: Some(key),
            reaction_time_ms: None,
            classification: Classification::FalseStart,
            timestamp_ms: at_ms,
        };
        if let Some((text, tone)) = self.feedback.and_then(|f| f(spec, &shown)) {
            events.push(EngineEvent::Render(RenderCommand::ShowFeedback { text, tone }));
        }
    }

    fn drain(&mut self, now_ms: u64, before_only: bool) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        loop {
            let due = if before_only {
                self.timers.pop_due_before(now_ms)
            } else {
                self.timers.pop_due(now_ms)
            };
            let Some((id, timer)) = due else {
                break;
            };
            if self.live != Some(id) {
                continue;
            }
            self.live = None;
            self.fire(timer, now_ms, &mut events);
        }
        events
    }

    fn ignore(&self, input: InputEvent, events: &mut Vec<EngineEvent>) {
        debug!(?input, phase = ?self.phase, "input ignored");
        events.push(EngineEvent::InputIgnored {
            input,
            phase: self.phase,
        });
    }
}

impl<R: Rng> RoundEngine for TrialClock<R> {
    fn start(&mut self, now_ms: u64) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        if self.phase == TrialPhase::Idle {
            self.begin_trial(now_ms, &mut events);
        }
        events
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

        let key = match input {
            InputEvent::Key { key, .. } if self.accepted.contains(&key) => key,
            _ => {
                self.ignore(input, &mut events);
                return events;
            }
        };

        let scores_early = self.timing.early_input == EarlyInputPolicy::FalseStart;
        if self.phase.allows_input() {
            if self.response.is_some() {
                // A hidden stimulus leaves only the fixation cross to press at.
                if self.timing.hide_on_response && scores_early {
                    self.stray_press(key, at_ms, &mut events);
                } else {
                    self.ignore(input, &mut events);
                }
                return events;
            }
            let rt = at_ms.saturating_sub(self.onset_ms.unwrap_or(at_ms));
            self.response = Some(Response::reaction(key, rt));
            events.push(EngineEvent::ResponseCaptured {
                trial: self.index,
                key,
                rt_ms: Some(rt),
                at_ms,
            });
            if self.timing.end_on_response {
                self.close_window(at_ms, &mut events);
            } else if self.timing.hide_on_response {
                events.push(EngineEvent::Render(RenderCommand::ShowFixation));
            }
        } else if self.phase.is_anticipatory() && scores_early {
            self.response = Some(Response::anticipatory(key));
            events.push(EngineEvent::ResponseCaptured {
                trial: self.index,
                key,
                rt_ms: None,
                at_ms,
            });
            self.close_window(at_ms, &mut events);
        } else if scores_early
            && matches!(
                self.phase,
                TrialPhase::ResponseWindowClosed | TrialPhase::InterTrialInterval
            )
        {
            self.stray_press(key, at_ms, &mut events);
        } else {
            self.ignore(input, &mut events);
        }
        events
    }

    fn abort(&mut self, now_ms: u64) -> Vec<EngineEvent> {
        if self.phase.is_terminal() {
            return Vec::new();
        }
        let cancelled = self.timers.cancel_all();
        self.live = None;
        self.phase = TrialPhase::Aborted;
        self.response = None;
        self.onset_ms = None;
        info!(trial = self.index, cancelled, at_ms = now_ms, "round aborted");
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
        Some(self.sequence.len())
    }

    fn outcomes(&self) -> &[TrialOutcome] {
        &self.outcomes
    }
}
