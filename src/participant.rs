//! Scripted participant for headless runs.

use rand::Rng;
use rand::rngs::StdRng;
use reactime_core::{Expected, InputEvent, KeyCode, StroopColor, TrailItem};
use reactime_experiment::{BatteryEvent, RenderCommand, RunnerEvent};

#[derive(Debug, Clone)]
pub struct ParticipantModel {
    pub mean_rt_ms: u64,
    pub jitter_ms: u64,
    /// Chance of answering a trial wrongly (wrong key, miss, or false alarm).
    pub error_rate: f64,
    pub tap_interval_ms: u64,
    /// Time between consecutive trail selections.
    pub trail_step_ms: u64,
}

impl Default for ParticipantModel {
    fn default() -> Self {
        Self {
            mean_rt_ms: 420,
            jitter_ms: 120,
            error_rate: 0.08,
            tap_interval_ms: 180,
            trail_step_ms: 900,
        }
    }
}

/// Reacts to battery events with the inputs a participant would produce,
/// each stamped with the virtual time it happens at.
pub struct SimulatedParticipant {
    model: ParticipantModel,
    rng: StdRng,
    expected: Option<Expected>,
    tapping_until: Option<u64>,
}

impl SimulatedParticipant {
    pub fn new(model: ParticipantModel, rng: StdRng) -> Self {
        Self {
            model,
            rng,
            expected: None,
            tapping_until: None,
        }
    }

    fn reaction_time(&mut self) -> u64 {
        let lo = self.model.mean_rt_ms.saturating_sub(self.model.jitter_ms).max(150);
        let hi = (self.model.mean_rt_ms + self.model.jitter_ms).max(lo + 1);
        self.rng.random_range(lo..hi)
    }

    fn errs(&mut self) -> bool {
        self.rng.random_bool(self.model.error_rate.clamp(0.0, 1.0))
    }

    /// `now_ms` is the time of the driver call that produced `event`.
    pub fn respond(&mut self, event: &BatteryEvent, now_ms: u64) -> Vec<InputEvent> {
        let BatteryEvent::Runner { event, .. } = event else {
            return Vec::new();
        };
        match event {
            RunnerEvent::TrialStarted { spec, .. } => {
                self.expected = Some(spec.expected);
                Vec::new()
            }
            RunnerEvent::StimulusShown { at_ms, .. } => {
                let Some(expected) = self.expected.take() else {
                    return Vec::new();
                };
                let at = at_ms + self.reaction_time();
                let wrong = self.errs();
                let key = match (expected, wrong) {
                    (Expected::Go, false) => Some(KeyCode::Space),
                    (Expected::Go, true) => None,
                    (Expected::Withhold, false) => None,
                    (Expected::Withhold, true) => Some(KeyCode::Space),
                    (Expected::Key(key), false) => Some(key),
                    (Expected::Key(key), true) => Some(wrong_key(key, &mut self.rng)),
                };
                key.map(|k| InputEvent::key(k, at)).into_iter().collect()
            }
            RunnerEvent::Render(RenderCommand::ShowTrail { items }) => trail_sequence(items)
                .into_iter()
                .enumerate()
                .map(|(i, item)| InputEvent::select(item, now_ms + (i as u64 + 1) * self.model.trail_step_ms))
                .collect(),
            RunnerEvent::Render(RenderCommand::ShowTapCount { remaining_ms, .. }) => {
                if self.tapping_until.is_some_and(|until| now_ms < until) {
                    return Vec::new();
                }
                let until = now_ms + remaining_ms;
                self.tapping_until = Some(until);
                let step = self.model.tap_interval_ms.max(1);
                (1..)
                    .map(|i| now_ms + i * step)
                    .take_while(|&at| at < until)
                    .map(|at| InputEvent::key(KeyCode::Space, at))
                    .collect()
            }
            _ => Vec::new(),
        }
    }
}

fn wrong_key(correct: KeyCode, rng: &mut StdRng) -> KeyCode {
    match correct {
        KeyCode::ArrowLeft => KeyCode::ArrowRight,
        KeyCode::ArrowRight => KeyCode::ArrowLeft,
        key => {
            let others: Vec<KeyCode> = StroopColor::ALL
                .into_iter()
                .map(KeyCode::for_color)
                .filter(|&k| k != key)
                .collect();
            others[rng.random_range(0..others.len())]
        }
    }
}

/// Correct selection order for a trail sheet: ascending numbers, or
/// numbers alternating with letters when the sheet has letters.
pub fn trail_sequence(items: &[TrailItem]) -> Vec<TrailItem> {
    let mut numbers: Vec<u32> = Vec::new();
    let mut letters: Vec<char> = Vec::new();
    for item in items {
        match *item {
            TrailItem::Number(n) => numbers.push(n),
            TrailItem::Letter(c) => letters.push(c),
        }
    }
    numbers.sort_unstable();
    letters.sort_unstable();
    let mut numbers = numbers.into_iter().map(TrailItem::Number);
    let mut letters = letters.into_iter().map(TrailItem::Letter);
    let mut out = Vec::with_capacity(items.len());
    loop {
        match (numbers.next(), letters.next()) {
            (None, None) => break,
            (n, l) => out.extend(n.into_iter().chain(l)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn trail_b_alternates_numbers_and_letters() {
        let items = [
            TrailItem::Number(1),
            TrailItem::Letter('B'),
            TrailItem::Number(3),
            TrailItem::Letter('A'),
            TrailItem::Number(2),
        ];
        let order: Vec<String> = trail_sequence(&items).iter().map(|i| i.to_string()).collect();
        assert_eq!(order, ["1", "A", "2", "B", "3"]);
    }

    #[test]
    fn taps_are_spread_over_the_round_once() {
        let model = ParticipantModel {
            tap_interval_ms: 250,
            ..Default::default()
        };
        let mut p = SimulatedParticipant::new(model, StdRng::seed_from_u64(1));
        let show = |remaining_ms| BatteryEvent::Runner {
            task: reactime_experiment::TaskKind::FingerTapping,
            event: RunnerEvent::Render(RenderCommand::ShowTapCount {
                count: 0,
                remaining_ms,
            }),
        };
        let taps = p.respond(&show(1_000), 0);
        assert_eq!(taps.len(), 3);
        assert_eq!(taps.last().map(InputEvent::at_ms), Some(750));
        assert!(p.respond(&show(900), 100).is_empty());
    }

    #[test]
    fn perfect_model_presses_the_expected_key() {
        let model = ParticipantModel {
            error_rate: 0.0,
            ..Default::default()
        };
        let mut p = SimulatedParticipant::new(model, StdRng::seed_from_u64(3));
        p.expected = Some(Expected::Key(KeyCode::KeyG));
        let shown = BatteryEvent::Runner {
            task: reactime_experiment::TaskKind::Stroop,
            event: RunnerEvent::StimulusShown {
                round: reactime_experiment::RoundKind::Main(0),
                trial: 0,
                at_ms: 5_000,
            },
        };
        let inputs = p.respond(&shown, 5_000);
        let [InputEvent::Key { key, at_ms }] = inputs[..] else {
            panic!("expected one key press, got {inputs:?}");
        };
        assert_eq!(key, KeyCode::KeyG);
        assert!(at_ms >= 5_150);
    }
}
