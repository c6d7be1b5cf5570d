//! Retained display state, rebuilt from the engine's render commands.

use reactime_core::{CueSide, Stimulus, TrailItem};
use reactime_experiment::{FeedbackTone, Presentation, RenderCommand};

pub const TRAIL_RADIUS: f32 = 28.0;
const TRAIL_MARGIN_X: f32 = 80.0;
const TRAIL_TOP: f32 = 140.0;
const TRAIL_BOTTOM: f32 = 80.0;

#[derive(Debug, Clone, PartialEq)]
pub struct ShownStimulus {
    pub trial: usize,
    pub stimulus: Stimulus,
    pub shown_at_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RestScreen {
    pub next_round: String,
    pub started_at_ms: u64,
    pub duration_ms: u64,
}

impl RestScreen {
    pub fn remaining_secs(&self, now_ms: u64) -> u64 {
        let end = self.started_at_ms + self.duration_ms;
        end.saturating_sub(now_ms).div_ceil(1_000)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrailMark {
    Pending,
    Done,
    Wrong,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scene {
    now_ms: u64,
    version: u64,
    pub instructions: Option<(String, String)>,
    pub fixation: bool,
    /// Posner placeholder boxes, shown from the first cue of a round.
    pub placeholders: bool,
    pub cue: Option<CueSide>,
    pub stimulus: Option<ShownStimulus>,
    pub feedback: Option<(String, FeedbackTone)>,
    pub rest: Option<RestScreen>,
    pub trail: Vec<(TrailItem, TrailMark)>,
    pub taps: Option<(usize, u64)>,
    pub summary: Option<(String, Vec<(String, f64)>)>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    /// Engine time used to stamp onsets and count down rests.
    pub fn set_time(&mut self, now_ms: u64) {
        self.now_ms = now_ms;
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Changes whenever the drawn image would change. Time-driven content
    /// (the PVT counter, rest countdown) folds the clock into the key.
    pub fn frame_key(&self) -> (u64, u64) {
        let tick = match (&self.stimulus, &self.rest) {
            (Some(shown), _) if shown.stimulus == Stimulus::Counter => {
                self.now_ms.saturating_sub(shown.shown_at_ms)
            }
            (_, Some(rest)) => rest.remaining_secs(self.now_ms),
            _ => 0,
        };
        (self.version, tick)
    }

    fn clear_trial(&mut self) {
        self.fixation = false;
        self.cue = None;
        self.stimulus = None;
        self.feedback = None;
    }

    fn clear_screen(&mut self) {
        self.clear_trial();
        self.instructions = None;
        self.placeholders = false;
        self.rest = None;
        self.trail.clear();
        self.taps = None;
        self.summary = None;
    }

    pub fn apply(&mut self, command: &RenderCommand) {
        self.version += 1;
        match command {
            RenderCommand::Clear => self.clear_trial(),
            RenderCommand::ShowInstructions { title, text } => {
                self.clear_screen();
                self.instructions = Some((title.clone(), text.clone()));
            }
            RenderCommand::ShowFixation => {
                self.clear_trial();
                self.fixation = true;
            }
            RenderCommand::ShowCue { side } => {
                self.placeholders = true;
                self.cue = Some(*side);
            }
            RenderCommand::ClearCue => self.cue = None,
            RenderCommand::ShowStimulus { trial, stimulus } => {
                self.fixation = false;
                self.stimulus = Some(ShownStimulus {
                    trial: *trial,
                    stimulus: stimulus.clone(),
                    shown_at_ms: self.now_ms,
                });
            }
            RenderCommand::ShowFeedback { text, tone } => {
                self.feedback = Some((text.clone(), *tone));
            }
            RenderCommand::ShowRest {
                next_round,
                duration_ms,
            } => {
                self.clear_screen();
                self.rest = Some(RestScreen {
                    next_round: next_round.clone(),
                    started_at_ms: self.now_ms,
                    duration_ms: *duration_ms,
                });
            }
            RenderCommand::ShowTrail { items } => {
                self.clear_trial();
                self.trail = items.iter().map(|&i| (i, TrailMark::Pending)).collect();
            }
            RenderCommand::MarkTrailItem { item, correct } => {
                for (_, mark) in self.trail.iter_mut() {
                    if *mark == TrailMark::Wrong {
                        *mark = TrailMark::Pending;
                    }
                }
                if let Some((_, mark)) = self.trail.iter_mut().find(|(i, _)| i == item) {
                    if *correct {
                        *mark = TrailMark::Done;
                    } else if *mark == TrailMark::Pending {
                        *mark = TrailMark::Wrong;
                    }
                }
            }
            RenderCommand::ShowTapCount {
                count,
                remaining_ms,
            } => self.taps = Some((*count, *remaining_ms)),
            RenderCommand::ShowSummary { title, metrics } => {
                self.clear_screen();
                self.summary = Some((title.clone(), metrics.clone()));
            }
        }
    }

    /// Center of each trail circle for a `width` x `height` surface, in
    /// the order the items were laid out.
    pub fn trail_positions(&self, width: u32, height: u32) -> Vec<(f32, f32)> {
        grid_positions(self.trail.len(), width as f32, height as f32)
    }

    /// Hit test for mouse selection on the trail sheet.
    pub fn trail_item_at(&self, width: u32, height: u32, x: f32, y: f32) -> Option<TrailItem> {
        self.trail_positions(width, height)
            .into_iter()
            .zip(&self.trail)
            .find(|((cx, cy), _)| (cx - x).hypot(cy - y) <= TRAIL_RADIUS)
            .map(|(_, (item, _))| *item)
    }
}

impl Presentation for Scene {
    fn present(&mut self, command: &RenderCommand) {
        self.apply(command);
    }
}

fn grid_positions(count: usize, width: f32, height: f32) -> Vec<(f32, f32)> {
    if count == 0 {
        return Vec::new();
    }
    let cols = (count as f32).sqrt().ceil() as usize;
    let rows = count.div_ceil(cols);
    let cell_w = (width - 2.0 * TRAIL_MARGIN_X).max(1.0) / cols as f32;
    let cell_h = (height - TRAIL_TOP - TRAIL_BOTTOM).max(1.0) / rows as f32;
    (0..count)
        .map(|i| {
            let (row, col) = (i / cols, i % cols);
            // Odd rows shift by a quarter cell so the sheet is not a plain grid.
            let shift = if row % 2 == 1 { cell_w * 0.25 } else { 0.0 };
            (
                TRAIL_MARGIN_X + cell_w * (col as f32 + 0.5) + shift,
                TRAIL_TOP + cell_h * (row as f32 + 0.5),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use reactime_core::{SquareColor, TrailItem};

    #[test]
    fn fixation_clears_previous_feedback_and_stimulus() {
        let mut scene = Scene::new();
        scene.apply(&RenderCommand::ShowStimulus {
            trial: 0,
            stimulus: Stimulus::Square {
                color: SquareColor::Orange,
            },
        });
        scene.apply(&RenderCommand::ShowFeedback {
            text: "Correct! (312ms)".into(),
            tone: FeedbackTone::Positive,
        });
        scene.apply(&RenderCommand::ShowFixation);
        assert!(scene.fixation);
        assert!(scene.stimulus.is_none());
        assert!(scene.feedback.is_none());
    }

    #[test]
    fn instructions_survive_trial_clears() {
        let mut scene = Scene::new();
        scene.apply(&RenderCommand::ShowInstructions {
            title: "Flanker".into(),
            text: "Press the arrow the middle one points to.".into(),
        });
        scene.apply(&RenderCommand::ShowFixation);
        scene.apply(&RenderCommand::Clear);
        assert!(scene.instructions.is_some());
        scene.apply(&RenderCommand::ShowRest {
            next_round: "flanker_block_2".into(),
            duration_ms: 2_000,
        });
        assert!(scene.instructions.is_none());
    }

    #[test]
    fn counter_and_rest_advance_the_frame_key() {
        let mut scene = Scene::new();
        scene.set_time(1_000);
        scene.apply(&RenderCommand::ShowStimulus {
            trial: 0,
            stimulus: Stimulus::Counter,
        });
        let before = scene.frame_key();
        scene.set_time(1_016);
        assert_ne!(scene.frame_key(), before);
        assert_eq!(scene.frame_key().1, 16);

        scene.apply(&RenderCommand::ShowRest {
            next_round: "pvt_round_2".into(),
            duration_ms: 2_000,
        });
        assert_eq!(scene.rest.as_ref().map(|r| r.remaining_secs(1_016)), Some(2));
        scene.set_time(2_100);
        assert_eq!(scene.frame_key().1, 1);
        scene.set_time(3_500);
        assert_eq!(scene.frame_key().1, 0);
    }

    #[test]
    fn wrong_trail_mark_lasts_until_next_selection() {
        let mut scene = Scene::new();
        let items = vec![TrailItem::Number(1), TrailItem::Number(2), TrailItem::Number(3)];
        scene.apply(&RenderCommand::ShowTrail { items });
        scene.apply(&RenderCommand::MarkTrailItem {
            item: TrailItem::Number(1),
            correct: true,
        });
        scene.apply(&RenderCommand::MarkTrailItem {
            item: TrailItem::Number(3),
            correct: false,
        });
        assert_eq!(scene.trail[2].1, TrailMark::Wrong);
        scene.apply(&RenderCommand::MarkTrailItem {
            item: TrailItem::Number(2),
            correct: true,
        });
        let marks: Vec<_> = scene.trail.iter().map(|(_, m)| *m).collect();
        assert_eq!(marks, [TrailMark::Done, TrailMark::Done, TrailMark::Pending]);
    }

    #[test]
    fn trail_hit_test_finds_the_circle_under_the_pointer() {
        let mut scene = Scene::new();
        let items: Vec<_> = (1..=25).map(TrailItem::Number).collect();
        scene.apply(&RenderCommand::ShowTrail {
            items: items.clone(),
        });
        let positions = scene.trail_positions(1280, 720);
        assert_eq!(positions.len(), 25);
        for (pos, item) in positions.iter().zip(&items) {
            assert_eq!(scene.trail_item_at(1280, 720, pos.0 + 5.0, pos.1 - 5.0), Some(*item));
        }
        assert_eq!(scene.trail_item_at(1280, 720, 2.0, 2.0), None);
    }
}
