use crate::scene::{Scene, TRAIL_RADIUS, TrailMark};
use crate::text::{TextCache, wrap};
use anyhow::{Context, Result, bail};
use bytemuck::{try_cast_slice, try_cast_slice_mut};
use reactime_core::{CueSide, Direction, SquareColor, Stimulus, StroopInk};
use reactime_experiment::FeedbackTone;
use reactime_timing::Timer;
use std::path::Path;
use std::time::Duration;
use tiny_skia::{Color, FillRule, Paint, PathBuilder, Pixmap, Rect, Stroke, Transform};
use tracing::debug;

const BACKGROUND: [u8; 4] = [0, 0, 0, 255];
const WHITE: [u8; 4] = [255, 255, 255, 255];
const GREY: [u8; 4] = [150, 150, 150, 255];
const GREEN: [u8; 4] = [0x27, 0xae, 0x60, 0xff];
const RED: [u8; 4] = [0xe7, 0x4c, 0x3c, 0xff];
const ORANGE: [u8; 4] = [255, 165, 0, 255];
const BLUE: [u8; 4] = [0, 90, 255, 255];

const SQUARE_SIZE: f32 = 150.0;
const FIXATION_SIZE: f32 = 40.0;
const FIXATION_BAR: f32 = 2.0;
const BOX_SIZE: f32 = 120.0;
const TARGET_SIZE: f32 = 50.0;

#[derive(Debug, Clone, Copy, Default)]
pub struct FrameStats {
    pub draw: Duration,
    pub copy: Duration,
    pub total: Duration,
    /// False when the scene was unchanged and the previous frame still stands.
    pub redrawn: bool,
}

/// Draws a [`Scene`] into an RGBA8 frame buffer with tiny-skia. Without a
/// font only shapes are drawn.
pub struct SkiaRenderer {
    width: u32,
    height: u32,
    center: (f32, f32),
    canvas: Pixmap,
    text: Option<TextCache>,
    last_key: Option<(u64, u64)>,
}

impl SkiaRenderer {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let canvas = Pixmap::new(width, height)
            .with_context(|| format!("invalid canvas size {width}x{height}"))?;
        Ok(Self {
            width,
            height,
            center: (width as f32 / 2.0, height as f32 / 2.0),
            canvas,
            text: None,
            last_key: None,
        })
    }

    pub fn with_font_bytes(mut self, bytes: Vec<u8>) -> Result<Self> {
        self.text = Some(TextCache::from_bytes(bytes)?);
        Ok(self)
    }

    pub fn with_font_file(self, path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("reading font {}", path.display()))?;
        self.with_font_bytes(bytes)
    }

    pub fn has_font(&self) -> bool {
        self.text.is_some()
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        self.canvas = Pixmap::new(width, height)
            .with_context(|| format!("invalid canvas size {width}x{height}"))?;
        self.width = width;
        self.height = height;
        self.center = (width as f32 / 2.0, height as f32 / 2.0);
        self.last_key = None;
        debug!(width, height, "renderer resized");
        Ok(())
    }

    /// Redraws when the scene changed since the last call, then copies the
    /// canvas into `frame`.
    pub fn render_frame<T: Timer>(&mut self, scene: &Scene, frame: &mut [u8], timer: &T) -> Result<FrameStats> {
        if frame.len() != self.canvas.data().len() {
            bail!(
                "frame buffer is {} bytes, canvas is {}x{}",
                frame.len(),
                self.width,
                self.height
            );
        }
        let key = scene.frame_key();
        if self.last_key == Some(key) {
            return Ok(FrameStats::default());
        }

        let t = timer.now();
        self.draw_scene(scene);
        let draw = timer.elapsed(t);

        let t = timer.now();
        frame.copy_from_slice(self.canvas.data());
        let copy = timer.elapsed(t);

        self.last_key = Some(key);
        Ok(FrameStats {
            draw,
            copy,
            total: draw + copy,
            redrawn: true,
        })
    }

    pub fn canvas(&self) -> &Pixmap {
        &self.canvas
    }

    fn draw_scene(&mut self, scene: &Scene) {
        self.canvas.fill(color(BACKGROUND));
        let (cx, cy) = self.center;

        if let Some((title, metrics)) = &scene.summary {
            self.draw_text(title, 40, WHITE, (cx, cy - 200.0));
            for (i, (name, value)) in metrics.iter().enumerate() {
                let line = format!("{name}: {value:.1}");
                self.draw_text(&line, 24, WHITE, (cx, cy - 130.0 + i as f32 * 34.0));
            }
            return;
        }
        if let Some(rest) = &scene.rest {
            self.draw_text("Take a short break", 40, WHITE, (cx, cy - 60.0));
            let next = format!("Next: {}", rest.next_round);
            self.draw_text(&next, 24, GREY, (cx, cy));
            let secs = format!("{}s", rest.remaining_secs(scene.now_ms()));
            self.draw_text(&secs, 32, WHITE, (cx, cy + 60.0));
            return;
        }

        if let Some((title, body)) = &scene.instructions {
            self.draw_text(title, 32, WHITE, (cx, 40.0));
            for (i, line) in wrap(body, 80).iter().enumerate() {
                self.draw_text(line, 18, GREY, (cx, 80.0 + i as f32 * 24.0));
            }
        }

        if !scene.trail.is_empty() {
            self.draw_trail(scene);
        }
        if let Some((count, remaining_ms)) = scene.taps {
            self.draw_text(&format!("Taps: {count}"), 64, WHITE, (cx, cy));
            let left = format!("Time left: {}s", remaining_ms.div_ceil(1_000));
            self.draw_text(&left, 24, GREY, (cx, cy + 70.0));
        }

        if scene.placeholders {
            for side in [Direction::Left, Direction::Right] {
                let lit = match scene.cue {
                    Some(CueSide::Both) => true,
                    Some(cue) => cue == CueSide::from(side),
                    None => false,
                };
                let (width, rgba) = if lit { (6.0, WHITE) } else { (2.0, GREY) };
                self.stroke_rect(self.box_center(side), BOX_SIZE, width, rgba);
            }
        }
        if scene.fixation {
            self.draw_fixation();
        }
        if let Some(shown) = &scene.stimulus {
            self.draw_stimulus(&shown.stimulus, scene.now_ms().saturating_sub(shown.shown_at_ms));
        }
        if let Some((text, tone)) = &scene.feedback {
            let rgba = match tone {
                FeedbackTone::Positive => GREEN,
                FeedbackTone::Negative => RED,
                FeedbackTone::Neutral => WHITE,
            };
            self.draw_text(text, 28, rgba, (cx, cy + 140.0));
        }
    }

    fn box_center(&self, side: Direction) -> (f32, f32) {
        let dx = self.width as f32 / 4.0;
        match side {
            Direction::Left => (self.center.0 - dx, self.center.1),
            Direction::Right => (self.center.0 + dx, self.center.1),
        }
    }

    fn draw_fixation(&mut self) {
        let (cx, cy) = self.center;
        let half = FIXATION_SIZE / 2.0;
        let bar = FIXATION_BAR / 2.0;
        self.fill_rect(cx - half, cy - bar, FIXATION_SIZE, FIXATION_BAR, WHITE);
        self.fill_rect(cx - bar, cy - half, FIXATION_BAR, FIXATION_SIZE, WHITE);
    }

    fn draw_stimulus(&mut self, stimulus: &Stimulus, elapsed_ms: u64) {
        let (cx, cy) = self.center;
        match stimulus {
            Stimulus::Square { color } => {
                let rgba = match color {
                    SquareColor::Orange => ORANGE,
                    SquareColor::Blue => BLUE,
                };
                let half = SQUARE_SIZE / 2.0;
                self.fill_rect(cx - half, cy - half, SQUARE_SIZE, SQUARE_SIZE, rgba);
            }
            Stimulus::Counter => self.draw_text(&elapsed_ms.to_string(), 72, RED, (cx, cy)),
            Stimulus::Letter { letter } => self.draw_text(&letter.to_string(), 120, WHITE, (cx, cy)),
            Stimulus::Arrows { .. } => self.draw_text(&stimulus.label(), 72, WHITE, (cx, cy)),
            Stimulus::ColorWord { word, ink } => {
                let rgba = match ink {
                    StroopInk::Color(c) => c.rgba(),
                    // Neutral ink on the dark background.
                    StroopInk::Black => WHITE,
                };
                self.draw_text(&word.to_string(), 72, rgba, (cx, cy));
            }
            Stimulus::ColorPatch { color } => {
                let half = SQUARE_SIZE / 2.0;
                self.fill_rect(cx - half, cy - half, SQUARE_SIZE, SQUARE_SIZE, color.rgba());
            }
            Stimulus::Target { side } => {
                let (tx, ty) = self.box_center(*side);
                let half = TARGET_SIZE / 2.0;
                self.fill_rect(tx - half, ty - half, TARGET_SIZE, TARGET_SIZE, WHITE);
            }
        }
    }

    fn draw_trail(&mut self, scene: &Scene) {
        let positions = scene.trail_positions(self.width, self.height);
        for ((x, y), (item, mark)) in positions.into_iter().zip(&scene.trail) {
            let Some(circle) = PathBuilder::from_circle(x, y, TRAIL_RADIUS) else {
                continue;
            };
            let (fill, label) = match mark {
                TrailMark::Pending => (None, WHITE),
                TrailMark::Done => (Some(GREEN), WHITE),
                TrailMark::Wrong => (Some(RED), WHITE),
            };
            if let Some(rgba) = fill {
                self.canvas.fill_path(
                    &circle,
                    &paint(rgba),
                    FillRule::Winding,
                    Transform::identity(),
                    None,
                );
            }
            let stroke = Stroke {
                width: 2.0,
                ..Stroke::default()
            };
            self.canvas
                .stroke_path(&circle, &paint(WHITE), &stroke, Transform::identity(), None);
            self.draw_text(&item.to_string(), 22, label, (x, y));
        }
    }

    fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, rgba: [u8; 4]) {
        if let Some(rect) = Rect::from_xywh(x, y, w, h) {
            self.canvas
                .fill_rect(rect, &paint(rgba), Transform::identity(), None);
        }
    }

    fn stroke_rect(&mut self, center: (f32, f32), size: f32, width: f32, rgba: [u8; 4]) {
        let half = size / 2.0;
        let Some(rect) = Rect::from_xywh(center.0 - half, center.1 - half, size, size) else {
            return;
        };
        let path = PathBuilder::from_rect(rect);
        let stroke = Stroke {
            width,
            ..Stroke::default()
        };
        self.canvas
            .stroke_path(&path, &paint(rgba), &stroke, Transform::identity(), None);
    }

    fn draw_text(&mut self, text: &str, size_px: u32, rgba: [u8; 4], center: (f32, f32)) {
        let Some(cache) = self.text.as_mut() else {
            return;
        };
        if let Some(pm) = cache.get_or_render(text, size_px, rgba) {
            blit_centered(&mut self.canvas, &pm, center);
        }
    }
}

fn color(rgba: [u8; 4]) -> Color {
    Color::from_rgba8(rgba[0], rgba[1], rgba[2], rgba[3])
}

fn paint(rgba: [u8; 4]) -> Paint<'static> {
    let mut p = Paint::default();
    p.set_color(color(rgba));
    p.anti_alias = true;
    p
}

/// Premultiplied source-over of `src` onto `dst`, centered on `center` and
/// clipped to `dst`.
pub fn blit_centered(dst: &mut Pixmap, src: &Pixmap, center: (f32, f32)) {
    let (w, h) = (src.width() as i32, src.height() as i32);
    let (cw, ch) = (dst.width() as i32, dst.height() as i32);
    let x = (center.0 - w as f32 * 0.5) as i32;
    let y = (center.1 - h as f32 * 0.5) as i32;
    if x + w <= 0 || y + h <= 0 || x >= cw || y >= ch {
        return;
    }

    let dst_x = x.max(0) as usize;
    let dst_y = y.max(0) as usize;
    let src_x = (-x).max(0) as usize;
    let src_y = (-y).max(0) as usize;
    let copy_w = (w as usize - src_x).min(cw as usize - dst_x);
    let copy_h = (h as usize - src_y).min(ch as usize - dst_y);
    let (src_stride, dst_stride) = (w as usize, cw as usize);

    let (Ok(src_px), Ok(dst_px)) = (
        try_cast_slice::<u8, u32>(src.data()),
        try_cast_slice_mut::<u8, u32>(dst.data_mut()),
    ) else {
        debug!("skipping blit of unaligned pixmap");
        return;
    };

    for row in 0..copy_h {
        let s_row = (src_y + row) * src_stride + src_x;
        let d_row = (dst_y + row) * dst_stride + dst_x;
        for i in 0..copy_w {
            let s = src_px[s_row + i];
            let sa = s >> 24;
            if sa == 0 {
                continue;
            }
            if sa == 255 {
                dst_px[d_row + i] = s;
                continue;
            }
            let d = dst_px[d_row + i];
            let inv = 255 - sa;
            let channel = |shift: u32| {
                let sc = (s >> shift) & 0xff;
                let dc = (d >> shift) & 0xff;
                (sc + (dc * inv + 127) / 255).min(255) << shift
            };
            dst_px[d_row + i] = channel(0) | channel(8) | channel(16) | channel(24);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reactime_experiment::RenderCommand;
    use bytemuck::cast_slice;
    use reactime_timing::ManualTimer;

    fn pixel(r: &SkiaRenderer, x: u32, y: u32) -> [u8; 4] {
        let i = ((y * r.width + x) * 4) as usize;
        let d = r.canvas().data();
        [d[i], d[i + 1], d[i + 2], d[i + 3]]
    }

    #[test]
    fn go_square_is_drawn_at_the_center() {
        let mut r = SkiaRenderer::new(320, 240).unwrap();
        let mut scene = Scene::new();
        scene.apply(&RenderCommand::ShowStimulus {
            trial: 0,
            stimulus: Stimulus::Square {
                color: SquareColor::Orange,
            },
        });
        let mut frame = vec![0u8; 320 * 240 * 4];
        let stats = r.render_frame(&scene, &mut frame, &ManualTimer::new()).unwrap();
        assert!(stats.redrawn);
        assert_eq!(pixel(&r, 160, 120), ORANGE);
        assert_eq!(pixel(&r, 5, 5), BACKGROUND);
        assert_eq!(&frame[..4], &BACKGROUND);
    }

    #[test]
    fn unchanged_scene_is_not_redrawn() {
        let mut r = SkiaRenderer::new(64, 64).unwrap();
        let mut scene = Scene::new();
        scene.apply(&RenderCommand::ShowFixation);
        let mut frame = vec![0u8; 64 * 64 * 4];
        let timer = ManualTimer::new();
        assert!(r.render_frame(&scene, &mut frame, &timer).unwrap().redrawn);
        assert!(!r.render_frame(&scene, &mut frame, &timer).unwrap().redrawn);
        assert_eq!(pixel(&r, 32, 32), WHITE);
    }

    #[test]
    fn posner_cue_thickens_the_cued_box() {
        let mut r = SkiaRenderer::new(400, 200).unwrap();
        let mut scene = Scene::new();
        scene.apply(&RenderCommand::ShowCue {
            side: CueSide::Left,
        });
        let mut frame = vec![0u8; 400 * 200 * 4];
        r.render_frame(&scene, &mut frame, &ManualTimer::new()).unwrap();
        // Left box spans x 40..160; a 6px stroke reaches 2px inside the edge.
        assert_eq!(pixel(&r, 42, 100), WHITE);
        assert_ne!(pixel(&r, 242, 100), WHITE);
    }

    #[test]
    fn mismatched_frame_is_an_error() {
        let mut r = SkiaRenderer::new(32, 32).unwrap();
        let mut frame = vec![0u8; 16];
        assert!(r.render_frame(&Scene::new(), &mut frame, &ManualTimer::new()).is_err());
    }

    #[test]
    fn blit_clips_at_the_canvas_edge() {
        let mut dst = Pixmap::new(10, 10).unwrap();
        let mut src = Pixmap::new(4, 4).unwrap();
        src.fill(Color::from_rgba8(255, 0, 0, 255));
        blit_centered(&mut dst, &src, (0.0, 0.0));
        let px: &[u32] = cast_slice(dst.data());
        assert_eq!(px[0], u32::from_le_bytes([255, 0, 0, 255]));
        assert_eq!(px[1], u32::from_le_bytes([255, 0, 0, 255]));
        assert_eq!(px[2], 0);
        assert_eq!(px[10], u32::from_le_bytes([255, 0, 0, 255]));
    }
}
