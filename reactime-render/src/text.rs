use ab_glyph::{Font, FontVec, Glyph, PxScale, ScaleFont, point};
use std::collections::HashMap;
use std::sync::Arc;
use string_cache::DefaultAtom as Atom;
use tiny_skia::{Pixmap, PremultipliedColorU8};

/// Cached pixmaps beyond this are dropped wholesale. The PVT counter alone
/// renders up to a thousand distinct strings per round.
const MAX_ENTRIES: usize = 4_096;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TextKey {
    text: Atom,
    size_px: u32,
    rgba: [u8; 4],
}

/// Rasterised strings keyed by interned text, size and color.
pub struct TextCache {
    font: FontVec,
    map: HashMap<TextKey, Arc<Pixmap>>,
}

impl TextCache {
    pub fn new(font: FontVec) -> Self {
        Self {
            font,
            map: HashMap::new(),
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> anyhow::Result<Self> {
        let font = FontVec::try_from_vec(bytes)?;
        Ok(Self::new(font))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// `None` for strings with no visible glyphs.
    pub fn get_or_render(&mut self, text: &str, size_px: u32, rgba: [u8; 4]) -> Option<Arc<Pixmap>> {
        let key = TextKey {
            text: Atom::from(text),
            size_px,
            rgba,
        };
        if let Some(pm) = self.map.get(&key) {
            return Some(Arc::clone(pm));
        }
        let pm = Arc::new(render_text_pixmap(text, size_px as f32, &self.font, rgba)?);
        if self.map.len() >= MAX_ENTRIES {
            self.map.clear();
        }
        self.map.insert(key, Arc::clone(&pm));
        Some(pm)
    }
}

pub fn render_text_pixmap<F: Font>(text: &str, font_size: f32, font: &F, rgba: [u8; 4]) -> Option<Pixmap> {
    let scale = PxScale::from(font_size);
    let sf = font.as_scaled(scale);

    // Baseline sits at the ascent so every glyph lands at y >= 0.
    let mut pen_x = 0.0f32;
    let mut glyphs = Vec::<Glyph>::new();
    for ch in text.chars() {
        let id = font.glyph_id(ch);
        if let Some(prev) = glyphs.last() {
            pen_x += sf.kern(prev.id, id);
        }
        glyphs.push(Glyph {
            id,
            scale,
            position: point(pen_x, sf.ascent()),
        });
        pen_x += sf.h_advance(id);
    }

    let outlined: Vec<_> = glyphs
        .into_iter()
        .filter_map(|g| font.outline_glyph(g))
        .collect();
    let mut bounds = outlined.iter().map(|o| o.px_bounds());
    let first = bounds.next()?;
    let (min_x, min_y, max_x, max_y) = bounds.fold(
        (first.min.x, first.min.y, first.max.x, first.max.y),
        |(x0, y0, x1, y1), b| (x0.min(b.min.x), y0.min(b.min.y), x1.max(b.max.x), y1.max(b.max.y)),
    );

    let w = (max_x.ceil() - min_x.floor()).max(1.0) as u32;
    let h = (max_y.ceil() - min_y.floor()).max(1.0) as u32;
    // Fresh pixmaps are transparent black.
    let mut pm = Pixmap::new(w, h)?;
    let stride = w as usize;
    let dst = pm.pixels_mut();

    for out in &outlined {
        let b = out.px_bounds();
        out.draw(|x, y, cov| {
            if cov <= f32::EPSILON {
                return;
            }
            let ix = (x as f32 + b.min.x - min_x).floor() as i32;
            let iy = (y as f32 + b.min.y - min_y).floor() as i32;
            if ix < 0 || iy < 0 || ix >= w as i32 || iy >= h as i32 {
                return;
            }
            let i = iy as usize * stride + ix as usize;

            let a = (cov * rgba[3] as f32 / 255.0).clamp(0.0, 1.0);
            let sa = (a * 255.0) as u8;
            let bg = dst[i];
            // Source over, premultiplied: out = src + bg * (1 - src.a).
            let inv = 1.0 - a;
            let blend = |s: u8, d: u8| ((s as f32 * a) as u8).saturating_add((d as f32 * inv) as u8);
            let r = blend(rgba[0], bg.red());
            let g = blend(rgba[1], bg.green());
            let bl = blend(rgba[2], bg.blue());
            let al = sa.saturating_add((bg.alpha() as f32 * inv) as u8);
            if let Some(px) = PremultipliedColorU8::from_rgba(r.min(al), g.min(al), bl.min(al), al) {
                dst[i] = px;
            }
        });
    }

    Some(pm)
}

/// Greedy word wrap on character count.
pub fn wrap(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line = String::new();
    for word in text.split_whitespace() {
        if !line.is_empty() && line.chars().count() + 1 + word.chars().count() > max_chars {
            lines.push(std::mem::take(&mut line));
        }
        if !line.is_empty() {
            line.push(' ');
        }
        line.push_str(word);
    }
    if !line.is_empty() {
        lines.push(line);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_breaks_on_word_boundaries() {
        let lines = wrap("Press SPACE as soon as the counter appears on screen", 20);
        assert_eq!(lines, ["Press SPACE as soon", "as the counter", "appears on screen"]);
        assert!(wrap("   ", 10).is_empty());
    }

    #[test]
    fn overlong_word_gets_its_own_line() {
        let lines = wrap("a supercalifragilistic b", 8);
        assert_eq!(lines, ["a", "supercalifragilistic", "b"]);
    }

    #[test]
    fn invalid_font_bytes_are_rejected() {
        assert!(TextCache::from_bytes(vec![0, 1, 2, 3]).is_err());
    }
}
