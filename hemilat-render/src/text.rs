use ab_glyph::{Font, FontVec, Glyph, PxScale, ScaleFont, point};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tiny_skia::{Color, Pixmap, PremultipliedColorU8};

/// Rasterizes `text` on one line into a tight, transparent pixmap.
pub fn render_text_pixmap<F: Font>(text: &str, font_size: f32, font: &F, color: Color) -> Result<Pixmap> {
    let scale = PxScale::from(font_size);
    let sf = font.as_scaled(scale);

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

    let outlines: Vec<_> = glyphs
        .into_iter()
        .filter_map(|g| font.outline_glyph(g))
        .collect();
    if outlines.is_empty() {
        return Pixmap::new(1, 1).context("allocating empty text pixmap");
    }

    let (mut min_x, mut min_y) = (f32::INFINITY, f32::INFINITY);
    let (mut max_x, mut max_y) = (f32::NEG_INFINITY, f32::NEG_INFINITY);
    for out in &outlines {
        let b = out.px_bounds();
        min_x = min_x.min(b.min.x);
        min_y = min_y.min(b.min.y);
        max_x = max_x.max(b.max.x);
        max_y = max_y.max(b.max.y);
    }

    let w = (max_x.ceil() - min_x.floor()).max(1.0) as u32;
    let h = (max_y.ceil() - min_y.floor()).max(1.0) as u32;
    let mut pm = Pixmap::new(w, h).with_context(|| format!("allocating {w}x{h} text pixmap"))?;
    let stride = w as usize;
    let dst = pm.pixels_mut();

    let rgba = color.to_color_u8();
    for out in &outlines {
        let b = out.px_bounds();
        out.draw(|x, y, cov| {
            if cov <= f32::EPSILON {
                return;
            }
            let ix = (x as f32 + b.min.x - min_x).floor() as i64;
            let iy = (y as f32 + b.min.y - min_y).floor() as i64;
            if ix < 0 || iy < 0 || ix >= w as i64 || iy >= h as i64 {
                return;
            }
            let i = iy as usize * stride + ix as usize;

            // Premultiplied source-over.
            let a = (cov * rgba.alpha() as f32 / 255.0).clamp(0.0, 1.0);
            let sa = (a * 255.0) as u8;
            let sr = (rgba.red() as f32 * a) as u8;
            let sg = (rgba.green() as f32 * a) as u8;
            let sb = (rgba.blue() as f32 * a) as u8;
            let bg = dst[i];
            let inv = 1.0 - a;
            let r = sr.saturating_add((bg.red() as f32 * inv) as u8);
            let g = sg.saturating_add((bg.green() as f32 * inv) as u8);
            let bl = sb.saturating_add((bg.blue() as f32 * inv) as u8);
            let al = sa.saturating_add((bg.alpha() as f32 * inv) as u8);
            if let Some(px) = PremultipliedColorU8::from_rgba(r.min(al), g.min(al), bl.min(al), al) {
                dst[i] = px;
            }
        });
    }

    Ok(pm)
}

/// Loaded font plus the pixmaps of every string drawn so far.
pub struct TextCache {
    font: FontVec,
    size_px: f32,
    map: HashMap<(String, [u8; 4]), Arc<Pixmap>>,
}

impl TextCache {
    pub fn new(font: FontVec, size_px: f32) -> Self {
        Self {
            font,
            size_px,
            map: HashMap::new(),
        }
    }

    pub fn load(path: impl AsRef<Path>, size_px: f32) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).with_context(|| format!("reading font {}", path.display()))?;
        let font = FontVec::try_from_vec(bytes).with_context(|| format!("parsing font {}", path.display()))?;
        Ok(Self::new(font, size_px))
    }

    pub fn get_or_render(&mut self, text: &str, color: Color) -> Result<Arc<Pixmap>> {
        let c = color.to_color_u8();
        let key = (text.to_string(), [c.red(), c.green(), c.blue(), c.alpha()]);
        if let Some(pm) = self.map.get(&key) {
            return Ok(Arc::clone(pm));
        }
        let pm = Arc::new(render_text_pixmap(text, self.size_px, &self.font, color)?);
        self.map.insert(key, Arc::clone(&pm));
        Ok(pm)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
