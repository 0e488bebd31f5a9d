use crate::scene::{Scene, Screen, Spot};
use crate::text::TextCache;
use anyhow::{Context, Result, ensure};
use hemilat_core::Hemifield;
use hemilat_timing::{Clock, FrameTimes};
use std::time::Duration;
use tiny_skia::{Color, FillRule, Paint, PathBuilder, Pixmap, PixmapPaint, Rect, Transform};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameStats {
    pub draw: Duration,
    pub copy: Duration,
    pub total: Duration,
}

/// Colours and sizes of the task display.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneStyle {
    pub lit: [u8; 4],
    pub dark: [u8; 4],
    pub spot: [u8; 4],
    pub fixation_box: [u8; 4],
    pub fixation_flash: [u8; 4],
    pub on_time: [u8; 4],
    pub late: [u8; 4],
    pub text: [u8; 4],
    /// Box size as a fraction of the screen width.
    pub box_size: (f32, f32),
    /// Full spot radius as a fraction of the screen width.
    pub spot_radius: f32,
    /// Feedback above this reaction time is drawn in the late colour.
    pub late_after: f64,
}

impl Default for SceneStyle {
    fn default() -> Self {
        Self {
            lit: [0xF7, 0xF7, 0xF7, 255],
            dark: [0, 0, 0, 255],
            spot: [0x40, 0x40, 0x40, 255],
            fixation_box: [255, 0, 0, 255],
            fixation_flash: [255, 255, 255, 255],
            on_time: [0, 128, 0, 255],
            late: [255, 255, 0, 255],
            text: [255, 255, 255, 255],
            box_size: (0.04, 0.02),
            spot_radius: 0.02,
            late_after: 0.5,
        }
    }
}

fn color([r, g, b, a]: [u8; 4]) -> Color {
    Color::from_rgba8(r, g, b, a)
}

fn paint(rgba: [u8; 4]) -> Paint<'static> {
    let mut p = Paint::default();
    p.set_color(color(rgba));
    p.anti_alias = true;
    p
}

/// Draws a [`Scene`] into an offscreen pixmap and copies it to an RGBA
/// frame buffer.
pub struct SceneRenderer {
    width: u32,
    height: u32,
    canvas: Pixmap,
    style: SceneStyle,
    text: Option<TextCache>,
    draw_times: FrameTimes,
}

impl SceneRenderer {
    pub fn new(width: u32, height: u32, style: SceneStyle, text: Option<TextCache>) -> Result<Self> {
        let canvas = Pixmap::new(width.max(1), height.max(1))
            .with_context(|| format!("allocating {width}x{height} canvas"))?;
        Ok(Self {
            width: width.max(1),
            height: height.max(1),
            canvas,
            style,
            text,
            draw_times: FrameTimes::default(),
        })
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        self.canvas = Pixmap::new(width.max(1), height.max(1))
            .with_context(|| format!("allocating {width}x{height} canvas"))?;
        self.width = width.max(1);
        self.height = height.max(1);
        debug!(width, height, "canvas resized");
        Ok(())
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn draw_times(&self) -> &FrameTimes {
        &self.draw_times
    }

    /// Pixel position of normalized scene coordinates.
    pub fn to_pixels(&self, x: f32, y: f32) -> (f32, f32) {
        let (w, h) = (self.width as f32, self.height as f32);
        (w * 0.5 * (1.0 + x), h * 0.5 * (1.0 - y))
    }

    pub fn render<C: Clock>(&mut self, scene: &Scene, frame: &mut [u8], clock: &C) -> Result<FrameStats> {
        let start = clock.now();
        self.draw(scene)?;
        let draw = clock.elapsed(start);

        let copy_start = clock.now();
        let data = self.canvas.data();
        ensure!(
            frame.len() == data.len(),
            "frame buffer holds {} bytes, canvas {}",
            frame.len(),
            data.len()
        );
        // The canvas is fully opaque, so premultiplied equals straight RGBA.
        frame.copy_from_slice(data);
        let copy = clock.elapsed(copy_start);

        self.draw_times.record(draw);
        Ok(FrameStats {
            draw,
            copy,
            total: clock.elapsed(start),
        })
    }

    pub fn draw(&mut self, scene: &Scene) -> Result<()> {
        self.canvas.fill(color(self.style.dark));
        match &scene.screen {
            Screen::Blank => {}
            Screen::Cue(text) => {
                let (cx, cy) = self.to_pixels(0.0, 0.0);
                self.blit_text(text, self.style.text, (cx, cy))?;
            }
            Screen::Task(side) => {
                self.draw_hemifield(*side);
                self.draw_fixation(scene.is_flashing());
                if let Some(spot) = scene.spot {
                    self.draw_spot(spot);
                }
                if let Some(rt) = scene.result {
                    let rgba = if rt > self.style.late_after {
                        self.style.late
                    } else {
                        self.style.on_time
                    };
                    let (cx, cy) = self.to_pixels(0.0, 0.25);
                    self.blit_text(&format!("{:.0}", rt * 1000.0), rgba, (cx, cy))?;
                }
            }
        }
        Ok(())
    }

    fn draw_hemifield(&mut self, side: Hemifield) {
        let half = self.width as f32 * 0.5;
        let x = if side.is_left() { 0.0 } else { half };
        if let Some(rect) = Rect::from_xywh(x, 0.0, half, self.height as f32) {
            self.canvas
                .fill_rect(rect, &paint(self.style.lit), Transform::identity(), None);
        }
    }

    fn draw_fixation(&mut self, flashing: bool) {
        let w = self.width as f32 * self.style.box_size.0;
        let h = self.width as f32 * self.style.box_size.1;
        let (cx, cy) = self.to_pixels(0.0, 0.0);
        let rgba = if flashing {
            self.style.fixation_flash
        } else {
            self.style.fixation_box
        };
        if let Some(rect) = Rect::from_xywh(cx - w * 0.5, cy - h * 0.5, w, h) {
            self.canvas
                .fill_rect(rect, &paint(rgba), Transform::identity(), None);
        }
    }

    fn draw_spot(&mut self, spot: Spot) {
        let radius = self.width as f32 * self.style.spot_radius * spot.fraction;
        if radius < 0.5 {
            return;
        }
        let (cx, cy) = self.to_pixels(spot.x, spot.y);
        if let Some(path) = PathBuilder::from_circle(cx, cy, radius) {
            self.canvas.fill_path(
                &path,
                &paint(self.style.spot),
                FillRule::Winding,
                Transform::identity(),
                None,
            );
        }
    }

    /// Draws `text` centred on `center`. Without a font the text is only
    /// logged.
    fn blit_text(&mut self, text: &str, rgba: [u8; 4], center: (f32, f32)) -> Result<()> {
        let Some(cache) = self.text.as_mut() else {
            debug!(text, "no font loaded, text not drawn");
            return Ok(());
        };
        let pm = cache.get_or_render(text, color(rgba))?;
        let x = (center.0 - pm.width() as f32 * 0.5).round() as i32;
        let y = (center.1 - pm.height() as f32 * 0.5).round() as i32;
        self.canvas.draw_pixmap(
            x,
            y,
            Pixmap::as_ref(&pm),
            &PixmapPaint::default(),
            Transform::identity(),
            None,
        );
        Ok(())
    }
}
