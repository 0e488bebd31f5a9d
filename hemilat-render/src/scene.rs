use hemilat_core::Hemifield;

/// Frames the fixation box stays lit after an unexpected key press
/// (about 0.1 s at 60 Hz).
pub const FLASH_FRAMES: u32 = 6;

/// What fills the screen underneath the overlays.
#[derive(Debug, Clone, PartialEq)]
pub enum Screen {
    Blank,
    /// One lit half with the fixation box in the middle.
    Task(Hemifield),
    Cue(String),
}

/// The shrinking target. Coordinates are normalized to `[-1, 1]` from the
/// screen centre, y pointing up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spot {
    pub x: f32,
    pub y: f32,
    pub fraction: f32,
}

/// Everything the display shows at one instant.
///
/// Written by the experiment side, read once per frame by the renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub screen: Screen,
    pub side: Hemifield,
    pub spot: Option<Spot>,
    pub result: Option<f64>,
    pub flash_frames: u32,
}

impl Default for Scene {
    fn default() -> Self {
        Self {
            screen: Screen::Blank,
            side: Hemifield::Left,
            spot: None,
            result: None,
            flash_frames: 0,
        }
    }
}

impl Scene {
    pub fn show_blank(&mut self) {
        self.screen = Screen::Blank;
        self.spot = None;
        self.result = None;
    }

    pub fn show_background(&mut self, side: Hemifield) {
        self.side = side;
        self.screen = Screen::Task(side);
        self.spot = None;
        self.result = None;
    }

    pub fn show_cue(&mut self, text: impl Into<String>) {
        self.screen = Screen::Cue(text.into());
        self.spot = None;
        self.result = None;
    }

    pub fn start_spot(&mut self, x: f32, y: f32) {
        self.spot = Some(Spot { x, y, fraction: 1.0 });
        self.result = None;
    }

    pub fn shrink_spot(&mut self, fraction: f32) {
        if let Some(spot) = self.spot.as_mut() {
            spot.fraction = fraction.clamp(0.0, 1.0);
        }
    }

    /// Replaces the target with the reaction time feedback.
    pub fn show_result(&mut self, reaction_time: f64) {
        self.spot = None;
        self.result = Some(reaction_time);
    }

    pub fn flash(&mut self) {
        self.flash_frames = FLASH_FRAMES;
    }

    pub fn is_flashing(&self) -> bool {
        self.flash_frames > 0
    }

    /// Called once per presented frame.
    pub fn advance_frame(&mut self) {
        self.flash_frames = self.flash_frames.saturating_sub(1);
    }
}
