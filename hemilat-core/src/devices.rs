//! Capabilities the timing core drives. Every call is synchronous and must
//! return within about one display frame; failures are reported through
//! `anyhow` and become fatal session errors in the core.

use crate::stimulus::{Clip, Hemifield, KeyPress, Marker};
use crate::trial::TrialRecord;
use anyhow::Result;
use std::time::Duration;

pub trait Renderer {
    fn show_background(&mut self, side: Hemifield) -> Result<()>;
    fn show_blank(&mut self) -> Result<()>;
    /// Places a fresh target inside the attended hemifield and returns its
    /// coordinates.
    fn new_target(&mut self) -> Result<(f32, f32)>;
    /// Visible fraction of the target in `[0, 1]`; 0 hides it.
    fn set_shrink_fraction(&mut self, fraction: f32) -> Result<()>;
    /// Displays the reaction time in seconds as feedback.
    fn show_result(&mut self, reaction_time: f64) -> Result<()>;
    fn show_cue(&mut self, text: &str) -> Result<()>;
    fn flash_invalid_input(&mut self) -> Result<()>;
}

pub trait TriggerEmitter {
    fn send(&mut self, marker: Marker) -> Result<()>;
    /// Emits a per-trial correlation id and returns it.
    fn send_trial_id(&mut self) -> Result<u64>;
    fn reset(&mut self) -> Result<()>;
}

pub trait PhysiologyRecorder {
    fn start_recording(&mut self) -> Result<()>;
    fn stop_recording(&mut self) -> Result<()>;
    /// Latest reading; the core never looks inside it.
    fn sample(&mut self) -> Result<serde_json::Value>;
    fn annotate(&mut self, label: &str, payload: serde_json::Value) -> Result<()>;
}

pub trait KeySource {
    /// Drains every key pressed since the previous poll. Never blocks.
    fn poll(&mut self) -> Result<Vec<KeyPress>>;
}

pub trait AudioPlayer {
    /// Schedules `clip` at session time `at`. Fire and forget.
    fn play_at(&mut self, clip: Clip, at: Duration) -> Result<()>;
}

pub trait SessionLog {
    fn append(&mut self, record: &TrialRecord) -> Result<()>;
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// The full set of collaborators a session runs against.
pub struct Devices {
    pub renderer: Box<dyn Renderer>,
    pub trigger: Box<dyn TriggerEmitter>,
    pub physiology: Box<dyn PhysiologyRecorder>,
    pub keys: Box<dyn KeySource>,
    pub audio: Box<dyn AudioPlayer>,
    pub log: Box<dyn SessionLog>,
}
