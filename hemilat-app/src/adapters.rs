//! Device implementations backing a live session: the shared scene drawn by
//! the window thread, keys forwarded from the event loop, and logging
//! stand-ins for the trigger box, eye tracker and audio output.

use anyhow::{Result, anyhow};
use hemilat_core::{
    AudioPlayer, Clip, Hemifield, KeyPress, KeySource, Marker, PhysiologyRecorder, Renderer,
    TriggerEmitter,
};
use hemilat_render::Scene;
use hemilat_timing::Clock;
use rand::Rng;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::mpsc::{Receiver, TryRecvError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

pub type SharedScene = Arc<Mutex<Scene>>;

fn lock(scene: &SharedScene) -> Result<MutexGuard<'_, Scene>> {
    scene.lock().map_err(|_| anyhow!("scene lock poisoned"))
}

/// Normalized target position inside the attended half, clear of the
/// fixation box and the screen edge.
pub fn target_position<R: Rng>(rng: &mut R, side: Hemifield) -> (f32, f32) {
    let x = rng.random_range(0.15f32..=0.85);
    let y = rng.random_range(-0.7f32..=0.7);
    if side.is_left() { (-x, y) } else { (x, y) }
}

pub struct SceneDisplay<R: Rng> {
    scene: SharedScene,
    rng: R,
}

impl<R: Rng> SceneDisplay<R> {
    pub fn new(scene: SharedScene, rng: R) -> Self {
        Self { scene, rng }
    }
}

impl<R: Rng> Renderer for SceneDisplay<R> {
    fn show_background(&mut self, side: Hemifield) -> Result<()> {
        lock(&self.scene)?.show_background(side);
        Ok(())
    }

    fn show_blank(&mut self) -> Result<()> {
        lock(&self.scene)?.show_blank();
        Ok(())
    }

    fn new_target(&mut self) -> Result<(f32, f32)> {
        let mut scene = lock(&self.scene)?;
        let (x, y) = target_position(&mut self.rng, scene.side);
        scene.start_spot(x, y);
        Ok((x, y))
    }

    fn set_shrink_fraction(&mut self, fraction: f32) -> Result<()> {
        lock(&self.scene)?.shrink_spot(fraction);
        Ok(())
    }

    fn show_result(&mut self, reaction_time: f64) -> Result<()> {
        lock(&self.scene)?.show_result(reaction_time);
        Ok(())
    }

    fn show_cue(&mut self, text: &str) -> Result<()> {
        lock(&self.scene)?.show_cue(text);
        Ok(())
    }

    fn flash_invalid_input(&mut self) -> Result<()> {
        lock(&self.scene)?.flash();
        Ok(())
    }
}

/// Keys stamped by the window thread on the shared clock.
pub struct ChannelKeys {
    rx: Receiver<KeyPress>,
}

impl ChannelKeys {
    pub fn new(rx: Receiver<KeyPress>) -> Self {
        Self { rx }
    }
}

impl KeySource for ChannelKeys {
    fn poll(&mut self) -> Result<Vec<KeyPress>> {
        let mut keys = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(key) => keys.push(key),
                Err(TryRecvError::Empty) => return Ok(keys),
                Err(TryRecvError::Disconnected) if !keys.is_empty() => return Ok(keys),
                Err(TryRecvError::Disconnected) => return Err(anyhow!("keyboard channel closed")),
            }
        }
    }
}

/// Logs every marker with its numeric code.
pub struct LoggingTrigger {
    codes: BTreeMap<&'static str, u8>,
    next_trial_id: u64,
}

impl LoggingTrigger {
    pub fn new(codes: BTreeMap<&'static str, u8>) -> Self {
        Self {
            codes,
            next_trial_id: 1,
        }
    }

    pub fn code(&self, marker: Marker) -> Option<u8> {
        self.codes.get(marker.label()).copied()
    }
}

impl TriggerEmitter for LoggingTrigger {
    fn send(&mut self, marker: Marker) -> Result<()> {
        let code = self
            .code(marker)
            .ok_or_else(|| anyhow!("no trigger code for {marker}"))?;
        info!(target: "trigger", code, "{}", marker);
        Ok(())
    }

    fn send_trial_id(&mut self) -> Result<u64> {
        let id = self.next_trial_id;
        self.next_trial_id += 1;
        info!(target: "trigger", id, "trial id");
        Ok(id)
    }

    fn reset(&mut self) -> Result<()> {
        debug!(target: "trigger", "reset");
        Ok(())
    }
}

/// Stands in for the eye tracker: samples carry only the clock time.
pub struct LoggingPhysiology<C: Clock> {
    clock: C,
    recording: bool,
}

impl<C: Clock> LoggingPhysiology<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            recording: false,
        }
    }
}

impl<C: Clock> PhysiologyRecorder for LoggingPhysiology<C> {
    fn start_recording(&mut self) -> Result<()> {
        self.recording = true;
        info!(target: "physiology", "recording started");
        Ok(())
    }

    fn stop_recording(&mut self) -> Result<()> {
        self.recording = false;
        info!(target: "physiology", "recording stopped");
        Ok(())
    }

    fn sample(&mut self) -> Result<Value> {
        Ok(json!({ "t": self.clock.now().as_secs_f64(), "recording": self.recording }))
    }

    fn annotate(&mut self, label: &str, payload: Value) -> Result<()> {
        debug!(target: "physiology", %payload, "{}", label);
        Ok(())
    }
}

pub struct LoggingAudio;

impl AudioPlayer for LoggingAudio {
    fn play_at(&mut self, clip: Clip, at: Duration) -> Result<()> {
        debug!(target: "audio", ?clip, at = at.as_secs_f64(), "play");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::AppSettings;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::sync::mpsc;

    #[test]
    fn targets_land_in_the_attended_half() {
        let mut rng = StdRng::seed_from_u64(17);
        for _ in 0..500 {
            let (x, y) = target_position(&mut rng, Hemifield::Left);
            assert!((-0.85..=-0.15).contains(&x));
            assert!((-0.7..=0.7).contains(&y));
            let (x, _) = target_position(&mut rng, Hemifield::Right);
            assert!((0.15..=0.85).contains(&x));
        }
    }

    #[test]
    fn renderer_updates_the_shared_scene() {
        let scene = SharedScene::default();
        let mut renderer = SceneDisplay::new(Arc::clone(&scene), StdRng::seed_from_u64(1));
        renderer.show_background(Hemifield::Right).unwrap();
        let (x, y) = renderer.new_target().unwrap();
        renderer.set_shrink_fraction(0.25).unwrap();

        let spot = scene.lock().unwrap().spot.unwrap();
        assert!(x > 0.0);
        assert_eq!((spot.x, spot.y, spot.fraction), (x, y, 0.25));
    }

    #[test]
    fn keys_drain_in_arrival_order() {
        let (tx, rx) = mpsc::channel();
        let mut keys = ChannelKeys::new(rx);
        tx.send(KeyPress::new("a", Duration::from_millis(1))).unwrap();
        tx.send(KeyPress::new("b", Duration::from_millis(2))).unwrap();

        let names: Vec<String> = keys.poll().unwrap().into_iter().map(|k| k.key).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(keys.poll().unwrap().is_empty());

        drop(tx);
        assert!(keys.poll().is_err());
    }

    #[test]
    fn every_marker_has_a_code() {
        let trigger = LoggingTrigger::new(AppSettings::default().trigger_codes());
        for marker in Marker::ALL {
            assert!(trigger.code(marker).is_some(), "{marker}");
        }
        assert_eq!(trigger.code(Marker::Tone), Some(12));
    }
}
