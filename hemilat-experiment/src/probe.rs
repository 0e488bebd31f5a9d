use crate::config::{SessionConfig, secs};
use crate::spurious::SpuriousKeys;
use crate::{physio_sample, tick};
use hemilat_core::{Clip, Device, DeviceResultExt, Devices, Marker, ProbeEvent, SessionError};
use hemilat_timing::{Clock, Deadline};
use rand::Rng;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

/// Gap bounds and playback length of the audio probes.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeTiming {
    pub min_gap: f64,
    pub max_gap: f64,
    pub duration: Duration,
}

impl ProbeTiming {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            min_gap: config.tones.min_gap,
            max_gap: config.tones.max_gap,
            duration: config.probe_duration(),
        }
    }
}

/// Injects audio probes at random moments inside an enclosing wait.
///
/// A probe is only played when its whole playback fits before the enclosing
/// deadline; otherwise the gap is dropped and a new one sampled. Spurious
/// keys are polled on every tick throughout.
#[derive(Debug)]
pub struct ProbeScheduler {
    timing: ProbeTiming,
    poll: Duration,
    next_index: u64,
}

impl ProbeScheduler {
    pub fn new(timing: ProbeTiming, poll: Duration) -> Self {
        Self {
            timing,
            poll,
            next_index: 0,
        }
    }

    /// Index the next played probe will carry.
    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    pub fn sample_gap<R: Rng>(&self, rng: &mut R) -> f64 {
        rng.random_range(self.timing.min_gap..=self.timing.max_gap)
    }

    /// Runs until `enclosing` expires and returns the probes played.
    pub fn run<C: Clock, R: Rng>(
        &mut self,
        enclosing: &Deadline<C>,
        rng: &mut R,
        devices: &mut Devices,
        spurious: &mut SpuriousKeys,
    ) -> Result<Vec<ProbeEvent>, SessionError> {
        let clock = enclosing.clock().clone();
        let mut events = Vec::new();

        while !enclosing.expired() {
            let gap = self.sample_gap(rng);
            debug!("tone delay of {:.3}s", gap);
            let gap_timer = Deadline::new(clock.clone(), secs(gap));

            loop {
                spurious.poll(devices)?;
                if enclosing.expired() {
                    return Ok(events);
                }
                if gap_timer.expired() {
                    break;
                }
                tick(&clock, self.poll, enclosing.time_left().min(gap_timer.time_left()));
            }

            if enclosing.time_left() < self.timing.duration {
                debug!(
                    left = enclosing.remaining(),
                    "not enough time left for a probe, skipping"
                );
                continue;
            }

            events.push(self.play(enclosing, devices, spurious)?);
        }

        Ok(events)
    }

    fn play<C: Clock>(
        &mut self,
        enclosing: &Deadline<C>,
        devices: &mut Devices,
        spurious: &mut SpuriousKeys,
    ) -> Result<ProbeEvent, SessionError> {
        let clock = enclosing.clock();
        let index = self.next_index;

        let pre = physio_sample(clock, devices)?;
        let at = clock.now();
        devices.audio.play_at(Clip::Probe, at).device(Device::Audio)?;
        devices.trigger.send(Marker::Tone).device(Device::Trigger)?;
        devices
            .physiology
            .annotate("Tone", json!({ "toneNumber": index }))
            .device(Device::Physiology)?;

        let playback = Deadline::new(clock.clone(), self.timing.duration);
        loop {
            spurious.poll(devices)?;
            if playback.expired() {
                break;
            }
            tick(clock, self.poll, playback.time_left());
        }
        let post = physio_sample(clock, devices)?;

        info!("tone {} at {:.3}s", index, at.as_secs_f64());
        self.next_index += 1;
        Ok(ProbeEvent {
            index,
            offset: at.saturating_sub(enclosing.started()).as_secs_f64(),
            time: at.as_secs_f64(),
            pre,
            post,
        })
    }
}
