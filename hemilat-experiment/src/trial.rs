use crate::block::MissStreak;
use crate::config::{SessionConfig, secs};
use crate::probe::{ProbeScheduler, ProbeTiming};
use crate::scorer::Scorer;
use crate::spurious::SpuriousKeys;
use crate::{physio_sample, tick};
use hemilat_core::{
    Clip, Device, DeviceResultExt, Devices, Hemifield, KeyPress, Marker, Outcome, PhysioSample,
    ProbeEvent, ResponseStage, SessionError, TrialPhase, TrialRecord,
};
use hemilat_timing::{Clock, Deadline};
use rand::Rng;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Where a trial sits in the session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrialContext {
    pub sequence_number: u64,
    pub block: usize,
    pub side: Hemifield,
}

/// Key press that ended the response window.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub key: KeyPress,
    pub reaction_time: Duration,
}

/// Visible share of the target for a given remaining window time.
pub fn visible_fraction(remaining: f64, max_time: f64) -> f32 {
    if max_time <= 0.0 {
        return 0.0;
    }
    (remaining / max_time).clamp(0.0, 1.0) as f32
}

/// Hit if the press landed while the target was visible, late otherwise.
pub fn classify(response: Option<&Response>, max_time: Duration) -> Outcome {
    match response {
        None => Outcome::Missed,
        Some(r) if r.reaction_time >= max_time => Outcome::LateHit,
        Some(_) => Outcome::Hit,
    }
}

struct Presentation {
    delay: f64,
    probes: Vec<ProbeEvent>,
    coordinates: (f32, f32),
    onset: Duration,
    response: Option<Response>,
    pre_spot: PhysioSample,
    post_spot: PhysioSample,
}

/// Runs single trials end to end: delay with probes and spurious-key
/// capture, the fixed extra wait, the shrinking response window, and
/// finalization into the scorer, the miss streak and the session log.
pub struct TrialEngine<C: Clock, R: Rng> {
    config: Arc<SessionConfig>,
    clock: C,
    rng: R,
    probes: ProbeScheduler,
    phase: TrialPhase,
}

impl<C: Clock, R: Rng> TrialEngine<C, R> {
    pub fn new(config: Arc<SessionConfig>, clock: C, rng: R) -> Self {
        let probes = ProbeScheduler::new(ProbeTiming::from_config(&config), config.poll_interval());
        Self {
            config,
            clock,
            rng,
            probes,
            phase: TrialPhase::Done,
        }
    }

    fn enter(&mut self, phase: TrialPhase) {
        debug!(from = ?self.phase, to = ?phase, "trial phase");
        self.phase = phase;
    }

    /// Delay before target onset, net of the fixed extra wait that follows it.
    pub fn sample_delay(&mut self) -> f64 {
        let fixation = &self.config.fixation;
        self.rng.random_range(fixation.min_delay..=fixation.max_delay) - self.config.task.extra_time
    }

    pub fn run(
        &mut self,
        ctx: TrialContext,
        devices: &mut Devices,
        scorer: &mut Scorer,
        streak: &mut MissStreak,
    ) -> Result<TrialRecord, SessionError> {
        let trial_id = devices.trigger.send_trial_id().device(Device::Trigger)?;
        devices
            .physiology
            .annotate(
                "StartTrial",
                json!({
                    "id": ctx.sequence_number,
                    "block": ctx.block,
                    "showLeft": ctx.side.is_left(),
                }),
            )
            .device(Device::Physiology)?;
        info!(
            "Starting iteration #{} with leftOn={}",
            ctx.sequence_number,
            ctx.side.is_left()
        );

        let mut spurious = SpuriousKeys::new(self.config.keys.quit.clone());
        let shown = match self.present(ctx, devices, &mut spurious) {
            Ok(shown) => shown,
            Err(err) => {
                // An abandoned trial is never logged, but its presses still count.
                scorer.add_extra_keys(spurious.presses().len());
                return Err(err);
            }
        };

        let outcome = classify(shown.response.as_ref(), self.config.max_time());
        let record = TrialRecord {
            sequence_number: ctx.sequence_number,
            trial_id,
            block: ctx.block,
            hemifield: ctx.side,
            delay: shown.delay,
            probes: shown.probes,
            extra_key_presses: spurious.into_presses(),
            coordinates: shown.coordinates,
            start_time: shown.onset.as_secs_f64(),
            outcome,
            reaction_time: shown.response.as_ref().map(|r| r.reaction_time.as_secs_f64()),
            response_key: shown.response.as_ref().map(|r| r.key.key.clone()),
            alarm: None,
            pre_spot: Some(shown.pre_spot),
            post_spot: Some(shown.post_spot),
        };

        let record = self.finalize(record, devices, scorer, streak)?;
        self.enter(TrialPhase::Done);

        if record.response_key.as_deref() == Some(self.config.keys.quit.as_str()) {
            info!("quit key pressed as response");
            return Err(SessionError::QuitRequested);
        }
        Ok(record)
    }

    /// Delay, extra wait, target and feedback: everything up to scoring.
    fn present(
        &mut self,
        ctx: TrialContext,
        devices: &mut Devices,
        spurious: &mut SpuriousKeys,
    ) -> Result<Presentation, SessionError> {
        // DELAY
        self.enter(TrialPhase::Delay);
        let delay = self.sample_delay();
        info!("Starting delay of {:.3} seconds", delay);
        let delay_timer = Deadline::new(self.clock.clone(), secs(delay));
        let probes = self
            .probes
            .run(&delay_timer, &mut self.rng, devices, spurious)?;

        // EXTRA_WAIT
        self.enter(TrialPhase::ExtraWait);
        self.clock.sleep(self.config.extra_time());
        let stale = devices.keys.poll().device(Device::Keyboard)?;
        spurious.handle(stale, devices)?;

        // RESPONSE_WINDOW
        let coordinates = devices.renderer.new_target().device(Device::Renderer)?;
        let pre_spot = physio_sample(&self.clock, devices)?;
        devices
            .physiology
            .annotate(
                "Stim",
                json!({
                    "sequence_number": ctx.sequence_number,
                    "coordinates": [coordinates.0, coordinates.1],
                }),
            )
            .device(Device::Physiology)?;
        let (onset, response) = self.response_window(devices, spurious)?;
        let post_spot = physio_sample(&self.clock, devices)?;

        if let Some(r) = &response {
            let rt = r.reaction_time.as_secs_f64();
            devices
                .physiology
                .annotate(
                    "Response",
                    json!({ "late": r.reaction_time >= self.config.max_time(), "RT": rt }),
                )
                .device(Device::Physiology)?;
            info!("RT: {:.4}", rt);
            devices.renderer.show_result(rt).device(Device::Renderer)?;
            self.clock.sleep(secs(self.config.fixation.score_time));
            devices
                .renderer
                .show_background(ctx.side)
                .device(Device::Renderer)?;
        }

        Ok(Presentation {
            delay,
            probes,
            coordinates,
            onset,
            response,
            pre_spot,
            post_spot,
        })
    }

    /// Shows the shrinking target and waits for the first key press made
    /// after onset. Earlier presses still queued are spurious.
    /// Returns the window onset and the response, if any.
    fn response_window(
        &mut self,
        devices: &mut Devices,
        spurious: &mut SpuriousKeys,
    ) -> Result<(Duration, Option<Response>), SessionError> {
        let max_time = self.config.max_time();
        let extra_time = self.config.extra_time();
        let poll = self.config.poll_interval();

        self.enter(TrialPhase::ResponseWindow(ResponseStage::ActiveShrink));
        let window = Deadline::new(self.clock.clone(), max_time);
        let onset = window.started();
        devices.trigger.send(Marker::Stim).device(Device::Trigger)?;

        loop {
            // Keys first: a press seen on the expiry tick still counts.
            let (early, keys): (Vec<KeyPress>, Vec<KeyPress>) = devices
                .keys
                .poll()
                .device(Device::Keyboard)?
                .into_iter()
                .partition(|key| key.timestamp < onset);
            spurious.handle(early, devices)?;
            if let Some(key) = keys.into_iter().next() {
                devices.trigger.send(Marker::Response).device(Device::Trigger)?;
                let reaction_time = key.timestamp - onset;
                return Ok((onset, Some(Response { key, reaction_time })));
            }

            if window.overrun() >= extra_time {
                return Ok((onset, None));
            }

            let (fraction, until_boundary) = if window.expired() {
                if self.phase == TrialPhase::ResponseWindow(ResponseStage::ActiveShrink) {
                    self.enter(TrialPhase::ResponseWindow(ResponseStage::Grace));
                }
                (0.0, extra_time - window.overrun())
            } else {
                (
                    visible_fraction(window.remaining(), max_time.as_secs_f64()),
                    window.time_left(),
                )
            };
            devices
                .renderer
                .set_shrink_fraction(fraction)
                .device(Device::Renderer)?;

            tick(&self.clock, poll, until_boundary);
        }
    }

    /// Applies outcome bookkeeping and hands the record to the session log.
    pub fn finalize(
        &mut self,
        mut record: TrialRecord,
        devices: &mut Devices,
        scorer: &mut Scorer,
        streak: &mut MissStreak,
    ) -> Result<TrialRecord, SessionError> {
        self.enter(TrialPhase::Finalize);

        match record.outcome {
            Outcome::Missed => {
                info!("missed");
                let alarm = streak.record_miss();
                warn!("Missed: {}", streak.count());
                if alarm {
                    let now = self.clock.now();
                    devices.trigger.send(Marker::Alarm).device(Device::Trigger)?;
                    devices
                        .audio
                        .play_at(Clip::Alarm, now)
                        .device(Device::Audio)?;
                    devices
                        .physiology
                        .annotate("Alarm", json!({ "missed": streak.count() }))
                        .device(Device::Physiology)?;
                    record.alarm = Some(now.as_secs_f64());
                    warn!(
                        "alarm sound after {} consecutive misses (threshold {})",
                        streak.count(),
                        streak.threshold()
                    );
                }
            }
            Outcome::Hit | Outcome::LateHit => streak.reset(),
        }

        scorer.record(&record, self.config.task.min_time);
        devices.log.append(&record).device(Device::SessionLog)?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{Call, SimRig};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn config() -> SessionConfig {
        let mut config = SessionConfig::default();
        config.task.min_time = 0.1;
        config.task.max_time = 0.5;
        config.task.extra_time = 0.5;
        config.fixation.min_delay = 2.0;
        config.fixation.max_delay = 4.0;
        config
    }

    fn engine(rig: &SimRig, config: SessionConfig) -> TrialEngine<hemilat_timing::ManualClock, StdRng> {
        TrialEngine::new(Arc::new(config), rig.clock.clone(), StdRng::seed_from_u64(42))
    }

    fn ctx(sequence_number: u64) -> TrialContext {
        TrialContext {
            sequence_number,
            block: 1,
            side: Hemifield::Left,
        }
    }

    fn run_one(rig: &SimRig, rt: Option<Duration>) -> TrialRecord {
        rig.plan_responses(vec![rt]);
        let mut engine = engine(rig, config());
        let mut devices = rig.devices();
        let mut scorer = Scorer::new();
        let mut streak = MissStreak::new(5);
        engine
            .run(ctx(1), &mut devices, &mut scorer, &mut streak)
            .unwrap()
    }

    #[test]
    fn fraction_is_clamped() {
        assert_eq!(visible_fraction(0.5, 0.5), 1.0);
        assert_eq!(visible_fraction(0.25, 0.5), 0.5);
        assert_eq!(visible_fraction(-0.1, 0.5), 0.0);
        assert_eq!(visible_fraction(0.7, 0.5), 1.0);
    }

    #[test]
    fn delays_stay_within_bounds() {
        let rig = SimRig::new();
        let mut engine = engine(&rig, config());
        for _ in 0..2000 {
            let d = engine.sample_delay();
            assert!((1.5..=3.5).contains(&d), "delay {d}");
        }
    }

    #[test]
    fn press_while_visible_is_a_hit() {
        let rig = SimRig::new();
        let record = run_one(&rig, Some(Duration::from_millis(300)));
        assert_eq!(record.outcome, Outcome::Hit);
        assert!((record.reaction_time.unwrap() - 0.3).abs() < 1e-9);
        assert_eq!(record.response_key.as_deref(), Some("space"));
        assert_eq!(rig.records(), vec![record]);
    }

    #[test]
    fn press_in_grace_window_is_late() {
        let rig = SimRig::new();
        let record = run_one(&rig, Some(Duration::from_millis(600)));
        assert_eq!(record.outcome, Outcome::LateHit);
        assert!((record.reaction_time.unwrap() - 0.6).abs() < 1e-9);
    }

    #[test]
    fn silence_through_grace_is_a_miss() {
        let rig = SimRig::new();
        let record = run_one(&rig, None);
        assert_eq!(record.outcome, Outcome::Missed);
        assert_eq!(record.reaction_time, None);
        assert_eq!(record.response_key, None);
        assert!(
            rig.calls()
                .iter()
                .any(|(t, c)| *c == Call::Fraction(0.0) && t.as_secs_f64() > record.start_time)
        );
        // window closes exactly max_time + extra_time after onset
        let last_fraction = rig
            .calls()
            .iter()
            .filter(|(_, c)| matches!(c, Call::Fraction(_)))
            .map(|(t, _)| *t)
            .last()
            .unwrap();
        assert!(last_fraction.as_secs_f64() < record.start_time + 1.0);
    }

    #[test]
    fn press_on_the_shrink_deadline_counts() {
        let rig = SimRig::new();
        let record = run_one(&rig, Some(Duration::from_millis(500)));
        assert_eq!(record.outcome, Outcome::LateHit);
    }

    #[test]
    fn press_on_the_grace_deadline_counts() {
        let rig = SimRig::new();
        let record = run_one(&rig, Some(Duration::from_millis(1000)));
        assert_eq!(record.outcome, Outcome::LateHit);
        assert!((record.reaction_time.unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn press_after_grace_is_missed() {
        let rig = SimRig::new();
        let record = run_one(&rig, Some(Duration::from_millis(1001)));
        assert_eq!(record.outcome, Outcome::Missed);
    }

    #[test]
    fn shrink_fraction_only_decreases() {
        let rig = SimRig::new();
        run_one(&rig, None);
        let fractions: Vec<f32> = rig
            .calls()
            .into_iter()
            .filter_map(|(_, c)| match c {
                Call::Fraction(f) => Some(f),
                _ => None,
            })
            .collect();
        assert_eq!(fractions.first().copied(), Some(1.0));
        assert!(fractions.windows(2).all(|w| w[1] <= w[0]));
        assert_eq!(fractions.last().copied(), Some(0.0));
    }

    #[test]
    fn keys_during_extra_wait_are_not_responses() {
        let rig = SimRig::new();
        let mut engine = engine(&rig, config());
        let mut devices = rig.devices();
        let mut scorer = Scorer::new();
        let mut streak = MissStreak::new(5);

        // The delay is at least 1.5s; this press lands inside the delay or
        // the extra wait, never inside the response window.
        rig.script_key("space", Duration::from_millis(1250));
        let record = engine
            .run(ctx(1), &mut devices, &mut scorer, &mut streak)
            .unwrap();

        assert_eq!(record.outcome, Outcome::Missed);
        assert_eq!(record.extra_key_presses, vec![1.25]);
        assert_eq!(scorer.extra_keys(), 1);
    }

    #[test]
    fn press_before_onset_is_never_the_response() {
        let rig = SimRig::new();
        let mut config = config();
        // Fixed 1.5s delay with no probes: the target appears at 2.0s.
        config.fixation.max_delay = 2.0;
        config.tones.min_gap = 5.0;
        config.tones.max_gap = 5.0;
        let mut engine = engine(&rig, config);
        let mut devices = rig.devices();
        let mut scorer = Scorer::new();
        let mut streak = MissStreak::new(5);

        // The pre-target sample takes 10ms; the press lands inside it.
        rig.set_sample_latency(Duration::from_millis(10));
        rig.script_key("space", Duration::from_millis(2005));
        let record = engine
            .run(ctx(1), &mut devices, &mut scorer, &mut streak)
            .unwrap();

        assert!((record.start_time - 2.01).abs() < 1e-9);
        assert_eq!(record.outcome, Outcome::Missed);
        assert_eq!(record.reaction_time, None);
        assert_eq!(record.extra_key_presses.len(), 1);
        assert!((record.extra_key_presses[0] - 2.005).abs() < 1e-9);
        assert_eq!(rig.count(|c| *c == Call::Trigger(Marker::BadResponse)), 1);
        assert_eq!(rig.count(|c| *c == Call::Trigger(Marker::Response)), 0);
        assert_eq!(scorer.extra_keys(), 1);
    }

    #[test]
    fn quit_mid_delay_still_counts_earlier_presses() {
        let rig = SimRig::new();
        let mut engine = engine(&rig, config());
        let mut devices = rig.devices();
        let mut scorer = Scorer::new();
        let mut streak = MissStreak::new(5);

        rig.script_key("f", Duration::from_millis(400));
        rig.script_key("j", Duration::from_millis(700));
        rig.script_key("q", Duration::from_millis(1000));
        let err = engine
            .run(ctx(1), &mut devices, &mut scorer, &mut streak)
            .unwrap_err();

        assert!(err.is_quit());
        assert!(rig.records().is_empty());
        assert_eq!(scorer.extra_keys(), 2);
        assert_eq!(scorer.summary().extra_keys, 2);
    }

    #[test]
    fn quit_as_response_still_finalizes() {
        let rig = SimRig::new();
        rig.set_response_key("q");
        rig.plan_responses(vec![Some(Duration::from_millis(250))]);
        let mut engine = engine(&rig, config());
        let mut devices = rig.devices();
        let mut scorer = Scorer::new();
        let mut streak = MissStreak::new(5);

        let err = engine
            .run(ctx(1), &mut devices, &mut scorer, &mut streak)
            .unwrap_err();

        assert!(err.is_quit());
        let records = rig.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].outcome, Outcome::Hit);
        assert_eq!(records[0].response_key.as_deref(), Some("q"));
        assert_eq!(scorer.hits(), 1);
    }

    #[test]
    fn finalize_resets_the_streak_on_response() {
        let rig = SimRig::new();
        let mut engine = engine(&rig, config());
        let mut devices = rig.devices();
        let mut scorer = Scorer::new();
        let mut streak = MissStreak::new(5);
        streak.record_miss();
        streak.record_miss();

        rig.plan_responses(vec![Some(Duration::from_millis(200))]);
        engine
            .run(ctx(1), &mut devices, &mut scorer, &mut streak)
            .unwrap();
        assert_eq!(streak.count(), 0);
    }

    #[test]
    fn failing_log_is_fatal() {
        let rig = SimRig::new();
        rig.fail_log_after(0);
        let mut engine = engine(&rig, config());
        let mut devices = rig.devices();
        let mut scorer = Scorer::new();
        let mut streak = MissStreak::new(5);

        let err = engine
            .run(ctx(1), &mut devices, &mut scorer, &mut streak)
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::Device {
                device: Device::SessionLog,
                ..
            }
        ));
    }
}
