//! In-memory collaborators running on a [`ManualClock`].
//!
//! Used by the test suites and by the app's dry-run mode. Every device call
//! is appended to a shared call log stamped with the clock time, key
//! presses can be scripted at absolute times, and a responder decides how
//! long the simulated participant takes to answer each target.

use anyhow::{Result, bail};
use hemilat_core::{
    AudioPlayer, Clip, Devices, Hemifield, KeyPress, KeySource, Marker, PhysiologyRecorder,
    Renderer, SessionLog, TrialRecord, TriggerEmitter,
};
use hemilat_timing::{Clock, ManualClock};
use serde_json::json;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Background(Hemifield),
    Blank,
    Target((f32, f32)),
    Fraction(f32),
    Result(f64),
    Cue(String),
    Flash,
    Trigger(Marker),
    TrialId(u64),
    TriggerReset,
    Play(Clip),
    StartRecording,
    StopRecording,
    Annotate(String),
    Sample,
    LogFlush,
}

type Responder = Box<dyn FnMut(usize) -> Option<Duration>>;

#[derive(Default)]
struct Failures {
    log_after: Option<usize>,
    recording_start: bool,
}

struct SimState {
    calls: Vec<(Duration, Call)>,
    records: Vec<TrialRecord>,
    scripted: Vec<KeyPress>,
    pending: Option<KeyPress>,
    responder: Option<Responder>,
    response_key: String,
    targets: usize,
    side: Hemifield,
    next_trial_id: u64,
    sample_latency: Duration,
    failures: Failures,
}

/// Handle owning the simulated time line and the shared device state.
#[derive(Clone)]
pub struct SimRig {
    pub clock: ManualClock,
    state: Rc<RefCell<SimState>>,
}

impl SimRig {
    pub fn new() -> Self {
        Self::with_clock(ManualClock::new())
    }

    pub fn with_clock(clock: ManualClock) -> Self {
        Self {
            clock,
            state: Rc::new(RefCell::new(SimState {
                calls: Vec::new(),
                records: Vec::new(),
                scripted: Vec::new(),
                pending: None,
                responder: None,
                response_key: "space".to_string(),
                targets: 0,
                side: Hemifield::Left,
                next_trial_id: 1,
                sample_latency: Duration::ZERO,
                failures: Failures::default(),
            })),
        }
    }

    /// Queues a key press at absolute session time `at`.
    pub fn script_key(&self, key: &str, at: Duration) {
        let mut state = self.state.borrow_mut();
        state.scripted.push(KeyPress::new(key, at));
        state.scripted.sort_by_key(|k| k.timestamp);
    }

    /// Reaction times per target, in onset order. `None` or running past
    /// the plan means the participant ignores that target.
    pub fn plan_responses(&self, plan: Vec<Option<Duration>>) {
        self.set_responder(move |target| plan.get(target).copied().flatten());
    }

    pub fn set_responder(&self, responder: impl FnMut(usize) -> Option<Duration> + 'static) {
        self.state.borrow_mut().responder = Some(Box::new(responder));
    }

    pub fn set_response_key(&self, key: &str) {
        self.state.borrow_mut().response_key = key.to_string();
    }

    /// Time every physiology sample takes to come back.
    pub fn set_sample_latency(&self, latency: Duration) {
        self.state.borrow_mut().sample_latency = latency;
    }

    /// Makes the session log fail on every append after the first `n`.
    pub fn fail_log_after(&self, n: usize) {
        self.state.borrow_mut().failures.log_after = Some(n);
    }

    pub fn fail_recording_start(&self) {
        self.state.borrow_mut().failures.recording_start = true;
    }

    pub fn devices(&self) -> Devices {
        let device = || SimDevice {
            clock: self.clock.clone(),
            state: Rc::clone(&self.state),
        };
        Devices {
            renderer: Box::new(device()),
            trigger: Box::new(device()),
            physiology: Box::new(device()),
            keys: Box::new(device()),
            audio: Box::new(device()),
            log: Box::new(device()),
        }
    }

    pub fn calls(&self) -> Vec<(Duration, Call)> {
        self.state.borrow().calls.clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.state.borrow().calls.iter().filter(|(_, c)| pred(c)).count()
    }

    pub fn records(&self) -> Vec<TrialRecord> {
        self.state.borrow().records.clone()
    }
}

impl Default for SimRig {
    fn default() -> Self {
        Self::new()
    }
}

struct SimDevice {
    clock: ManualClock,
    state: Rc<RefCell<SimState>>,
}

impl SimDevice {
    fn push(&self, call: Call) {
        let now = self.clock.now();
        self.state.borrow_mut().calls.push((now, call));
    }
}

impl Renderer for SimDevice {
    fn show_background(&mut self, side: Hemifield) -> Result<()> {
        self.state.borrow_mut().side = side;
        self.push(Call::Background(side));
        Ok(())
    }

    fn show_blank(&mut self) -> Result<()> {
        self.push(Call::Blank);
        Ok(())
    }

    fn new_target(&mut self) -> Result<(f32, f32)> {
        let now = self.clock.now();
        let coords = {
            let mut state = self.state.borrow_mut();
            let target = state.targets;
            state.targets += 1;
            let rt = state.responder.as_mut().and_then(|respond| respond(target));
            let key = state.response_key.clone();
            state.pending = rt.map(|rt| KeyPress::new(key, now + rt));
            if state.side.is_left() { (-0.5, 0.0) } else { (0.5, 0.0) }
        };
        self.push(Call::Target(coords));
        Ok(coords)
    }

    fn set_shrink_fraction(&mut self, fraction: f32) -> Result<()> {
        self.push(Call::Fraction(fraction));
        Ok(())
    }

    fn show_result(&mut self, reaction_time: f64) -> Result<()> {
        self.push(Call::Result(reaction_time));
        Ok(())
    }

    fn show_cue(&mut self, text: &str) -> Result<()> {
        self.push(Call::Cue(text.to_string()));
        Ok(())
    }

    fn flash_invalid_input(&mut self) -> Result<()> {
        self.push(Call::Flash);
        Ok(())
    }
}

impl TriggerEmitter for SimDevice {
    fn send(&mut self, marker: Marker) -> Result<()> {
        self.push(Call::Trigger(marker));
        Ok(())
    }

    fn send_trial_id(&mut self) -> Result<u64> {
        let id = {
            let mut state = self.state.borrow_mut();
            let id = state.next_trial_id;
            state.next_trial_id += 1;
            id
        };
        self.push(Call::TrialId(id));
        Ok(id)
    }

    fn reset(&mut self) -> Result<()> {
        self.push(Call::TriggerReset);
        Ok(())
    }
}

impl PhysiologyRecorder for SimDevice {
    fn start_recording(&mut self) -> Result<()> {
        if self.state.borrow().failures.recording_start {
            bail!("eye tracker did not answer");
        }
        self.push(Call::StartRecording);
        Ok(())
    }

    fn stop_recording(&mut self) -> Result<()> {
        self.push(Call::StopRecording);
        Ok(())
    }

    fn sample(&mut self) -> Result<serde_json::Value> {
        self.push(Call::Sample);
        let latency = self.state.borrow().sample_latency;
        self.clock.advance(latency);
        Ok(json!({ "diameter": 3.0, "t": self.clock.now().as_secs_f64() }))
    }

    fn annotate(&mut self, label: &str, _payload: serde_json::Value) -> Result<()> {
        self.push(Call::Annotate(label.to_string()));
        Ok(())
    }
}

impl KeySource for SimDevice {
    fn poll(&mut self) -> Result<Vec<KeyPress>> {
        let now = self.clock.now();
        let mut state = self.state.borrow_mut();
        let split = state.scripted.partition_point(|k| k.timestamp <= now);
        let mut keys: Vec<KeyPress> = state.scripted.drain(..split).collect();
        if state.pending.as_ref().is_some_and(|k| k.timestamp <= now) {
            keys.extend(state.pending.take());
        }
        keys.sort_by_key(|k| k.timestamp);
        Ok(keys)
    }
}

impl AudioPlayer for SimDevice {
    fn play_at(&mut self, clip: Clip, _at: Duration) -> Result<()> {
        self.push(Call::Play(clip));
        Ok(())
    }
}

impl SessionLog for SimDevice {
    fn append(&mut self, record: &TrialRecord) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if let Some(limit) = state.failures.log_after {
            if state.records.len() >= limit {
                bail!("disk full");
            }
        }
        state.records.push(record.clone());
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.push(Call::LogFlush);
        Ok(())
    }
}
