pub mod block;
pub mod config;
pub mod probe;
pub mod record_log;
pub mod scorer;
pub mod session;
pub mod sim;
pub mod spurious;
pub mod trial;

pub use block::{BlockController, MissStreak};
pub use config::SessionConfig;
pub use probe::{ProbeScheduler, ProbeTiming};
pub use record_log::{JsonLinesLog, read_records};
pub use scorer::{ScoreSummary, Scorer};
pub use session::{Session, SessionReport};
pub use spurious::SpuriousKeys;
pub use trial::{Response, TrialContext, TrialEngine, classify, visible_fraction};

use hemilat_core::{Device, DeviceResultExt, Devices, PhysioSample, SessionError};
use hemilat_timing::{Clock, Deadline};
use std::time::Duration;
use tracing::{debug, info};

/// One cooperative tick: sleeps the poll interval, or less when a boundary
/// falls inside it.
pub(crate) fn tick<C: Clock>(clock: &C, poll: Duration, until_boundary: Duration) {
    clock.sleep(poll.min(until_boundary));
}

pub(crate) fn physio_sample<C: Clock>(
    clock: &C,
    devices: &mut Devices,
) -> Result<PhysioSample, SessionError> {
    let value = devices.physiology.sample().device(Device::Physiology)?;
    Ok(PhysioSample {
        value,
        timestamp: clock.now().as_secs_f64(),
    })
}

/// Waits out a rest or cue while watching for the quit key. Other presses
/// are dropped.
pub(crate) fn rest<C: Clock>(
    clock: &C,
    duration: Duration,
    config: &SessionConfig,
    devices: &mut Devices,
) -> Result<(), SessionError> {
    let poll = config.poll_interval();
    let deadline = Deadline::new(clock.clone(), duration);
    loop {
        for press in devices.keys.poll().device(Device::Keyboard)? {
            if press.is(&config.keys.quit) {
                info!("quit key pressed during a rest");
                return Err(SessionError::QuitRequested);
            }
            debug!(key = %press.key, "key ignored during rest");
        }
        if deadline.expired() {
            return Ok(());
        }
        tick(clock, poll, deadline.time_left());
    }
}
