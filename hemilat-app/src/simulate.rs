use crate::settings::Settings;
use anyhow::Result;
use hemilat_core::SessionLog;
use hemilat_experiment::sim::SimRig;
use hemilat_experiment::{JsonLinesLog, Session};
use hemilat_timing::Clock;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tracing::info;

/// Probability that the simulated participant ignores a target.
const LAPSE_RATE: f64 = 0.1;

/// Runs the configured session on simulated time against a participant
/// answering at random, then writes the trials to the configured log.
pub fn run(settings: Settings, seed: u64) -> Result<i32> {
    let rig = SimRig::new();
    let mut participant = StdRng::seed_from_u64(seed.wrapping_add(1));
    rig.set_responder(move |_| {
        if participant.random_bool(LAPSE_RATE) {
            None
        } else {
            Some(Duration::from_secs_f64(participant.random_range(0.18..0.8)))
        }
    });

    let session = Session::new(settings.session, rig.clock.clone(), StdRng::seed_from_u64(seed))?;
    let report = session.run(&mut rig.devices());

    let mut log = JsonLinesLog::create(&settings.app.output.session_log)?;
    for record in rig.records() {
        log.append(&record)?;
    }
    log.flush()?;

    info!(
        seed,
        trials = report.trials,
        simulated_s = rig.clock.now().as_secs_f64(),
        path = %settings.app.output.session_log.display(),
        "dry run finished"
    );
    info!("{}", report.summary);
    Ok(report.exit_code())
}
