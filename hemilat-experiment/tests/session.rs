use hemilat_core::{Clip, Device, Marker, Outcome, SessionError};
use hemilat_experiment::sim::{Call, SimRig};
use hemilat_experiment::{Session, SessionConfig, SessionReport};
use hemilat_timing::Clock;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::time::Duration;

fn config() -> SessionConfig {
    let mut config = SessionConfig::default();
    config.task.blocks = 3;
    config.task.duration = 20.0;
    config.task.max_missed = 2;
    config.fixation.min_delay = 2.0;
    config.fixation.max_delay = 4.0;
    config.timing.rest = 3.0;
    config.timing.cue = 1.0;
    config
}

fn run(rig: &SimRig, config: SessionConfig, seed: u64) -> SessionReport {
    let session = Session::new(config, rig.clock.clone(), StdRng::seed_from_u64(seed)).unwrap();
    session.run(&mut rig.devices())
}

#[test]
fn full_session_scores_every_trial() {
    let rig = SimRig::new();
    // Every third target is ignored, one answer lands in the grace window.
    rig.set_responder(|n| match n % 3 {
        0 => Some(Duration::from_millis(280)),
        1 => Some(Duration::from_millis(640)),
        _ => None,
    });

    let report = run(&rig, config(), 21);
    assert_eq!(report.exit_code(), 0);

    let records = rig.records();
    assert_eq!(report.trials, records.len() as u64);
    for record in &records {
        assert_eq!(record.reaction_time.is_some(), record.outcome != Outcome::Missed);
        if record.outcome == Outcome::LateHit {
            assert!(record.reaction_time.unwrap() >= 0.5);
        }
        assert!(record.pre_spot.is_some() && record.post_spot.is_some());
    }

    let misses = records.iter().filter(|r| r.missed()).count() as u32;
    let late = records.iter().filter(|r| r.is_late()).count() as u32;
    assert_eq!(report.summary.misses, misses);
    assert_eq!(report.summary.hits, records.len() as u32 - misses);
    assert_eq!(report.summary.late, late);
    // Misses never come twice in a row, so the alarm stays silent.
    assert!(records.iter().all(|r| r.alarm.is_none()));

    let blocks: Vec<usize> = records.iter().map(|r| r.block).collect();
    assert!(blocks.windows(2).all(|w| w[0] <= w[1]));
    for pair in records.windows(2).filter(|w| w[0].block != w[1].block) {
        assert_eq!(pair[1].hemifield, pair[0].hemifield.flipped());
    }

    let calls = rig.calls();
    let (_, last) = calls.last().unwrap();
    assert_eq!(*last, Call::Play(Clip::QuestionnaireReminder));
    assert_eq!(rig.count(|c| *c == Call::Cue("DONE!".to_string())), 1);
    assert_eq!(rig.count(|c| *c == Call::Trigger(Marker::End)), 1);
    assert_eq!(rig.count(|c| *c == Call::StopRecording), 1);
}

#[test]
fn quit_during_a_delay_tears_everything_down() {
    let rig = SimRig::new();
    rig.set_responder(|_| Some(Duration::from_millis(300)));
    // Prologue takes 4s; the first trial's delay is at least 1.5s.
    rig.script_key("q", Duration::from_millis(5000));

    let report = run(&rig, config(), 5);

    assert!(matches!(report.error, Some(SessionError::QuitRequested)));
    assert_eq!(report.exit_code(), 2);
    assert!(rig.records().is_empty());
    assert_eq!(rig.clock.now(), Duration::from_millis(5000));
    assert_eq!(rig.count(|c| *c == Call::Trigger(Marker::Quit)), 1);
    assert_eq!(rig.count(|c| *c == Call::StopRecording), 1);
    assert_eq!(rig.count(|c| *c == Call::LogFlush), 1);
    assert_eq!(rig.count(|c| *c == Call::Play(Clip::QuestionnaireReminder)), 0);
}

#[test]
fn quit_as_a_response_keeps_the_trial() {
    let rig = SimRig::new();
    rig.set_response_key("q");
    rig.plan_responses(vec![Some(Duration::from_millis(350))]);

    let report = run(&rig, config(), 6);

    assert_eq!(report.exit_code(), 2);
    let records = rig.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].response_key.as_deref(), Some("q"));
    assert_eq!(report.summary.hits, 1);
    assert_eq!(report.summary.valid_responses, 1);
}

#[test]
fn log_failure_mid_session_is_fatal() {
    let rig = SimRig::new();
    rig.set_responder(|_| Some(Duration::from_millis(300)));
    rig.fail_log_after(2);

    let report = run(&rig, config(), 7);

    assert_eq!(report.exit_code(), 1);
    assert!(matches!(
        report.error,
        Some(SessionError::Device {
            device: Device::SessionLog,
            ..
        })
    ));
    assert_eq!(rig.records().len(), 2);
    // The third trial was scored before the log refused it.
    assert_eq!(report.summary.hits, 3);
    assert_eq!(rig.count(|c| *c == Call::Trigger(Marker::Quit)), 0);
    assert_eq!(rig.count(|c| *c == Call::StopRecording), 1);
}

#[test]
fn init_failure_never_starts_a_block() {
    let rig = SimRig::new();
    rig.fail_recording_start();

    let report = run(&rig, config(), 8);

    assert!(matches!(
        report.error,
        Some(SessionError::DeviceInit {
            device: Device::Physiology,
            ..
        })
    ));
    assert_eq!(report.exit_code(), 1);
    assert_eq!(report.trials, 0);
    assert_eq!(rig.count(|c| matches!(c, Call::Background(_))), 0);
    assert_eq!(rig.count(|c| *c == Call::StopRecording), 0);
    assert_eq!(rig.clock.now(), Duration::ZERO);
}

#[test]
fn long_miss_streak_keeps_alarming() {
    let rig = SimRig::new();
    rig.set_responder(|_| None);
    let mut config = config();
    config.task.blocks = 1;

    let report = run(&rig, config, 9);
    assert_eq!(report.exit_code(), 0);

    let alarms: Vec<bool> = rig.records().iter().map(|r| r.alarm.is_some()).collect();
    assert!(alarms.len() >= 4);
    assert_eq!(&alarms[..2], &[false, true]);
    assert!(alarms[1..].iter().all(|a| *a));
    assert_eq!(
        rig.count(|c| *c == Call::Play(Clip::Alarm)),
        alarms.len() - 1
    );
    assert_eq!(
        rig.count(|c| *c == Call::Trigger(Marker::Alarm)),
        alarms.len() - 1
    );
}
