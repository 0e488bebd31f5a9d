use crate::block::BlockController;
use crate::config::{SessionConfig, secs};
use crate::rest;
use crate::scorer::ScoreSummary;
use hemilat_core::{Clip, Device, DeviceResultExt, Devices, Marker, SessionError};
use hemilat_timing::Clock;
use rand::Rng;
use std::sync::Arc;
use tracing::{error, info, warn};

/// What a finished session leaves behind.
#[derive(Debug)]
pub struct SessionReport {
    pub summary: ScoreSummary,
    pub trials: u64,
    pub error: Option<SessionError>,
}

impl SessionReport {
    /// 0 on completion, 2 when the participant quit, 1 on any fatal error.
    pub fn exit_code(&self) -> i32 {
        self.error.as_ref().map_or(0, SessionError::exit_code)
    }

    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

/// A whole recording session: prologue, every block, epilogue, teardown.
pub struct Session<C: Clock, R: Rng> {
    config: Arc<SessionConfig>,
    clock: C,
    blocks: BlockController<C, R>,
    recording: bool,
}

impl<C: Clock, R: Rng> Session<C, R> {
    pub fn new(config: SessionConfig, clock: C, rng: R) -> Result<Self, SessionError> {
        config.validate()?;
        let config = Arc::new(config);
        let blocks = BlockController::new(Arc::clone(&config), clock.clone(), rng);
        Ok(Self {
            config,
            clock,
            blocks,
            recording: false,
        })
    }

    /// Runs to completion or to the first fatal condition. Teardown always
    /// runs; the report carries the error, if any.
    pub fn run(mut self, devices: &mut Devices) -> SessionReport {
        info!(
            blocks = self.config.task.blocks,
            duration = self.config.task.duration,
            "session starting"
        );

        let mut result = self.start(devices).and_then(|()| self.body(devices));
        let teardown = self.teardown(devices, result.as_ref().err());
        if result.is_ok() {
            result = teardown;
        }

        match &result {
            Ok(()) => {
                if let Err(err) = self.remind(devices) {
                    warn!("questionnaire reminder failed: {:#}", err);
                }
                info!("session complete");
            }
            Err(err) if err.is_quit() => info!("session stopped by participant"),
            Err(err) => error!("session aborted: {}", error_chain(err)),
        }

        SessionReport {
            summary: self.blocks.scorer().summary(),
            trials: self.blocks.sequence_number(),
            error: result.err(),
        }
    }

    fn start(&mut self, devices: &mut Devices) -> Result<(), SessionError> {
        devices
            .physiology
            .start_recording()
            .device_init(Device::Physiology)?;
        self.recording = true;
        devices.trigger.reset().device_init(Device::Trigger)?;
        Ok(())
    }

    fn body(&mut self, devices: &mut Devices) -> Result<(), SessionError> {
        self.prologue(devices)?;
        self.blocks.run_all(devices)?;
        self.epilogue(devices)
    }

    fn blank_rest(&self, devices: &mut Devices) -> Result<(), SessionError> {
        devices.renderer.show_blank().device(Device::Renderer)?;
        info!("Starting blank period");
        devices.trigger.send(Marker::StartBlank).device(Device::Trigger)?;
        rest(&self.clock, secs(self.config.timing.rest), &self.config, devices)?;
        devices.trigger.send(Marker::EndBlank).device(Device::Trigger)?;
        Ok(())
    }

    fn cue(&self, devices: &mut Devices, text: &str, marker: Marker) -> Result<(), SessionError> {
        devices.renderer.show_cue(text).device(Device::Renderer)?;
        devices.trigger.send(marker).device(Device::Trigger)?;
        rest(&self.clock, secs(self.config.timing.cue), &self.config, devices)
    }

    fn prologue(&self, devices: &mut Devices) -> Result<(), SessionError> {
        self.blank_rest(devices)?;
        self.cue(devices, "START", Marker::Start)
    }

    fn epilogue(&self, devices: &mut Devices) -> Result<(), SessionError> {
        self.cue(devices, "DONE!", Marker::End)?;
        self.blank_rest(devices)?;
        info!("Finished");
        Ok(())
    }

    /// Best-effort release of everything the session touched. Failures are
    /// logged; on an otherwise clean run a failed log flush is reported.
    fn teardown(&mut self, devices: &mut Devices, cause: Option<&SessionError>) -> Result<(), SessionError> {
        info!("{}", self.blocks.scorer().summary());

        if cause.is_some_and(SessionError::is_quit) {
            info!("quit experiment");
            if let Err(err) = devices.trigger.send(Marker::Quit) {
                warn!("could not send quit marker: {:#}", err);
            }
        }
        if let Err(err) = devices.trigger.reset() {
            warn!("trigger reset failed: {:#}", err);
        }
        if self.recording {
            if let Err(err) = devices.physiology.stop_recording() {
                warn!("stopping the recording failed: {:#}", err);
            }
            self.recording = false;
        }
        match devices.log.flush() {
            Ok(()) => Ok(()),
            Err(err) if cause.is_some() => {
                warn!("session log flush failed: {:#}", err);
                Ok(())
            }
            Err(err) => Err(SessionError::Device {
                device: Device::SessionLog,
                source: err,
            }),
        }
    }

    fn remind(&self, devices: &mut Devices) -> anyhow::Result<()> {
        devices
            .audio
            .play_at(Clip::QuestionnaireReminder, self.clock.now())?;
        self.clock.sleep(secs(self.config.timing.reminder));
        Ok(())
    }
}

fn error_chain(err: &SessionError) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
