use hemilat_core::{Device, DeviceResultExt, Devices, KeyPress, Marker, SessionError};
use tracing::{debug, info};

/// Collects key presses that are not responses to the target.
///
/// Each press is recorded with its session time, marked with a
/// `BadResponse` trigger and acknowledged on screen. Timers are untouched.
/// The reserved quit key ends the session instead.
#[derive(Debug)]
pub struct SpuriousKeys {
    quit_key: String,
    presses: Vec<f64>,
}

impl SpuriousKeys {
    pub fn new(quit_key: impl Into<String>) -> Self {
        Self {
            quit_key: quit_key.into(),
            presses: Vec::new(),
        }
    }

    pub fn poll(&mut self, devices: &mut Devices) -> Result<(), SessionError> {
        let keys = devices.keys.poll().device(Device::Keyboard)?;
        self.handle(keys, devices)
    }

    pub fn handle(&mut self, keys: Vec<KeyPress>, devices: &mut Devices) -> Result<(), SessionError> {
        for press in keys {
            if press.is(&self.quit_key) {
                info!("quit key pressed outside the response window");
                return Err(SessionError::QuitRequested);
            }
            devices.trigger.send(Marker::BadResponse).device(Device::Trigger)?;
            self.presses.push(press.timestamp.as_secs_f64());
            debug!(key = %press.key, at = press.timestamp.as_secs_f64(), "unexpected key press");
            devices.renderer.flash_invalid_input().device(Device::Renderer)?;
        }
        Ok(())
    }

    pub fn presses(&self) -> &[f64] {
        &self.presses
    }

    pub fn into_presses(self) -> Vec<f64> {
        self.presses
    }
}
