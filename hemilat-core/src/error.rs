use std::fmt;
use thiserror::Error;

/// Collaborator a failure is attributed to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Device {
    Renderer,
    Trigger,
    Physiology,
    Keyboard,
    Audio,
    SessionLog,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Device::Renderer => "renderer",
            Device::Trigger => "trigger emitter",
            Device::Physiology => "physiology recorder",
            Device::Keyboard => "key source",
            Device::Audio => "audio player",
            Device::SessionLog => "session log",
        })
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be positive, got {value}")]
    NotPositive { field: &'static str, value: f64 },
    #[error("{field} is not a representable duration: {value}")]
    OutOfRange { field: &'static str, value: f64 },
    #[error("{lower} ({low}) must not exceed {upper} ({high})")]
    InvertedRange {
        lower: &'static str,
        upper: &'static str,
        low: f64,
        high: f64,
    },
    #[error("minimum delay {min_delay}s is shorter than the extra wait {extra_time}s")]
    DelayShorterThanExtraTime { min_delay: f64, extra_time: f64 },
    #[error("{0} must be at least 1")]
    Zero(&'static str),
}

#[derive(Debug, Error)]
pub enum SessionError {
    /// The participant pressed the reserved quit key.
    #[error("quit requested by participant")]
    QuitRequested,
    #[error("{device} failed to initialize")]
    DeviceInit {
        device: Device,
        #[source]
        source: anyhow::Error,
    },
    #[error("{device} failed during the session")]
    Device {
        device: Device,
        #[source]
        source: anyhow::Error,
    },
    #[error("invalid session configuration")]
    Config(#[from] ConfigError),
}

impl SessionError {
    /// Process exit code for this termination cause.
    pub fn exit_code(&self) -> i32 {
        match self {
            SessionError::QuitRequested => 2,
            _ => 1,
        }
    }

    pub fn is_quit(&self) -> bool {
        matches!(self, SessionError::QuitRequested)
    }
}

/// Attaches the failing collaborator to a device call's error.
pub trait DeviceResultExt<T> {
    fn device(self, device: Device) -> Result<T, SessionError>;
    fn device_init(self, device: Device) -> Result<T, SessionError>;
}

impl<T> DeviceResultExt<T> for anyhow::Result<T> {
    fn device(self, device: Device) -> Result<T, SessionError> {
        self.map_err(|source| SessionError::Device { device, source })
    }

    fn device_init(self, device: Device) -> Result<T, SessionError> {
        self.map_err(|source| SessionError::DeviceInit { device, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn quit_has_distinct_exit_code() {
        assert_eq!(SessionError::QuitRequested.exit_code(), 2);
        let err: anyhow::Result<()> = Err(anyhow!("serial port gone"));
        let err = err.device(Device::Trigger).unwrap_err();
        assert_eq!(err.exit_code(), 1);
        assert_eq!(err.to_string(), "trigger emitter failed during the session");
    }

    #[test]
    fn init_failures_name_the_device() {
        let err: anyhow::Result<()> = Err(anyhow!("no tracker at 127.0.0.1"));
        let err = err.device_init(Device::Physiology).unwrap_err();
        assert!(matches!(
            err,
            SessionError::DeviceInit {
                device: Device::Physiology,
                ..
            }
        ));
    }
}
