use hemilat_core::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Every timing parameter the session core reads. All durations are in
/// seconds. Immutable once a session starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub task: TaskConfig,
    pub fixation: FixationConfig,
    pub tones: ToneConfig,
    pub timing: TimingConfig,
    pub keys: KeyConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    pub blocks: usize,
    /// Wall-clock budget of one block.
    pub duration: f64,
    /// Reaction times at or below this are not counted as valid.
    pub min_time: f64,
    /// Time the target takes to shrink away.
    pub max_time: f64,
    /// Grace window after the target vanishes; also the fixed pause
    /// between the delay and the target onset.
    pub extra_time: f64,
    /// Consecutive misses that trigger the alarm.
    pub max_missed: u32,
    pub alternate_hemifield: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixationConfig {
    pub min_delay: f64,
    pub max_delay: f64,
    /// How long the reaction time stays on screen.
    pub score_time: f64,
    /// Pause between blocks.
    pub rest_time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToneConfig {
    pub min_gap: f64,
    pub max_gap: f64,
    /// Playback length of one probe.
    pub duration: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Blank rest at session start and end.
    pub rest: f64,
    pub cue: f64,
    /// Cooperative poll period of every wait loop.
    pub poll_interval: f64,
    /// Pause after the questionnaire reminder.
    pub reminder: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyConfig {
    pub quit: String,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            blocks: 6,
            duration: 120.0,
            min_time: 0.1,
            max_time: 0.5,
            extra_time: 0.5,
            max_missed: 5,
            alternate_hemifield: true,
        }
    }
}

impl Default for FixationConfig {
    fn default() -> Self {
        Self {
            min_delay: 2.0,
            max_delay: 10.0,
            score_time: 0.5,
            rest_time: 3.0,
        }
    }
}

impl Default for ToneConfig {
    fn default() -> Self {
        Self {
            min_gap: 1.5,
            max_gap: 5.0,
            duration: 0.05,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            rest: 60.0,
            cue: 2.0,
            poll_interval: 0.001,
            reminder: 2.0,
        }
    }
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            quit: "q".to_string(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            task: TaskConfig::default(),
            fixation: FixationConfig::default(),
            tones: ToneConfig::default(),
            timing: TimingConfig::default(),
            keys: KeyConfig::default(),
        }
    }
}

pub(crate) fn secs(value: f64) -> Duration {
    Duration::from_secs_f64(value.max(0.0))
}

/// Rejects infinities and values too large for a `Duration`.
fn finite_duration(field: &'static str, value: f64) -> Result<(), ConfigError> {
    Duration::try_from_secs_f64(value)
        .map(drop)
        .map_err(|_| ConfigError::OutOfRange { field, value })
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 {
        finite_duration(field, value)
    } else {
        Err(ConfigError::NotPositive { field, value })
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value >= 0.0 {
        finite_duration(field, value)
    } else {
        Err(ConfigError::NotPositive { field, value })
    }
}

fn ordered(lower: &'static str, low: f64, upper: &'static str, high: f64) -> Result<(), ConfigError> {
    if low <= high {
        Ok(())
    } else {
        Err(ConfigError::InvertedRange {
            lower,
            upper,
            low,
            high,
        })
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.task.blocks == 0 {
            return Err(ConfigError::Zero("task.blocks"));
        }
        if self.task.max_missed == 0 {
            return Err(ConfigError::Zero("task.max_missed"));
        }
        positive("task.duration", self.task.duration)?;
        positive("task.max_time", self.task.max_time)?;
        non_negative("task.min_time", self.task.min_time)?;
        non_negative("task.extra_time", self.task.extra_time)?;
        ordered("task.min_time", self.task.min_time, "task.max_time", self.task.max_time)?;

        ordered(
            "fixation.min_delay",
            self.fixation.min_delay,
            "fixation.max_delay",
            self.fixation.max_delay,
        )?;
        finite_duration("fixation.max_delay", self.fixation.max_delay)?;
        if self.fixation.min_delay < self.task.extra_time {
            return Err(ConfigError::DelayShorterThanExtraTime {
                min_delay: self.fixation.min_delay,
                extra_time: self.task.extra_time,
            });
        }
        non_negative("fixation.score_time", self.fixation.score_time)?;
        non_negative("fixation.rest_time", self.fixation.rest_time)?;

        positive("tones.min_gap", self.tones.min_gap)?;
        positive("tones.duration", self.tones.duration)?;
        ordered("tones.min_gap", self.tones.min_gap, "tones.max_gap", self.tones.max_gap)?;
        finite_duration("tones.max_gap", self.tones.max_gap)?;

        positive("timing.poll_interval", self.timing.poll_interval)?;
        non_negative("timing.rest", self.timing.rest)?;
        non_negative("timing.cue", self.timing.cue)?;
        non_negative("timing.reminder", self.timing.reminder)?;
        Ok(())
    }

    pub fn block_duration(&self) -> Duration {
        secs(self.task.duration)
    }

    pub fn max_time(&self) -> Duration {
        secs(self.task.max_time)
    }

    pub fn extra_time(&self) -> Duration {
        secs(self.task.extra_time)
    }

    pub fn poll_interval(&self) -> Duration {
        secs(self.timing.poll_interval)
    }

    pub fn probe_duration(&self) -> Duration {
        secs(self.tones.duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = SessionConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.task.blocks, 6);
        assert_eq!(config.max_time(), Duration::from_millis(500));
        assert_eq!(config.poll_interval(), Duration::from_millis(1));
    }

    #[test]
    fn delay_must_cover_extra_wait() {
        let mut config = SessionConfig::default();
        config.fixation.min_delay = 0.25;
        assert_eq!(
            config.validate(),
            Err(ConfigError::DelayShorterThanExtraTime {
                min_delay: 0.25,
                extra_time: 0.5
            })
        );
    }

    #[test]
    fn inverted_ranges_are_rejected() {
        let mut config = SessionConfig::default();
        config.tones.min_gap = 6.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvertedRange {
                lower: "tones.min_gap",
                ..
            })
        ));

        let mut config = SessionConfig::default();
        config.task.max_missed = 0;
        assert_eq!(config.validate(), Err(ConfigError::Zero("task.max_missed")));
    }

    #[test]
    fn unrepresentable_durations_are_rejected() {
        let mut config = SessionConfig::default();
        config.task.duration = f64::INFINITY;
        assert_eq!(
            config.validate(),
            Err(ConfigError::OutOfRange {
                field: "task.duration",
                value: f64::INFINITY
            })
        );

        let mut config = SessionConfig::default();
        config.timing.rest = 1e20;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange {
                field: "timing.rest",
                ..
            })
        ));

        let mut config = SessionConfig::default();
        config.fixation.max_delay = f64::INFINITY;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange {
                field: "fixation.max_delay",
                ..
            })
        ));

        let mut config = SessionConfig::default();
        config.tones.max_gap = 1e20;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange {
                field: "tones.max_gap",
                ..
            })
        ));

        let mut config = SessionConfig::default();
        config.task.min_time = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_sections_fall_back_to_defaults() {
        let config: SessionConfig =
            serde_json::from_str(r#"{ "task": { "blocks": 2, "duration": 30.0 } }"#).unwrap();
        assert_eq!(config.task.blocks, 2);
        assert_eq!(config.task.max_missed, 5);
        assert_eq!(config.tones, ToneConfig::default());
    }
}
