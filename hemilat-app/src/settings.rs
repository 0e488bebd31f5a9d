use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use hemilat_core::Marker;
use hemilat_experiment::SessionConfig;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

pub const DEFAULT_CONFIG: &str = "hemilat.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    pub title: String,
    pub fullscreen: bool,
    /// TTF/OTF used for cues and feedback. Text is skipped without one.
    pub font: Option<PathBuf>,
    pub font_size: f32,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            title: "Hemifield LAT".to_string(),
            fullscreen: true,
            font: None,
            font_size: 48.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Filter used when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub session_log: PathBuf,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            session_log: PathBuf::from("output/session.jsonl"),
        }
    }
}

/// Everything outside the session core: window, logging, output files and
/// trigger codes.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub display: DisplaySettings,
    pub logging: LoggingSettings,
    pub output: OutputSettings,
    /// Per-label overrides of the trigger codes.
    pub triggers: BTreeMap<String, u8>,
}

impl AppSettings {
    pub fn trigger_codes(&self) -> BTreeMap<&'static str, u8> {
        Marker::ALL
            .iter()
            .map(|m| {
                // Keys may come back lowercased from the config layer.
                let code = self
                    .triggers
                    .iter()
                    .find(|(label, _)| label.eq_ignore_ascii_case(m.label()))
                    .map(|(_, code)| *code)
                    .unwrap_or_else(|| default_code(*m));
                (m.label(), code)
            })
            .collect()
    }
}

pub fn default_code(marker: Marker) -> u8 {
    match marker {
        Marker::StartBlank => 1,
        Marker::EndBlank => 2,
        Marker::Start => 3,
        Marker::BadResponse => 4,
        Marker::Stim => 5,
        Marker::Response => 6,
        Marker::Alarm => 7,
        Marker::Quit => 8,
        Marker::End => 9,
        Marker::StartBlockLeft => 10,
        Marker::StartBlockRight => 11,
        Marker::Tone => 12,
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub session: SessionConfig,
    pub app: AppSettings,
}

impl Settings {
    /// Reads `path` if it exists, then `HEMILAT_*` environment overrides
    /// (`HEMILAT_TASK__BLOCKS=2`).
    pub fn load(path: &str) -> Result<Self> {
        let builder = Config::builder()
            .add_source(File::with_name(path).format(FileFormat::Toml).required(false))
            .add_source(
                Environment::with_prefix("HEMILAT")
                    .separator("__")
                    .try_parsing(true),
            );
        Self::from_config(builder.build().with_context(|| format!("loading {path}"))?)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()?;
        Self::from_config(config)
    }

    fn from_config(config: Config) -> Result<Self> {
        let session: SessionConfig = config
            .clone()
            .try_deserialize()
            .context("reading session parameters")?;
        session.validate()?;
        let app: AppSettings = config
            .try_deserialize()
            .context("reading display and output settings")?;
        Ok(Self { session, app })
    }
}
