use crate::application::polar_store::is_valid_file_name;
use crate::domain::filters::{AverageRatioFilter, StabilityFilter, VmgRatioFilter};
use crate::domain::polar::PolarGrid;
use crate::domain::recording::{MotoringConfig, RecordingMode};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be positive")]
    NonPositive(&'static str),
    #[error("{0} must not be negative")]
    Negative(&'static str),
    #[error("{name}: lower bound {lower} must be below upper bound {upper}")]
    InvertedBounds {
        name: &'static str,
        lower: f64,
        upper: f64,
    },
    #[error("sampling.stale_multiplier must be at least 1")]
    StaleMultiplier,
    #[error("{0} must be a bare .json file name")]
    FileName(&'static str),
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct RecorderConfig {
    pub server: ServerSettings,
    pub storage: StorageSettings,
    pub source: SourceSettings,
    pub sampling: SamplingSettings,
    pub polar: PolarGrid,
    pub stability: StabilitySettings,
    pub admission: AdmissionSettings,
    pub motoring: MotoringConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3030".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageSettings {
    pub data_dir: PathBuf,
    pub polar_file: String,
    pub auto_recording_file: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            polar_file: "polar-data.json".to_string(),
            auto_recording_file: "auto-recording-polar.json".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Poll a Signal K server over REST.
    #[default]
    SignalK,
    /// Readings are pushed to `POST /api/readings`.
    Push,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SourceSettings {
    pub kind: SourceKind,
    pub signalk_url: String,
    pub token: Option<String>,
    pub propulsion_poll_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            kind: SourceKind::SignalK,
            signalk_url: "http://localhost:3000".to_string(),
            token: None,
            propulsion_poll_ms: 1000,
            request_timeout_ms: 800,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct SamplingSettings {
    pub interval_ms: u64,
    /// A reading older than `interval_ms * stale_multiplier` is stale.
    pub stale_multiplier: f64,
    pub min_stw_kt: f64,
    pub mode: RecordingMode,
}

impl SamplingSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn stale_after(&self) -> chrono::TimeDelta {
        chrono::TimeDelta::milliseconds((self.interval_ms as f64 * self.stale_multiplier) as i64)
    }
}

impl Default for SamplingSettings {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            stale_multiplier: 3.0,
            min_stw_kt: 0.5,
            mode: RecordingMode::Manual,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct StabilitySettings {
    pub course: StabilityFilter,
    pub heading: StabilityFilter,
    pub twd: StabilityFilter,
}

impl Default for StabilitySettings {
    fn default() -> Self {
        Self {
            course: StabilityFilter::new(true, 10.0, 5.0),
            heading: StabilityFilter::new(false, 10.0, 5.0),
            twd: StabilityFilter::new(false, 30.0, 10.0),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default)]
#[serde(default)]
pub struct AdmissionSettings {
    pub vmg: VmgRatioFilter,
    pub stw: AverageRatioFilter,
    pub twa: AverageRatioFilter,
    pub tws: AverageRatioFilter,
}

impl RecorderConfig {
    /// Rejects values that would make every sample unevaluable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sampling.interval_ms == 0 {
            return Err(ConfigError::NonPositive("sampling.interval_ms"));
        }
        if !(self.sampling.stale_multiplier >= 1.0) {
            return Err(ConfigError::StaleMultiplier);
        }
        if !(self.sampling.min_stw_kt >= 0.0) {
            return Err(ConfigError::Negative("sampling.min_stw_kt"));
        }
        positive("polar.angle_step_deg", self.polar.angle_step_deg)?;
        positive("polar.speed_step_kt", self.polar.speed_step_kt)?;
        if self.source.propulsion_poll_ms == 0 {
            return Err(ConfigError::NonPositive("source.propulsion_poll_ms"));
        }

        for (name, filter) in [
            ("stability.course", &self.stability.course),
            ("stability.heading", &self.stability.heading),
            ("stability.twd", &self.stability.twd),
        ] {
            positive(name, filter.window_secs)?;
            if !(filter.threshold_deg >= 0.0) {
                return Err(ConfigError::Negative(name));
            }
        }

        bounds("admission.vmg", self.admission.vmg.lower, self.admission.vmg.upper)?;
        for (name, filter) in [
            ("admission.stw", &self.admission.stw),
            ("admission.twa", &self.admission.twa),
            ("admission.tws", &self.admission.tws),
        ] {
            positive(name, filter.window_secs)?;
            bounds(name, filter.lower, filter.upper)?;
        }

        if !(self.motoring.max_idle_rpm >= 0.0) {
            return Err(ConfigError::Negative("motoring.max_idle_rpm"));
        }
        if !is_valid_file_name(&self.storage.polar_file) {
            return Err(ConfigError::FileName("storage.polar_file"));
        }
        if !is_valid_file_name(&self.storage.auto_recording_file) {
            return Err(ConfigError::FileName("storage.auto_recording_file"));
        }
        Ok(())
    }
}

fn positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NonPositive(name))
    }
}

fn bounds(name: &'static str, lower: f64, upper: f64) -> Result<(), ConfigError> {
    if lower < upper {
        Ok(())
    } else {
        Err(ConfigError::InvertedBounds { name, lower, upper })
    }
}

fn build(settings: config::ConfigBuilder<config::builder::DefaultState>) -> anyhow::Result<RecorderConfig> {
    let config: RecorderConfig = settings
        .add_source(
            config::Environment::with_prefix("POLAR")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()?;
    config.validate()?;
    Ok(config)
}

/// Loads `config/recorder.toml` (optional) overlaid with `POLAR__*` variables.
pub fn load_recorder_config() -> anyhow::Result<RecorderConfig> {
    build(
        config::Config::builder()
            .add_source(config::File::with_name("config/recorder").required(false)),
    )
}
