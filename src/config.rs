//! ==============================================================================
//! config.rs - Runtime Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `host.toml`.
//!     loads configuration from file or falls back to defaults.
//!     everything is fixed at startup, there is no hot reload.
//!
//! structure:
//!     - LinkConfig: which sensor link to open, serial port, baud, timeouts, backoff.
//!     - PipelineConfig: lookback window, forecast horizon, display limit, pacing.
//!     - ModelConfig: paths to the scaler and forecaster files.
//!     - ServerConfig: where the dashboard listens.
//!     - LoggingConfig: log level and per-reading output.
//!
//! environment:
//!     - FORECAST_CONFIG: explicit path to a host.toml
//!     - SERIAL_PORT: overrides link.port
//!
//! ==============================================================================

use crate::error::ConfigError;
use crate::link::BackoffPolicy;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct HostConfig {
    #[serde(default)]
    pub link: LinkConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// file this config came from, None when running on defaults
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    #[default]
    Serial,
    Simulated,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LinkConfig {
    pub kind: LinkKind,
    pub port: String,
    pub baud_rate: u32,
    pub read_timeout_ms: u64,
    pub backoff: BackoffConfig,
    /// frames per second when `kind = "simulated"`
    pub simulated_rate_hz: f64,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(tag = "strategy", rename_all = "lowercase")]
pub enum BackoffConfig {
    Fixed { delay_secs: u64 },
    Exponential { base_secs: u64, max_secs: u64 },
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PipelineConfig {
    pub lookback: usize,
    pub horizon: usize,
    /// forecast cards shown on the dashboard; capped at `horizon`
    pub display_limit: usize,
    pub step_hours: i64,
    /// pause after each processed reading
    pub pause_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ModelConfig {
    pub feature_scaler_path: PathBuf,
    pub target_scaler_path: PathBuf,
    pub model_path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// events buffered per subscriber before new ones are dropped for it
    pub subscriber_buffer: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub show_sensor_data: bool,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            kind: LinkKind::Serial,
            port: "/dev/ttyACM0".to_string(),
            baud_rate: 9600,
            read_timeout_ms: 2000,
            backoff: BackoffConfig::default(),
            simulated_rate_hz: 1.0,
        }
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        BackoffConfig::Fixed { delay_secs: 5 }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            lookback: 24,
            horizon: 7,
            display_limit: 5,
            step_hours: 2,
            pause_ms: 1000,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        let dir = PathBuf::from("models");
        Self {
            feature_scaler_path: dir.join("feature_scaler.json"),
            target_scaler_path: dir.join("target_scaler.json"),
            model_path: dir.join("forecast_model.json"),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5000".to_string(),
            subscriber_buffer: 64,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            show_sensor_data: true,
        }
    }
}

impl LinkConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// tick period of the simulated link; the rate must be finite, positive
    /// and slow enough that the period does not round down to zero
    pub fn simulated_period(&self) -> Result<Duration, ConfigError> {
        let rate = self.simulated_rate_hz;
        let invalid = || {
            ConfigError::Invalid(format!(
                "link.simulated_rate_hz must be a finite rate > 0 with a non-zero period (got {rate})"
            ))
        };
        if !(rate.is_finite() && rate > 0.0) {
            return Err(invalid());
        }
        match Duration::try_from_secs_f64(1.0 / rate) {
            Ok(period) if !period.is_zero() => Ok(period),
            _ => Err(invalid()),
        }
    }

    pub fn backoff_policy(&self) -> BackoffPolicy {
        match self.backoff {
            BackoffConfig::Fixed { delay_secs } => {
                BackoffPolicy::Fixed(Duration::from_secs(delay_secs))
            }
            BackoffConfig::Exponential { base_secs, max_secs } => BackoffPolicy::Exponential {
                base: Duration::from_secs(base_secs),
                max: Duration::from_secs(max_secs),
            },
        }
    }
}

impl HostConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: HostConfig = toml::from_str(content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Load with default fallback.
    /// an explicit FORECAST_CONFIG path must exist; the search paths may be absent,
    /// but a host.toml that exists and fails to parse is an error either way.
    pub fn load_or_default() -> anyhow::Result<Self> {
        let mut config = match std::env::var_os("FORECAST_CONFIG") {
            Some(path) => Self::load_from(PathBuf::from(path))?,
            None => Self::search()?,
        };

        if let Ok(port) = std::env::var("SERIAL_PORT") {
            config.link.port = port;
        }
        Ok(config)
    }

    fn load_from(path: PathBuf) -> anyhow::Result<Self> {
        let mut config = Self::load(&path)
            .map_err(|e| anyhow::anyhow!("{}: {}", path.display(), e))?;
        config.source = Some(path);
        Ok(config)
    }

    fn search() -> anyhow::Result<Self> {
        let paths = [
            PathBuf::from("config").join("host.toml"),
            PathBuf::from("..").join("config").join("host.toml"),
        ];

        match paths.into_iter().find(|path| path.exists()) {
            Some(path) => Self::load_from(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.pipeline;
        if p.lookback == 0 {
            return Err(ConfigError::Invalid("pipeline.lookback must be > 0".into()));
        }
        if p.horizon == 0 {
            return Err(ConfigError::Invalid("pipeline.horizon must be > 0".into()));
        }
        if p.display_limit == 0 {
            return Err(ConfigError::Invalid("pipeline.display_limit must be > 0".into()));
        }
        if p.step_hours <= 0 {
            return Err(ConfigError::Invalid("pipeline.step_hours must be > 0".into()));
        }
        if self.link.read_timeout_ms == 0 {
            return Err(ConfigError::Invalid("link.read_timeout_ms must be > 0".into()));
        }
        if self.link.kind == LinkKind::Simulated {
            self.link.simulated_period()?;
        }
        if self.server.subscriber_buffer == 0 {
            return Err(ConfigError::Invalid("server.subscriber_buffer must be > 0".into()));
        }
        match self.link.backoff {
            BackoffConfig::Fixed { delay_secs: 0 } => {
                Err(ConfigError::Invalid("link.backoff delay must be > 0".into()))
            }
            BackoffConfig::Exponential { base_secs, max_secs }
                if base_secs == 0 || max_secs < base_secs =>
            {
                Err(ConfigError::Invalid(
                    "link.backoff needs 0 < base_secs <= max_secs".into(),
                ))
            }
            _ => Ok(()),
        }
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        tracing::info!("┌─────────────────────────────────────────┐");
        tracing::info!("│           HOST CONFIGURATION            │");
        tracing::info!("├─────────────────────────────────────────┤");
        match &self.source {
            Some(path) => tracing::info!("│ Loaded from {}", path.display()),
            None => tracing::warn!("│ No config file found - using defaults"),
        }
        tracing::info!("│ Link: {:?} {} @ {} baud", self.link.kind, self.link.port, self.link.baud_rate);
        tracing::info!("│ Lookback: {} | Horizon: {} | Cards: {}", self.pipeline.lookback, self.pipeline.horizon, self.pipeline.display_limit);
        tracing::info!("│ Model: {}", self.model.model_path.display());
        tracing::info!("│ Bind: {}", self.server.bind);
        tracing::info!("│ Log Level: {}", self.logging.level);
        tracing::info!("├─────────────────────────────────────────┤");
    }
}
