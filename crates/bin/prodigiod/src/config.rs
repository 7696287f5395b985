//! Configuration loading: TOML file with environment variable overrides.
//!
//! Looks for `prodigio.toml` in the working directory. Every field has a
//! default so the file is optional. Environment variables take precedence
//! over file values.

use std::time::Duration;

use prodigio_adapter_ble::BleConfig;
use prodigio_app::config::ClientConfig;
use prodigio_domain::error::ValidationError;
use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging settings.
    pub logging: LoggingConfig,
    /// BLE adapter settings.
    pub ble: BleConfig,
    /// Auth code and retry budget.
    pub client: ClientConfig,
    /// Poll loop settings.
    pub poll: PollConfig,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Seconds between two polling cycles.
    pub interval_secs: u64,
}

impl PollConfig {
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Config {
    /// Load configuration from `prodigio.toml` (if present), apply
    /// environment-variable overrides and validate the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if the
    /// resulting configuration is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file("prodigio.toml")?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(val) = var("PRODIGIO_AUTH_CODE") {
            self.client.auth_code = val;
        }
        if let Some(secs) = var("PRODIGIO_SCAN_SECS").and_then(|val| val.parse().ok()) {
            self.ble.scan_duration_secs = secs;
        }
        if let Some(secs) = var("PRODIGIO_POLL_SECS").and_then(|val| val.parse().ok()) {
            self.poll.interval_secs = secs;
        }
        if let Some(val) = var("PRODIGIO_LOG") {
            self.logging.filter = val;
        }
        if let Some(val) = var("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.client.auth_code().map_err(ConfigError::AuthCode)?;
        if self.client.retry_attempts == 0 {
            return Err(ConfigError::Validation(
                "retry_attempts must be at least 1".to_string(),
            ));
        }
        if self.poll.interval_secs == 0 {
            return Err(ConfigError::Validation(
                "poll interval must be at least 1 second".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "prodigiod=info,prodigio=info".to_string(),
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self { interval_secs: 30 }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// The auth code is missing or malformed.
    #[error("invalid client.auth_code")]
    AuthCode(#[source] ValidationError),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
