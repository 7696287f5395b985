//! BLE adapter configuration.

use std::time::Duration;

use serde::Deserialize;

/// Configuration for the btleplug transport.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BleConfig {
    /// How long each scan listens for advertisements, in seconds.
    pub scan_duration_secs: u16,
}

impl BleConfig {
    #[must_use]
    pub fn scan_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.scan_duration_secs))
    }
}

impl Default for BleConfig {
    fn default() -> Self {
        Self {
            scan_duration_secs: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_scan_for_ten_seconds_by_default() {
        assert_eq!(BleConfig::default().scan_duration(), Duration::from_secs(10));
    }

    #[test]
    fn should_deserialize_scan_duration() {
        let config: BleConfig = toml::from_str("scan_duration_secs = 4").unwrap();
        assert_eq!(config.scan_duration(), Duration::from_secs(4));
    }

    #[test]
    fn should_default_missing_fields() {
        let config: BleConfig = toml::from_str("").unwrap();
        assert_eq!(config.scan_duration_secs, 10);
    }
}
