//! Client configuration.

use std::time::Duration;

use prodigio_domain::auth::AuthCode;
use prodigio_domain::error::ValidationError;
use serde::Deserialize;

use crate::retry::RetryPolicy;

/// Configuration for the [`ProdigioClient`](crate::client::ProdigioClient).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Hex auth code taken from the official app (e.g. `"87302f3c2b62e4f0"`).
    pub auth_code: String,
    /// Attempts per GATT operation, including the first one.
    pub retry_attempts: u32,
    /// Pause between two attempts, in milliseconds.
    pub retry_delay_ms: u64,
}

impl ClientConfig {
    /// Parse the configured auth code.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] if the code is empty or not valid hex.
    pub fn auth_code(&self) -> Result<AuthCode, ValidationError> {
        self.auth_code.parse()
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_attempts,
            Duration::from_millis(self.retry_delay_ms),
        )
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            auth_code: String::new(),
            retry_attempts: 4,
            retry_delay_ms: 3_000,
        }
    }
}
