//! # Bus Configuration
//!
//! Request timeout and connect-on-demand policy.

use crate::domain::BusError;
use crate::{
    DEFAULT_CONNECT_RETRIES, DEFAULT_CONNECT_RETRY_INTERVAL_MS, DEFAULT_REQUEST_TIMEOUT_MS,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bus configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// How long a request waits for its reply, in milliseconds.
    /// `None` waits until the reply arrives or the channel closes.
    pub request_timeout_ms: Option<u64>,

    /// Open a channel through the host when a send names an unknown target.
    pub connect_on_demand: bool,

    /// Connect attempts before a target is declared unreachable.
    pub connect_retries: u32,

    /// Pause between connect attempts, in milliseconds.
    pub connect_retry_interval_ms: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: Some(DEFAULT_REQUEST_TIMEOUT_MS),
            connect_on_demand: true,
            connect_retries: DEFAULT_CONNECT_RETRIES,
            connect_retry_interval_ms: DEFAULT_CONNECT_RETRY_INTERVAL_MS,
        }
    }
}

impl BusConfig {
    /// Create a config for testing (short windows).
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            request_timeout_ms: Some(500),
            connect_on_demand: true,
            connect_retries: 3,
            connect_retry_interval_ms: 10,
        }
    }

    /// Request timeout as a duration.
    #[must_use]
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    /// Retry pause as a duration.
    #[must_use]
    pub fn connect_retry_interval(&self) -> Duration {
        Duration::from_millis(self.connect_retry_interval_ms)
    }

    /// Reject unusable combinations.
    pub fn validate(&self) -> Result<(), BusError> {
        if self.request_timeout_ms == Some(0) {
            return Err(BusError::InvalidConfig(
                "request_timeout_ms must be positive or unset".into(),
            ));
        }
        if self.connect_on_demand && self.connect_retries > 0 && self.connect_retry_interval_ms == 0 {
            return Err(BusError::InvalidConfig(
                "connect_retry_interval_ms must be positive when retries are enabled".into(),
            ));
        }
        Ok(())
    }
}
