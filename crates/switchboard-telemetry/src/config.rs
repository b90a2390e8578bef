//! Logging configuration from environment variables.

use serde::{Deserialize, Serialize};
use std::env;

/// Default service name attached to every log line.
pub const DEFAULT_SERVICE_NAME: &str = "switchboard";

/// Configuration for the logging stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Service name attached to the startup log line.
    pub service_name: String,

    /// Log filter directive (trace, debug, info, warn, error, or an
    /// `EnvFilter` expression such as `switchboard=debug`).
    pub log_level: String,

    /// Whether to write logs to the console at all.
    pub console_output: bool,

    /// Whether to emit JSON instead of human-readable lines.
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            log_level: "info".to_string(),
            console_output: true,
            json_logs: false,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `SWITCHBOARD_SERVICE_NAME`: Service name (default: switchboard)
    /// - `SWITCHBOARD_LOG_LEVEL` or `RUST_LOG`: Log filter (default: info)
    /// - `SWITCHBOARD_CONSOLE_OUTPUT`: Enable console output (default: true)
    /// - `SWITCHBOARD_JSON_LOGS`: Enable JSON logs (default: false)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            service_name: lookup("SWITCHBOARD_SERVICE_NAME").unwrap_or(defaults.service_name),

            log_level: lookup("SWITCHBOARD_LOG_LEVEL")
                .or_else(|| lookup("RUST_LOG"))
                .unwrap_or(defaults.log_level),

            console_output: lookup("SWITCHBOARD_CONSOLE_OUTPUT")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(defaults.console_output),

            json_logs: lookup("SWITCHBOARD_JSON_LOGS")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(defaults.json_logs),
        }
    }

    /// Configuration for test binaries: debug level, plain output.
    pub fn for_testing() -> Self {
        Self {
            service_name: format!("{DEFAULT_SERVICE_NAME}-tests"),
            log_level: "debug".to_string(),
            ..Self::default()
        }
    }
}
