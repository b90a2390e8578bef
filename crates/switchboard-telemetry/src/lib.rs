//! # Switchboard Telemetry
//!
//! Structured logging bootstrap for processes embedding Switchboard.
//! The bus itself only emits `tracing` events; this crate installs the
//! subscriber that renders them.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use switchboard_telemetry::{init_logging, TelemetryConfig};
//!
//! fn main() {
//!     let config = TelemetryConfig::from_env();
//!     let _guard = init_logging(&config).expect("Failed to init logging");
//!
//!     // Bus activity is now logged
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `SWITCHBOARD_SERVICE_NAME` | `switchboard` | Service name in the startup line |
//! | `SWITCHBOARD_LOG_LEVEL` | `info` | Log filter (falls back to `RUST_LOG`) |
//! | `SWITCHBOARD_CONSOLE_OUTPUT` | `true` | Write logs to the console |
//! | `SWITCHBOARD_JSON_LOGS` | `false` | JSON instead of human-readable output |

#![warn(missing_docs)]

mod config;
mod logging;

pub use config::{TelemetryConfig, DEFAULT_SERVICE_NAME};
pub use logging::{build_filter, init_logging, init_test_logging, LoggingGuard};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// The log filter directive could not be parsed.
    #[error("Invalid log filter: {0}")]
    Filter(String),

    /// A global subscriber is already installed.
    #[error("Failed to install subscriber: {0}")]
    AlreadyInitialized(String),
}
