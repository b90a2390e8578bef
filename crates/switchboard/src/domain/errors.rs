//! # Domain Errors
//!
//! Error types for the message bus.

use super::message::{RemoteError, RequestId};
use super::target::TargetId;
use std::any::Any;
use std::time::Duration;
use thiserror::Error;

/// Failures reported by the host transport.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The channel was closed before or while the operation ran.
    #[error("Port disconnected")]
    Disconnected,

    /// No context is registered under the requested identity.
    #[error("No context is listening as {0}")]
    NoSuchTarget(String),

    /// The transport refused the message (the host's "last error").
    #[error("Transport rejected the message: {0}")]
    Rejected(String),
}

/// Errors surfaced to callers of the bus.
#[derive(Debug, Error)]
pub enum BusError {
    /// No open channel to the target and the connect window elapsed.
    #[error("Target {target} is not registered, could not connect to port")]
    UnreachableTarget {
        /// Requested target, `broadcast` when no target was named.
        target: String,
    },

    /// The host transport failed to connect or post.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The channel to the target closed before a response was received.
    #[error("Port to {target} closed before a response was received")]
    PortClosed {
        /// Target whose channel closed.
        target: TargetId,
    },

    /// The remote listener failed and replied with an error descriptor.
    #[error("Remote listener failed: {0}")]
    Remote(RemoteError),

    /// No reply arrived within the request timeout.
    #[error("Request {id} timed out after {after:?}")]
    Timeout {
        /// Request that timed out.
        id: RequestId,
        /// Configured timeout.
        after: Duration,
    },

    /// An inbound port carried neither a usable name nor a tab handle.
    #[error("Unable to derive port name from {name:?}")]
    UnderivablePortName {
        /// Name the port announced.
        name: String,
    },

    /// A message line with this greeting already exists in the scope.
    #[error("Greeting {greeting:?} is not unique in scope {scope:?}")]
    DuplicateGreeting {
        /// Scope of the line.
        scope: String,
        /// Duplicated greeting.
        greeting: String,
    },

    /// A payload or envelope could not be (de)serialized.
    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// The configuration is unusable.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The stream ended before a matching message arrived.
    #[error("Message stream closed")]
    StreamClosed,

    /// The bus shut down while the operation was pending.
    #[error("Bus shut down")]
    Shutdown,
}

impl BusError {
    /// Unreachable-target error for an optional target.
    pub(crate) fn unreachable(target: Option<&TargetId>) -> Self {
        Self::UnreachableTarget {
            target: target.map_or_else(|| "broadcast".to_owned(), ToString::to_string),
        }
    }
}

/// Failure raised by a registered listener.
///
/// Plain listener failures are logged; respondable listener failures are
/// sent back to the caller as a failure response.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ListenerError {
    /// Human readable description.
    pub message: String,
    /// Error kind, e.g. `TypeError`.
    pub name: Option<String>,
}

impl ListenerError {
    /// Create an error with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            name: None,
        }
    }

    /// Create an error with a kind and a message.
    pub fn named(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            name: Some(name.into()),
        }
    }

    /// Convert a caught panic payload.
    pub(crate) fn from_panic(panic: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = panic.downcast_ref::<&str>() {
            (*s).to_owned()
        } else if let Some(s) = panic.downcast_ref::<String>() {
            s.clone()
        } else {
            "listener panicked".to_owned()
        };
        Self::named("Panic", message)
    }
}

impl From<&str> for ListenerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for ListenerError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<serde_json::Error> for ListenerError {
    fn from(error: serde_json::Error) -> Self {
        Self::named("CodecError", error.to_string())
    }
}

impl From<BusError> for ListenerError {
    fn from(error: BusError) -> Self {
        Self::named("BusError", error.to_string())
    }
}

impl From<ListenerError> for RemoteError {
    fn from(error: ListenerError) -> Self {
        Self {
            message: error.message,
            name: error.name,
        }
    }
}
