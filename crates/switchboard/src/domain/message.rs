//! # Wire Messages
//!
//! Every message crossing a channel is one of three envelopes:
//!
//! | Kind | Expects reply | Carries id |
//! |------|---------------|------------|
//! | `notify` | no | no |
//! | `request` | yes | yes |
//! | `response` | - | echoes the request id |
//!
//! Envelopes are converted to and from `serde_json::Value`, the native
//! message format of the host transport.

use super::errors::BusError;
use super::target::TargetId;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Correlation token of a request (random 128-bit UUID).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Generate a fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Routing header plus application payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Logical channel; messages are invisible outside their scope.
    pub scope: String,
    /// Intended receiver, `None` for a broadcast.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<TargetId>,
    /// Name of the sending context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<TargetId>,
    /// Application data.
    #[serde(default)]
    pub payload: Value,
}

/// An envelope that expects a reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// Correlation id echoed by the response.
    pub id: RequestId,
    /// Routing header and payload.
    #[serde(flatten)]
    pub envelope: Envelope,
}

/// Reply to a [`RequestEnvelope`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Id of the originating request.
    pub id: RequestId,
    /// Whether the listener succeeded.
    pub success: bool,
    /// Response data on success, a [`RemoteError`] descriptor on failure.
    #[serde(default)]
    pub payload: Value,
}

impl ResponseEnvelope {
    /// Successful reply carrying `payload`.
    #[must_use]
    pub fn success(id: RequestId, payload: Value) -> Self {
        Self {
            id,
            success: true,
            payload,
        }
    }

    /// Failed reply carrying an arbitrary rejection payload.
    #[must_use]
    pub fn rejection(id: RequestId, payload: Value) -> Self {
        Self {
            id,
            success: false,
            payload,
        }
    }

    /// Failed reply carrying an error descriptor.
    #[must_use]
    pub fn failure(id: RequestId, error: &RemoteError) -> Self {
        Self::rejection(id, error.to_value())
    }
}

/// Message as it travels over a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WireMessage {
    /// Fire-and-forget message.
    Notify(Envelope),
    /// Message expecting a reply.
    Request(RequestEnvelope),
    /// Reply to a request.
    Response(ResponseEnvelope),
}

impl WireMessage {
    /// Whether the sender awaits a reply (the logical `async` flag).
    #[must_use]
    pub fn expects_reply(&self) -> bool {
        matches!(self, Self::Request(_))
    }

    /// Scope of a notify or request; responses are unscoped.
    #[must_use]
    pub fn scope(&self) -> Option<&str> {
        match self {
            Self::Notify(envelope) => Some(&envelope.scope),
            Self::Request(request) => Some(&request.envelope.scope),
            Self::Response(_) => None,
        }
    }

    /// Routing header of a notify or request.
    #[must_use]
    pub fn envelope(&self) -> Option<&Envelope> {
        match self {
            Self::Notify(envelope) => Some(envelope),
            Self::Request(request) => Some(&request.envelope),
            Self::Response(_) => None,
        }
    }

    /// Encode into the host's native message format.
    pub fn encode(&self) -> Result<Value, BusError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Decode from the host's native message format.
    pub fn decode(value: Value) -> Result<Self, BusError> {
        Ok(serde_json::from_value(value)?)
    }
}

/// Error descriptor carried by a failure response.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message}")]
pub struct RemoteError {
    /// Description of the failure.
    pub message: String,
    /// Error kind reported by the remote listener.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl RemoteError {
    /// Create a descriptor with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            name: None,
        }
    }

    /// Serialize as a JSON object.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match &self.name {
            Some(name) => json!({ "message": self.message, "name": name }),
            None => json!({ "message": self.message }),
        }
    }

    /// Interpret a failure payload.
    ///
    /// Accepts an error descriptor object, a bare string, or any other JSON
    /// value, which is kept verbatim as the message text.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::String(message) => Self::new(message),
            other => serde_json::from_value(other.clone())
                .unwrap_or_else(|_| Self::new(other.to_string())),
        }
    }
}
