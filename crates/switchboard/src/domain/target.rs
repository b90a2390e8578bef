//! # Target Identity
//!
//! Identifies the context a message is addressed to or arrived from.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Port name content scripts announce themselves with.
///
/// A port carrying this name is keyed by the tab handle of its sender
/// rather than by its name, since every content script shares it.
pub const CONTENT_PORT_NAME: &str = "content";

/// Identity of a remote execution context.
///
/// Serialized untagged: a JSON number for tabs, a JSON string for names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetId {
    /// Opaque handle of a foreground tab/document (content script).
    Tab(i64),
    /// Well-known logical name (`background`, `options`, `popup`, ...).
    Name(String),
}

impl TargetId {
    /// Build a named target.
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    /// The logical name, if this is a named target.
    #[must_use]
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Self::Name(name) => Some(name),
            Self::Tab(_) => None,
        }
    }

    /// The tab handle, if this is a tab target.
    #[must_use]
    pub fn as_tab(&self) -> Option<i64> {
        match self {
            Self::Tab(id) => Some(*id),
            Self::Name(_) => None,
        }
    }

    /// Whether this identifies a content script in a tab.
    #[must_use]
    pub fn is_tab(&self) -> bool {
        matches!(self, Self::Tab(_))
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tab(id) => write!(f, "tab#{id}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

impl From<&str> for TargetId {
    fn from(name: &str) -> Self {
        Self::Name(name.to_owned())
    }
}

impl From<String> for TargetId {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<i64> for TargetId {
    fn from(id: i64) -> Self {
        Self::Tab(id)
    }
}

/// Who a delivered message came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSender {
    /// Identity of the connection the message arrived on.
    pub port: TargetId,
    /// Name the sending context declared in the envelope, if any.
    pub origin: Option<TargetId>,
}

impl MessageSender {
    /// Create a sender record.
    #[must_use]
    pub fn new(port: TargetId, origin: Option<TargetId>) -> Self {
        Self { port, origin }
    }

    /// Tab handle of the sender when it is a content script.
    #[must_use]
    pub fn tab_id(&self) -> Option<i64> {
        self.port.as_tab()
    }
}
