//! # Transport Ports
//!
//! Outbound traits implemented by the host platform. The bus consumes
//! exactly these capabilities:
//!
//! - open a channel to a named or identified target ([`Host::connect`])
//! - post a message on a channel, best-effort ([`Port::post`])
//! - observe "message received" and "channel closed" ([`Port::on_message`],
//!   [`Port::on_disconnect`])
//! - learn the local context's logical name ([`Host::own_name`])
//!
//! Inbound connection announcements are handed to [`crate::Bus::accept`].

use crate::domain::{TargetId, TransportError, CONTENT_PORT_NAME};
use serde_json::Value;
use std::sync::Arc;

/// Handler for messages arriving on a channel.
pub type MessageHandler = Box<dyn Fn(Value) + Send + Sync>;

/// Handler for channel closure, with the host's error if there was one.
pub type DisconnectHandler = Box<dyn Fn(Option<TransportError>) + Send + Sync>;

/// Sender metadata the host attaches to a channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortSender {
    /// Tab handle when the remote end is a content script.
    pub tab_id: Option<i64>,
    /// Sub-frame identity within the tab.
    pub frame_id: Option<i64>,
    /// Document URL of the remote end.
    pub url: Option<String>,
}

impl PortSender {
    /// Sender metadata for a content script in `tab_id`.
    #[must_use]
    pub fn tab(tab_id: i64) -> Self {
        Self {
            tab_id: Some(tab_id),
            ..Self::default()
        }
    }
}

/// One open channel endpoint.
pub trait Port: Send + Sync {
    /// Name the remote end announced when connecting.
    fn name(&self) -> &str;

    /// Host metadata about the remote end.
    fn sender(&self) -> &PortSender;

    /// Post a message; no implicit acknowledgement.
    fn post(&self, message: Value) -> Result<(), TransportError>;

    /// Close the channel.
    fn disconnect(&self);

    /// Subscribe to inbound messages.
    fn on_message(&self, handler: MessageHandler);

    /// Subscribe to closure of the channel by the remote end.
    fn on_disconnect(&self, handler: DisconnectHandler);
}

/// Channel factory and self-discovery of the local context.
pub trait Host: Send + Sync {
    /// Logical name of the local context, if it can be derived.
    fn own_name(&self) -> Option<String>;

    /// Open a channel to `target`.
    fn connect(&self, target: &TargetId) -> Result<Arc<dyn Port>, TransportError>;
}

/// Derive the remote identity of an inbound channel.
///
/// Content scripts are keyed by tab handle; every other context by the
/// name it announced. Returns `None` when neither is available.
#[must_use]
pub fn derive_target(port: &dyn Port) -> Option<TargetId> {
    match (port.name(), port.sender().tab_id) {
        (CONTENT_PORT_NAME, Some(tab_id)) => Some(TargetId::Tab(tab_id)),
        ("", _) => None,
        (name, _) => Some(TargetId::name(name)),
    }
}
