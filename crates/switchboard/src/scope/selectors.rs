//! Scoped dispatch policies.
//!
//! Inbound envelopes reach a listener only when, in order:
//!
//! 1. the envelope's scope equals the listener's scope
//! 2. the envelope kind matches the listener kind (notify vs request)
//! 3. the envelope is addressed to the listener (see [`is_addressed_to`])

use super::listener::Responder;
use crate::domain::{MessageSender, TargetId, WireMessage};
use crate::event::Selector;
use crate::ports::Inbound;
use serde_json::Value;

/// Options a scoped listener is registered with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerOptions {
    /// Scope the listener belongs to.
    pub scope: String,
    /// Name the listener answers to; defaults to the context's own name.
    pub name: Option<String>,
}

/// Whether a message addressed to `target` reaches a listener named `name`.
///
/// Broadcasts and tab-addressed messages reach every listener; a named
/// target reaches only listeners with that name.
#[must_use]
pub fn is_addressed_to(target: Option<&TargetId>, name: Option<&str>) -> bool {
    match target {
        None | Some(TargetId::Tab(_)) => true,
        Some(TargetId::Name(target)) => name == Some(target.as_str()),
    }
}

fn sender_of(inbound: &Inbound, origin: Option<&TargetId>) -> MessageSender {
    MessageSender::new(inbound.from.target().clone(), origin.cloned())
}

fn default_name(own_name: &Option<String>, options: ListenerOptions) -> ListenerOptions {
    ListenerOptions {
        name: options.name.or_else(|| own_name.clone()),
        ..options
    }
}

/// Delivers fire-and-forget envelopes as `(payload, sender)`.
#[derive(Debug, Clone, Default)]
pub struct NotifySelector {
    own_name: Option<String>,
}

impl NotifySelector {
    /// Selector for a context named `own_name`.
    #[must_use]
    pub fn new(own_name: Option<String>) -> Self {
        Self { own_name }
    }
}

impl Selector for NotifySelector {
    type Event = Inbound;
    type Options = ListenerOptions;
    type Output = (Value, MessageSender);

    fn select(&self, options: &ListenerOptions, inbound: &Inbound) -> Option<Self::Output> {
        if inbound.message.scope() != Some(options.scope.as_str()) {
            return None;
        }
        let WireMessage::Notify(envelope) = &inbound.message else {
            return None;
        };
        if !is_addressed_to(envelope.target.as_ref(), options.name.as_deref()) {
            return None;
        }
        Some((
            envelope.payload.clone(),
            sender_of(inbound, envelope.sender.as_ref()),
        ))
    }

    fn prepare(&self, options: ListenerOptions) -> ListenerOptions {
        default_name(&self.own_name, options)
    }
}

/// Delivers request envelopes as `(payload, sender, responder)`.
#[derive(Debug, Clone, Default)]
pub struct RequestSelector {
    own_name: Option<String>,
}

impl RequestSelector {
    /// Selector for a context named `own_name`.
    #[must_use]
    pub fn new(own_name: Option<String>) -> Self {
        Self { own_name }
    }
}

impl Selector for RequestSelector {
    type Event = Inbound;
    type Options = ListenerOptions;
    type Output = (Value, MessageSender, Responder);

    fn select(&self, options: &ListenerOptions, inbound: &Inbound) -> Option<Self::Output> {
        if inbound.message.scope() != Some(options.scope.as_str()) {
            return None;
        }
        let WireMessage::Request(request) = &inbound.message else {
            return None;
        };
        let envelope = &request.envelope;
        if !is_addressed_to(envelope.target.as_ref(), options.name.as_deref()) {
            return None;
        }
        Some((
            envelope.payload.clone(),
            sender_of(inbound, envelope.sender.as_ref()),
            Responder::new(request.id, inbound.from.clone()),
        ))
    }

    fn prepare(&self, options: ListenerOptions) -> ListenerOptions {
        default_name(&self.own_name, options)
    }
}
