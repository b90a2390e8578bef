//! In-process transport.
//!
//! A [`MemoryNetwork`] is a directory of contexts. Each context gets a
//! [`MemoryHost`] and binds its [`Bus`] to receive inbound channels.
//! Connecting creates a linked pair of [`MemoryPort`]s: the caller keeps
//! one end, the other is announced to the target's bus under the caller's
//! identity (`"content"` plus tab handle for tabs, the name otherwise).
//!
//! Delivery is synchronous. Disconnecting one end notifies only the other.

use crate::bus::{Bus, WeakBus};
use crate::domain::{TargetId, TransportError, CONTENT_PORT_NAME};
use crate::transport::{DisconnectHandler, Host, MessageHandler, Port, PortSender};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// Directory of in-process contexts.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    contexts: Arc<RwLock<HashMap<TargetId, WeakBus>>>,
}

impl fmt::Debug for MemoryNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let contexts: Vec<TargetId> = self.contexts.read().keys().cloned().collect();
        f.debug_struct("MemoryNetwork").field("contexts", &contexts).finish()
    }
}

impl MemoryNetwork {
    /// Create an empty network.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Host for the context named `name`.
    pub fn host(&self, name: impl Into<String>) -> Arc<MemoryHost> {
        Arc::new(MemoryHost {
            network: self.clone(),
            identity: TargetId::Name(name.into()),
        })
    }

    /// Host for the content script in tab `tab_id`.
    #[must_use]
    pub fn tab_host(&self, tab_id: i64) -> Arc<MemoryHost> {
        Arc::new(MemoryHost {
            network: self.clone(),
            identity: TargetId::Tab(tab_id),
        })
    }

    /// Whether a live bus is bound under `identity`.
    #[must_use]
    pub fn is_bound(&self, identity: &TargetId) -> bool {
        self.contexts
            .read()
            .get(identity)
            .is_some_and(|bus| bus.upgrade().is_some())
    }

    fn bind(&self, identity: TargetId, bus: &Bus) {
        debug!(%identity, "Context bound");
        self.contexts.write().insert(identity, bus.downgrade());
    }

    fn detach(&self, identity: &TargetId) -> bool {
        self.contexts.write().remove(identity).is_some()
    }

    fn lookup(&self, identity: &TargetId) -> Option<Bus> {
        self.contexts.read().get(identity).and_then(WeakBus::upgrade)
    }
}

/// Host of one in-process context.
pub struct MemoryHost {
    network: MemoryNetwork,
    identity: TargetId,
}

impl fmt::Debug for MemoryHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryHost").field("identity", &self.identity).finish()
    }
}

impl MemoryHost {
    /// Identity other contexts reach this one by.
    #[must_use]
    pub fn identity(&self) -> &TargetId {
        &self.identity
    }

    /// Start accepting inbound channels for `bus`.
    pub fn bind(&self, bus: &Bus) {
        self.network.bind(self.identity.clone(), bus);
    }

    /// Stop accepting inbound channels.
    pub fn detach(&self) -> bool {
        self.network.detach(&self.identity)
    }

    fn endpoint(identity: &TargetId) -> (String, PortSender) {
        match identity {
            TargetId::Tab(tab_id) => (CONTENT_PORT_NAME.to_owned(), PortSender::tab(*tab_id)),
            TargetId::Name(name) => (name.clone(), PortSender::default()),
        }
    }
}

impl Host for MemoryHost {
    fn own_name(&self) -> Option<String> {
        match &self.identity {
            TargetId::Tab(_) => Some(CONTENT_PORT_NAME.to_owned()),
            TargetId::Name(name) => Some(name.clone()),
        }
    }

    fn connect(&self, target: &TargetId) -> Result<Arc<dyn Port>, TransportError> {
        let remote_bus = self
            .network
            .lookup(target)
            .ok_or_else(|| TransportError::NoSuchTarget(target.to_string()))?;

        let (local_name, local_sender) = Self::endpoint(target);
        let (remote_name, remote_sender) = Self::endpoint(&self.identity);
        let (local, remote) = MemoryPort::pair((local_name, local_sender), (remote_name, remote_sender));

        remote_bus
            .accept(remote)
            .map_err(|e| TransportError::Rejected(e.to_string()))?;
        debug!(from = %self.identity, to = %target, "Memory link opened");
        Ok(local)
    }
}

#[derive(Default)]
struct Endpoint {
    message_handlers: Mutex<Vec<Arc<MessageHandler>>>,
    disconnect_handlers: Mutex<Vec<Arc<DisconnectHandler>>>,
}

#[derive(Default)]
struct Link {
    ends: [Endpoint; 2],
    open: AtomicBool,
}

/// One end of an in-process channel.
pub struct MemoryPort {
    name: String,
    sender: PortSender,
    side: usize,
    link: Arc<Link>,
    failure: Mutex<Option<String>>,
    posted: AtomicUsize,
}

impl fmt::Debug for MemoryPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryPort")
            .field("name", &self.name)
            .field("sender", &self.sender)
            .field("open", &self.is_open())
            .finish()
    }
}

impl MemoryPort {
    /// Create a linked pair. Each end is described by the name and sender
    /// metadata of the context on its far side.
    #[must_use]
    pub fn pair(first: (String, PortSender), second: (String, PortSender)) -> (Arc<Self>, Arc<Self>) {
        let link = Arc::new(Link::default());
        link.open.store(true, Ordering::SeqCst);
        let end = |side: usize, (name, sender): (String, PortSender)| {
            Arc::new(Self {
                name,
                sender,
                side,
                link: Arc::clone(&link),
                failure: Mutex::new(None),
                posted: AtomicUsize::new(0),
            })
        };
        (end(0, first), end(1, second))
    }

    /// Whether neither end has disconnected.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.link.open.load(Ordering::SeqCst)
    }

    /// Messages successfully posted from this end.
    #[must_use]
    pub fn posted(&self) -> usize {
        self.posted.load(Ordering::SeqCst)
    }

    /// Make every post from this end fail with `Rejected(reason)`;
    /// `None` restores normal delivery.
    pub fn set_failing(&self, reason: Option<String>) {
        *self.failure.lock() = reason;
    }

    /// Close the link as the host would, reporting `error` to both ends.
    pub fn sever(&self, error: Option<TransportError>) {
        if !self.link.open.swap(false, Ordering::SeqCst) {
            return;
        }
        for side in [self.side, 1 - self.side] {
            Self::notify_closed(&self.link.ends[side], error.clone());
        }
    }

    fn notify_closed(end: &Endpoint, error: Option<TransportError>) {
        let handlers = end.disconnect_handlers.lock().clone();
        for handler in handlers {
            handler(error.clone());
        }
    }

    fn peer(&self) -> &Endpoint {
        &self.link.ends[1 - self.side]
    }

    fn own(&self) -> &Endpoint {
        &self.link.ends[self.side]
    }
}

impl Port for MemoryPort {
    fn name(&self) -> &str {
        &self.name
    }

    fn sender(&self) -> &PortSender {
        &self.sender
    }

    fn post(&self, message: Value) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::Disconnected);
        }
        if let Some(reason) = self.failure.lock().clone() {
            return Err(TransportError::Rejected(reason));
        }
        self.posted.fetch_add(1, Ordering::SeqCst);

        let handlers = self.peer().message_handlers.lock().clone();
        trace!(port = %self.name, handlers = handlers.len(), "Delivering message");
        for handler in handlers {
            handler(message.clone());
        }
        Ok(())
    }

    fn disconnect(&self) {
        if self.link.open.swap(false, Ordering::SeqCst) {
            Self::notify_closed(self.peer(), None);
        }
    }

    fn on_message(&self, handler: MessageHandler) {
        self.own().message_handlers.lock().push(Arc::new(handler));
    }

    fn on_disconnect(&self, handler: DisconnectHandler) {
        self.own().disconnect_handlers.lock().push(Arc::new(handler));
    }
}
