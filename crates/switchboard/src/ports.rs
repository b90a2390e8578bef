//! # Port Registry
//!
//! Live channels keyed by remote identity, plus three set events:
//!
//! - `on_connect`: a record was stored (fires after the state change)
//! - `on_message`: a decoded envelope arrived on a registered channel
//! - `on_disconnect`: a record was removed, locally or by the remote end
//!
//! Each stored record gets a generation key. Handlers attached to a channel
//! carry that key, so a channel that has been replaced under the same
//! identity goes inert instead of tearing down its successor. Replaced
//! channels are disconnected; handles still pointing at them resolve to the
//! successor through [`PortHandle::current`].

use crate::domain::{BusError, TargetId, TransportError, WireMessage};
use crate::event::{Forward, SetEvent};
use crate::transport::{Port, PortSender};
use parking_lot::RwLock;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, trace, warn};

/// A registered channel.
#[derive(Clone)]
pub struct PortHandle {
    key: u64,
    target: TargetId,
    port: Arc<dyn Port>,
    registry: Weak<RegistryInner>,
}

impl PortHandle {
    /// Remote identity the channel is registered under.
    #[must_use]
    pub fn target(&self) -> &TargetId {
        &self.target
    }

    /// Host metadata of the remote end.
    #[must_use]
    pub fn sender(&self) -> &PortSender {
        self.port.sender()
    }

    /// The underlying channel.
    #[must_use]
    pub fn port(&self) -> &Arc<dyn Port> {
        &self.port
    }

    /// Whether both handles refer to the same registration.
    #[must_use]
    pub fn same_connection(&self, other: &PortHandle) -> bool {
        self.key == other.key
    }

    /// Whether this handle is still the record stored for its identity.
    #[must_use]
    pub fn is_current(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|inner| inner.current(&self.target, self.key).is_some())
    }

    /// Record now stored for this handle's identity, which may be a
    /// successor registered after a reconnect.
    #[must_use]
    pub fn current(&self) -> Option<PortHandle> {
        let inner = self.registry.upgrade()?;
        let successor = inner
            .records
            .read()
            .iter()
            .find(|record| record.target == self.target)
            .cloned();
        successor
    }

    /// Encode and post an envelope.
    pub fn post(&self, message: &WireMessage) -> Result<(), BusError> {
        self.port.post(message.encode()?)?;
        Ok(())
    }
}

impl fmt::Debug for PortHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortHandle")
            .field("key", &self.key)
            .field("target", &self.target)
            .field("name", &self.port.name())
            .finish()
    }
}

/// Payload of `on_connect`.
#[derive(Clone, Debug)]
pub struct Connection {
    /// Identity the channel was stored under.
    pub target: TargetId,
    /// The stored record.
    pub port: PortHandle,
    /// Registry holding the record.
    pub registry: PortRegistry,
}

/// Payload of `on_message`.
#[derive(Clone, Debug)]
pub struct Inbound {
    /// Decoded envelope.
    pub message: WireMessage,
    /// Channel the envelope arrived on.
    pub from: PortHandle,
}

/// Payload of `on_disconnect`.
#[derive(Clone, Debug)]
pub struct Disconnection {
    /// Identity whose record was removed.
    pub target: TargetId,
    /// Transport error reported by the host, `None` for a clean close.
    pub error: Option<TransportError>,
}

struct RegistryInner {
    records: RwLock<Vec<PortHandle>>,
    next_key: AtomicU64,
    on_connect: SetEvent<Forward<Connection>>,
    on_message: SetEvent<Forward<Inbound>>,
    on_disconnect: SetEvent<Forward<Disconnection>>,
}

impl RegistryInner {
    fn current(&self, target: &TargetId, key: u64) -> Option<PortHandle> {
        self.records
            .read()
            .iter()
            .find(|record| record.key == key && &record.target == target)
            .cloned()
    }

    fn take(&self, target: &TargetId, key: Option<u64>) -> Option<PortHandle> {
        let mut records = self.records.write();
        let index = records
            .iter()
            .position(|record| &record.target == target && key.map_or(true, |key| record.key == key))?;
        Some(records.remove(index))
    }

    fn forward(&self, target: &TargetId, key: u64, value: Value) {
        let Some(from) = self.current(target, key) else {
            trace!(%target, "Dropping message from a replaced port");
            return;
        };
        match WireMessage::decode(value) {
            Ok(message) => {
                self.on_message.call_listeners(&Inbound { message, from });
            }
            Err(e) => warn!(%target, error = %e, "Dropping undecodable message"),
        }
    }

    fn closed(&self, target: &TargetId, key: u64, error: Option<TransportError>) {
        if self.take(target, Some(key)).is_none() {
            return;
        }
        debug!(%target, error = ?error, "Port closed by remote end");
        self.on_disconnect.call_listeners(&Disconnection {
            target: target.clone(),
            error,
        });
    }
}

/// Channel table shared by the bus and its collaborators.
#[derive(Clone)]
pub struct PortRegistry {
    inner: Arc<RegistryInner>,
}

impl Default for PortRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PortRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortRegistry").field("keys", &self.keys()).finish()
    }
}

impl PortRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                records: RwLock::new(Vec::new()),
                next_key: AtomicU64::new(1),
                on_connect: SetEvent::new(Forward::new()),
                on_message: SetEvent::new(Forward::new()),
                on_disconnect: SetEvent::new(Forward::new()),
            }),
        }
    }

    /// Fired after a record is stored.
    #[must_use]
    pub fn on_connect(&self) -> &SetEvent<Forward<Connection>> {
        &self.inner.on_connect
    }

    /// Fired for every decoded envelope on a registered channel.
    #[must_use]
    pub fn on_message(&self) -> &SetEvent<Forward<Inbound>> {
        &self.inner.on_message
    }

    /// Fired after a record is removed.
    #[must_use]
    pub fn on_disconnect(&self) -> &SetEvent<Forward<Disconnection>> {
        &self.inner.on_disconnect
    }

    /// Store `port` under `target`, replacing any previous record.
    ///
    /// The replaced channel is disconnected without firing `on_disconnect`;
    /// the identity stays connected through its successor.
    pub fn set(&self, target: TargetId, port: Arc<dyn Port>) -> PortHandle {
        let key = self.inner.next_key.fetch_add(1, Ordering::Relaxed);
        let handle = PortHandle {
            key,
            target: target.clone(),
            port: Arc::clone(&port),
            registry: Arc::downgrade(&self.inner),
        };

        let replaced = {
            let mut records = self.inner.records.write();
            match records.iter_mut().find(|record| record.target == target) {
                Some(existing) => Some(std::mem::replace(existing, handle.clone())),
                None => {
                    records.push(handle.clone());
                    None
                }
            }
        };
        if let Some(old) = replaced.as_ref().filter(|old| !Arc::ptr_eq(&old.port, &port)) {
            old.port.disconnect();
        }

        let weak: Weak<RegistryInner> = Arc::downgrade(&self.inner);
        let message_target = target.clone();
        port.on_message(Box::new(move |value| {
            if let Some(inner) = weak.upgrade() {
                inner.forward(&message_target, key, value);
            }
        }));

        let weak: Weak<RegistryInner> = Arc::downgrade(&self.inner);
        let closed_target = target.clone();
        port.on_disconnect(Box::new(move |error| {
            if let Some(inner) = weak.upgrade() {
                inner.closed(&closed_target, key, error);
            }
        }));

        debug!(%target, replaced = replaced.is_some(), "Port registered");
        self.inner.on_connect.call_listeners(&Connection {
            target,
            port: handle.clone(),
            registry: self.clone(),
        });
        handle
    }

    /// Record stored under `target`.
    #[must_use]
    pub fn get(&self, target: &TargetId) -> Option<PortHandle> {
        self.inner
            .records
            .read()
            .iter()
            .find(|record| &record.target == target)
            .cloned()
    }

    /// Whether a record is stored under `target`.
    #[must_use]
    pub fn has(&self, target: &TargetId) -> bool {
        self.inner.records.read().iter().any(|record| &record.target == target)
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.records.read().len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.records.read().is_empty()
    }

    /// Disconnect and remove the record under `target`.
    ///
    /// Returns `false` if nothing was stored there.
    pub fn delete(&self, target: &TargetId) -> bool {
        let Some(record) = self.inner.take(target, None) else {
            return false;
        };
        record.port.disconnect();
        debug!(%target, "Port deleted");
        self.inner.on_disconnect.call_listeners(&Disconnection {
            target: record.target,
            error: None,
        });
        true
    }

    /// Disconnect and remove every record.
    pub fn clear(&self) {
        let records = std::mem::take(&mut *self.inner.records.write());
        for record in records {
            record.port.disconnect();
            self.inner.on_disconnect.call_listeners(&Disconnection {
                target: record.target,
                error: None,
            });
        }
    }

    /// Identities in insertion order.
    #[must_use]
    pub fn keys(&self) -> Vec<TargetId> {
        self.inner
            .records
            .read()
            .iter()
            .map(|record| record.target.clone())
            .collect()
    }

    /// Records in insertion order.
    #[must_use]
    pub fn values(&self) -> Vec<PortHandle> {
        self.inner.records.read().clone()
    }

    /// Identity/record pairs in insertion order.
    #[must_use]
    pub fn entries(&self) -> Vec<(TargetId, PortHandle)> {
        self.inner
            .records
            .read()
            .iter()
            .map(|record| (record.target.clone(), record.clone()))
            .collect()
    }

    /// Visit every record in insertion order.
    ///
    /// Runs over a snapshot; the callback may mutate the registry.
    pub fn for_each(&self, mut f: impl FnMut(&TargetId, &PortHandle)) {
        for record in self.values() {
            f(&record.target, &record);
        }
    }
}
