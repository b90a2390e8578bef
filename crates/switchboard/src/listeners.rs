//! # Listener Registry
//!
//! Maps, per scope, a user listener's identity to the adapter actually
//! registered with the scoped dispatch events, so `off` can find and
//! deregister the adapter without the caller knowing it exists.

use crate::event::ListenerId;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Which dispatch event an adapter is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterKind {
    /// Fire-and-forget messages.
    Notify,
    /// Messages expecting a reply.
    Request,
}

/// Internal adapter bound on behalf of a user listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdapterRecord {
    /// Event the adapter is registered with.
    pub kind: AdapterKind,
    /// Id the adapter is registered under.
    pub adapter: ListenerId,
}

/// Per-scope table of user listener → adapter.
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    scopes: RwLock<HashMap<String, HashMap<ListenerId, AdapterRecord>>>,
}

impl ListenerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an association, creating the scope map on first use.
    ///
    /// Returns `false` and leaves the existing record untouched when the
    /// listener is already registered in this scope.
    pub fn set_listener(&self, scope: &str, listener: ListenerId, adapter: AdapterRecord) -> bool {
        let mut scopes = self.scopes.write();
        let callbacks = scopes.entry(scope.to_owned()).or_default();
        if callbacks.contains_key(&listener) {
            return false;
        }
        callbacks.insert(listener, adapter);
        true
    }

    /// The adapter bound for `listener` in `scope`.
    #[must_use]
    pub fn get_listener(&self, scope: &str, listener: ListenerId) -> Option<AdapterRecord> {
        self.scopes
            .read()
            .get(scope)
            .and_then(|callbacks| callbacks.get(&listener).copied())
    }

    /// Whether `listener` is registered in `scope`.
    #[must_use]
    pub fn has_listener(&self, scope: &str, listener: ListenerId) -> bool {
        self.get_listener(scope, listener).is_some()
    }

    /// Delete an association. The scope map stays in place even when empty.
    pub fn remove_listener(&self, scope: &str, listener: ListenerId) -> Option<AdapterRecord> {
        self.scopes
            .write()
            .get_mut(scope)
            .and_then(|callbacks| callbacks.remove(&listener))
    }

    /// Number of listeners registered in `scope`.
    #[must_use]
    pub fn scope_len(&self, scope: &str) -> usize {
        self.scopes.read().get(scope).map_or(0, HashMap::len)
    }

    /// Number of scopes that have ever had a listener.
    #[must_use]
    pub fn scope_count(&self) -> usize {
        self.scopes.read().len()
    }

    /// Drop every association in every scope.
    pub fn clear(&self) {
        self.scopes.write().clear();
    }
}
