//! # Event Multiplexer
//!
//! Generic listener fan-out with a pluggable [`Selector`] policy that both
//! filters and reshapes event arguments before delivery.
//!
//! - [`SetEvent`]: identity-only listeners. The selector runs once per event
//!   and every listener receives the same derived arguments.
//! - [`MapEvent`]: listeners carry options. The selector runs per listener
//!   with that listener's options; `None` skips the listener.
//!
//! Every specialized listener type in the bus (scoped message listeners,
//! respondable listeners, connection listeners) is one of these two types
//! parameterized by a different selector.

use parking_lot::RwLock;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a registered callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Allocate a fresh id.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}

/// Shared callback invoked with the selector's output.
pub type Callback<A> = Arc<dyn Fn(A) + Send + Sync>;

/// Dispatch policy of an event.
pub trait Selector: Send + Sync {
    /// Raw event fed to `call_listeners`.
    type Event;
    /// Per-listener options (`()` for set events).
    type Options: Send + Sync;
    /// Arguments delivered to a listener.
    type Output;

    /// Decide whether and how a listener with `options` sees `event`.
    fn select(&self, options: &Self::Options, event: &Self::Event) -> Option<Self::Output>;

    /// Post-process options at registration time.
    fn prepare(&self, options: Self::Options) -> Self::Options {
        options
    }
}

/// Selector that forwards every event unchanged.
pub struct Forward<E>(PhantomData<fn() -> E>);

impl<E> Forward<E> {
    /// Create the selector.
    #[must_use]
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<E> Default for Forward<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Clone> Selector for Forward<E> {
    type Event = E;
    type Options = ();
    type Output = E;

    fn select(&self, _options: &(), event: &E) -> Option<E> {
        Some(event.clone())
    }
}

/// Event with set semantics: listeners are identified by id only.
pub struct SetEvent<S: Selector<Options = ()>> {
    selector: S,
    listeners: RwLock<Vec<(ListenerId, Callback<S::Output>)>>,
}

impl<S> SetEvent<S>
where
    S: Selector<Options = ()>,
    S::Output: Clone,
{
    /// Create an event with the given selector.
    pub fn new(selector: S) -> Self {
        Self {
            selector,
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Register a callback. Returns `false` if `id` was already registered.
    pub fn add_listener(&self, id: ListenerId, callback: Callback<S::Output>) -> bool {
        let mut listeners = self.listeners.write();
        if listeners.iter().any(|(known, _)| *known == id) {
            return false;
        }
        listeners.push((id, callback));
        true
    }

    /// Deregister a callback. No-op if absent.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(known, _)| *known != id);
        listeners.len() != before
    }

    /// Whether `id` is registered.
    #[must_use]
    pub fn has_listener(&self, id: ListenerId) -> bool {
        self.listeners.read().iter().any(|(known, _)| *known == id)
    }

    /// Whether any callback is registered.
    #[must_use]
    pub fn has_listeners(&self) -> bool {
        !self.listeners.read().is_empty()
    }

    /// Number of registered callbacks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    /// Whether no callback is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Drop every callback.
    pub fn clear_listeners(&self) {
        self.listeners.write().clear();
    }

    /// Deliver `event` to every callback in registration order.
    ///
    /// Returns the number of callbacks invoked.
    pub fn call_listeners(&self, event: &S::Event) -> usize {
        let Some(args) = self.selector.select(&(), event) else {
            return 0;
        };

        let snapshot: Vec<Callback<S::Output>> = self
            .listeners
            .read()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();

        for callback in &snapshot {
            callback(args.clone());
        }
        snapshot.len()
    }
}

struct MapEntry<O, A> {
    id: ListenerId,
    options: Arc<O>,
    callback: Callback<A>,
}

impl<O, A> Clone for MapEntry<O, A> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            options: Arc::clone(&self.options),
            callback: Arc::clone(&self.callback),
        }
    }
}

/// Event with map semantics: each listener carries its own options.
pub struct MapEvent<S: Selector> {
    selector: S,
    listeners: RwLock<Vec<MapEntry<S::Options, S::Output>>>,
}

impl<S: Selector> MapEvent<S> {
    /// Create an event with the given selector.
    pub fn new(selector: S) -> Self {
        Self {
            selector,
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// The selector policy.
    pub fn selector(&self) -> &S {
        &self.selector
    }

    /// Register a callback with options.
    ///
    /// Re-registering a known id replaces its options in place and keeps
    /// its position. Returns `true` if the id was new.
    pub fn add_listener(&self, id: ListenerId, callback: Callback<S::Output>, options: S::Options) -> bool {
        let options = Arc::new(self.selector.prepare(options));
        let mut listeners = self.listeners.write();
        if let Some(entry) = listeners.iter_mut().find(|entry| entry.id == id) {
            entry.options = options;
            entry.callback = callback;
            return false;
        }
        listeners.push(MapEntry {
            id,
            options,
            callback,
        });
        true
    }

    /// Deregister a callback. No-op if absent.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|entry| entry.id != id);
        listeners.len() != before
    }

    /// Whether `id` is registered.
    #[must_use]
    pub fn has_listener(&self, id: ListenerId) -> bool {
        self.listeners.read().iter().any(|entry| entry.id == id)
    }

    /// Whether any callback is registered.
    #[must_use]
    pub fn has_listeners(&self) -> bool {
        !self.listeners.read().is_empty()
    }

    /// Number of registered callbacks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    /// Whether no callback is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Drop every callback.
    pub fn clear_listeners(&self) {
        self.listeners.write().clear();
    }

    /// Deliver `event` to each callback whose options the selector accepts.
    ///
    /// Returns the number of callbacks invoked.
    pub fn call_listeners(&self, event: &S::Event) -> usize {
        let snapshot = self.listeners.read().clone();

        let mut delivered = 0;
        for entry in &snapshot {
            if let Some(args) = self.selector.select(&entry.options, event) {
                (entry.callback)(args);
                delivered += 1;
            }
        }
        delivered
    }
}
