//! # Message Bus
//!
//! Composition root. One [`Bus`] per execution context owns:
//!
//! - the [`PortRegistry`] of live channels
//! - the [`Correlator`] of pending requests
//! - the [`ListenerRegistry`] and the two scoped dispatch events
//! - the set of greetings claimed by message lines
//!
//! ```text
//!   Host ──connect──► PortRegistry ◄──accept── inbound Port
//!                         │ on_message
//!            ┌────────────┼─────────────┐
//!            ▼            ▼             ▼
//!      notify event  request event  Correlator (responses)
//!            │            │
//!            ▼            ▼
//!        Scope listeners / streams / lines
//! ```

use crate::config::BusConfig;
use crate::correlator::Correlator;
use crate::domain::{BusError, Envelope, RequestEnvelope, TargetId, WireMessage};
use crate::event::{ListenerId, MapEvent};
use crate::listeners::ListenerRegistry;
use crate::ports::{Connection, Inbound, PortHandle, PortRegistry};
use crate::scope::{NotifySelector, RequestSelector, Scope, SendOptions};
use crate::transport::{derive_target, Host, Port};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// The two scoped dispatch events every scope listener lives in.
pub(crate) struct ScopedEvents {
    pub(crate) notify: MapEvent<NotifySelector>,
    pub(crate) request: MapEvent<RequestSelector>,
}

impl ScopedEvents {
    fn dispatch(&self, inbound: &Inbound) -> usize {
        match inbound.message {
            WireMessage::Notify(_) => self.notify.call_listeners(inbound),
            WireMessage::Request(_) => self.request.call_listeners(inbound),
            WireMessage::Response(_) => 0,
        }
    }

    fn clear(&self) {
        self.notify.clear_listeners();
        self.request.clear_listeners();
    }
}

pub(crate) struct BusInner {
    host: Arc<dyn Host>,
    config: BusConfig,
    own_name: Option<String>,
    ports: PortRegistry,
    correlator: Correlator,
    pub(crate) listeners: ListenerRegistry,
    pub(crate) events: Arc<ScopedEvents>,
    greetings: Mutex<HashSet<(String, String)>>,
    connected: Arc<Notify>,
}

/// Message bus of one execution context.
#[derive(Clone)]
pub struct Bus {
    inner: Arc<BusInner>,
}

/// Non-owning bus handle, for host callbacks that must not keep it alive.
#[derive(Clone)]
pub struct WeakBus {
    inner: Weak<BusInner>,
}

impl WeakBus {
    /// The bus, if it is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<Bus> {
        self.inner.upgrade().map(|inner| Bus { inner })
    }
}

impl fmt::Debug for Bus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bus")
            .field("own_name", &self.inner.own_name)
            .field("ports", &self.inner.ports)
            .field("pending", &self.inner.correlator.pending_count())
            .finish()
    }
}

impl Bus {
    /// Create a bus over `host`.
    pub fn new(host: Arc<dyn Host>, config: BusConfig) -> Result<Self, BusError> {
        config.validate()?;

        let own_name = host.own_name();
        if own_name.is_none() {
            warn!("Context has no name; named messages will not reach default listeners");
        }

        let ports = PortRegistry::new();
        let correlator = Correlator::new();
        correlator.attach(&ports);

        let events = Arc::new(ScopedEvents {
            notify: MapEvent::new(NotifySelector::new(own_name.clone())),
            request: MapEvent::new(RequestSelector::new(own_name.clone())),
        });
        let dispatch = Arc::clone(&events);
        ports.on_message().add_listener(
            ListenerId::next(),
            Arc::new(move |inbound: Inbound| {
                dispatch.dispatch(&inbound);
            }),
        );

        let connected = Arc::new(Notify::new());
        let wake = Arc::clone(&connected);
        ports.on_connect().add_listener(
            ListenerId::next(),
            Arc::new(move |_: Connection| wake.notify_waiters()),
        );

        info!(own_name = ?own_name, "Message bus started");
        Ok(Self {
            inner: Arc::new(BusInner {
                host,
                config,
                own_name,
                ports,
                correlator,
                listeners: ListenerRegistry::new(),
                events,
                greetings: Mutex::new(HashSet::new()),
                connected,
            }),
        })
    }

    pub(crate) fn inner(&self) -> &BusInner {
        &self.inner
    }

    /// Non-owning handle to this bus.
    #[must_use]
    pub fn downgrade(&self) -> WeakBus {
        WeakBus {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Logical name of this context.
    #[must_use]
    pub fn own_name(&self) -> Option<&str> {
        self.inner.own_name.as_deref()
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &BusConfig {
        &self.inner.config
    }

    /// Live channel table.
    #[must_use]
    pub fn ports(&self) -> &PortRegistry {
        &self.inner.ports
    }

    /// Pending-request table.
    #[must_use]
    pub fn correlator(&self) -> &Correlator {
        &self.inner.correlator
    }

    /// Surface for the scope named `name`.
    pub fn scope(&self, name: impl Into<String>) -> Scope {
        Scope::new(self.clone(), name.into())
    }

    /// Register a channel announced by another context.
    ///
    /// Content scripts are keyed by tab, everything else by port name.
    pub fn accept(&self, port: Arc<dyn Port>) -> Result<TargetId, BusError> {
        let Some(target) = derive_target(port.as_ref()) else {
            warn!(name = %port.name(), "Rejecting port with no derivable identity");
            return Err(BusError::UnderivablePortName {
                name: port.name().to_owned(),
            });
        };
        self.inner.ports.set(target.clone(), port);
        info!(%target, "Accepted connection");
        Ok(target)
    }

    /// Open a channel to `target` through the host and register it.
    pub fn connect(&self, target: &TargetId) -> Result<PortHandle, BusError> {
        let port = self.inner.host.connect(target)?;
        let handle = self.inner.ports.set(target.clone(), port);
        info!(%target, "Connected");
        Ok(handle)
    }

    /// Disconnect every channel, fail every pending request and drop every
    /// listener. Open streams end.
    pub fn shutdown(&self) {
        let failed = self.inner.correlator.fail_all();
        self.inner.ports.clear();
        self.inner.events.clear();
        self.inner.listeners.clear();
        info!(failed_requests = failed, "Message bus shut down");
    }

    pub(crate) async fn notify(&self, scope: &str, payload: Value, options: &SendOptions) -> Result<(), BusError> {
        let (port_target, target) = options.route();
        let message = WireMessage::Notify(self.envelope(scope, target, payload));

        match port_target {
            Some(port_target) => {
                let port = self.resolve_port(&port_target).await?;
                port.post(&message)?;
                debug!(scope, target = %port_target, "Message sent");
            }
            None => {
                let delivered = self.broadcast(&message)?;
                debug!(scope, ports = delivered, "Message broadcast");
            }
        }
        Ok(())
    }

    pub(crate) async fn request(&self, scope: &str, payload: Value, options: &SendOptions) -> Result<Value, BusError> {
        let (port_target, target) = options.route();
        let reply = self.inner.correlator.register(port_target.clone());
        let id = reply.id();
        let message = WireMessage::Request(RequestEnvelope {
            id,
            envelope: self.envelope(scope, target, payload),
        });

        let posted = match &port_target {
            Some(port_target) => match self.resolve_port(port_target).await {
                Ok(port) => port.post(&message),
                Err(e) => Err(e),
            },
            None => match self.broadcast(&message) {
                Ok(0) => Err(BusError::unreachable(None)),
                Ok(_) => Ok(()),
                Err(e) => Err(e),
            },
        };
        if let Err(e) = posted {
            self.inner.correlator.abandon(id);
            return Err(e);
        }

        debug!(scope, request_id = %id, target = ?port_target, "Request sent");
        let timeout = options.timeout.or_else(|| self.inner.config.request_timeout());
        reply.wait(timeout).await
    }

    fn envelope(&self, scope: &str, target: Option<TargetId>, payload: Value) -> Envelope {
        Envelope {
            scope: scope.to_owned(),
            target,
            sender: self.inner.own_name.clone().map(TargetId::Name),
            payload,
        }
    }

    /// Post on every registered channel; returns how many accepted it.
    ///
    /// Fails with the last transport error when channels exist but none
    /// accepted the message.
    fn broadcast(&self, message: &WireMessage) -> Result<usize, BusError> {
        let value = message.encode()?;
        let mut delivered = 0;
        let mut last_error = None;
        self.inner.ports.for_each(|target, handle| match handle.port().post(value.clone()) {
            Ok(()) => delivered += 1,
            Err(e) => {
                warn!(%target, error = %e, "Broadcast post failed");
                last_error = Some(e);
            }
        });
        match last_error {
            Some(e) if delivered == 0 => Err(e.into()),
            _ => Ok(delivered),
        }
    }

    /// Registered channel for `target`, connecting on demand.
    async fn resolve_port(&self, target: &TargetId) -> Result<PortHandle, BusError> {
        if let Some(port) = self.inner.ports.get(target) {
            return Ok(port);
        }
        let config = &self.inner.config;
        if !config.connect_on_demand {
            return Err(BusError::unreachable(Some(target)));
        }

        let interval = config.connect_retry_interval();
        for attempt in 1..=config.connect_retries {
            let connected = self.inner.connected.notified();
            match self.connect(target) {
                Ok(port) => return Ok(port),
                Err(e) => debug!(%target, attempt, error = %e, "Connect attempt failed"),
            }
            if attempt == config.connect_retries {
                break;
            }
            // Inbound connections wake the wait early.
            let _ = tokio::time::timeout(interval, connected).await;
            if let Some(port) = self.inner.ports.get(target) {
                return Ok(port);
            }
        }

        warn!(%target, retries = config.connect_retries, "Target unreachable");
        Err(BusError::unreachable(Some(target)))
    }

    /// Claim `greeting` in `scope` for a message line.
    pub(crate) fn reserve_greeting(&self, scope: &str, greeting: &str) -> Result<(), BusError> {
        let claimed = self
            .inner
            .greetings
            .lock()
            .insert((scope.to_owned(), greeting.to_owned()));
        if claimed {
            Ok(())
        } else {
            Err(BusError::DuplicateGreeting {
                scope: scope.to_owned(),
                greeting: greeting.to_owned(),
            })
        }
    }

    pub(crate) fn release_greeting(&self, scope: &str, greeting: &str) {
        self.inner
            .greetings
            .lock()
            .remove(&(scope.to_owned(), greeting.to_owned()));
    }
}
