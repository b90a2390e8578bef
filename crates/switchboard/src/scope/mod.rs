//! # Scope Engine
//!
//! A scope is a named logical channel multiplexed over the bus's ports.
//! Messages sent in one scope are invisible to listeners of another.
//!
//! ```text
//! scope.send / scope.request
//!        │ envelope { scope, target, sender, payload }
//!        ▼
//!   route: tab → Tab port, target → Name port, neither → every port
//!        ▼
//! remote PortRegistry.on_message
//!        ▼
//!   NotifySelector / RequestSelector  (scope, kind, target filter)
//!        ▼
//!   adapter → user listener (plain or respondable)
//! ```

mod line;
mod listener;
mod selectors;
mod stream;

pub use line::{Line, LineStream, RequestLine, RequestLineStream, TypedResponder};
pub use listener::{ListenerFuture, MessageListener, Responder};
pub use selectors::{is_addressed_to, ListenerOptions, NotifySelector, RequestSelector};
pub use stream::{Incoming, MessageStream, StreamFilter};

use crate::bus::Bus;
use crate::domain::{BusError, ListenerError, MessageSender, RemoteError, TargetId};
use crate::event::ListenerId;
use crate::listeners::{AdapterKind, AdapterRecord};
use futures::FutureExt;
use listener::{ListenerKind, PlainFn, RespondableFn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Addressing and timeout for one send.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendOptions {
    /// Logical name of the receiver.
    pub target: Option<String>,
    /// Tab handle of the receiving content script.
    pub tab: Option<i64>,
    /// Overrides the configured request timeout.
    pub timeout: Option<Duration>,
}

impl SendOptions {
    /// Send to every connected context.
    #[must_use]
    pub fn broadcast() -> Self {
        Self::default()
    }

    /// Send to the context named `target`.
    pub fn to(target: impl Into<String>) -> Self {
        Self {
            target: Some(target.into()),
            ..Self::default()
        }
    }

    /// Send to the content script in `tab`.
    #[must_use]
    pub fn to_tab(tab: i64) -> Self {
        Self {
            tab: Some(tab),
            ..Self::default()
        }
    }

    /// Bound the wait for a reply.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..self
        }
    }

    /// Port to post on (`None` for a broadcast) and envelope target.
    pub(crate) fn route(&self) -> (Option<TargetId>, Option<TargetId>) {
        let named = self.target.clone().map(TargetId::Name);
        match self.tab {
            Some(tab) => (Some(TargetId::Tab(tab)), named),
            None => (named.clone(), named),
        }
    }
}

/// Named logical channel over a bus.
#[derive(Clone)]
pub struct Scope {
    bus: Bus,
    name: String,
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope").field("name", &self.name).finish()
    }
}

impl Scope {
    pub(crate) fn new(bus: Bus, name: String) -> Self {
        Self { bus, name }
    }

    /// Name of this scope.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The bus this scope runs over.
    #[must_use]
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Fire-and-forget send.
    ///
    /// A broadcast with no connected context succeeds without delivering.
    pub async fn send(&self, payload: impl Serialize, options: SendOptions) -> Result<(), BusError> {
        let payload = serde_json::to_value(payload)?;
        self.bus.notify(&self.name, payload, &options).await
    }

    /// Send and wait for the first reply.
    pub async fn request(&self, payload: impl Serialize, options: SendOptions) -> Result<Value, BusError> {
        let payload = serde_json::to_value(payload)?;
        self.bus.request(&self.name, payload, &options).await
    }

    /// [`Scope::request`], decoding the reply as `R`.
    pub async fn request_as<R: DeserializeOwned>(
        &self,
        payload: impl Serialize,
        options: SendOptions,
    ) -> Result<R, BusError> {
        let reply = self.request(payload, options).await?;
        Ok(serde_json::from_value(reply)?)
    }

    /// Register `listener` in this scope.
    ///
    /// `name` restricts delivery of named messages to those addressed to
    /// it; it defaults to the context's own name. Registering the same
    /// listener twice is a no-op and returns `false`.
    pub fn on(&self, listener: &MessageListener, name: Option<&str>) -> bool {
        let adapter = ListenerId::next();
        let kind = if listener.expects_reply() {
            AdapterKind::Request
        } else {
            AdapterKind::Notify
        };
        let listeners = &self.bus.inner().listeners;
        if !listeners.set_listener(&self.name, listener.id(), AdapterRecord { kind, adapter }) {
            return false;
        }

        let options = ListenerOptions {
            scope: self.name.clone(),
            name: name.map(str::to_owned),
        };
        let events = &self.bus.inner().events;
        let scope = self.name.clone();
        match listener.kind() {
            ListenerKind::Plain(f) => {
                let f = Arc::clone(f);
                events.notify.add_listener(
                    adapter,
                    Arc::new(move |(payload, sender): (Value, MessageSender)| {
                        run_plain(&scope, &f, payload, sender);
                    }),
                    options,
                );
            }
            ListenerKind::Respondable(f) => {
                let f = Arc::clone(f);
                events.request.add_listener(
                    adapter,
                    Arc::new(move |(payload, sender, responder): (Value, MessageSender, Responder)| {
                        run_respondable(&scope, &f, payload, sender, responder);
                    }),
                    options,
                );
            }
        }
        debug!(scope = %self.name, listener = %listener.id(), ?kind, "Listener registered");
        true
    }

    /// Deregister `listener` from this scope. Returns `false` if absent.
    pub fn off(&self, listener: &MessageListener) -> bool {
        self.off_id(listener.id())
    }

    pub(crate) fn off_id(&self, listener: ListenerId) -> bool {
        let inner = self.bus.inner();
        let Some(record) = inner.listeners.remove_listener(&self.name, listener) else {
            return false;
        };
        match record.kind {
            AdapterKind::Notify => inner.events.notify.remove_listener(record.adapter),
            AdapterKind::Request => inner.events.request.remove_listener(record.adapter),
        };
        debug!(scope = %self.name, %listener, "Listener removed");
        true
    }

    /// Whether `listener` is registered in this scope.
    #[must_use]
    pub fn is_listening(&self, listener: &MessageListener) -> bool {
        self.bus.inner().listeners.has_listener(&self.name, listener.id())
    }

    /// Every message delivered in this scope, as a stream.
    #[must_use]
    pub fn stream(&self) -> MessageStream {
        MessageStream::new(self.clone(), StreamFilter::All, None)
    }

    /// Stream restricted by kind and listener name.
    #[must_use]
    pub fn stream_with(&self, filter: StreamFilter, name: Option<&str>) -> MessageStream {
        MessageStream::new(self.clone(), filter, name)
    }

    /// Typed fire-and-forget sub-channel keyed by `greeting`.
    pub fn line<T>(&self, greeting: impl Into<String>) -> Result<Line<T>, BusError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
    {
        Line::new(self.clone(), greeting.into())
    }

    /// Typed request/response sub-channel keyed by `greeting`.
    pub fn request_line<T, R>(&self, greeting: impl Into<String>) -> Result<RequestLine<T, R>, BusError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        R: Serialize + DeserializeOwned + Send + 'static,
    {
        RequestLine::new(self.clone(), greeting.into())
    }
}

fn run_plain(scope: &str, f: &Arc<PlainFn>, payload: Value, sender: MessageSender) {
    match catch_unwind(AssertUnwindSafe(|| f(payload, sender))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(scope, error = %e, "Listener failed"),
        Err(panic) => error!(scope, error = %ListenerError::from_panic(panic), "Listener panicked"),
    }
}

fn run_respondable(
    scope: &str,
    f: &Arc<RespondableFn>,
    payload: Value,
    sender: MessageSender,
    responder: Responder,
) {
    let reply = responder.clone();
    let future = match catch_unwind(AssertUnwindSafe(|| f(payload, sender, reply))) {
        Ok(future) => future,
        Err(panic) => {
            report_failure(scope, &responder, ListenerError::from_panic(panic));
            return;
        }
    };

    let scope = scope.to_owned();
    let task = async move {
        let outcome = match AssertUnwindSafe(future).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => Err(ListenerError::from_panic(panic)),
        };
        if let Err(e) = outcome {
            report_failure(&scope, &responder, e);
        }
    };

    match tokio::runtime::Handle::try_current() {
        Ok(runtime) => {
            runtime.spawn(task);
        }
        Err(_) => futures::executor::block_on(task),
    }
}

fn report_failure(scope: &str, responder: &Responder, e: ListenerError) {
    warn!(scope, request_id = %responder.request_id(), error = %e, "Respondable listener failed");
    if let Err(post) = responder.fail(&RemoteError::from(e)) {
        debug!(scope, error = %post, "Could not deliver failure response");
    }
}
