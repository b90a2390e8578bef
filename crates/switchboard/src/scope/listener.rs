//! User-facing listener and responder types.

use crate::domain::{BusError, ListenerError, MessageSender, RemoteError, RequestId, ResponseEnvelope, TargetId, WireMessage};
use crate::event::ListenerId;
use crate::ports::PortHandle;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Future returned by a respondable listener.
pub type ListenerFuture = Pin<Box<dyn Future<Output = Result<(), ListenerError>> + Send>>;

pub(crate) type PlainFn = dyn Fn(Value, MessageSender) -> Result<(), ListenerError> + Send + Sync;
pub(crate) type RespondableFn = dyn Fn(Value, MessageSender, Responder) -> ListenerFuture + Send + Sync;

#[derive(Clone)]
pub(crate) enum ListenerKind {
    Plain(Arc<PlainFn>),
    Respondable(Arc<RespondableFn>),
}

/// A scoped message listener.
///
/// Identity is fixed at construction; clones share it, so registering a
/// clone is the same as registering the original.
#[derive(Clone)]
pub struct MessageListener {
    id: ListenerId,
    kind: ListenerKind,
}

impl MessageListener {
    /// Listener for fire-and-forget messages.
    pub fn plain<F>(f: F) -> Self
    where
        F: Fn(Value, MessageSender) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        Self {
            id: ListenerId::next(),
            kind: ListenerKind::Plain(Arc::new(f)),
        }
    }

    /// Listener for requests, answering through the [`Responder`].
    ///
    /// An `Err` (or a panic) is sent back to the caller as a failure
    /// response.
    pub fn respondable<F, Fut>(f: F) -> Self
    where
        F: Fn(Value, MessageSender, Responder) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ListenerError>> + Send + 'static,
    {
        let adapter = move |payload: Value, sender: MessageSender, responder: Responder| -> ListenerFuture {
            Box::pin(f(payload, sender, responder))
        };
        Self {
            id: ListenerId::next(),
            kind: ListenerKind::Respondable(Arc::new(adapter)),
        }
    }

    /// Listener for requests whose return value is the reply.
    pub fn replying<F, Fut, T>(f: F) -> Self
    where
        F: Fn(Value, MessageSender) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ListenerError>> + Send + 'static,
        T: Serialize + Send + 'static,
    {
        let f = Arc::new(f);
        Self::respondable(move |payload: Value, sender: MessageSender, responder: Responder| {
            let reply = f(payload, sender);
            async move {
                let value = reply.await?;
                responder.respond(value)?;
                Ok::<(), ListenerError>(())
            }
        })
    }

    /// Identity of this listener.
    #[must_use]
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Whether this listener answers requests.
    #[must_use]
    pub fn expects_reply(&self) -> bool {
        matches!(self.kind, ListenerKind::Respondable(_))
    }

    pub(crate) fn kind(&self) -> &ListenerKind {
        &self.kind
    }
}

impl fmt::Debug for MessageListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageListener")
            .field("id", &self.id)
            .field("expects_reply", &self.expects_reply())
            .finish()
    }
}

/// Reply channel for one inbound request.
///
/// Replies travel back on the channel the request arrived on, or on its
/// successor if the caller's context reconnected in the meantime. Only the
/// first reply reaches the caller; later ones are discarded there.
#[derive(Clone, Debug)]
pub struct Responder {
    id: RequestId,
    port: PortHandle,
}

impl Responder {
    pub(crate) fn new(id: RequestId, port: PortHandle) -> Self {
        Self { id, port }
    }

    /// Id of the request being answered.
    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.id
    }

    /// Identity of the channel the request arrived on.
    #[must_use]
    pub fn sender_port(&self) -> &TargetId {
        self.port.target()
    }

    /// Resolve the caller's request with `payload`.
    pub fn respond(&self, payload: impl Serialize) -> Result<(), BusError> {
        let payload = serde_json::to_value(payload)?;
        self.post(ResponseEnvelope::success(self.id, payload))
    }

    /// Reject the caller's request with `payload`.
    pub fn reject(&self, payload: impl Serialize) -> Result<(), BusError> {
        let payload = serde_json::to_value(payload)?;
        self.post(ResponseEnvelope::rejection(self.id, payload))
    }

    pub(crate) fn fail(&self, error: &RemoteError) -> Result<(), BusError> {
        self.post(ResponseEnvelope::failure(self.id, error))
    }

    fn post(&self, response: ResponseEnvelope) -> Result<(), BusError> {
        let message = WireMessage::Response(response);
        match self.port.current() {
            Some(port) => port.post(&message),
            None => self.port.post(&message),
        }
    }
}
