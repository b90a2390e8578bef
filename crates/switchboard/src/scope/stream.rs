//! Scoped message streams.
//!
//! A [`MessageStream`] owns up to two listeners in its scope, one plain and
//! one respondable, that push into an unbounded channel. The channel's
//! senders live only inside the registered adapters: dropping the stream
//! removes both adapters, and clearing the bus's listeners ends the stream.

use super::listener::{MessageListener, Responder};
use super::Scope;
use crate::domain::{ListenerError, MessageSender};
use crate::event::ListenerId;
use serde_json::Value;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tracing::debug;

/// A message delivered to a stream.
#[derive(Debug, Clone)]
pub enum Incoming {
    /// Fire-and-forget message.
    Notify {
        /// Application data.
        payload: Value,
        /// Where it came from.
        sender: MessageSender,
    },
    /// Message awaiting a reply through `responder`.
    Request {
        /// Application data.
        payload: Value,
        /// Where it came from.
        sender: MessageSender,
        /// Reply channel.
        responder: Responder,
    },
}

impl Incoming {
    /// Application data.
    #[must_use]
    pub fn payload(&self) -> &Value {
        match self {
            Self::Notify { payload, .. } | Self::Request { payload, .. } => payload,
        }
    }

    /// Where the message came from.
    #[must_use]
    pub fn sender(&self) -> &MessageSender {
        match self {
            Self::Notify { sender, .. } | Self::Request { sender, .. } => sender,
        }
    }

    /// Reply channel, for requests.
    #[must_use]
    pub fn responder(&self) -> Option<&Responder> {
        match self {
            Self::Notify { .. } => None,
            Self::Request { responder, .. } => Some(responder),
        }
    }
}

/// Which message kinds a stream receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamFilter {
    /// Notifications and requests.
    #[default]
    All,
    /// Fire-and-forget messages only.
    Notifications,
    /// Requests only.
    Requests,
}

impl StreamFilter {
    fn notifications(self) -> bool {
        matches!(self, Self::All | Self::Notifications)
    }

    fn requests(self) -> bool {
        matches!(self, Self::All | Self::Requests)
    }
}

/// Stream of messages delivered in a scope.
pub struct MessageStream {
    scope: Scope,
    filter: StreamFilter,
    listeners: Vec<ListenerId>,
    inner: UnboundedReceiverStream<Incoming>,
}

impl MessageStream {
    pub(crate) fn new(scope: Scope, filter: StreamFilter, name: Option<&str>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut listeners = Vec::with_capacity(2);

        if filter.notifications() {
            let tx = tx.clone();
            listeners.push(MessageListener::plain(move |payload, sender| {
                if tx.send(Incoming::Notify { payload, sender }).is_err() {
                    debug!("Stream closed, dropping notification");
                }
                Ok(())
            }));
        }
        if filter.requests() {
            listeners.push(MessageListener::respondable(move |payload, sender, responder| {
                if tx.send(Incoming::Request { payload, sender, responder }).is_err() {
                    debug!("Stream closed, dropping request");
                }
                std::future::ready(Ok::<(), ListenerError>(()))
            }));
        }

        for listener in &listeners {
            scope.on(listener, name);
        }

        Self {
            scope,
            filter,
            listeners: listeners.iter().map(MessageListener::id).collect(),
            inner: UnboundedReceiverStream::new(rx),
        }
    }

    /// Scope this stream listens in.
    #[must_use]
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Kinds this stream receives.
    #[must_use]
    pub fn kind_filter(&self) -> StreamFilter {
        self.filter
    }

    /// Receive the next message.
    ///
    /// Returns `None` once the bus has shut down.
    pub async fn recv(&mut self) -> Option<Incoming> {
        self.inner.next().await
    }

    /// Receive a message if one is queued.
    pub fn try_recv(&mut self) -> Option<Incoming> {
        self.inner.as_mut().try_recv().ok()
    }
}

impl Stream for MessageStream {
    type Item = Incoming;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl Drop for MessageStream {
    fn drop(&mut self) {
        for listener in &self.listeners {
            self.scope.off_id(*listener);
        }
        debug!(scope = %self.scope.name(), "Message stream dropped");
    }
}
