//! # Message Lines
//!
//! Typed sub-channels of a scope, keyed by a greeting string that is
//! unique per scope. On the wire a line message is the scope payload
//! `{"greeting": <greeting>, "data": <T>}`; messages with another greeting,
//! or whose `data` does not decode as `T`, are skipped.

use super::listener::Responder;
use super::stream::{Incoming, MessageStream, StreamFilter};
use super::{Scope, SendOptions};
use crate::domain::{BusError, MessageSender};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio_stream::{Stream, StreamExt};
use tracing::debug;

/// Claim on a greeting, released when the last line handle drops.
struct GreetingLease {
    scope: Scope,
    greeting: String,
}

impl GreetingLease {
    fn acquire(scope: Scope, greeting: String) -> Result<Arc<Self>, BusError> {
        scope.bus().reserve_greeting(scope.name(), &greeting)?;
        Ok(Arc::new(Self { scope, greeting }))
    }

    fn wrap(&self, data: Value) -> Value {
        json!({ "greeting": self.greeting, "data": data })
    }

    fn extract<T: DeserializeOwned>(&self, payload: &Value) -> Option<T> {
        if payload.get("greeting").and_then(Value::as_str) != Some(self.greeting.as_str()) {
            return None;
        }
        let data = payload.get("data").cloned().unwrap_or(Value::Null);
        match serde_json::from_value(data) {
            Ok(data) => Some(data),
            Err(e) => {
                debug!(scope = %self.scope.name(), greeting = %self.greeting, error = %e, "Skipping undecodable line message");
                None
            }
        }
    }
}

impl Drop for GreetingLease {
    fn drop(&mut self) {
        self.scope.bus().release_greeting(self.scope.name(), &self.greeting);
    }
}

/// Fire-and-forget line carrying `T`.
pub struct Line<T> {
    lease: Arc<GreetingLease>,
    _data: PhantomData<fn() -> T>,
}

impl<T> Clone for Line<T> {
    fn clone(&self) -> Self {
        Self {
            lease: Arc::clone(&self.lease),
            _data: PhantomData,
        }
    }
}

impl<T> Line<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    pub(crate) fn new(scope: Scope, greeting: String) -> Result<Self, BusError> {
        Ok(Self {
            lease: GreetingLease::acquire(scope, greeting)?,
            _data: PhantomData,
        })
    }

    /// The greeting this line is keyed by.
    #[must_use]
    pub fn greeting(&self) -> &str {
        &self.lease.greeting
    }

    /// Send `data` on this line.
    pub async fn send(&self, data: &T, options: SendOptions) -> Result<(), BusError> {
        let payload = self.lease.wrap(serde_json::to_value(data)?);
        self.lease.scope.send(payload, options).await
    }

    /// Send the bare greeting, with no `data`.
    ///
    /// Receivers see it when `T` decodes from `null`, as `()` does.
    pub async fn greet(&self, options: SendOptions) -> Result<(), BusError> {
        let payload = json!({ "greeting": self.lease.greeting });
        self.lease.scope.send(payload, options).await
    }

    /// Send the bare greeting to the content script in tab `tab_id`.
    pub async fn to_tab(&self, tab_id: i64) -> Result<(), BusError> {
        self.greet(SendOptions::to_tab(tab_id)).await
    }

    /// Messages arriving on this line.
    #[must_use]
    pub fn stream(&self) -> LineStream<T> {
        LineStream {
            lease: Arc::clone(&self.lease),
            inner: self.lease.scope.stream_with(StreamFilter::Notifications, None),
            _data: PhantomData,
        }
    }

    /// Wait for the first message satisfying `predicate`.
    pub async fn wait_for_first<P>(&self, predicate: P) -> Result<T, BusError>
    where
        P: Fn(&T) -> bool,
    {
        let mut stream = self.stream();
        while let Some((data, _)) = stream.next().await {
            if predicate(&data) {
                return Ok(data);
            }
        }
        Err(BusError::StreamClosed)
    }
}

/// Stream of `(data, sender)` for a [`Line`].
pub struct LineStream<T> {
    lease: Arc<GreetingLease>,
    inner: MessageStream,
    _data: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> Stream for LineStream<T> {
    type Item = (T, MessageSender);

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Incoming::Notify { payload, sender })) => {
                    if let Some(data) = self.lease.extract(&payload) {
                        return Poll::Ready(Some((data, sender)));
                    }
                }
                Poll::Ready(Some(Incoming::Request { .. })) => {}
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Responder that serializes `R`.
pub struct TypedResponder<R> {
    inner: Responder,
    _reply: PhantomData<fn(R)>,
}

impl<R> Clone for TypedResponder<R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _reply: PhantomData,
        }
    }
}

impl<R: Serialize> TypedResponder<R> {
    /// Resolve the caller's request.
    pub fn respond(&self, reply: &R) -> Result<(), BusError> {
        self.inner.respond(reply)
    }

    /// Reject the caller's request with an arbitrary payload.
    pub fn reject(&self, reason: impl Serialize) -> Result<(), BusError> {
        self.inner.reject(reason)
    }

    /// The untyped responder.
    #[must_use]
    pub fn untyped(&self) -> &Responder {
        &self.inner
    }
}

/// Request/response line carrying `T` and answered with `R`.
pub struct RequestLine<T, R> {
    lease: Arc<GreetingLease>,
    _data: PhantomData<fn(T) -> R>,
}

impl<T, R> Clone for RequestLine<T, R> {
    fn clone(&self) -> Self {
        Self {
            lease: Arc::clone(&self.lease),
            _data: PhantomData,
        }
    }
}

impl<T, R> RequestLine<T, R>
where
    T: Serialize + DeserializeOwned + Send + 'static,
    R: Serialize + DeserializeOwned + Send + 'static,
{
    pub(crate) fn new(scope: Scope, greeting: String) -> Result<Self, BusError> {
        Ok(Self {
            lease: GreetingLease::acquire(scope, greeting)?,
            _data: PhantomData,
        })
    }

    /// The greeting this line is keyed by.
    #[must_use]
    pub fn greeting(&self) -> &str {
        &self.lease.greeting
    }

    /// Send `data` and wait for the reply.
    pub async fn request(&self, data: &T, options: SendOptions) -> Result<R, BusError> {
        let payload = self.lease.wrap(serde_json::to_value(data)?);
        self.lease.scope.request_as(payload, options).await
    }

    /// Requests arriving on this line.
    #[must_use]
    pub fn stream(&self) -> RequestLineStream<T, R> {
        RequestLineStream {
            lease: Arc::clone(&self.lease),
            inner: self.lease.scope.stream_with(StreamFilter::Requests, None),
            _data: PhantomData,
        }
    }

    /// Wait for the first request satisfying `predicate`.
    ///
    /// Requests seen before the match are left unanswered.
    pub async fn wait_for_first<P>(&self, predicate: P) -> Result<(T, TypedResponder<R>), BusError>
    where
        P: Fn(&T) -> bool,
    {
        let mut stream = self.stream();
        while let Some((data, _, responder)) = stream.next().await {
            if predicate(&data) {
                return Ok((data, responder));
            }
        }
        Err(BusError::StreamClosed)
    }
}

/// Stream of `(data, sender, responder)` for a [`RequestLine`].
pub struct RequestLineStream<T, R> {
    lease: Arc<GreetingLease>,
    inner: MessageStream,
    _data: PhantomData<fn(T) -> R>,
}

impl<T: DeserializeOwned, R> Stream for RequestLineStream<T, R> {
    type Item = (T, MessageSender, TypedResponder<R>);

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Incoming::Request {
                    payload,
                    sender,
                    responder,
                })) => {
                    if let Some(data) = self.lease.extract(&payload) {
                        let responder = TypedResponder {
                            inner: responder,
                            _reply: PhantomData,
                        };
                        return Poll::Ready(Some((data, sender, responder)));
                    }
                }
                Poll::Ready(Some(Incoming::Notify { .. })) => {}
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
