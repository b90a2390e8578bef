//! # Request/Response Correlator
//!
//! Owns the pending-request table. Each outgoing request registers a
//! one-shot completion under a fresh [`RequestId`]; the first response
//! carrying that id settles it, later ones are stale and ignored.
//!
//! Every entry is removed exactly once, by whichever of these happens
//! first: settlement, post failure (`abandon`), channel teardown
//! (`fail_target`), bus shutdown (`fail_all`), timeout, or the caller
//! dropping its [`PendingReply`].

use crate::domain::{BusError, RemoteError, RequestId, ResponseEnvelope, TargetId, WireMessage};
use crate::event::ListenerId;
use crate::ports::{Disconnection, Inbound, PortRegistry};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

type Outcome = Result<Value, BusError>;
type PendingTable = Mutex<HashMap<RequestId, PendingRequest>>;

struct PendingRequest {
    target: Option<TargetId>,
    tx: oneshot::Sender<Outcome>,
}

/// Pending-request table.
#[derive(Clone, Default)]
pub struct Correlator {
    pending: Arc<PendingTable>,
}

impl Correlator {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to response envelopes and channel teardown on `ports`.
    pub fn attach(&self, ports: &PortRegistry) {
        let correlator = self.clone();
        ports.on_message().add_listener(
            ListenerId::next(),
            Arc::new(move |inbound: Inbound| {
                if let WireMessage::Response(response) = &inbound.message {
                    correlator.settle(response);
                }
            }),
        );

        let correlator = self.clone();
        ports.on_disconnect().add_listener(
            ListenerId::next(),
            Arc::new(move |gone: Disconnection| {
                correlator.fail_target(&gone.target);
            }),
        );
    }

    /// Register a request addressed to `target` (`None` for a broadcast).
    pub fn register(&self, target: Option<TargetId>) -> PendingReply {
        let id = RequestId::new();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, PendingRequest { target, tx });
        trace!(request_id = %id, "Request registered");

        PendingReply {
            id,
            rx: Some(rx),
            table: Arc::downgrade(&self.pending),
        }
    }

    /// Settle the request `response` answers.
    ///
    /// Returns `false` for unknown (stale or duplicate) ids.
    pub fn settle(&self, response: &ResponseEnvelope) -> bool {
        let Some(pending) = self.pending.lock().remove(&response.id) else {
            debug!(request_id = %response.id, "Ignoring response with no pending request");
            return false;
        };

        let outcome = if response.success {
            Ok(response.payload.clone())
        } else {
            Err(BusError::Remote(RemoteError::from_value(response.payload.clone())))
        };
        if pending.tx.send(outcome).is_err() {
            trace!(request_id = %response.id, "Caller stopped waiting");
        }
        true
    }

    /// Remove a request that was never delivered.
    pub fn abandon(&self, id: RequestId) -> bool {
        self.pending.lock().remove(&id).is_some()
    }

    /// Reject every request addressed to `target` with `PortClosed`.
    pub fn fail_target(&self, target: &TargetId) -> usize {
        let failed: Vec<(RequestId, PendingRequest)> = {
            let mut pending = self.pending.lock();
            let ids: Vec<RequestId> = pending
                .iter()
                .filter(|(_, request)| request.target.as_ref() == Some(target))
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| pending.remove(&id).map(|request| (id, request)))
                .collect()
        };

        for (id, _) in &failed {
            debug!(request_id = %id, %target, "Failing request, port closed");
        }
        let count = failed.len();
        for (_, request) in failed {
            let _ = request.tx.send(Err(BusError::PortClosed {
                target: target.clone(),
            }));
        }
        count
    }

    /// Reject every pending request with `Shutdown`.
    pub fn fail_all(&self) -> usize {
        let drained: Vec<PendingRequest> = self.pending.lock().drain().map(|(_, request)| request).collect();
        let count = drained.len();
        for request in drained {
            let _ = request.tx.send(Err(BusError::Shutdown));
        }
        if count > 0 {
            debug!(count, "Failed pending requests on shutdown");
        }
        count
    }

    /// Number of unsettled requests.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Whether `id` is still awaiting a reply.
    #[must_use]
    pub fn is_pending(&self, id: RequestId) -> bool {
        self.pending.lock().contains_key(&id)
    }
}

/// Caller side of a registered request.
///
/// Dropping it before settlement removes the table entry.
pub struct PendingReply {
    id: RequestId,
    rx: Option<oneshot::Receiver<Outcome>>,
    table: Weak<PendingTable>,
}

impl PendingReply {
    /// Correlation id to put on the wire.
    #[must_use]
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Wait for the reply, bounded by `timeout` (`None` waits forever).
    pub async fn wait(mut self, timeout: Option<Duration>) -> Result<Value, BusError> {
        let Some(rx) = self.rx.take() else {
            return Err(BusError::Shutdown);
        };

        let received = match timeout {
            Some(after) => match tokio::time::timeout(after, rx).await {
                Ok(received) => received,
                Err(_) => {
                    warn!(request_id = %self.id, ?after, "Request timed out");
                    return Err(BusError::Timeout { id: self.id, after });
                }
            },
            None => rx.await,
        };
        received.unwrap_or(Err(BusError::Shutdown))
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        if let Some(table) = self.table.upgrade() {
            if table.lock().remove(&self.id).is_some() {
                trace!(request_id = %self.id, "Request dropped before settlement");
            }
        }
    }
}
