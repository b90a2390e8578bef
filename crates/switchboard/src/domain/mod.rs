//! # Domain Layer
//!
//! Target identities, wire envelopes and error types.

pub mod errors;
pub mod message;
pub mod target;

pub use errors::{BusError, ListenerError, TransportError};
pub use message::{Envelope, RemoteError, RequestEnvelope, RequestId, ResponseEnvelope, WireMessage};
pub use target::{MessageSender, TargetId, CONTENT_PORT_NAME};
