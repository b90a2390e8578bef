//! # Switchboard
//!
//! Cross-context message bus. Isolated execution contexts (a background
//! context, option pages, popups, per-tab content scripts) exchange
//! messages over long-lived bidirectional channels supplied by a host.
//!
//! ## Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | Scopes | Named logical channels multiplexed over one set of ports |
//! | Addressing | Broadcast, by context name, or by tab handle |
//! | Request/response | Replies correlated by request id, never by arrival order |
//! | Streams and lines | Scoped message streams and typed greeting-keyed sub-channels |
//! | Connect on demand | Bounded retry when a send names an unknown target |
//!
//! ## Module Structure
//!
//! ```text
//! switchboard/
//! ├── domain/          # TargetId, wire envelopes, errors
//! ├── event.rs         # SetEvent / MapEvent multiplexer with selectors
//! ├── listeners.rs     # Per-scope listener → adapter registry
//! ├── ports.rs         # PortRegistry with connect/message/disconnect events
//! ├── correlator.rs    # Pending-request table
//! ├── scope/           # Scope surface, streams, message lines
//! ├── bus.rs           # Composition root
//! ├── transport.rs     # Host/Port traits (outbound ports)
//! ├── adapters/        # In-memory transport
//! └── config.rs        # BusConfig
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use switchboard::{Bus, BusConfig, MemoryNetwork, MessageListener, SendOptions};
//! use serde_json::json;
//!
//! # async fn run() -> Result<(), switchboard::BusError> {
//! let network = MemoryNetwork::new();
//! let host = network.host("options");
//! let options = Bus::new(host.clone(), BusConfig::default())?;
//! host.bind(&options);
//!
//! options.scope("root").on(
//!     &MessageListener::plain(|payload, _sender| {
//!         println!("got {payload}");
//!         Ok(())
//!     }),
//!     None,
//! );
//!
//! let background = Bus::new(network.host("background"), BusConfig::default())?;
//! background
//!     .scope("root")
//!     .send(json!({ "greeting": "hello" }), SendOptions::to("options"))
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod bus;
pub mod config;
pub mod correlator;
pub mod domain;
pub mod event;
pub mod listeners;
pub mod ports;
pub mod scope;
pub mod transport;

// Re-exports
pub use adapters::{MemoryHost, MemoryNetwork, MemoryPort};
pub use bus::{Bus, WeakBus};
pub use config::BusConfig;
pub use correlator::{Correlator, PendingReply};
pub use domain::{
    BusError, Envelope, ListenerError, MessageSender, RemoteError, RequestEnvelope, RequestId,
    ResponseEnvelope, TargetId, TransportError, WireMessage, CONTENT_PORT_NAME,
};
pub use event::{Callback, Forward, ListenerId, MapEvent, Selector, SetEvent};
pub use listeners::{AdapterKind, AdapterRecord, ListenerRegistry};
pub use ports::{Connection, Disconnection, Inbound, PortHandle, PortRegistry};
pub use scope::{
    Incoming, Line, LineStream, ListenerFuture, MessageListener, MessageStream, RequestLine,
    RequestLineStream, Responder, Scope, SendOptions, StreamFilter, TypedResponder,
};
pub use transport::{derive_target, DisconnectHandler, Host, MessageHandler, Port, PortSender};

/// Default request timeout (30 seconds).
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Default number of connect attempts for an unknown target.
pub const DEFAULT_CONNECT_RETRIES: u32 = 5;

/// Default pause between connect attempts.
pub const DEFAULT_CONNECT_RETRY_INTERVAL_MS: u64 = 100;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
