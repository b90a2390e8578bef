//! # Switchboard Test Suite
//!
//! Cross-context scenarios run over the in-memory transport.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── fixtures.rs     # Contexts wired over one MemoryNetwork
//!     ├── round_trip.rs   # Request/response, failures, listener selection
//!     ├── isolation.rs    # Scope and target filtering
//!     ├── correlation.rs  # Overlapping requests, stale replies
//!     ├── lifecycle.rs    # Disconnects, reconnects, unreachable targets
//!     ├── tabs.rs         # Content scripts addressed by tab handle
//!     ├── streams.rs      # Message streams
//!     └── lines.rs        # Greeting-keyed message lines
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p switchboard-tests
//! cargo test -p switchboard-tests integration::correlation
//!
//! # Benchmarks
//! cargo bench -p switchboard-tests
//! ```
