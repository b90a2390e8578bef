//! # Adapters Layer
//!
//! Implementations of the transport ports.

mod memory;

pub use memory::{MemoryHost, MemoryNetwork, MemoryPort};
