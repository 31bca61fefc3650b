//! Distributed queries over named caches.
//!
//! Aggregations run on the peer across every partition of a cache; only the
//! merged result crosses the wire.

pub mod aggregations;

pub use aggregations::*;
