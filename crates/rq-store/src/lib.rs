//! rq-store — read-only access to RQ state held in Redis.
//!
//! Connects to Redis directly, by URL, or through sentinel, and exposes
//! queues, workers and jobs as plain records through the
//! [`EntityAccessor`] trait. Nothing in this crate writes to the store.
//!
//! # Architecture
//!
//! ```text
//! RedisConfig ──▶ ConnectionTarget::resolve ──▶ StoreHandle (Arc, shared)
//!                                                   │
//! KeyspaceRegistry ──▶ Worker/QueueKeyspace ──▶ RedisAccessor ─┐
//!                                                              ├─▶ dyn EntityAccessor
//!                                               MemoryAccessor ┘
//! ```
//!
//! Every accessor call is an independent read. Communication failures
//! surface as [`StoreError::Query`]; entities that vanish between listing
//! and detail fetch surface as [`StoreError::NotFound`].

pub mod accessor;
pub mod connector;
pub mod error;
pub mod keyspace;
pub mod memory;
pub mod redis_accessor;
pub mod types;

#[cfg(test)]
mod test_server;

pub use accessor::EntityAccessor;
pub use connector::{ConnectionTarget, SentinelNode, StoreHandle};
pub use error::{StoreError, StoreResult};
pub use keyspace::{KeyspaceRegistry, QueueKeyspace, WorkerKeyspace};
pub use memory::{FailurePoint, MemoryAccessor};
pub use redis_accessor::RedisAccessor;
pub use types::*;
