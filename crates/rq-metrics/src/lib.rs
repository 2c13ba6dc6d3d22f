//! rq-metrics — turns RQ store state into Prometheus metrics.
//!
//! # Architecture
//!
//! ```text
//! MetricsRegistry (one per process, shared by Arc)
//!   ├── register()  ← duplicate-name check + eager collect
//!   ├── render()    → text/plain for /metrics
//!   └── RqCollector::collect()        ← every scrape, timed
//!         └── SnapshotAggregator::aggregate()
//!               └── EntityAccessor (Redis or in-memory)
//! ```

pub mod aggregator;
pub mod collector;
pub mod error;
pub mod families;
pub mod registry;
pub mod snapshot;

pub use aggregator::{AggregatorOptions, SnapshotAggregator};
pub use collector::{MetricSource, RqCollector};
pub use error::{CollectError, CollectResult};
pub use registry::MetricsRegistry;
pub use snapshot::{DurationSamples, QueueCounts, Snapshot};
