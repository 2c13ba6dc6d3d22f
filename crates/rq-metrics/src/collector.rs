//! The RQ collector: one aggregation per scrape, no caching.

use std::sync::Arc;

use prometheus::proto::MetricFamily;
use prometheus::{Histogram, HistogramOpts, Registry};
use tracing::debug;

use crate::aggregator::SnapshotAggregator;
use crate::error::{CollectError, CollectResult};
use crate::families::{FAMILY_NAMES, snapshot_families};

pub const REQUEST_PROCESSING: &str = "rq_request_processing_seconds";

/// Something that produces metric families on demand.
pub trait MetricSource: Send + Sync {
    /// Names of every family `collect` may return.
    fn family_names(&self) -> Vec<String>;

    fn collect(&self) -> CollectResult<Vec<MetricFamily>>;
}

/// Turns a fresh [`Snapshot`](crate::Snapshot) into metric families on
/// every call, timing itself in `rq_request_processing_seconds`.
pub struct RqCollector {
    aggregator: Arc<SnapshotAggregator>,
    processing: Histogram,
}

impl RqCollector {
    /// Create the collector and register its self-timing histogram.
    ///
    /// Fails with [`CollectError::DuplicateFamily`] if another collector
    /// already registered the histogram in `registry`.
    pub fn new(aggregator: Arc<SnapshotAggregator>, registry: &Registry) -> CollectResult<Self> {
        let processing = Histogram::with_opts(HistogramOpts::new(
            REQUEST_PROCESSING,
            "Time spent collecting RQ data",
        ))?;
        registry
            .register(Box::new(processing.clone()))
            .map_err(|e| match e {
                prometheus::Error::AlreadyReg => {
                    CollectError::DuplicateFamily(REQUEST_PROCESSING.to_string())
                }
                other => CollectError::Metric(other),
            })?;
        Ok(Self {
            aggregator,
            processing,
        })
    }
}

impl MetricSource for RqCollector {
    fn family_names(&self) -> Vec<String> {
        FAMILY_NAMES.iter().map(|name| name.to_string()).collect()
    }

    fn collect(&self) -> CollectResult<Vec<MetricFamily>> {
        let _timer = self.processing.start_timer();
        let snapshot = self.aggregator.aggregate()?;
        let families = snapshot_families(&snapshot)?;
        debug!(
            workers = snapshot.workers.len(),
            queues = snapshot.queues.len(),
            families = families.len(),
            "rq collection finished"
        );
        Ok(families)
    }
}
