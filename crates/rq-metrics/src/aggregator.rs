//! Snapshot aggregation: one pass over the store per call.
//!
//! Workers are read first, then queue bucket counts, then (optionally)
//! the timings of each queue's most recent finished jobs. Entities that
//! disappear between enumeration and detail fetch are skipped; any other
//! store error aborts the pass.

use std::collections::BTreeMap;
use std::sync::Arc;

use rq_core::{CollectorConfig, config::DEFAULT_FINISHED_WINDOW};
use rq_store::{EntityAccessor, QueueRef, StoreResult, WorkerRecord, delta_ms};
use tracing::debug;

use crate::snapshot::{DurationSamples, QueueCounts, Snapshot};

/// Status label for jobs whose record carries no status field.
const FALLBACK_STATUS: &str = "finished";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregatorOptions {
    /// Sample execution/queued durations of recently finished jobs.
    pub job_timings: bool,
    /// How many finished jobs per queue to sample.
    pub finished_window: usize,
}

impl Default for AggregatorOptions {
    fn default() -> Self {
        Self {
            job_timings: false,
            finished_window: DEFAULT_FINISHED_WINDOW,
        }
    }
}

impl From<&CollectorConfig> for AggregatorOptions {
    fn from(config: &CollectorConfig) -> Self {
        Self {
            job_timings: config.job_timings,
            finished_window: config.finished_window,
        }
    }
}

/// Builds a [`Snapshot`] from an [`EntityAccessor`].
pub struct SnapshotAggregator {
    accessor: Arc<dyn EntityAccessor>,
    options: AggregatorOptions,
}

impl SnapshotAggregator {
    pub fn new(accessor: Arc<dyn EntityAccessor>, options: AggregatorOptions) -> Self {
        Self { accessor, options }
    }

    pub fn aggregate(&self) -> StoreResult<Snapshot> {
        let workers = self.collect_workers()?;

        let queue_refs = self.accessor.list_queues()?;
        let mut queues = Vec::with_capacity(queue_refs.len());
        for queue in &queue_refs {
            let counts = self.accessor.queue_status_counts(queue)?;
            queues.push(QueueCounts {
                name: queue.name.clone(),
                counts,
            });
        }

        let durations = if self.options.job_timings {
            Some(self.collect_durations(&queue_refs)?)
        } else {
            None
        };

        debug!(
            accessor = self.accessor.name(),
            workers = workers.len(),
            queues = queues.len(),
            "snapshot assembled"
        );
        Ok(Snapshot {
            workers,
            queues,
            durations,
        })
    }

    fn collect_workers(&self) -> StoreResult<Vec<WorkerRecord>> {
        let refs = self.accessor.list_workers()?;
        let mut workers = Vec::with_capacity(refs.len());
        for worker in &refs {
            match self.accessor.worker_stats(worker) {
                Ok(record) => workers.push(record),
                Err(e) if e.is_missing() => {
                    debug!(worker = %worker.name, "worker vanished before stats fetch");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(workers)
    }

    fn collect_durations(&self, queues: &[QueueRef]) -> StoreResult<Vec<DurationSamples>> {
        let mut buckets: BTreeMap<(String, String), DurationSamples> = BTreeMap::new();

        for queue in queues {
            let jobs = self
                .accessor
                .finished_jobs_for_queue(queue, self.options.finished_window)?;

            for job in &jobs {
                let timings = match self.accessor.job_timings(job) {
                    Ok(timings) => timings,
                    Err(e) if e.is_missing() => {
                        debug!(job = %job.id, queue = %job.queue, "job vanished before timings fetch");
                        continue;
                    }
                    Err(e) => return Err(e),
                };

                let execution = timings.runtime().and_then(delta_ms);
                let queued = timings.queued_time().and_then(delta_ms);
                if execution.is_none() && queued.is_none() {
                    continue;
                }

                let status = timings
                    .status
                    .clone()
                    .unwrap_or_else(|| FALLBACK_STATUS.to_string());
                let bucket = buckets
                    .entry((queue.name.clone(), status.clone()))
                    .or_insert_with(|| DurationSamples {
                        queue: queue.name.clone(),
                        status,
                        execution_ms: Vec::new(),
                        queued_ms: Vec::new(),
                    });
                bucket.execution_ms.extend(execution);
                bucket.queued_ms.extend(queued);
            }
        }

        Ok(buckets.into_values().collect())
    }
}
