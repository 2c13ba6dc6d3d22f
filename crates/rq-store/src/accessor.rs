//! The read-only query surface the aggregator is written against.

use crate::error::StoreResult;
use crate::types::{JobRef, JobTimings, QueueRef, StatusCounts, WorkerRecord, WorkerRef};

/// Read-only access to RQ queues, workers and jobs.
///
/// Every call is an independent read against the store; nothing here is
/// transactional across calls. Implementations surface communication
/// failures as [`StoreError::Query`](crate::StoreError::Query) and a
/// vanished worker or job as [`StoreError::NotFound`](crate::StoreError::NotFound),
/// and never retry.
pub trait EntityAccessor: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// All queues currently known to the store, sorted by name.
    fn list_queues(&self) -> StoreResult<Vec<QueueRef>>;

    /// Count of jobs in each of the six buckets of a queue.
    ///
    /// A queue with no backing keys reports zero everywhere.
    fn queue_status_counts(&self, queue: &QueueRef) -> StoreResult<StatusCounts>;

    /// All registered workers, sorted by key.
    fn list_workers(&self) -> StoreResult<Vec<WorkerRef>>;

    fn worker_stats(&self, worker: &WorkerRef) -> StoreResult<WorkerRecord>;

    /// The `limit` most recent entries of the queue's finished registry,
    /// newest last.
    fn finished_jobs_for_queue(&self, queue: &QueueRef, limit: usize)
    -> StoreResult<Vec<JobRef>>;

    fn job_timings(&self, job: &JobRef) -> StoreResult<JobTimings>;
}
