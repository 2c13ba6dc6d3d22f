//! The immutable result of one aggregation pass.

use rq_store::{StatusCounts, WorkerRecord};
use serde::Serialize;

/// Bucket counts for one enumerated queue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueCounts {
    pub name: String,
    pub counts: StatusCounts,
}

/// Duration samples, in milliseconds, for one `(queue, status)` pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DurationSamples {
    pub queue: String,
    pub status: String,
    /// `ended_at - started_at` per job.
    pub execution_ms: Vec<f64>,
    /// `started_at - created_at` per job.
    pub queued_ms: Vec<f64>,
}

/// One best-effort, non-transactional view of workers, queues and
/// (optionally) recent job durations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub workers: Vec<WorkerRecord>,
    pub queues: Vec<QueueCounts>,
    /// `None` when duration sampling is disabled.
    pub durations: Option<Vec<DurationSamples>>,
}

#[cfg(test)]
impl Snapshot {
    pub fn queue(&self, name: &str) -> Option<&StatusCounts> {
        self.queues
            .iter()
            .find(|q| q.name == name)
            .map(|q| &q.counts)
    }

    pub fn worker(&self, name: &str) -> Option<&WorkerRecord> {
        self.workers.iter().find(|w| w.name == name)
    }

    pub fn durations_for(&self, queue: &str, status: &str) -> Option<&DurationSamples> {
        self.durations
            .as_ref()?
            .iter()
            .find(|d| d.queue == queue && d.status == status)
    }
}
