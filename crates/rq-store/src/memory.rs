//! In-memory [`EntityAccessor`] for tests and local runs without Redis.
//!
//! Fixtures can be changed after the accessor is shared, which lets tests
//! simulate churn between collection cycles, entities vanishing between
//! enumeration and detail fetch, and store communication failures.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::accessor::EntityAccessor;
use crate::error::{StoreError, StoreResult};
use crate::keyspace::WorkerKeyspace;
use crate::types::{JobRef, JobTimings, QueueRef, StatusCounts, WorkerRecord, WorkerRef};

/// Which accessor operation should fail with a communication error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePoint {
    ListQueues,
    QueueCounts,
    ListWorkers,
    WorkerStats,
    FinishedJobs,
    JobTimings,
}

#[derive(Default)]
struct MemoryState {
    queues: BTreeMap<String, StatusCounts>,
    workers: BTreeMap<String, WorkerRecord>,
    /// Listed as registered but their record is gone.
    ghost_workers: BTreeSet<String>,
    finished: BTreeMap<String, Vec<String>>,
    jobs: HashMap<String, JobTimings>,
    failure: Option<FailurePoint>,
}

#[derive(Default)]
pub struct MemoryAccessor {
    state: Mutex<MemoryState>,
    keyspace: WorkerKeyspace,
}

impl MemoryAccessor {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(&self, state: &MemoryState, point: FailurePoint) -> StoreResult<()> {
        if state.failure == Some(point) {
            return Err(StoreError::Query(format!("injected failure at {point:?}")));
        }
        Ok(())
    }

    /// Insert or replace a queue and its bucket counts.
    pub fn put_queue(&self, name: &str, counts: StatusCounts) {
        self.state().queues.insert(name.to_string(), counts);
    }

    pub fn remove_queue(&self, name: &str) {
        self.state().queues.remove(name);
    }

    /// Insert or replace a worker record.
    pub fn put_worker(&self, record: WorkerRecord) {
        let mut state = self.state();
        state.ghost_workers.remove(&record.name);
        state.workers.insert(record.name.clone(), record);
    }

    /// Keep the worker registered but drop its record, as when a worker
    /// exits between enumeration and detail fetch.
    pub fn vanish_worker(&self, name: &str) {
        let mut state = self.state();
        state.workers.remove(name);
        state.ghost_workers.insert(name.to_string());
    }

    /// Append a job to a queue's finished registry (newest last).
    pub fn put_finished_job(&self, queue: &str, timings: JobTimings) {
        let mut state = self.state();
        state
            .finished
            .entry(queue.to_string())
            .or_default()
            .push(timings.id.clone());
        state.jobs.insert(timings.id.clone(), timings);
    }

    /// Append a finished-registry id whose job record no longer exists.
    pub fn push_dangling_finished_id(&self, queue: &str, id: &str) {
        self.state()
            .finished
            .entry(queue.to_string())
            .or_default()
            .push(id.to_string());
    }

    /// Make one operation fail until cleared with `None`.
    pub fn fail_on(&self, point: Option<FailurePoint>) {
        self.state().failure = point;
    }
}

impl EntityAccessor for MemoryAccessor {
    fn name(&self) -> &str {
        "memory"
    }

    fn list_queues(&self) -> StoreResult<Vec<QueueRef>> {
        let state = self.state();
        self.check(&state, FailurePoint::ListQueues)?;
        Ok(state.queues.keys().map(QueueRef::new).collect())
    }

    fn queue_status_counts(&self, queue: &QueueRef) -> StoreResult<StatusCounts> {
        let state = self.state();
        self.check(&state, FailurePoint::QueueCounts)?;
        Ok(state.queues.get(&queue.name).cloned().unwrap_or_default())
    }

    fn list_workers(&self) -> StoreResult<Vec<WorkerRef>> {
        let state = self.state();
        self.check(&state, FailurePoint::ListWorkers)?;
        let names: BTreeSet<&String> = state
            .workers
            .keys()
            .chain(state.ghost_workers.iter())
            .collect();
        Ok(names
            .into_iter()
            .map(|name| WorkerRef {
                name: name.clone(),
                key: format!("{}{name}", self.keyspace.worker_prefix),
            })
            .collect())
    }

    fn worker_stats(&self, worker: &WorkerRef) -> StoreResult<WorkerRecord> {
        let state = self.state();
        self.check(&state, FailurePoint::WorkerStats)?;
        state
            .workers
            .get(&worker.name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("worker {}", worker.name)))
    }

    fn finished_jobs_for_queue(
        &self,
        queue: &QueueRef,
        limit: usize,
    ) -> StoreResult<Vec<JobRef>> {
        let state = self.state();
        self.check(&state, FailurePoint::FinishedJobs)?;
        let ids = state
            .finished
            .get(&queue.name)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let skip = ids.len().saturating_sub(limit);
        Ok(ids[skip..]
            .iter()
            .map(|id| JobRef::new(id.clone(), queue.name.clone()))
            .collect())
    }

    fn job_timings(&self, job: &JobRef) -> StoreResult<JobTimings> {
        let state = self.state();
        self.check(&state, FailurePoint::JobTimings)?;
        state
            .jobs
            .get(&job.id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("job {}", job.id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{JobStatus, WorkerState};

    fn worker(name: &str) -> WorkerRecord {
        WorkerRecord {
            name: name.to_string(),
            queues: vec!["default".to_string()],
            state: WorkerState::Idle,
            successful_job_count: 1,
            failed_job_count: 0,
            total_working_time: 0.5,
        }
    }

    fn job(id: &str) -> JobTimings {
        JobTimings {
            id: id.to_string(),
            func_name: None,
            status: Some("finished".to_string()),
            created_at: None,
            started_at: None,
            ended_at: None,
        }
    }

    #[test]
    fn unknown_queue_counts_are_zero() {
        let accessor = MemoryAccessor::new();
        let counts = accessor
            .queue_status_counts(&QueueRef::new("missing"))
            .unwrap();
        assert_eq!(counts, StatusCounts::zeroed());
    }

    #[test]
    fn queues_are_listed_sorted() {
        let accessor = MemoryAccessor::new();
        accessor.put_queue("low", StatusCounts::zeroed());
        accessor.put_queue("high", StatusCounts::zeroed());
        let names: Vec<_> = accessor
            .list_queues()
            .unwrap()
            .into_iter()
            .map(|q| q.name)
            .collect();
        assert_eq!(names, vec!["high", "low"]);
    }

    #[test]
    fn vanished_worker_is_listed_but_not_found() {
        let accessor = MemoryAccessor::new();
        accessor.put_worker(worker("a"));
        accessor.put_worker(worker("b"));
        accessor.vanish_worker("b");

        let refs = accessor.list_workers().unwrap();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].key, "rq:worker:a");
        assert!(accessor.worker_stats(&refs[0]).is_ok());
        assert!(accessor.worker_stats(&refs[1]).unwrap_err().is_missing());
    }

    #[test]
    fn finished_window_keeps_newest_last() {
        let accessor = MemoryAccessor::new();
        for id in ["j1", "j2", "j3", "j4"] {
            accessor.put_finished_job("default", job(id));
        }
        let ids: Vec<_> = accessor
            .finished_jobs_for_queue(&QueueRef::new("default"), 3)
            .unwrap()
            .into_iter()
            .map(|j| j.id)
            .collect();
        assert_eq!(ids, vec!["j2", "j3", "j4"]);

        let none = accessor
            .finished_jobs_for_queue(&QueueRef::new("other"), 3)
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn dangling_job_id_is_not_found() {
        let accessor = MemoryAccessor::new();
        accessor.push_dangling_finished_id("default", "gone");
        let refs = accessor
            .finished_jobs_for_queue(&QueueRef::new("default"), 3)
            .unwrap();
        assert!(accessor.job_timings(&refs[0]).unwrap_err().is_missing());
    }

    #[test]
    fn injected_failure_is_query_error() {
        let accessor = MemoryAccessor::new();
        accessor.put_queue(
            "default",
            [(JobStatus::Queued, 1)].into_iter().collect(),
        );
        accessor.fail_on(Some(FailurePoint::QueueCounts));
        let err = accessor
            .queue_status_counts(&QueueRef::new("default"))
            .unwrap_err();
        assert!(matches!(err, StoreError::Query(_)));
        assert!(!err.is_missing());

        accessor.fail_on(None);
        assert!(accessor.queue_status_counts(&QueueRef::new("default")).is_ok());
    }
}
