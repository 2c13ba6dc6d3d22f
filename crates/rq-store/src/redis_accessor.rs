//! [`EntityAccessor`] over a live Redis connection, using RQ's key layout.

use std::sync::Arc;

use chrono::Utc;
use redis::{Commands, RedisResult};
use rq_core::RedisConfig;
use tracing::{debug, warn};

use crate::accessor::EntityAccessor;
use crate::connector::StoreHandle;
use crate::error::{StoreError, StoreResult};
use crate::keyspace::{KeyspaceRegistry, QueueKeyspace, WorkerKeyspace};
use crate::types::{
    JobRef, JobStatus, JobTimings, QueueRef, StatusCounts, WorkerRecord, WorkerRef, WorkerState,
    parse_rq_timestamp,
};

const WORKER_FIELDS: [&str; 5] = [
    "queues",
    "state",
    "successful_job_count",
    "failed_job_count",
    "total_working_time",
];

const JOB_FIELDS: [&str; 5] = ["created_at", "started_at", "ended_at", "status", "description"];

/// Reads RQ entities through a shared [`StoreHandle`].
pub struct RedisAccessor {
    handle: Arc<StoreHandle>,
    workers: WorkerKeyspace,
    queues: QueueKeyspace,
}

impl RedisAccessor {
    pub fn new(handle: Arc<StoreHandle>, workers: WorkerKeyspace, queues: QueueKeyspace) -> Self {
        Self {
            handle,
            workers,
            queues,
        }
    }

    /// Accessor whose layouts are chosen by the config's keyspace overrides.
    pub fn from_config(
        handle: Arc<StoreHandle>,
        registry: &KeyspaceRegistry,
        config: &RedisConfig,
    ) -> StoreResult<Self> {
        let workers = registry.worker(config.worker_class_override.as_deref())?;
        let queues = registry.queue(config.queue_class_override.as_deref())?;
        debug!(
            worker_prefix = %workers.worker_prefix,
            queue_prefix = %queues.queue_prefix,
            "redis accessor keyspace selected"
        );
        Ok(Self::new(handle, workers, queues))
    }
}

impl EntityAccessor for RedisAccessor {
    fn name(&self) -> &str {
        "redis"
    }

    fn list_queues(&self) -> StoreResult<Vec<QueueRef>> {
        let members: Vec<String> = self
            .handle
            .with_connection(|conn| conn.smembers(&self.queues.queues_key))?;

        let mut queues: Vec<QueueRef> = members
            .iter()
            .filter_map(|key| match self.queues.queue_name(key) {
                Some(name) => Some(QueueRef::new(name)),
                None => {
                    warn!(%key, "skipping queue key outside keyspace");
                    None
                }
            })
            .collect();
        queues.sort();
        queues.dedup();
        Ok(queues)
    }

    fn queue_status_counts(&self, queue: &QueueRef) -> StoreResult<StatusCounts> {
        let name = queue.name.as_str();
        // Started, finished and failed registries score entries by expiry;
        // RQ drops scores <= now on read, so count only what it would keep.
        let live = format!("({}", Utc::now().timestamp());

        let mut counts = StatusCounts::zeroed();
        let queued: u64 = self
            .handle
            .with_connection(|conn| conn.llen(self.queues.queue_key(name)))?;
        counts.set(JobStatus::Queued, queued);

        for (status, key) in [
            (JobStatus::Started, self.queues.started_registry(name)),
            (JobStatus::Finished, self.queues.finished_registry(name)),
            (JobStatus::Failed, self.queues.failed_registry(name)),
        ] {
            let count: u64 = self
                .handle
                .with_connection(|conn| conn.zcount(&key, live.as_str(), "+inf"))?;
            counts.set(status, count);
        }

        // Deferred entries are scored by enqueue time (or +inf) and scheduled
        // entries by run time; RQ never expires either, so count every entry.
        for (status, key) in [
            (JobStatus::Deferred, self.queues.deferred_registry(name)),
            (JobStatus::Scheduled, self.queues.scheduled_registry(name)),
        ] {
            let count: u64 = self.handle.with_connection(|conn| conn.zcard(&key))?;
            counts.set(status, count);
        }

        Ok(counts)
    }

    fn list_workers(&self) -> StoreResult<Vec<WorkerRef>> {
        let members: Vec<String> = self
            .handle
            .with_connection(|conn| conn.smembers(&self.workers.workers_key))?;

        let mut workers: Vec<WorkerRef> = members
            .into_iter()
            .filter_map(|key| match self.workers.worker_name(&key) {
                Some(name) => Some(WorkerRef {
                    name: name.to_string(),
                    key,
                }),
                None => {
                    warn!(%key, "skipping worker key outside keyspace");
                    None
                }
            })
            .collect();
        workers.sort();
        Ok(workers)
    }

    fn worker_stats(&self, worker: &WorkerRef) -> StoreResult<WorkerRecord> {
        let (exists, fields): (bool, Vec<Option<String>>) =
            self.handle.with_connection(|conn| -> RedisResult<_> {
                redis::pipe()
                    .exists(&worker.key)
                    .cmd("HMGET")
                    .arg(&worker.key)
                    .arg(&WORKER_FIELDS[..])
                    .query(conn)
            })?;
        if !exists {
            return Err(StoreError::NotFound(format!("worker {}", worker.name)));
        }

        let [queues, state, successful, failed, working_time] = take_fields::<5>(fields)?;
        let queues = queues
            .map(|q| {
                q.split(',')
                    .map(str::trim)
                    .filter(|q| !q.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(WorkerRecord {
            name: worker.name.clone(),
            queues,
            state: WorkerState::from(state.as_deref().unwrap_or("?")),
            successful_job_count: parse_field(&worker.name, "successful_job_count", successful)?,
            failed_job_count: parse_field(&worker.name, "failed_job_count", failed)?,
            total_working_time: parse_field(&worker.name, "total_working_time", working_time)?,
        })
    }

    fn finished_jobs_for_queue(
        &self,
        queue: &QueueRef,
        limit: usize,
    ) -> StoreResult<Vec<JobRef>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let key = self.queues.finished_registry(&queue.name);
        let start = -isize::try_from(limit).unwrap_or(isize::MAX);
        let ids: Vec<String> = self
            .handle
            .with_connection(|conn| conn.zrange(&key, start, -1))?;
        Ok(ids
            .into_iter()
            .map(|id| JobRef::new(id, queue.name.clone()))
            .collect())
    }

    fn job_timings(&self, job: &JobRef) -> StoreResult<JobTimings> {
        let key = self.queues.job_key(&job.id);
        // HMGET on named fields: the pickled `data` field is not UTF-8.
        let (exists, fields): (bool, Vec<Option<String>>) =
            self.handle.with_connection(|conn| -> RedisResult<_> {
                redis::pipe()
                    .exists(&key)
                    .cmd("HMGET")
                    .arg(&key)
                    .arg(&JOB_FIELDS[..])
                    .query(conn)
            })?;
        if !exists {
            return Err(StoreError::NotFound(format!("job {}", job.id)));
        }

        let [created, started, ended, status, description] = take_fields::<5>(fields)?;
        Ok(JobTimings {
            id: job.id.clone(),
            func_name: description.as_deref().and_then(func_name_from_description),
            status: status.filter(|s| !s.is_empty()),
            created_at: created.as_deref().and_then(parse_rq_timestamp),
            started_at: started.as_deref().and_then(parse_rq_timestamp),
            ended_at: ended.as_deref().and_then(parse_rq_timestamp),
        })
    }
}

fn take_fields<const N: usize>(fields: Vec<Option<String>>) -> StoreResult<[Option<String>; N]> {
    let len = fields.len();
    fields
        .try_into()
        .map_err(|_| StoreError::Decode(format!("expected {N} hash fields, got {len}")))
}

fn parse_field<T: std::str::FromStr + Default>(
    owner: &str,
    field: &str,
    value: Option<String>,
) -> StoreResult<T> {
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(T::default()),
        Some(raw) => raw
            .parse()
            .map_err(|_| StoreError::Decode(format!("{owner}: invalid {field} {raw:?}"))),
    }
}

/// `jobs.process_data(10)` → `jobs.process_data`.
fn func_name_from_description(description: &str) -> Option<String> {
    let name = description.split('(').next().unwrap_or_default().trim();
    (!name.is_empty()).then(|| name.to_string())
}
