//! Domain records read from the RQ store.
//!
//! These are plain aggregates with no knowledge of the metrics format:
//! queue bucket counts, worker counters, and job timestamps.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

// ── Job status ─────────────────────────────────────────────────────

/// The six mutually exclusive buckets a queue reports counts for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Started,
    Finished,
    Failed,
    Deferred,
    Scheduled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 6] = [
        JobStatus::Queued,
        JobStatus::Started,
        JobStatus::Finished,
        JobStatus::Failed,
        JobStatus::Deferred,
        JobStatus::Scheduled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Started => "started",
            JobStatus::Finished => "finished",
            JobStatus::Failed => "failed",
            JobStatus::Deferred => "deferred",
            JobStatus::Scheduled => "scheduled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown job status: {s}"))
    }
}

/// Job counts per status for one queue. Always holds all six buckets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct StatusCounts(BTreeMap<JobStatus, u64>);

impl StatusCounts {
    /// All six buckets set to zero.
    pub fn zeroed() -> Self {
        Self(JobStatus::ALL.into_iter().map(|s| (s, 0)).collect())
    }

    pub fn set(&mut self, status: JobStatus, count: u64) {
        self.0.insert(status, count);
    }

    pub fn get(&self, status: JobStatus) -> u64 {
        self.0.get(&status).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (JobStatus, u64)> + '_ {
        self.0.iter().map(|(s, c)| (*s, *c))
    }
}

impl Default for StatusCounts {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl FromIterator<(JobStatus, u64)> for StatusCounts {
    fn from_iter<I: IntoIterator<Item = (JobStatus, u64)>>(iter: I) -> Self {
        let mut counts = Self::zeroed();
        for (status, count) in iter {
            counts.set(status, count);
        }
        counts
    }
}

// ── References ─────────────────────────────────────────────────────

/// A queue as enumerated from the store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct QueueRef {
    pub name: String,
}

impl QueueRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// A registered worker: its name and the hash key holding its state.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct WorkerRef {
    pub name: String,
    pub key: String,
}

/// A job id together with the queue it was found through.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct JobRef {
    pub id: String,
    pub queue: String,
}

impl JobRef {
    pub fn new(id: impl Into<String>, queue: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            queue: queue.into(),
        }
    }
}

// ── Workers ────────────────────────────────────────────────────────

/// Worker lifecycle state as reported by the worker itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum WorkerState {
    Starting,
    Started,
    Idle,
    Busy,
    Suspended,
    Other(String),
}

impl WorkerState {
    pub fn as_str(&self) -> &str {
        match self {
            WorkerState::Starting => "starting",
            WorkerState::Started => "started",
            WorkerState::Idle => "idle",
            WorkerState::Busy => "busy",
            WorkerState::Suspended => "suspended",
            WorkerState::Other(s) => s,
        }
    }
}

impl From<&str> for WorkerState {
    fn from(s: &str) -> Self {
        match s {
            "starting" => WorkerState::Starting,
            "started" => WorkerState::Started,
            "idle" => WorkerState::Idle,
            "busy" => WorkerState::Busy,
            "suspended" => WorkerState::Suspended,
            other => WorkerState::Other(other.to_string()),
        }
    }
}

impl From<String> for WorkerState {
    fn from(s: String) -> Self {
        WorkerState::from(s.as_str())
    }
}

impl From<WorkerState> for String {
    fn from(state: WorkerState) -> Self {
        state.as_str().to_string()
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time statistics for one worker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerRecord {
    pub name: String,
    /// Queue names in the order the worker listens on them.
    pub queues: Vec<String>,
    pub state: WorkerState,
    pub successful_job_count: u64,
    pub failed_job_count: u64,
    /// Cumulative seconds spent executing jobs.
    pub total_working_time: f64,
}

impl WorkerRecord {
    /// Queue names joined by `,`; empty for a worker bound to no queues.
    pub fn queues_label(&self) -> String {
        self.queues.join(",")
    }
}

// ── Jobs ───────────────────────────────────────────────────────────

/// Timing information for a single job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobTimings {
    pub id: String,
    pub func_name: Option<String>,
    pub status: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl JobTimings {
    /// `ended_at - started_at`, when both exist and are ordered.
    pub fn runtime(&self) -> Option<TimeDelta> {
        ordered_delta(self.started_at, self.ended_at)
    }

    /// `started_at - created_at`, when both exist and are ordered.
    pub fn queued_time(&self) -> Option<TimeDelta> {
        ordered_delta(self.created_at, self.started_at)
    }
}

fn ordered_delta(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Option<TimeDelta> {
    let (from, to) = (from?, to?);
    (to >= from).then(|| to - from)
}

/// Convert a delta to fractional milliseconds at microsecond precision.
pub fn delta_ms(delta: TimeDelta) -> Option<f64> {
    delta.num_microseconds().map(|us| us as f64 / 1_000.0)
}

/// Parse a timestamp as written by RQ (`2024-01-02T03:04:05.123456Z`).
///
/// Older RQ versions omit the fractional part; RFC 3339 with an offset is
/// also accepted. Empty or malformed values yield `None`.
pub fn parse_rq_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.fZ", "%Y-%m-%dT%H:%M:%SZ"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
