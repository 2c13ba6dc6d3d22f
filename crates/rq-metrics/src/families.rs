//! Mapping a [`Snapshot`] onto Prometheus metric families.
//!
//! Families are rebuilt from scratch on every call, so a worker or queue
//! that disappears from the store also disappears from the next scrape.

use prometheus::core::Collector;
use prometheus::proto::MetricFamily;
use prometheus::{CounterVec, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts};

use crate::snapshot::Snapshot;

pub const WORKERS: &str = "rq_workers";
pub const WORKERS_SUCCESS: &str = "rq_workers_success_total";
pub const WORKERS_FAILED: &str = "rq_workers_failed_total";
pub const WORKERS_WORKING_TIME: &str = "rq_workers_working_time_total";
pub const JOBS: &str = "rq_jobs";
pub const JOB_EXECUTION_TIME: &str = "rq_job_execution_time_ms";
pub const JOB_QUEUED_TIME: &str = "rq_job_queued_time_ms";

/// Every family name [`snapshot_families`] can emit.
pub const FAMILY_NAMES: [&str; 7] = [
    WORKERS,
    WORKERS_SUCCESS,
    WORKERS_FAILED,
    WORKERS_WORKING_TIME,
    JOBS,
    JOB_EXECUTION_TIME,
    JOB_QUEUED_TIME,
];

/// Millisecond buckets for job durations, from sub-second tasks up to
/// ten minutes.
const DURATION_BUCKETS_MS: [f64; 13] = [
    10.0, 50.0, 100.0, 250.0, 500.0, 1_000.0, 2_500.0, 5_000.0, 10_000.0, 30_000.0, 60_000.0,
    300_000.0, 600_000.0,
];

pub fn snapshot_families(snapshot: &Snapshot) -> prometheus::Result<Vec<MetricFamily>> {
    let workers = IntGaugeVec::new(Opts::new(WORKERS, "RQ workers"), &["name", "state", "queues"])?;
    let success = IntCounterVec::new(
        Opts::new(WORKERS_SUCCESS, "RQ workers success count"),
        &["name", "queues"],
    )?;
    let failed = IntCounterVec::new(
        Opts::new(WORKERS_FAILED, "RQ workers fail count"),
        &["name", "queues"],
    )?;
    let working_time = CounterVec::new(
        Opts::new(WORKERS_WORKING_TIME, "RQ workers spent seconds"),
        &["name", "queues"],
    )?;
    let jobs = IntGaugeVec::new(Opts::new(JOBS, "RQ jobs by state"), &["queue", "status"])?;

    for worker in &snapshot.workers {
        let queues = worker.queues_label();
        workers
            .with_label_values(&[&worker.name, worker.state.as_str(), &queues])
            .set(1);
        success
            .with_label_values(&[&worker.name, &queues])
            .inc_by(worker.successful_job_count);
        failed
            .with_label_values(&[&worker.name, &queues])
            .inc_by(worker.failed_job_count);
        working_time
            .with_label_values(&[&worker.name, &queues])
            .inc_by(worker.total_working_time.max(0.0));
    }

    for queue in &snapshot.queues {
        for (status, count) in queue.counts.iter() {
            jobs.with_label_values(&[&queue.name, status.as_str()])
                .set(i64::try_from(count).unwrap_or(i64::MAX));
        }
    }

    let mut families = Vec::new();
    families.extend(workers.collect());
    families.extend(success.collect());
    families.extend(failed.collect());
    families.extend(working_time.collect());
    families.extend(jobs.collect());

    if let Some(durations) = &snapshot.durations {
        let execution = duration_histogram(JOB_EXECUTION_TIME, "RQ job execution time in milliseconds")?;
        let queued = duration_histogram(JOB_QUEUED_TIME, "RQ job time spent queued in milliseconds")?;
        for samples in durations {
            let labels = [samples.queue.as_str(), samples.status.as_str()];
            if !samples.execution_ms.is_empty() {
                let histogram = execution.with_label_values(&labels);
                samples.execution_ms.iter().for_each(|ms| histogram.observe(*ms));
            }
            if !samples.queued_ms.is_empty() {
                let histogram = queued.with_label_values(&labels);
                samples.queued_ms.iter().for_each(|ms| histogram.observe(*ms));
            }
        }
        families.extend(execution.collect());
        families.extend(queued.collect());
    }

    Ok(families)
}

fn duration_histogram(name: &str, help: &str) -> prometheus::Result<HistogramVec> {
    HistogramVec::new(
        HistogramOpts::new(name, help).buckets(DURATION_BUCKETS_MS.to_vec()),
        &["queue", "status"],
    )
}
