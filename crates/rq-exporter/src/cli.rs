//! Command-line flags and their overlay onto the TOML config.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rq_core::{ConfigResult, ExporterConfig, LogFormat};

#[derive(Parser, Debug)]
#[command(name = "rq-exporter", about = "Prometheus exporter for RQ", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// TOML config file; flags and environment variables override it.
    #[arg(long, short = 'c', global = true, env = "RQ_EXPORTER_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub redis: RedisArgs,

    #[command(flatten)]
    pub exporter: ExporterArgs,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Serve /metrics (default).
    Serve,
    /// Print the merged configuration as TOML, credentials masked, and exit.
    CheckConfig,
}

#[derive(clap::Args, Debug, Default)]
pub struct RedisArgs {
    /// Redis URL; takes precedence over every other connection flag.
    #[arg(long, env = "RQ_REDIS_URL", global = true)]
    pub redis_url: Option<String>,

    #[arg(long, env = "RQ_REDIS_HOST", global = true)]
    pub redis_host: Option<String>,

    #[arg(long, env = "RQ_REDIS_PORT", global = true)]
    pub redis_port: Option<u16>,

    #[arg(long, env = "RQ_REDIS_DB", global = true)]
    pub redis_db: Option<i64>,

    #[arg(long, env = "RQ_REDIS_AUTH", global = true, hide_env_values = true)]
    pub redis_auth: Option<String>,

    /// File holding the Redis password; replaces --redis-auth.
    #[arg(long, env = "RQ_REDIS_AUTH_FILE", global = true)]
    pub redis_auth_file: Option<PathBuf>,

    /// Comma separated sentinel `host[:port]` list.
    #[arg(long, env = "RQ_REDIS_SENTINEL_HOST", global = true)]
    pub redis_sentinel_host: Option<String>,

    #[arg(long, env = "RQ_REDIS_SENTINEL_PORT", global = true)]
    pub redis_sentinel_port: Option<u16>,

    #[arg(long, env = "RQ_REDIS_SENTINEL_MASTER", global = true)]
    pub redis_sentinel_master: Option<String>,

    #[arg(long, env = "RQ_REDIS_TLS", global = true)]
    pub redis_tls: bool,

    /// Keyspace used for worker lookups (`rq` or `custom`).
    #[arg(long, env = "RQ_WORKER_CLASS", global = true)]
    pub worker_class: Option<String>,

    /// Keyspace used for queue and job lookups (`rq` or `custom`).
    #[arg(long, env = "RQ_QUEUE_CLASS", global = true)]
    pub queue_class: Option<String>,
}

#[derive(clap::Args, Debug, Default)]
pub struct ExporterArgs {
    #[arg(long, env = "RQ_EXPORTER_HOST", global = true)]
    pub host: Option<String>,

    #[arg(long, env = "RQ_EXPORTER_PORT", global = true)]
    pub port: Option<u16>,

    /// Tracing filter when RUST_LOG is unset, e.g. `debug` or `info,rq_store=trace`.
    #[arg(long, env = "RQ_EXPORTER_LOG_LEVEL", global = true)]
    pub log_level: Option<String>,

    /// `text` or `json`.
    #[arg(long, env = "RQ_EXPORTER_LOG_FORMAT", global = true)]
    pub log_format: Option<LogFormat>,

    /// Also export job execution and queued time histograms.
    #[arg(long, env = "RQ_EXPORTER_JOB_TIMINGS", global = true)]
    pub job_timings: bool,

    /// Finished jobs sampled per queue for the timing histograms.
    #[arg(long, env = "RQ_EXPORTER_FINISHED_WINDOW", global = true)]
    pub finished_window: Option<usize>,
}

impl Cli {
    /// Load the config file (if any) and apply flags on top.
    pub fn load_config(&self) -> ConfigResult<ExporterConfig> {
        let mut config = match &self.config {
            Some(path) => ExporterConfig::from_file(path)?,
            None => ExporterConfig::default(),
        };
        self.overlay(&mut config);
        Ok(config)
    }

    pub fn overlay(&self, config: &mut ExporterConfig) {
        let r = &self.redis;
        let redis = &mut config.redis;
        set(&mut redis.url, r.redis_url.clone());
        replace(&mut redis.host, r.redis_host.clone());
        replace(&mut redis.port, r.redis_port);
        replace(&mut redis.db, r.redis_db);
        set(&mut redis.password, r.redis_auth.clone());
        set(&mut redis.password_file, r.redis_auth_file.clone());
        set(&mut redis.sentinel_hosts, r.redis_sentinel_host.clone());
        replace(&mut redis.sentinel_port, r.redis_sentinel_port);
        set(&mut redis.sentinel_master, r.redis_sentinel_master.clone());
        redis.tls |= r.redis_tls;
        set(&mut redis.worker_class_override, r.worker_class.clone());
        set(&mut redis.queue_class_override, r.queue_class.clone());

        let e = &self.exporter;
        replace(&mut config.server.host, e.host.clone());
        replace(&mut config.server.port, e.port);
        replace(&mut config.log.level, e.log_level.clone());
        replace(&mut config.log.format, e.log_format);
        config.collector.job_timings |= e.job_timings;
        replace(&mut config.collector.finished_window, e.finished_window);
    }
}

/// The `check-config` output: merged config as TOML with secrets masked.
pub fn render_config(config: &ExporterConfig) -> ConfigResult<String> {
    config.redacted().to_toml_string()
}

fn set<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}

fn replace<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}
