//! rq-exporter — Prometheus exporter for RQ.
//!
//! Connects to the Redis instance backing RQ, runs one eager collection to
//! fail fast on a bad store, then serves `/metrics`. Every scrape triggers
//! a fresh collection; nothing is cached between scrapes.
//!
//! # Usage
//!
//! ```text
//! rq-exporter --redis-host localhost --port 9726
//! rq-exporter --config /etc/rq-exporter.toml check-config
//! ```

mod cli;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use rq_core::{ExporterConfig, LogConfig, LogFormat};
use rq_metrics::{AggregatorOptions, MetricsRegistry, RqCollector, SnapshotAggregator};
use rq_store::{KeyspaceRegistry, RedisAccessor, StoreHandle};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;

    init_tracing(&config.log)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => run(config).await,
        Command::CheckConfig => {
            print!("{}", cli::render_config(&config)?);
            Ok(())
        }
    }
}

fn init_tracing(log: &LogConfig) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&log.level)
            .with_context(|| format!("invalid log level {:?}", log.level))?,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match log.format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
    Ok(())
}

async fn run(config: ExporterConfig) -> anyhow::Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "rq exporter starting");

    // ── Initialize subsystems ──────────────────────────────────

    let setup_config = config.clone();
    let state = tokio::task::spawn_blocking(move || build_state(&setup_config))
        .await
        .context("startup task failed")??;

    // ── Start HTTP server ──────────────────────────────────────

    let router = rq_api::build_router(state);
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "invalid listen address {}:{}",
                config.server.host, config.server.port
            )
        })?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "serving metrics");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("rq exporter stopped");
    Ok(())
}

/// Connect, select keyspaces and register the collector.
///
/// Registration runs one collection, so an unreachable or unreadable store
/// stops the process here rather than on the first scrape.
fn build_state(config: &ExporterConfig) -> anyhow::Result<rq_api::ApiState> {
    let handle = StoreHandle::connect(&config.redis).context("failed to connect to redis")?;
    let keyspaces = KeyspaceRegistry::with_builtins();
    let accessor = RedisAccessor::from_config(Arc::new(handle), &keyspaces, &config.redis)?;

    let options = AggregatorOptions::from(&config.collector);
    info!(
        job_timings = options.job_timings,
        finished_window = options.finished_window,
        "collector configured"
    );
    let aggregator = Arc::new(SnapshotAggregator::new(Arc::new(accessor), options));

    let mut registry = MetricsRegistry::new();
    let collector = RqCollector::new(aggregator.clone(), registry.prometheus())?;
    registry
        .register(Box::new(collector))
        .context("initial collection failed")?;

    Ok(rq_api::ApiState {
        registry: Arc::new(registry),
        aggregator,
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
