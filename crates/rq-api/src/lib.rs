//! rq-api — HTTP routes for the RQ exporter.
//!
//! # Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/metrics` | Prometheus exposition, one collection per request |
//! | GET | `/healthz` | Liveness probe |
//! | GET | `/api/v1/snapshot` | Current snapshot as JSON |

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use rq_metrics::{MetricsRegistry, SnapshotAggregator};

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub registry: Arc<MetricsRegistry>,
    pub aggregator: Arc<SnapshotAggregator>,
}

/// Build the complete router.
pub fn build_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route("/snapshot", get(handlers::snapshot))
        .with_state(state.clone());

    Router::new()
        .route("/metrics", get(handlers::prometheus_metrics))
        .route("/healthz", get(handlers::healthz))
        .with_state(state)
        .nest("/api/v1", api_routes)
}
