//! HTTP handlers.
//!
//! Collection talks to the store synchronously, so every handler that
//! triggers one moves it onto tokio's blocking pool.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use tracing::{error, warn};

use crate::ApiState;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

// ── Metrics ────────────────────────────────────────────────────

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let registry = state.registry.clone();
    let rendered = tokio::task::spawn_blocking(move || registry.render()).await;

    match rendered {
        Ok(Ok(body)) => (
            StatusCode::OK,
            [("content-type", PROMETHEUS_CONTENT_TYPE)],
            body,
        )
            .into_response(),
        Ok(Err(e)) => {
            error!(error = %e, "metrics collection failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
        Err(e) => {
            error!(error = %e, "metrics collection task panicked");
            (StatusCode::INTERNAL_SERVER_ERROR, "collection task failed").into_response()
        }
    }
}

// ── Health ─────────────────────────────────────────────────────

/// GET /healthz
pub async fn healthz() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

// ── Snapshot ───────────────────────────────────────────────────

/// GET /api/v1/snapshot
pub async fn snapshot(State(state): State<ApiState>) -> impl IntoResponse {
    let aggregator = state.aggregator.clone();
    let snapshot = tokio::task::spawn_blocking(move || aggregator.aggregate()).await;

    match snapshot {
        Ok(Ok(snapshot)) => ApiResponse::ok(snapshot).into_response(),
        Ok(Err(e)) => {
            warn!(error = %e, "snapshot unavailable");
            error_response(&e.to_string(), StatusCode::SERVICE_UNAVAILABLE).into_response()
        }
        Err(e) => {
            error!(error = %e, "snapshot task panicked");
            error_response("snapshot task failed", StatusCode::INTERNAL_SERVER_ERROR)
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use axum::body::to_bytes;
    use rq_metrics::{AggregatorOptions, MetricsRegistry, RqCollector, SnapshotAggregator};
    use rq_store::{FailurePoint, JobStatus, MemoryAccessor, StatusCounts};

    fn test_state() -> (ApiState, Arc<MemoryAccessor>) {
        let accessor = Arc::new(MemoryAccessor::new());
        accessor.put_queue(
            "default",
            [(JobStatus::Queued, 4), (JobStatus::Failed, 1)]
                .into_iter()
                .collect::<StatusCounts>(),
        );
        let aggregator = Arc::new(SnapshotAggregator::new(
            accessor.clone(),
            AggregatorOptions::default(),
        ));

        let mut registry = MetricsRegistry::new();
        let collector = RqCollector::new(aggregator.clone(), registry.prometheus()).unwrap();
        registry.register(Box::new(collector)).unwrap();

        let state = ApiState {
            registry: Arc::new(registry),
            aggregator,
        };
        (state, accessor)
    }

    async fn body_text(resp: axum::response::Response) -> String {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn metrics_renders_prometheus_text() {
        let (state, _) = test_state();
        let resp = prometheus_metrics(State(state)).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()["content-type"],
            "text/plain; version=0.0.4; charset=utf-8"
        );

        let body = body_text(resp).await;
        assert!(body.contains(r#"rq_jobs{queue="default",status="queued"} 4"#));
        assert!(body.contains(r#"rq_jobs{queue="default",status="scheduled"} 0"#));
    }

    #[tokio::test]
    async fn metrics_store_failure_is_500() {
        let (state, accessor) = test_state();
        accessor.fail_on(Some(FailurePoint::ListQueues));
        let resp = prometheus_metrics(State(state)).await.into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body_text(resp).await.contains("rq_jobs"));
    }

    #[tokio::test]
    async fn healthz_is_ok() {
        let resp = healthz().await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
        assert_eq!(body, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn snapshot_returns_counts() {
        let (state, _) = test_state();
        let resp = snapshot(State(state)).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);

        let body: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["queues"][0]["name"], "default");
        assert_eq!(body["data"]["queues"][0]["counts"]["queued"], 4);
        assert_eq!(body["data"]["queues"][0]["counts"]["deferred"], 0);
        assert!(body["data"]["durations"].is_null());
    }

    #[tokio::test]
    async fn snapshot_store_failure_is_503() {
        let (state, accessor) = test_state();
        accessor.fail_on(Some(FailurePoint::QueueCounts));
        let resp = snapshot(State(state)).await.into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("injected failure"));
    }
}
