//! HTTP endpoints: Prometheus scrape target and liveness probe.

use std::sync::Arc;
use std::time::Duration;

use auklet_metrics::{AutoscaleMetrics, render_prometheus};
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use tower_http::timeout::TimeoutLayer;

/// Longest time a request may take before it is answered with 408.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the daemon's router.
pub fn build_router(metrics: Arc<AutoscaleMetrics>) -> Router {
    let router = Router::new()
        .route("/metrics", get(prometheus_metrics))
        .route("/healthz", get(healthz))
        .with_state(metrics);
    with_request_timeout(router, REQUEST_TIMEOUT)
}

/// Bound every route already on `router` by `timeout`.
pub fn with_request_timeout(router: Router, timeout: Duration) -> Router {
    router.layer(TimeoutLayer::new(timeout))
}

/// GET /metrics
async fn prometheus_metrics(State(metrics): State<Arc<AutoscaleMetrics>>) -> impl IntoResponse {
    let body = render_prometheus(&metrics.snapshot().await);
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

/// GET /healthz
async fn healthz() -> &'static str {
    "ok"
}
