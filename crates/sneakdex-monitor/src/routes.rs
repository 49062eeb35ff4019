//! `GET /health` and `GET /metrics` handlers (§4.7).
//!
//! Grounded on `riptide-api::handlers::health`'s status-code-from-report
//! pattern.

use crate::Monitor;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use std::sync::Arc;

pub fn router(monitor: Arc<Monitor>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(monitor)
}

async fn health(State(monitor): State<Arc<Monitor>>) -> impl IntoResponse {
    let report = monitor.health_report().await;
    let code = StatusCode::from_u16(report.status_code()).unwrap_or(StatusCode::SERVICE_UNAVAILABLE);
    (code, Json(report))
}

async fn metrics(State(monitor): State<Arc<Monitor>>) -> impl IntoResponse {
    monitor.sync().await;
    let body = monitor.render_prometheus_text();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        body,
    )
}
