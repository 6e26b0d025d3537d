// GET handlers: version, health, api/power, api/stats, metrics

use axum::{
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
};

use super::AppState;
use crate::version::{NAME, VERSION};

/// GET /version: service name and version (from Cargo.toml at build time).
pub(super) async fn version_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "name": NAME,
        "version": VERSION,
    }))
}

/// GET /health: 200 when every poller delivered recently, 503 otherwise.
pub(super) async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let errors: Vec<String> = state
        .pollers
        .iter()
        .filter_map(|p| p.is_healthy().err())
        .map(|e| e.to_string())
        .collect();
    if errors.is_empty() {
        return (
            StatusCode::OK,
            axum::Json(serde_json::json!({ "healthy": true })),
        );
    }
    tracing::warn!(errors = ?errors, "health check failed");
    (
        StatusCode::SERVICE_UNAVAILABLE,
        axum::Json(serde_json::json!({ "healthy": false, "errors": errors })),
    )
}

pub(super) async fn power_handler(State(state): State<AppState>) -> impl IntoResponse {
    axum::Json(state.gauges.snapshot())
}

pub(super) async fn stats_handler(State(state): State<AppState>) -> impl IntoResponse {
    let pollers: Vec<serde_json::Value> = state
        .pollers
        .iter()
        .map(|p| {
            serde_json::json!({
                "source": p.source(),
                "pollsOk": p.polls_ok(),
                "pollsFailed": p.polls_failed(),
                "healthy": p.is_healthy().is_ok(),
            })
        })
        .collect();
    axum::Json(serde_json::json!({
        "writer": state.writer_stats.snapshot(),
        "pollers": pollers,
    }))
}

/// GET /metrics: Prometheus text exposition of the solaredge_* gauges.
pub(super) async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
