// HTTP routes: version, health check, latest power gauges, pipeline stats,
// Prometheus exposition

mod http;

use axum::{Router, routing::get};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::exporter::PowerGauges;
use crate::poller::PollerHealth;
use crate::writer::WriterStats;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) gauges: Arc<PowerGauges>,
    pub(crate) pollers: Vec<Arc<PollerHealth>>,
    pub(crate) writer_stats: Arc<WriterStats>,
    pub(crate) metrics: PrometheusHandle,
}

pub fn app(
    gauges: Arc<PowerGauges>,
    pollers: Vec<Arc<PollerHealth>>,
    writer_stats: Arc<WriterStats>,
    metrics: PrometheusHandle,
) -> Router {
    let state = AppState {
        gauges,
        pollers,
        writer_stats,
        metrics,
    };
    Router::new()
        .route("/version", get(http::version_handler)) // GET /version
        .route("/health", get(http::health_handler)) // GET /health
        .route("/api/power", get(http::power_handler)) // GET /api/power
        .route("/api/stats", get(http::stats_handler)) // GET /api/stats
        .route("/metrics", get(http::metrics_handler)) // GET /metrics
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}
