//! Prometheus /metrics + health check HTTP endpoints
//!
//! Endpoints:
//!   GET /metrics  Prometheus text format
//!   GET /healthz  Liveness check (always 200 if process is running)

use anyhow::Result;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus_client::{
    encoding::text::encode,
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};
use std::sync::Arc;

use sft_core::SessionState;
use sft_proto::SessionReport;

/// Per-session counters, cloned into every session task.
#[derive(Clone, Default)]
pub struct SessionMetrics {
    sessions: Family<Vec<(String, String)>, Counter>,
    bytes_received: Counter,
}

impl SessionMetrics {
    pub fn new(registry: &mut Registry) -> Self {
        let metrics = Self::default();

        // Counters get the `_total` suffix on encode.
        registry.register(
            "sft_sessions",
            "Sessions by outcome (succeeded or failure kind)",
            metrics.sessions.clone(),
        );
        registry.register(
            "sft_bytes_received",
            "Verified plaintext bytes written to the sink",
            metrics.bytes_received.clone(),
        );
        metrics
    }

    pub fn record(&self, report: &SessionReport) {
        let outcome = match (&report.state, &report.error) {
            (SessionState::Succeeded, _) => "succeeded",
            (_, Some(e)) => e.kind(),
            _ => "failed",
        };
        self.sessions
            .get_or_create(&vec![("outcome".to_string(), outcome.to_string())])
            .inc();
        self.bytes_received.inc_by(report.bytes);
    }
}

/// Serve Prometheus metrics and health endpoints on `addr` (e.g. "127.0.0.1:9100")
pub async fn serve(addr: String, registry: Arc<Registry>) -> Result<()> {
    let app = router(registry);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("metrics bind {addr}: {e}"))?;

    tracing::info!(addr = %addr, "metrics: listening on /metrics, /healthz");

    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("metrics server: {e}"))
}

fn router(registry: Arc<Registry>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .with_state(registry)
}

async fn metrics_handler(State(registry): State<Arc<Registry>>) -> impl IntoResponse {
    let mut body = String::new();
    match encode(&mut body, &registry) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            body,
        ),
        Err(e) => {
            tracing::error!("metrics encode failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                e.to_string(),
            )
        }
    }
}

/// Liveness check: returns 200 if the process is running.
async fn healthz_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Render the registry the way `/metrics` does.
#[cfg(test)]
pub fn render(registry: &Registry) -> String {
    let mut body = String::new();
    encode(&mut body, registry).unwrap();
    body
}
