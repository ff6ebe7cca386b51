//! HTTP scrape endpoint for Prometheus.
//!
//! Runs on its own tokio task so scrapes never block the pipeline.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;

use crate::error::{CollectorError, Result};
use crate::metrics::METRICS;

/// A bound, not-yet-serving metrics endpoint.
pub struct MetricsServer {
    listener: TcpListener,
}

impl MetricsServer {
    /// Bind the scrape endpoint on all interfaces.
    pub async fn bind(port: u16) -> Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", port))
            .await
            .map_err(|e| CollectorError::Metrics(format!("bind on port {port}: {e}")))?;
        tracing::info!(port, "metrics endpoint listening");
        Ok(Self { listener })
    }

    /// Serve until the process exits. Intended to be spawned.
    pub async fn serve(self) {
        let app = Router::new().route("/metrics", get(metrics_handler));
        if let Err(e) = axum::serve(self.listener, app).await {
            tracing::error!(error = %e, "metrics endpoint terminated");
        }
    }
}

/// Handler for GET /metrics: Prometheus text exposition.
async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        METRICS.encode(),
    )
}
