//! # Probe and Metrics Server
//!
//! Small HTTP surface for liveness, readiness, and Prometheus scraping.

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

use super::metrics;

/// Shared readiness flag flipped once every controller stream is running.
#[derive(Debug, Default)]
pub struct ServerState {
    pub is_ready: AtomicBool,
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn readyz(State(state): State<Arc<ServerState>>) -> StatusCode {
    if state.is_ready.load(Ordering::Relaxed) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn metrics_handler() -> String {
    metrics::gather()
}

/// Serve `/healthz`, `/readyz`, and `/metrics` until the process exits.
pub async fn start_server(port: u16, state: Arc<ServerState>) -> Result<()> {
    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("Failed to bind metrics server on port {port}"))?;
    info!("Metrics and probe server listening on :{port}");
    axum::serve(listener, app)
        .await
        .context("Metrics server terminated")?;
    Ok(())
}
