//! SRE HTTP listener.
//!
//! Serves operational endpoints on a port separate from gRPC:
//! - `/metrics` - Prometheus metrics
//! - `/health` - Liveness check

use std::future::Future;

use axum::{response::IntoResponse, routing::get, Json, Router};
use tokio::net::TcpListener;
use tracing::info;

use crate::observability::{metrics_handler, MetricsState};

/// Creates the router for the SRE endpoints.
pub fn create_sre_router(metrics_state: MetricsState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_check))
        .with_state(metrics_state)
}

/// Liveness probe: 200 while the process is serving. Dependencies are not checked.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Serves the SRE router on an already bound listener until `shutdown` completes.
pub async fn run_sre_server<F>(
    listener: TcpListener,
    metrics_state: MetricsState,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!(addr = ?listener.local_addr().ok(), "SRE server listening");

    axum::serve(listener, create_sre_router(metrics_state))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("SRE server shutdown complete");
    Ok(())
}
