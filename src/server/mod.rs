//! HTTP server
//!
//! Serves the application API and views, plus the operational endpoints:
//! - `/healthz` - Liveness probe (process is running)
//! - `/readyz` - Readiness probe (connected and not shutting down)
//! - `/metrics` - Prometheus metrics
//!
//! Also provides graceful shutdown handling for SIGTERM/SIGINT.

pub mod api;
mod health;
pub mod metrics;
pub mod shutdown;
pub mod views;

pub use api::{api_router, ApiState};
pub use health::{health_router, ReadinessState};
pub use metrics::{create_metrics, SharedMetrics};
pub use shutdown::{shutdown_channel, wait_for_signal, ShutdownController, ShutdownSignal};

use crate::app::Context;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Build the full router: application API plus health and metrics
pub fn build_router(
    ctx: Arc<Context>,
    readiness: ReadinessState,
    metrics: SharedMetrics,
    shutdown: ShutdownSignal,
) -> Router {
    let api = api_router(ApiState::new(ctx, metrics.clone(), shutdown));
    api.merge(health_router(readiness, metrics))
}

/// Run the HTTP server on the specified port until shutdown is signaled
///
/// In-flight requests observe the same shutdown through their request
/// tokens, so pending cluster calls are cancelled rather than awaited.
pub async fn run_server(
    port: u16,
    router: Router,
    shutdown: ShutdownSignal,
) -> Result<(), std::io::Error> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    // Log after successful bind - server is actually listening
    info!(port = %port, "kanari listening (HTTP)");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.wait().await })
        .await
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "health_test.rs"]
mod health_tests;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "api_test.rs"]
mod api_tests;

#[cfg(test)]
#[path = "shutdown_test.rs"]
mod shutdown_tests;
