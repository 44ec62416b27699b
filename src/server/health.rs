//! Operational endpoints
//!
//! - `/healthz` answers 200 while the process can serve HTTP at all
//! - `/readyz` answers 200 between startup and the start of shutdown
//! - `/metrics` exposes the operation metrics for scraping

use crate::server::metrics::SharedMetrics;
use axum::{
    extract::State,
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use prometheus::{Encoder, TextEncoder};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::error;

/// Readiness flag shared between `main` and the `/readyz` handler
///
/// Starts unready. `main` flips it once the Kubernetes client exists and
/// flips it back when a termination signal arrives, so the Service stops
/// routing to a draining pod.
#[derive(Debug, Clone, Default)]
pub struct ReadinessState {
    ready: Arc<AtomicBool>,
}

impl ReadinessState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    pub fn set_not_ready(&self) {
        self.ready.store(false, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
struct ProbeState {
    readiness: ReadinessState,
    metrics: SharedMetrics,
}

async fn liveness() -> StatusCode {
    StatusCode::OK
}

async fn readiness(State(probe): State<ProbeState>) -> StatusCode {
    match probe.readiness.is_ready() {
        true => StatusCode::OK,
        false => StatusCode::SERVICE_UNAVAILABLE,
    }
}

async fn scrape(State(probe): State<ProbeState>) -> Response {
    match probe.metrics.encode() {
        Ok(text) => ([(CONTENT_TYPE, TextEncoder::new().format_type().to_string())], text)
            .into_response(),
        Err(e) => {
            error!(error = %e, "Metrics encoding failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Routes for probes and metrics
pub fn health_router(readiness_state: ReadinessState, metrics: SharedMetrics) -> Router {
    Router::new()
        .route("/healthz", get(liveness))
        .route("/readyz", get(readiness))
        .route("/metrics", get(scrape))
        .with_state(ProbeState {
            readiness: readiness_state,
            metrics,
        })
}
