//! Prometheus metrics for the kanari API
//!
//! - `kanari_operations_total{operation,result}` - core operations served
//! - `kanari_operation_duration_seconds{operation}` - time spent per operation

use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

pub type SharedMetrics = Arc<ApiMetrics>;

pub struct ApiMetrics {
    registry: Registry,
    operations: IntCounterVec,
    duration: HistogramVec,
}

impl ApiMetrics {
    /// Create and register all collectors on a fresh registry
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let operations = IntCounterVec::new(
            Opts::new("kanari_operations_total", "Core operations served"),
            &["operation", "result"],
        )?;
        let duration = HistogramVec::new(
            HistogramOpts::new(
                "kanari_operation_duration_seconds",
                "Time spent serving core operations",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
            &["operation"],
        )?;

        registry.register(Box::new(operations.clone()))?;
        registry.register(Box::new(duration.clone()))?;

        Ok(ApiMetrics {
            registry,
            operations,
            duration,
        })
    }

    pub fn record_success(&self, operation: &str, seconds: f64) {
        self.operations.with_label_values(&[operation, "success"]).inc();
        self.duration.with_label_values(&[operation]).observe(seconds);
    }

    pub fn record_error(&self, operation: &str, seconds: f64) {
        self.operations.with_label_values(&[operation, "error"]).inc();
        self.duration.with_label_values(&[operation]).observe(seconds);
    }

    /// Render all metrics in Prometheus text format
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Create the shared metrics registry
pub fn create_metrics() -> Result<SharedMetrics, prometheus::Error> {
    Ok(Arc::new(ApiMetrics::new()?))
}
