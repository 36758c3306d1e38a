//! # Metrics
//!
//! Prometheus metrics for object store operations.
//!
//! ## Metrics Exposed
//!
//! - `vals_provider_operations_total` - Store operations by resource kind and operation
//! - `vals_provider_operation_errors_total` - Failed store operations by resource kind and operation
//! - `vals_provider_operation_duration_seconds` - Duration of store operations
//!
//! Operations are `get`, `create`, `update` and `delete`. A `get` answered with
//! not-found is counted as a successful operation: the reconciler expects it.

use anyhow::Result;
use prometheus::{Encoder, HistogramVec, IntCounterVec, Registry, TextEncoder};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "vals_provider_operations_total",
            "Total number of object store operations by resource kind",
        ),
        &["kind", "operation"],
    )
    .expect("Failed to create OPERATIONS_TOTAL metric - this should never happen")
});

static OPERATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "vals_provider_operation_errors_total",
            "Total number of failed object store operations by resource kind",
        ),
        &["kind", "operation"],
    )
    .expect("Failed to create OPERATION_ERRORS_TOTAL metric - this should never happen")
});

static OPERATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "vals_provider_operation_duration_seconds",
            "Duration of object store operations in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["kind", "operation"],
    )
    .expect("Failed to create OPERATION_DURATION metric - this should never happen")
});

/// Register all collectors with the crate registry.
///
/// Safe to call more than once; collectors that are already registered are skipped.
#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn register_metrics() -> Result<()> {
    register(Box::new(OPERATIONS_TOTAL.clone()))?;
    register(Box::new(OPERATION_ERRORS_TOTAL.clone()))?;
    register(Box::new(OPERATION_DURATION.clone()))?;
    Ok(())
}

fn register(collector: Box<dyn prometheus::core::Collector>) -> Result<()> {
    match REGISTRY.register(collector) {
        Ok(()) | Err(prometheus::Error::AlreadyReg) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Record a completed store operation
pub fn record_operation(kind: &str, operation: &str, duration: f64) {
    OPERATIONS_TOTAL.with_label_values(&[kind, operation]).inc();
    OPERATION_DURATION
        .with_label_values(&[kind, operation])
        .observe(duration);
}

pub fn increment_operation_errors(kind: &str, operation: &str) {
    OPERATION_ERRORS_TOTAL
        .with_label_values(&[kind, operation])
        .inc();
}

/// Current value of the operations counter, mainly for tests and diagnostics
#[must_use]
pub fn operation_count(kind: &str, operation: &str) -> u64 {
    OPERATIONS_TOTAL.with_label_values(&[kind, operation]).get()
}

/// Render every registered metric in the Prometheus text exposition format
#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn gather_metrics() -> Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
