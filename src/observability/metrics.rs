//! # Metrics
//!
//! Prometheus metrics for monitoring policy reconciliation.
//!
//! ## Metrics Exposed
//!
//! - `apim_policy_reconciliations_total{operation}` - Reconciler entry point invocations
//! - `apim_policy_reconciliation_errors_total{operation}` - Failed entry point invocations
//! - `apim_policy_reconciliation_duration_seconds{operation}` - Entry point duration
//! - `apim_policy_api_operations_total{operation}` - Management API calls
//! - `apim_policy_api_operation_errors_total{operation}` - Failed management API calls
//! - `apim_policy_api_operation_duration_seconds{operation}` - Management API call duration
//! - `apim_policy_drift_detected_total` - Policies found deleted out of band
//!
//! The CLI is short-lived, so the registry is written to a node-exporter
//! textfile rather than served over HTTP.

use anyhow::{Context, Result};
use prometheus::{Encoder, HistogramVec, IntCounter, IntCounterVec, Registry, TextEncoder};
use std::path::Path;
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "apim_policy_reconciliations_total",
            "Total number of reconciler invocations by operation",
        ),
        &["operation"],
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "apim_policy_reconciliation_errors_total",
            "Total number of failed reconciler invocations by operation",
        ),
        &["operation"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "apim_policy_reconciliation_duration_seconds",
            "Duration of reconciler invocations in seconds by operation",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]),
        &["operation"],
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static API_OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "apim_policy_api_operations_total",
            "Total number of API Management policy calls by operation",
        ),
        &["operation"],
    )
    .expect("Failed to create API_OPERATIONS_TOTAL metric - this should never happen")
});

static API_OPERATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "apim_policy_api_operation_duration_seconds",
            "Duration of API Management policy calls in seconds by operation",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["operation"],
    )
    .expect("Failed to create API_OPERATION_DURATION metric - this should never happen")
});

static API_OPERATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "apim_policy_api_operation_errors_total",
            "Total number of failed API Management policy calls by operation",
        ),
        &["operation"],
    )
    .expect("Failed to create API_OPERATION_ERRORS_TOTAL metric - this should never happen")
});

static DRIFT_DETECTED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "apim_policy_drift_detected_total",
        "Total number of policies found deleted outside of this provider",
    )
    .expect("Failed to create DRIFT_DETECTED_TOTAL metric - this should never happen")
});

#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
/// Register all metrics with the crate registry. Call once per process.
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(API_OPERATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(API_OPERATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(API_OPERATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(DRIFT_DETECTED_TOTAL.clone()))?;

    Ok(())
}

pub fn increment_reconciliations(operation: &str) {
    RECONCILIATIONS_TOTAL.with_label_values(&[operation]).inc();
}

pub fn increment_reconciliation_errors(operation: &str) {
    RECONCILIATION_ERRORS_TOTAL
        .with_label_values(&[operation])
        .inc();
}

pub fn observe_reconciliation_duration(operation: &str, duration: f64) {
    RECONCILIATION_DURATION
        .with_label_values(&[operation])
        .observe(duration);
}

/// Record a completed management API call
pub fn record_operation(operation: &str, duration: f64) {
    API_OPERATIONS_TOTAL.with_label_values(&[operation]).inc();
    API_OPERATION_DURATION
        .with_label_values(&[operation])
        .observe(duration);
}

/// Increment management API call errors counter
pub fn increment_operation_errors(operation: &str) {
    API_OPERATION_ERRORS_TOTAL
        .with_label_values(&[operation])
        .inc();
}

pub fn increment_drift_detected() {
    DRIFT_DETECTED_TOTAL.inc();
}

/// Render the registry in the Prometheus text exposition format
///
/// # Errors
/// Returns an error if encoding fails.
pub fn gather_text() -> Result<String> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&REGISTRY.gather(), &mut buffer)
        .context("Failed to encode metrics")?;
    String::from_utf8(buffer).context("Metrics output was not valid UTF-8")
}

/// Write the registry to a node-exporter textfile
///
/// Written to a sibling temp file first so the collector never reads a
/// partial file.
///
/// # Errors
/// Returns an error if the file cannot be written.
pub fn write_textfile(path: &Path) -> Result<()> {
    let text = gather_text()?;
    let tmp = path.with_extension("prom.tmp");
    std::fs::write(&tmp, text)
        .with_context(|| format!("Failed to write metrics to {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move metrics into {}", path.display()))?;
    Ok(())
}
