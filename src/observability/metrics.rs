//! # Metrics
//!
//! Prometheus metrics for monitoring the controllers.
//!
//! ## Metrics Exposed
//!
//! - `acm_sync_reconciliations_total` - Reconciliations per controller
//! - `acm_sync_reconciliation_errors_total` - Failed reconciliations
//! - `acm_sync_reconciliation_duration_seconds` - Secret reconciliation duration
//! - `acm_sync_requeues_total` - Requeued reconciliations
//! - `acm_sync_acm_imports_total` - Certificates imported into ACM
//! - `acm_sync_acm_operations_total` - ACM API calls per operation
//! - `acm_sync_acm_operation_errors_total` - Failed ACM API calls per operation
//! - `acm_sync_acm_operation_duration_seconds` - ACM API call duration

use std::sync::LazyLock;

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, Opts, Registry};

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "acm_sync_reconciliations_total",
            "Total number of reconciliations per controller",
        ),
        &["controller"],
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "acm_sync_reconciliation_errors_total",
        "Total number of reconciliation errors",
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "acm_sync_reconciliation_duration_seconds",
            "Duration of secret reconciliation in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "acm_sync_requeues_total",
        "Total number of requeued reconciliations",
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

static ACM_IMPORTS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "acm_sync_acm_imports_total",
        "Total number of certificates imported into ACM",
    )
    .expect("Failed to create ACM_IMPORTS_TOTAL metric - this should never happen")
});

static ACM_OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "acm_sync_acm_operations_total",
            "Total number of ACM API calls per operation",
        ),
        &["operation"],
    )
    .expect("Failed to create ACM_OPERATIONS_TOTAL metric - this should never happen")
});

static ACM_OPERATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "acm_sync_acm_operation_errors_total",
            "Total number of failed ACM API calls per operation",
        ),
        &["operation"],
    )
    .expect("Failed to create ACM_OPERATION_ERRORS_TOTAL metric - this should never happen")
});

static ACM_OPERATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "acm_sync_acm_operation_duration_seconds",
            "Duration of ACM API calls in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0]),
    )
    .expect("Failed to create ACM_OPERATION_DURATION metric - this should never happen")
});

/// Register all metrics with the shared registry. Called once at startup.
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ACM_IMPORTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ACM_OPERATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ACM_OPERATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ACM_OPERATION_DURATION.clone()))?;
    Ok(())
}

pub fn increment_reconciliations(controller: &str) {
    RECONCILIATIONS_TOTAL.with_label_values(&[controller]).inc();
}

pub fn increment_reconciliation_errors() {
    RECONCILIATION_ERRORS_TOTAL.inc();
}

pub fn observe_reconciliation_duration(seconds: f64) {
    RECONCILIATION_DURATION.observe(seconds);
}

pub fn increment_requeues() {
    REQUEUES_TOTAL.inc();
}

pub fn increment_acm_imports() {
    ACM_IMPORTS_TOTAL.inc();
}

pub fn record_acm_operation(operation: &str, seconds: f64) {
    ACM_OPERATIONS_TOTAL.with_label_values(&[operation]).inc();
    ACM_OPERATION_DURATION.observe(seconds);
}

pub fn increment_acm_operation_errors(operation: &str) {
    ACM_OPERATION_ERRORS_TOTAL
        .with_label_values(&[operation])
        .inc();
}
