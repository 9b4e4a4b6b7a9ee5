//! # Controller Metrics
//!
//! Prometheus counters for reconciliations, errors, and status writes,
//! labelled by controller.

use anyhow::Result;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::LazyLock;

/// Global Prometheus metrics registry
static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "stack_operator_reconciliations_total",
            "Total number of reconciliations",
        ),
        &["controller"],
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "stack_operator_reconciliation_errors_total",
            "Total number of reconciliation errors",
        ),
        &["controller"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static STATUS_WRITES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "stack_operator_status_writes_total",
            "Total number of status patches issued after a condition change",
        ),
        &["controller"],
    )
    .expect("Failed to create STATUS_WRITES_TOTAL metric - this should never happen")
});

/// Register all metrics with the Prometheus registry.
///
/// Prometheus Registry::register() takes ownership (Box<dyn Collector>), so
/// metrics are cloned; they are Arc-backed internally, cloning is cheap.
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(STATUS_WRITES_TOTAL.clone()))?;
    Ok(())
}

pub fn increment_reconciliations(controller: &str) {
    RECONCILIATIONS_TOTAL.with_label_values(&[controller]).inc();
}

pub fn increment_reconciliation_errors(controller: &str) {
    RECONCILIATION_ERRORS_TOTAL
        .with_label_values(&[controller])
        .inc();
}

pub fn increment_status_writes(controller: &str) {
    STATUS_WRITES_TOTAL.with_label_values(&[controller]).inc();
}

/// Render the registry in the Prometheus text exposition format.
pub fn gather() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if encoder.encode(&REGISTRY.gather(), &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
