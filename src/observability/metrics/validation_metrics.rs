//! # Validation Metrics
//!
//! Metrics for protocol validation probes.

use crate::observability::metrics::registry::REGISTRY;
use anyhow::Result;
use prometheus::{Histogram, IntCounterVec};
use std::sync::LazyLock;

static VALIDATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "mcp_operator_validations_total",
            "Total number of protocol validation probes by resulting state",
        ),
        &["result"],
    )
    .expect("Failed to create VALIDATIONS_TOTAL metric - this should never happen")
});

static VALIDATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "mcp_operator_validation_duration_seconds",
            "Duration of protocol validation probes in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0]),
    )
    .expect("Failed to create VALIDATION_DURATION metric - this should never happen")
});

static VALIDATION_ISSUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "mcp_operator_validation_issues_total",
            "Total number of validation issues reported by code",
        ),
        &["code"],
    )
    .expect("Failed to create VALIDATION_ISSUES_TOTAL metric - this should never happen")
});

/// Register validation metrics with the registry
pub(crate) fn register_validation_metrics() -> Result<()> {
    REGISTRY.register(Box::new(VALIDATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(VALIDATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(VALIDATION_ISSUES_TOTAL.clone()))?;
    Ok(())
}

/// `result` is the validation state after the probe
pub fn increment_validations(result: &str) {
    VALIDATIONS_TOTAL.with_label_values(&[result]).inc();
}

pub fn observe_validation_duration(duration: f64) {
    VALIDATION_DURATION.observe(duration);
}

pub fn increment_validation_issue(code: &str) {
    VALIDATION_ISSUES_TOTAL.with_label_values(&[code]).inc();
}
