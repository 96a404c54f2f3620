//! # Controller Metrics
//!
//! Metrics for controller operations: reconciliations, requeues and the
//! observed state of each MCPServer.

use crate::observability::metrics::registry::REGISTRY;
use anyhow::Result;
use prometheus::{Histogram, IntCounterVec, IntGaugeVec};
use std::sync::LazyLock;

// Reconciliation metrics
static RECONCILIATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "mcp_operator_reconciliations_total",
            "Total number of reconciliations by result",
        ),
        &["result"],
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "mcp_operator_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

// Requeue metrics
static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "mcp_operator_requeues_total",
            "Total number of reconciliation requeues",
        ),
        &["reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

// Per-resource state gauges
static SERVER_REPLICAS: LazyLock<IntGaugeVec> = LazyLock::new(|| {
    IntGaugeVec::new(
        prometheus::Opts::new(
            "mcp_operator_server_replicas",
            "Observed replica count of the MCP server workload",
        ),
        &["namespace", "name"],
    )
    .expect("Failed to create SERVER_REPLICAS metric - this should never happen")
});

static SERVER_READY_REPLICAS: LazyLock<IntGaugeVec> = LazyLock::new(|| {
    IntGaugeVec::new(
        prometheus::Opts::new(
            "mcp_operator_server_ready_replicas",
            "Ready replica count of the MCP server workload",
        ),
        &["namespace", "name"],
    )
    .expect("Failed to create SERVER_READY_REPLICAS metric - this should never happen")
});

static SERVER_COMPLIANT: LazyLock<IntGaugeVec> = LazyLock::new(|| {
    IntGaugeVec::new(
        prometheus::Opts::new(
            "mcp_operator_server_compliant",
            "1 if the last protocol validation found the server compliant",
        ),
        &["namespace", "name"],
    )
    .expect("Failed to create SERVER_COMPLIANT metric - this should never happen")
});

static SERVER_INGRESS_ENABLED: LazyLock<IntGaugeVec> = LazyLock::new(|| {
    IntGaugeVec::new(
        prometheus::Opts::new(
            "mcp_operator_server_ingress_enabled",
            "1 if external access is enabled for the server",
        ),
        &["namespace", "name"],
    )
    .expect("Failed to create SERVER_INGRESS_ENABLED metric - this should never happen")
});

static SERVER_AUTOSCALER_ENABLED: LazyLock<IntGaugeVec> = LazyLock::new(|| {
    IntGaugeVec::new(
        prometheus::Opts::new(
            "mcp_operator_server_autoscaler_enabled",
            "1 if an autoscaler owns the server replica count",
        ),
        &["namespace", "name"],
    )
    .expect("Failed to create SERVER_AUTOSCALER_ENABLED metric - this should never happen")
});

/// Register controller metrics with the registry
pub(crate) fn register_controller_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SERVER_REPLICAS.clone()))?;
    REGISTRY.register(Box::new(SERVER_READY_REPLICAS.clone()))?;
    REGISTRY.register(Box::new(SERVER_COMPLIANT.clone()))?;
    REGISTRY.register(Box::new(SERVER_INGRESS_ENABLED.clone()))?;
    REGISTRY.register(Box::new(SERVER_AUTOSCALER_ENABLED.clone()))?;
    Ok(())
}

// Public functions for controller metrics

/// `result` is `success` or an error label
pub fn increment_reconciliations(result: &str) {
    RECONCILIATIONS_TOTAL.with_label_values(&[result]).inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

pub fn increment_requeues_total(reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[reason]).inc();
}

pub fn set_server_replicas(namespace: &str, name: &str, replicas: i32, ready: i32) {
    SERVER_REPLICAS
        .with_label_values(&[namespace, name])
        .set(i64::from(replicas));
    SERVER_READY_REPLICAS
        .with_label_values(&[namespace, name])
        .set(i64::from(ready));
}

pub fn set_server_compliant(namespace: &str, name: &str, compliant: bool) {
    SERVER_COMPLIANT
        .with_label_values(&[namespace, name])
        .set(i64::from(compliant));
}

pub fn set_server_features(namespace: &str, name: &str, ingress: bool, autoscaler: bool) {
    SERVER_INGRESS_ENABLED
        .with_label_values(&[namespace, name])
        .set(i64::from(ingress));
    SERVER_AUTOSCALER_ENABLED
        .with_label_values(&[namespace, name])
        .set(i64::from(autoscaler));
}

/// Drop every per-resource series for a deleted server
pub fn remove_server_metrics(namespace: &str, name: &str) {
    for gauge in [
        &*SERVER_REPLICAS,
        &*SERVER_READY_REPLICAS,
        &*SERVER_COMPLIANT,
        &*SERVER_INGRESS_ENABLED,
        &*SERVER_AUTOSCALER_ENABLED,
    ] {
        // Absent series are fine
        let _ = gauge.remove_label_values(&[namespace, name]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_reconciliations() {
        let before = RECONCILIATIONS_TOTAL.with_label_values(&["success"]).get();
        increment_reconciliations("success");
        let after = RECONCILIATIONS_TOTAL.with_label_values(&["success"]).get();
        assert_eq!(after, before + 1u64);
    }

    #[test]
    fn test_increment_requeues_total() {
        let before = REQUEUES_TOTAL.with_label_values(&["validation-retry"]).get();
        increment_requeues_total("validation-retry");
        let after = REQUEUES_TOTAL.with_label_values(&["validation-retry"]).get();
        assert_eq!(after, before + 1u64);
    }

    #[test]
    fn test_server_gauges_set_and_removed() {
        set_server_replicas("metrics-ns", "gauge-test", 3, 2);
        set_server_compliant("metrics-ns", "gauge-test", true);
        set_server_features("metrics-ns", "gauge-test", false, true);

        assert_eq!(
            SERVER_REPLICAS
                .with_label_values(&["metrics-ns", "gauge-test"])
                .get(),
            3
        );
        assert_eq!(
            SERVER_READY_REPLICAS
                .with_label_values(&["metrics-ns", "gauge-test"])
                .get(),
            2
        );
        assert_eq!(
            SERVER_AUTOSCALER_ENABLED
                .with_label_values(&["metrics-ns", "gauge-test"])
                .get(),
            1
        );

        remove_server_metrics("metrics-ns", "gauge-test");
        assert!(SERVER_COMPLIANT
            .remove_label_values(&["metrics-ns", "gauge-test"])
            .is_err());
    }
}
