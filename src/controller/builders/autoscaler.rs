//! HorizontalPodAutoscaler builder.

use k8s_openapi::api::autoscaling::v2::{
    CrossVersionObjectReference, HorizontalPodAutoscaler, HorizontalPodAutoscalerSpec, MetricSpec,
    MetricTarget, ResourceMetricSource,
};
use kube::ResourceExt;

use crate::controller::reconciler::ReconcilerError;
use crate::crd::{AutoscalingConfig, MCPServer};

use super::owned_metadata;

/// CPU target the API server would default to
const DEFAULT_CPU_UTILIZATION: i32 = 80;

/// Autoscaler targeting the server Deployment
pub fn build_hpa(
    server: &MCPServer,
    config: &AutoscalingConfig,
) -> Result<HorizontalPodAutoscaler, ReconcilerError> {
    let min_replicas = config.min_replicas.unwrap_or(1).max(1);
    Ok(HorizontalPodAutoscaler {
        metadata: owned_metadata(server)?,
        spec: Some(HorizontalPodAutoscalerSpec {
            scale_target_ref: CrossVersionObjectReference {
                api_version: Some("apps/v1".to_string()),
                kind: "Deployment".to_string(),
                name: server.name_any(),
            },
            min_replicas: Some(min_replicas),
            max_replicas: config.max_replicas.max(min_replicas),
            metrics: Some(vec![MetricSpec {
                type_: "Resource".to_string(),
                resource: Some(ResourceMetricSource {
                    name: "cpu".to_string(),
                    target: MetricTarget {
                        type_: "Utilization".to_string(),
                        average_utilization: Some(
                            config
                                .target_cpu_utilization_percentage
                                .unwrap_or(DEFAULT_CPU_UTILIZATION),
                        ),
                        ..Default::default()
                    },
                }),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// Whether the scaling bounds, target or metrics drifted
pub fn hpa_needs_update(existing: &HorizontalPodAutoscaler, desired: &HorizontalPodAutoscaler) -> bool {
    let (Some(live), Some(want)) = (existing.spec.as_ref(), desired.spec.as_ref()) else {
        return true;
    };
    live.min_replicas != want.min_replicas
        || live.max_replicas != want.max_replicas
        || live.scale_target_ref != want.scale_target_ref
        || live.metrics != want.metrics
}

/// Apply the operator-owned fields of `desired` onto the live autoscaler
pub fn merge_hpa(
    existing: &HorizontalPodAutoscaler,
    desired: &HorizontalPodAutoscaler,
) -> HorizontalPodAutoscaler {
    let mut merged = existing.clone();
    if let (Some(spec), Some(want)) = (merged.spec.as_mut(), desired.spec.as_ref()) {
        spec.min_replicas = want.min_replicas;
        spec.max_replicas = want.max_replicas;
        spec.scale_target_ref = want.scale_target_ref.clone();
        spec.metrics = want.metrics.clone();
    } else {
        merged.spec = desired.spec.clone();
    }
    merged
}
