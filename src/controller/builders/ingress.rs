//! Ingress builder.

use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, IngressTLS, ServiceBackendPort,
};
use kube::ResourceExt;

use crate::controller::reconciler::ReconcilerError;
use crate::crd::{IngressConfig, MCPServer};

use super::owned_metadata;

/// Ingress routing external traffic to the server Service
pub fn build_ingress(
    server: &MCPServer,
    config: &IngressConfig,
    port: i32,
) -> Result<Ingress, ReconcilerError> {
    let mut metadata = owned_metadata(server)?;
    if !config.annotations.is_empty() {
        metadata.annotations = Some(config.annotations.clone());
    }

    let path = HTTPIngressPath {
        path: Some(config.path.clone().unwrap_or_else(|| "/".to_string())),
        path_type: "Prefix".to_string(),
        backend: IngressBackend {
            service: Some(IngressServiceBackend {
                name: server.name_any(),
                port: Some(ServiceBackendPort {
                    number: Some(port),
                    ..Default::default()
                }),
            }),
            ..Default::default()
        },
    };

    let tls = match (&config.tls_secret_name, &config.host) {
        (Some(secret), Some(host)) => Some(vec![IngressTLS {
            hosts: Some(vec![host.clone()]),
            secret_name: Some(secret.clone()),
        }]),
        _ => None,
    };

    Ok(Ingress {
        metadata,
        spec: Some(IngressSpec {
            ingress_class_name: config.class_name.clone(),
            rules: Some(vec![IngressRule {
                host: config.host.clone(),
                http: Some(HTTPIngressRuleValue { paths: vec![path] }),
            }]),
            tls,
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// Whether the spec or the requested annotations drifted
pub fn ingress_needs_update(existing: &Ingress, desired: &Ingress) -> bool {
    let live_annotations = existing.annotations();
    let annotations_drifted = desired
        .annotations()
        .iter()
        .any(|(k, v)| live_annotations.get(k) != Some(v));
    existing.spec != desired.spec || annotations_drifted
}

/// Apply the operator-owned fields of `desired` onto the live Ingress
pub fn merge_ingress(existing: &Ingress, desired: &Ingress) -> Ingress {
    let mut merged = existing.clone();
    merged.spec = desired.spec.clone();
    let annotations = desired.annotations().clone();
    merged.annotations_mut().extend(annotations);
    merged
}
