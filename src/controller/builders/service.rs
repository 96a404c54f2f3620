//! Service builder.

use k8s_openapi::api::core::v1::{
    ClientIPConfig, Service, ServicePort, ServiceSpec, SessionAffinityConfig,
};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use crate::controller::reconciler::ReconcilerError;
use crate::controller::transport::SseSettings;
use crate::crd::MCPServer;

use super::{owned_metadata, selector_labels};

/// Build the ClusterIP Service in front of the server
///
/// ClientIP affinity is only set when the SSE settings opt into it.
pub fn build_service(
    server: &MCPServer,
    port: i32,
    sse: Option<&SseSettings>,
) -> Result<Service, ReconcilerError> {
    let affinity_timeout = sse.and_then(|s| s.session_affinity_timeout_seconds);

    Ok(Service {
        metadata: owned_metadata(server)?,
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(selector_labels(server)),
            ports: Some(vec![ServicePort {
                name: Some("mcp".to_string()),
                port,
                target_port: Some(IntOrString::Int(port)),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            session_affinity: Some(
                if affinity_timeout.is_some() {
                    "ClientIP"
                } else {
                    "None"
                }
                .to_string(),
            ),
            session_affinity_config: affinity_timeout.map(|timeout| SessionAffinityConfig {
                client_ip: Some(ClientIPConfig {
                    timeout_seconds: Some(timeout),
                }),
            }),
            ..Default::default()
        }),
        ..Default::default()
    })
}

fn port_key(p: &ServicePort) -> (Option<&str>, i32, Option<&IntOrString>, Option<&str>) {
    (
        p.name.as_deref(),
        p.port,
        p.target_port.as_ref(),
        p.protocol.as_deref(),
    )
}

/// Whether the operator-owned Service fields drifted
///
/// Fields the API server assigns (clusterIP, nodePort) are ignored.
pub fn service_needs_update(existing: &Service, desired: &Service) -> bool {
    let (Some(live), Some(want)) = (existing.spec.as_ref(), desired.spec.as_ref()) else {
        return true;
    };
    let live_ports: Vec<_> = live.ports.iter().flatten().map(port_key).collect();
    let want_ports: Vec<_> = want.ports.iter().flatten().map(port_key).collect();

    live_ports != want_ports
        || live.selector != want.selector
        || live.session_affinity.as_deref().unwrap_or("None")
            != want.session_affinity.as_deref().unwrap_or("None")
        || live.session_affinity_config != want.session_affinity_config
}

/// Apply the operator-owned fields of `desired` onto the live Service
pub fn merge_service(existing: &Service, desired: &Service) -> Service {
    let mut merged = existing.clone();
    let Some(want) = desired.spec.clone() else {
        return merged;
    };
    let spec = merged.spec.get_or_insert_with(Default::default);
    spec.ports = want.ports;
    spec.selector = want.selector;
    spec.session_affinity = want.session_affinity;
    spec.session_affinity_config = want.session_affinity_config;
    merged
}

#[cfg(test)]
mod tests {
    use super::super::test_support::server;
    use super::*;
    use serde_json::json;

    #[test]
    fn test_build_service_without_affinity() {
        let server = server(json!({ "image": "example/mcp:1" }));
        let service = build_service(&server, 8080, None).expect("service should build");
        let spec = service.spec.as_ref().expect("spec");
        assert_eq!(spec.session_affinity.as_deref(), Some("None"));
        assert!(spec.session_affinity_config.is_none());
        assert_eq!(spec.ports.as_ref().map(|p| p[0].port), Some(8080));
    }

    #[test]
    fn test_build_service_with_client_ip_affinity() {
        let server = server(json!({ "image": "example/mcp:1" }));
        let sse = SseSettings {
            termination_grace_period_seconds: 60,
            session_affinity_timeout_seconds: Some(10800),
        };
        let service = build_service(&server, 8080, Some(&sse)).expect("service should build");
        let spec = service.spec.as_ref().expect("spec");
        assert_eq!(spec.session_affinity.as_deref(), Some("ClientIP"));
        assert_eq!(
            spec.session_affinity_config
                .as_ref()
                .and_then(|c| c.client_ip.as_ref())
                .and_then(|c| c.timeout_seconds),
            Some(10800)
        );
    }

    #[test]
    fn test_service_drift_ignores_cluster_ip() {
        let server = server(json!({ "image": "example/mcp:1" }));
        let desired = build_service(&server, 8080, None).expect("desired");
        let mut live = desired.clone();
        if let Some(spec) = live.spec.as_mut() {
            spec.cluster_ip = Some("10.0.0.12".to_string());
        }
        assert!(!service_needs_update(&live, &desired));

        let moved = build_service(&server, 9090, None).expect("moved");
        assert!(service_needs_update(&live, &moved));
        let merged = merge_service(&live, &moved);
        assert_eq!(
            merged.spec.as_ref().and_then(|s| s.cluster_ip.as_deref()),
            Some("10.0.0.12")
        );
        assert!(!service_needs_update(&merged, &moved));
    }
}
