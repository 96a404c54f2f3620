//! # Custom Resource Definitions
//!
//! CRD types for the MCP Server Operator.
//!
//! This module contains the `MCPServer` custom resource and the spec types
//! that describe the desired workload, its transport, validation policy,
//! autoscaling and external access.

mod status;
mod transport;

pub use status::*;
pub use transport::*;

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::constants;

/// MCPServer Custom Resource Definition
///
/// Declares an MCP server workload. The operator converges a Deployment,
/// Service, optional HorizontalPodAutoscaler and optional Ingress toward this
/// spec, then probes the running server to confirm it speaks the declared
/// transport.
///
/// # Example
///
/// ```yaml
/// apiVersion: mcp.x-k8s.io/v1alpha1
/// kind: MCPServer
/// metadata:
///   name: weather
///   namespace: default
/// spec:
///   image: ghcr.io/example/weather-mcp:1.2.0
///   replicas: 2
///   transport:
///     type: http
///     protocol: auto
///   validation:
///     enabled: true
///     strictMode: false
///     requiredCapabilities: ["tools"]
/// ```
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    kind = "MCPServer",
    group = "mcp.x-k8s.io",
    version = "v1alpha1",
    namespaced,
    status = "MCPServerStatus",
    shortname = "mcps",
    derive = "PartialEq",
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}, {"name":"Ready", "type":"integer", "jsonPath":".status.readyReplicas"}, {"name":"Validation", "type":"string", "jsonPath":".status.validation.state"}, {"name":"Endpoint", "type":"string", "jsonPath":".status.serviceEndpoint"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MCPServerSpec {
    /// Container image running the MCP server
    pub image: String,
    /// Desired replica count
    /// Ignored after creation while an autoscaler is enabled
    #[serde(default = "default_replicas")]
    pub replicas: i32,
    /// Container port the server listens on
    /// Overridden by `transport.http.port` or `transport.custom.port` when set
    #[serde(default = "default_port")]
    pub port: i32,
    /// Extra container arguments
    #[serde(default)]
    pub args: Vec<String>,
    /// Container environment variables
    #[serde(default)]
    pub env: Vec<EnvVarSpec>,
    /// ServiceAccount the pods run as
    /// When unset, the operator creates and owns a ServiceAccount named after the resource
    #[serde(default)]
    pub service_account_name: Option<String>,
    /// Transport declaration
    #[serde(default)]
    pub transport: TransportConfig,
    /// Protocol validation policy
    #[serde(default)]
    pub validation: ValidationConfig,
    /// Horizontal autoscaling policy
    #[serde(default)]
    pub hpa: Option<AutoscalingConfig>,
    /// External access policy
    #[serde(default)]
    pub ingress: Option<IngressConfig>,
}

/// A single name/value environment variable
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EnvVarSpec {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

/// Protocol validation policy
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ValidationConfig {
    /// Probe the running server after it becomes ready
    /// Default: true
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Escalate a failed validation into deleting the workload
    /// Default: false (failures only mark the resource Degraded)
    #[serde(default)]
    pub strict_mode: bool,
    /// Capabilities the server must advertise (e.g. "tools", "resources", "prompts")
    #[serde(default)]
    pub required_capabilities: Vec<String>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strict_mode: false,
            required_capabilities: Vec::new(),
        }
    }
}

/// Horizontal autoscaling policy
///
/// While enabled, the autoscaler exclusively owns the Deployment replica count.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AutoscalingConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub min_replicas: Option<i32>,
    #[serde(default = "default_max_replicas")]
    pub max_replicas: i32,
    /// Average CPU utilization target
    #[serde(default, rename = "targetCPUUtilizationPercentage")]
    pub target_cpu_utilization_percentage: Option<i32>,
}

/// External access policy
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct IngressConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Host name routed to the server
    #[serde(default)]
    pub host: Option<String>,
    /// Path prefix routed to the server
    /// Default: "/"
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    /// TLS secret for `host`
    #[serde(default)]
    pub tls_secret_name: Option<String>,
}

impl MCPServerSpec {
    /// Whether an autoscaler is declared enabled for this server
    pub fn autoscaling_enabled(&self) -> bool {
        self.hpa.as_ref().is_some_and(|h| h.enabled)
    }

    /// Whether external access is declared enabled for this server
    pub fn ingress_enabled(&self) -> bool {
        self.ingress.as_ref().is_some_and(|i| i.enabled)
    }
}

impl MCPServer {
    /// Current spec generation, 0 when the API server has not assigned one
    pub fn generation(&self) -> i64 {
        self.metadata.generation.unwrap_or(0)
    }

    /// Whether the deletion guard is present
    pub fn has_finalizer(&self) -> bool {
        self.metadata
            .finalizers
            .as_ref()
            .is_some_and(|f| f.iter().any(|x| x == constants::FINALIZER))
    }

    /// Whether a deletion marker is present
    pub fn is_being_deleted(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }
}

fn default_replicas() -> i32 {
    1
}

fn default_port() -> i32 {
    constants::DEFAULT_SERVER_PORT
}

fn default_max_replicas() -> i32 {
    5
}

pub(crate) fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_spec_defaults() {
        let spec: MCPServerSpec =
            serde_json::from_value(serde_json::json!({ "image": "example/mcp:1" }))
                .expect("minimal spec should deserialize");

        assert_eq!(spec.replicas, 1);
        assert_eq!(spec.port, 8080);
        assert!(spec.validation.enabled);
        assert!(!spec.validation.strict_mode);
        assert_eq!(spec.transport.r#type, TransportType::Http);
        assert_eq!(spec.transport.protocol, TransportProtocol::Auto);
        assert!(!spec.autoscaling_enabled());
        assert!(!spec.ingress_enabled());
    }

    #[test]
    fn test_full_spec_deserializes() {
        let spec: MCPServerSpec = serde_json::from_value(serde_json::json!({
            "image": "example/mcp:1",
            "replicas": 3,
            "transport": {
                "type": "http",
                "protocol": "sse",
                "http": { "port": 9000, "path": "/rpc", "sse": { "sessionAffinity": true } }
            },
            "validation": { "strictMode": true, "requiredCapabilities": ["tools"] },
            "hpa": { "enabled": true, "minReplicas": 2, "maxReplicas": 10, "targetCPUUtilizationPercentage": 70 },
            "ingress": { "enabled": true, "host": "mcp.example.com" }
        }))
        .expect("full spec should deserialize");

        assert_eq!(spec.transport.protocol, TransportProtocol::Sse);
        assert_eq!(spec.transport.container_port(spec.port), 9000);
        assert_eq!(spec.transport.path(), "/rpc");
        let sse = spec.transport.sse_config();
        assert!(sse.session_affinity);
        assert_eq!(sse.termination_grace_period_seconds, 60);
        assert!(spec.validation.strict_mode);
        assert!(spec.autoscaling_enabled());
        assert_eq!(
            spec.hpa.as_ref().and_then(|h| h.target_cpu_utilization_percentage),
            Some(70)
        );
        assert!(spec.ingress_enabled());
    }
}
