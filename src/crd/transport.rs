//! # Transport Declaration
//!
//! Transport types for the MCPServer spec.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants;

/// Transport declaration
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TransportConfig {
    /// Workload shape: `http` (default) or `custom`
    #[serde(default)]
    pub r#type: TransportType,
    /// Wire protocol the server claims to speak
    /// `auto` lets the operator detect it from the running server
    #[serde(default)]
    pub protocol: TransportProtocol,
    /// HTTP transport settings
    #[serde(default)]
    pub http: Option<HttpTransportConfig>,
    /// Custom transport settings
    #[serde(default)]
    pub custom: Option<CustomTransportConfig>,
}

/// Workload shape selected by the transport manager factory
#[derive(Debug, Clone, Copy, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportType {
    /// HTTP streaming server fronted by a Service
    #[default]
    Http,
    /// Arbitrary command, optionally exposing a port
    Custom,
}

/// MCP wire protocol
#[derive(Debug, Clone, Copy, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TransportProtocol {
    /// Detect from the running server
    #[default]
    Auto,
    /// Streamable HTTP (single endpoint, JSON or SSE responses)
    StreamableHttp,
    /// Legacy HTTP+SSE (long-lived event stream plus message endpoint)
    Sse,
}

impl TransportProtocol {
    pub fn as_str(self) -> &'static str {
        match self {
            TransportProtocol::Auto => "auto",
            TransportProtocol::StreamableHttp => "streamable-http",
            TransportProtocol::Sse => "sse",
        }
    }
}

impl fmt::Display for TransportProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP transport settings
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct HttpTransportConfig {
    #[serde(default)]
    pub port: Option<i32>,
    /// MCP endpoint path
    /// Default: "/mcp"
    #[serde(default)]
    pub path: Option<String>,
    /// Settings applied only while the effective protocol is SSE
    #[serde(default)]
    pub sse: Option<SseConfig>,
}

/// Settings applied to the workload while the effective protocol is SSE
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SseConfig {
    /// Grace period letting open streams drain on pod termination
    /// Default: 60
    #[serde(default = "default_termination_grace_period")]
    pub termination_grace_period_seconds: i64,
    /// Pin clients to a pod by source IP
    /// Default: false
    #[serde(default)]
    pub session_affinity: bool,
    /// ClientIP affinity timeout
    /// Default: 10800 (3 hours)
    #[serde(default = "default_session_affinity_timeout")]
    pub session_affinity_timeout_seconds: i32,
}

impl Default for SseConfig {
    fn default() -> Self {
        Self {
            termination_grace_period_seconds: default_termination_grace_period(),
            session_affinity: false,
            session_affinity_timeout_seconds: default_session_affinity_timeout(),
        }
    }
}

/// Custom transport settings
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct CustomTransportConfig {
    /// Port to expose through a Service; no Service is created when unset
    #[serde(default)]
    pub port: Option<i32>,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub args: Vec<String>,
}

impl TransportConfig {
    /// Port the container listens on
    pub fn container_port(&self, default_port: i32) -> i32 {
        match self.r#type {
            TransportType::Http => self.http.as_ref().and_then(|h| h.port),
            TransportType::Custom => self.custom.as_ref().and_then(|c| c.port),
        }
        .unwrap_or(default_port)
    }

    /// MCP endpoint path
    pub fn path(&self) -> &str {
        self.http
            .as_ref()
            .and_then(|h| h.path.as_deref())
            .unwrap_or(constants::DEFAULT_MCP_PATH)
    }

    /// SSE settings with defaults filled in
    pub fn sse_config(&self) -> SseConfig {
        self.http
            .as_ref()
            .and_then(|h| h.sse.clone())
            .unwrap_or_default()
    }
}

fn default_termination_grace_period() -> i64 {
    constants::DEFAULT_SSE_TERMINATION_GRACE_PERIOD_SECS
}

fn default_session_affinity_timeout() -> i32 {
    constants::DEFAULT_SSE_SESSION_AFFINITY_TIMEOUT_SECS
}
