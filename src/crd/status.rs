//! # MCPServer Status
//!
//! Status types for tracking reconciliation, validation and resolved transport.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::TransportProtocol;

/// Status of the MCPServer resource
///
/// Written exclusively by the operator.
#[derive(Debug, Clone, Deserialize, Serialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MCPServerStatus {
    /// Current lifecycle phase, unset until the first reconcile
    #[serde(default)]
    pub phase: Option<MCPServerPhase>,
    /// Human-readable description of the current state
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub replicas: i32,
    #[serde(default)]
    pub ready_replicas: i32,
    #[serde(default)]
    pub available_replicas: i32,
    /// In-cluster URL of the MCP endpoint
    #[serde(default)]
    pub service_endpoint: Option<String>,
    #[serde(default)]
    pub observed_generation: Option<i64>,
    /// At most one condition per type, in insertion order
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub validation: Option<ValidationStatus>,
    /// Only populated when the declared protocol is `auto`
    #[serde(default)]
    pub resolved_transport: Option<ResolvedTransportStatus>,
}

/// Lifecycle phase
#[derive(Debug, Clone, Copy, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum MCPServerPhase {
    Creating,
    Running,
    Scaling,
    Failed,
    Terminating,
    /// Strict validation failed and the workload was deleted
    ValidationFailed,
}

impl fmt::Display for MCPServerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MCPServerPhase::Creating => "Creating",
            MCPServerPhase::Running => "Running",
            MCPServerPhase::Scaling => "Scaling",
            MCPServerPhase::Failed => "Failed",
            MCPServerPhase::Terminating => "Terminating",
            MCPServerPhase::ValidationFailed => "ValidationFailed",
        };
        f.write_str(s)
    }
}

/// Condition represents a condition of a resource
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    pub r#type: String,
    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,
    /// Last time status, reason or message changed (RFC3339)
    #[serde(default)]
    pub last_transition_time: Option<String>,
    /// Reason for the condition
    #[serde(default)]
    pub reason: Option<String>,
    /// Message describing the condition
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl From<bool> for ConditionStatus {
    fn from(value: bool) -> Self {
        if value {
            ConditionStatus::True
        } else {
            ConditionStatus::False
        }
    }
}

/// Well-known condition types
pub mod condition_types {
    pub const READY: &str = "Ready";
    pub const AVAILABLE: &str = "Available";
    pub const PROGRESSING: &str = "Progressing";
    pub const DEGRADED: &str = "Degraded";
}

/// Protocol validation record
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ValidationStatus {
    pub state: ValidationState,
    /// Probes run for `validatedGeneration`
    #[serde(default)]
    pub attempts: i32,
    #[serde(default)]
    pub last_attempt_time: Option<String>,
    #[serde(default)]
    pub protocol_version: Option<String>,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub compliant: bool,
    /// Transport detected by the last probe
    #[serde(default)]
    pub transport_used: Option<TransportProtocol>,
    #[serde(default)]
    pub requires_auth: bool,
    /// Generation the last probe ran against
    #[serde(default)]
    pub validated_generation: Option<i64>,
    #[serde(default)]
    pub issues: Vec<ValidationIssue>,
}

/// Validation state machine states
#[derive(Debug, Clone, Copy, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Default)]
pub enum ValidationState {
    Disabled,
    #[default]
    Pending,
    /// Probed at least once, retrying
    Validating,
    Passed,
    /// Compliant, but the server requires authentication
    AuthRequired,
    Failed,
}

impl ValidationState {
    /// Terminal states stop further probing until the spec changes
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ValidationState::Disabled | ValidationState::Passed | ValidationState::Failed
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ValidationState::Disabled => "Disabled",
            ValidationState::Pending => "Pending",
            ValidationState::Validating => "Validating",
            ValidationState::Passed => "Passed",
            ValidationState::AuthRequired => "AuthRequired",
            ValidationState::Failed => "Failed",
        }
    }
}

/// Structured, machine-matchable diagnostic
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    pub level: IssueLevel,
    pub code: IssueCode,
    pub message: String,
}

impl ValidationIssue {
    pub fn error(code: IssueCode, message: impl Into<String>) -> Self {
        Self {
            level: IssueLevel::Error,
            code,
            message: message.into(),
        }
    }

    pub fn warning(code: IssueCode, message: impl Into<String>) -> Self {
        Self {
            level: IssueLevel::Warning,
            code,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IssueLevel {
    Error,
    Warning,
}

/// Issue codes reported by the protocol prober and the state machine
#[derive(Debug, Clone, Copy, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum IssueCode {
    ProtocolMismatch,
    AuthRequired,
    InvalidProtocolVersion,
    MissingCapability,
    MissingServerInfo,
    ConnectionFailed,
    Timeout,
    InvalidResponse,
}

impl IssueCode {
    /// Configuration-class codes: retrying will not fix them
    pub fn is_permanent(self) -> bool {
        matches!(
            self,
            IssueCode::ProtocolMismatch
                | IssueCode::AuthRequired
                | IssueCode::InvalidProtocolVersion
                | IssueCode::MissingCapability
                | IssueCode::MissingServerInfo
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IssueCode::ProtocolMismatch => "protocol-mismatch",
            IssueCode::AuthRequired => "auth-required",
            IssueCode::InvalidProtocolVersion => "invalid-protocol-version",
            IssueCode::MissingCapability => "missing-capability",
            IssueCode::MissingServerInfo => "missing-server-info",
            IssueCode::ConnectionFailed => "connection-failed",
            IssueCode::Timeout => "timeout",
            IssueCode::InvalidResponse => "invalid-response",
        }
    }
}

/// Transport resolved by detection when the declared protocol is `auto`
///
/// `protocol` is recorded as soon as a probe detects it. `sseConfigApplied`
/// only becomes true after a later convergence has applied the SSE workload
/// settings.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedTransportStatus {
    pub protocol: TransportProtocol,
    pub resolved_generation: i64,
    #[serde(default)]
    pub sse_config_applied: bool,
}
