//! # Protocol Validation
//!
//! Probing of running MCP servers and the state machine that turns probe
//! results into a validation record.
//!
//! - `prober` - HTTP implementation of [`ProtocolValidator`]
//! - `state_machine` - Attempt counting, error classification, backoff and eligibility

mod prober;
pub mod state_machine;

pub use prober::HttpProtocolValidator;
pub use state_machine::*;

use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::crd::{IssueCode, IssueLevel, TransportProtocol, ValidationIssue};

/// Options passed to a probe
///
/// The declared protocol is deliberately absent: the prober must detect the
/// transport independently so a mismatch can be observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationOptions {
    pub timeout: Duration,
    /// MCP endpoint path on the server
    pub configured_path: String,
    pub required_capabilities: Vec<String>,
    pub strict_mode: bool,
}

/// Structured probe outcome
///
/// Probe failures are encoded as issues rather than errors: a server that
/// cannot be reached is a validation result, not a reconciler failure.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProbeResult {
    /// The server answered `initialize` with a usable result
    pub success: bool,
    pub protocol_version: Option<String>,
    pub capabilities: Vec<String>,
    pub detected_transport: Option<TransportProtocol>,
    pub requires_auth: bool,
    pub issues: Vec<ValidationIssue>,
    pub duration: Duration,
    pub endpoint: String,
}

impl ProbeResult {
    /// Any error-level issue
    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(|i| i.level == IssueLevel::Error)
    }

    pub fn has_issue(&self, code: IssueCode) -> bool {
        self.issues.iter().any(|i| i.code == code)
    }
}

/// Probes a live MCP server
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ProtocolValidator: Send + Sync {
    /// `endpoint` is the server base URL without a path
    async fn validate(&self, endpoint: &str, options: &ValidationOptions) -> ProbeResult;
}
