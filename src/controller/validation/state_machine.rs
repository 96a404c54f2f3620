//! # Validation State Machine
//!
//! Pure transitions from a probe result to a new validation record.
//!
//! ```text
//! Pending ──probe──> Validating ──probe──> ... ──> Passed | AuthRequired | Failed
//!    ^                                                         │
//!    └──────────── spec edit (recovery) ───────────────────────┘
//! ```
//!
//! Error classes:
//! - permanent: protocol mismatch, auth required (with other errors), invalid
//!   protocol version, missing server info, missing capability. Fails after
//!   `max_permanent_error_attempts`.
//! - transient: connection failures, timeouts, malformed responses. Fails after
//!   `max_validation_attempts`.

use std::time::Duration;

use crate::config::ControllerConfig;
use crate::constants;
use crate::crd::{
    IssueCode, IssueLevel, MCPServerPhase, MCPServerSpec, MCPServerStatus, TransportProtocol,
    ValidationIssue, ValidationState, ValidationStatus,
};

use super::ProbeResult;

/// Result of feeding one probe into the state machine
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationOutcome {
    pub validation: ValidationStatus,
    /// Detected transport differs from a non-auto declared protocol
    pub mismatch: bool,
    /// The failure is configuration-class
    pub permanent: bool,
}

impl ValidationOutcome {
    pub fn state(&self) -> ValidationState {
        self.validation.state
    }
}

/// Whether a probe should run in this reconcile
///
/// Requires validation enabled, phase Running and at least one ready replica.
/// Then probes when there is no record yet, the spec changed since the last
/// probe, or a retry is in progress.
pub fn should_validate(spec: &MCPServerSpec, status: &MCPServerStatus, generation: i64) -> bool {
    if !spec.validation.enabled {
        return false;
    }
    if status.phase != Some(MCPServerPhase::Running) || status.ready_replicas < 1 {
        return false;
    }
    match &status.validation {
        None => true,
        Some(v) => {
            v.validated_generation != Some(generation) || v.state == ValidationState::Validating
        }
    }
}

/// Declared and detected transports disagree
///
/// Only meaningful when the declared protocol is not `auto` and the probe
/// detected something.
pub fn is_protocol_mismatch(
    declared: TransportProtocol,
    detected: Option<TransportProtocol>,
) -> bool {
    match detected {
        Some(detected) => declared != TransportProtocol::Auto && detected != declared,
        None => false,
    }
}

/// Transition the validation record with a new probe result
///
/// Attempts accumulate while `validatedGeneration` matches the current
/// generation and restart at 1 otherwise.
pub fn apply_probe_result(
    previous: Option<&ValidationStatus>,
    result: &ProbeResult,
    declared: TransportProtocol,
    generation: i64,
    config: &ControllerConfig,
    now: String,
) -> ValidationOutcome {
    let attempts = match previous {
        Some(prev) if prev.validated_generation == Some(generation) => prev.attempts + 1,
        _ => 1,
    };

    let mismatch = is_protocol_mismatch(declared, result.detected_transport);
    let mut issues = result.issues.clone();
    if mismatch && !issues.iter().any(|i| i.code == IssueCode::ProtocolMismatch) {
        let detected = result
            .detected_transport
            .map_or("unknown", TransportProtocol::as_str);
        issues.push(ValidationIssue::error(
            IssueCode::ProtocolMismatch,
            format!(
                "server speaks {detected} but the resource declares {declared}; update the declared protocol to match, or use auto-detection"
            ),
        ));
    }

    let errors: Vec<&ValidationIssue> = issues
        .iter()
        .filter(|i| i.level == IssueLevel::Error)
        .collect();
    let auth_only = result.requires_auth
        && !errors.is_empty()
        && errors.iter().all(|i| i.code == IssueCode::AuthRequired);
    let compliant = !mismatch && ((result.success && errors.is_empty()) || auth_only);
    let permanent = !compliant && (mismatch || errors.iter().any(|i| i.code.is_permanent()));

    let state = if compliant {
        if result.requires_auth {
            ValidationState::AuthRequired
        } else {
            ValidationState::Passed
        }
    } else if permanent {
        if attempts >= config.max_permanent_error_attempts {
            ValidationState::Failed
        } else {
            ValidationState::Validating
        }
    } else if attempts >= config.max_validation_attempts {
        ValidationState::Failed
    } else {
        ValidationState::Validating
    };

    ValidationOutcome {
        validation: ValidationStatus {
            state,
            attempts,
            last_attempt_time: Some(now),
            protocol_version: result.protocol_version.clone(),
            capabilities: result.capabilities.clone(),
            compliant,
            transport_used: result.detected_transport,
            requires_auth: result.requires_auth,
            validated_generation: Some(generation),
            issues,
        },
        mismatch,
        permanent,
    }
}

/// Delay before the next probe, zero for no periodic requeue
///
/// No record yet: 30s. Terminal states: 0. Otherwise keyed on attempts:
/// up to 2 => 30s, up to 4 => 60s, beyond => 120s.
pub fn retry_interval(validation: Option<&ValidationStatus>) -> Duration {
    let Some(v) = validation else {
        return Duration::from_secs(constants::VALIDATION_RETRY_SHORT_SECS);
    };
    if v.state.is_terminal() {
        return Duration::ZERO;
    }
    let secs = match v.attempts {
        i32::MIN..=2 => constants::VALIDATION_RETRY_SHORT_SECS,
        3..=4 => constants::VALIDATION_RETRY_MEDIUM_SECS,
        _ => constants::VALIDATION_RETRY_LONG_SECS,
    };
    Duration::from_secs(secs)
}

/// Record for a resource whose validation is switched off
pub fn disabled_validation(generation: i64) -> ValidationStatus {
    ValidationStatus {
        state: ValidationState::Disabled,
        validated_generation: Some(generation),
        ..Default::default()
    }
}

/// Strict mode has escalated this record to the terminal failure
pub fn is_terminal_strict_failure(
    spec: &MCPServerSpec,
    validation: Option<&ValidationStatus>,
    config: &ControllerConfig,
) -> bool {
    spec.validation.strict_mode
        && validation.is_some_and(|v| {
            v.state == ValidationState::Failed && v.attempts >= config.max_permanent_error_attempts
        })
}
