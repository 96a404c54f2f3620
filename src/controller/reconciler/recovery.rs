//! # Recovery
//!
//! Leaving a failed validation behind after a spec edit, and the strict-mode
//! terminal failure.
//!
//! A spec edit bumps `metadata.generation`. When the last validation was a
//! failure for an older generation, the record is reset so the next reconcile
//! recreates the workload and probes from scratch. Without an edit a failed
//! resource stays failed.

use crate::crd::condition_types::{AVAILABLE, DEGRADED, PROGRESSING, READY};
use crate::crd::{ConditionStatus, MCPServerPhase, MCPServerStatus, ValidationState, ValidationStatus};

use super::status::{degraded_reasons, remove_condition, set_condition};

/// The spec changed since a failed or non-compliant validation
pub fn needs_recovery(status: &MCPServerStatus, generation: i64) -> bool {
    let Some(validation) = status.validation.as_ref() else {
        return false;
    };
    let stale = validation
        .validated_generation
        .is_some_and(|g| g != generation);
    let failed = validation.state == ValidationState::Failed
        || (!validation.compliant && validation.state != ValidationState::Disabled);
    stale && failed
}

/// Reset the validation record and phase for a fresh attempt
pub fn apply_recovery(status: &mut MCPServerStatus) {
    status.validation = Some(ValidationStatus {
        state: ValidationState::Pending,
        ..Default::default()
    });
    status.phase = Some(MCPServerPhase::Creating);
    status.message = Some("spec changed, retrying after failed validation".to_string());
    remove_condition(&mut status.conditions, DEGRADED);
}

/// Record the strict-mode terminal failure after the workload was deleted
pub fn apply_terminal_failure(status: &mut MCPServerStatus, now: &str) {
    let detail = status
        .validation
        .as_ref()
        .and_then(|v| v.issues.first())
        .map(|i| format!("{}: {}", i.code.as_str(), i.message))
        .unwrap_or_else(|| "protocol validation failed".to_string());
    let message = format!("strict validation failed, deployment deleted ({detail})");

    status.phase = Some(MCPServerPhase::ValidationFailed);
    status.message = Some(message.clone());
    status.replicas = 0;
    status.ready_replicas = 0;
    status.available_replicas = 0;

    let reason = degraded_reasons::DEPLOYMENT_DELETED;
    set_condition(&mut status.conditions, READY, ConditionStatus::False, reason, message.as_str(), now);
    set_condition(&mut status.conditions, AVAILABLE, ConditionStatus::False, reason, message.as_str(), now);
    set_condition(&mut status.conditions, PROGRESSING, ConditionStatus::False, reason, message.as_str(), now);
    set_condition(&mut status.conditions, DEGRADED, ConditionStatus::True, reason, message, now);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::reconciler::status::find_condition;
    use crate::crd::{IssueCode, ValidationIssue};

    fn status_with(state: ValidationState, compliant: bool, generation: i64) -> MCPServerStatus {
        MCPServerStatus {
            phase: Some(MCPServerPhase::Running),
            validation: Some(ValidationStatus {
                state,
                attempts: 2,
                compliant,
                validated_generation: Some(generation),
                issues: vec![ValidationIssue::error(IssueCode::ProtocolMismatch, "wrong transport")],
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_recovery_requires_generation_change() {
        let status = status_with(ValidationState::Failed, false, 3);
        assert!(!needs_recovery(&status, 3));
        assert!(needs_recovery(&status, 4));
    }

    #[test]
    fn test_recovery_covers_non_compliant_retries() {
        assert!(needs_recovery(&status_with(ValidationState::Validating, false, 1), 2));
        assert!(!needs_recovery(&status_with(ValidationState::Passed, true, 1), 2));
        assert!(!needs_recovery(&status_with(ValidationState::Disabled, false, 1), 2));
        assert!(!needs_recovery(&MCPServerStatus::default(), 2));
    }

    #[test]
    fn test_apply_recovery_resets_record() {
        let mut status = status_with(ValidationState::Failed, false, 1);
        set_condition(&mut status.conditions, DEGRADED, ConditionStatus::True, "x", "y", "t");
        apply_recovery(&mut status);

        let validation = status.validation.as_ref().expect("validation");
        assert_eq!(validation.state, ValidationState::Pending);
        assert_eq!(validation.attempts, 0);
        assert!(validation.issues.is_empty());
        assert_eq!(validation.validated_generation, None);
        assert_eq!(status.phase, Some(MCPServerPhase::Creating));
        assert!(find_condition(&status.conditions, DEGRADED).is_none());
    }

    #[test]
    fn test_terminal_failure_zeroes_replicas() {
        let mut status = status_with(ValidationState::Failed, false, 1);
        status.replicas = 2;
        status.ready_replicas = 2;
        apply_terminal_failure(&mut status, "t");

        assert_eq!(status.phase, Some(MCPServerPhase::ValidationFailed));
        assert_eq!(status.ready_replicas, 0);
        let degraded = find_condition(&status.conditions, DEGRADED).expect("degraded");
        assert_eq!(degraded.status, ConditionStatus::True);
        assert_eq!(degraded.reason.as_deref(), Some(degraded_reasons::DEPLOYMENT_DELETED));
        let ready = find_condition(&status.conditions, READY).expect("ready");
        assert_eq!(ready.status, ConditionStatus::False);
        assert!(status.message.as_deref().is_some_and(|m| m.contains("protocol-mismatch")));

        let before = status.clone();
        apply_terminal_failure(&mut status, "later");
        assert_eq!(status, before);
    }
}
