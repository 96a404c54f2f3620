//! # Status Ledger
//!
//! Pure status transitions. Each function mutates an in-memory
//! [`MCPServerStatus`]; the reconciler commits the result with
//! [`commit_status`](super::retry::commit_status), which skips the write when
//! nothing changed.
//!
//! Condition timestamps only move when status, reason or message change, so
//! repeated reconciles of a stable resource produce identical statuses.

use k8s_openapi::api::apps::v1::Deployment;

use crate::controller::validation::ValidationOutcome;
use crate::crd::condition_types::{AVAILABLE, DEGRADED, PROGRESSING, READY};
use crate::crd::{
    Condition, ConditionStatus, MCPServerPhase, MCPServerStatus, ResolvedTransportStatus,
    TransportProtocol, ValidationState,
};

/// Degraded condition reasons
pub mod degraded_reasons {
    pub const VALIDATION_PASSED: &str = "ValidationPassed";
    pub const PROTOCOL_MISMATCH: &str = "ProtocolMismatch";
    pub const VALIDATION_FAILED: &str = "ValidationFailed";
    pub const VALIDATION_FAILED_STRICT: &str = "ValidationFailedStrict";
    pub const DEPLOYMENT_DELETED: &str = "DeploymentDeleted";
}

/// Current time as RFC3339
pub fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Insert or update the condition of `type_`
///
/// Keeps at most one condition per type. The transition time is refreshed
/// only when status, reason or message change.
pub fn set_condition(
    conditions: &mut Vec<Condition>,
    type_: &str,
    status: ConditionStatus,
    reason: &str,
    message: impl Into<String>,
    now: &str,
) {
    let message = message.into();
    match conditions.iter_mut().find(|c| c.r#type == type_) {
        Some(existing) => {
            let changed = existing.status != status
                || existing.reason.as_deref() != Some(reason)
                || existing.message.as_deref() != Some(message.as_str());
            if changed {
                existing.status = status;
                existing.reason = Some(reason.to_string());
                existing.message = Some(message);
                existing.last_transition_time = Some(now.to_string());
            }
        }
        None => conditions.push(Condition {
            r#type: type_.to_string(),
            status,
            last_transition_time: Some(now.to_string()),
            reason: Some(reason.to_string()),
            message: Some(message),
        }),
    }
}

pub fn remove_condition(conditions: &mut Vec<Condition>, type_: &str) {
    conditions.retain(|c| c.r#type != type_);
}

pub fn find_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.r#type == type_)
}

/// Replica counts read from a Deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkloadObservation {
    /// Replica count requested on the Deployment (possibly by an autoscaler)
    pub desired: i32,
    pub replicas: i32,
    pub ready: i32,
    pub available: i32,
}

impl WorkloadObservation {
    pub fn from_deployment(deployment: Option<&Deployment>) -> Self {
        let Some(deployment) = deployment else {
            return Self::default();
        };
        let desired = deployment
            .spec
            .as_ref()
            .and_then(|s| s.replicas)
            .unwrap_or(1);
        let status = deployment.status.as_ref();
        Self {
            desired,
            replicas: status.and_then(|s| s.replicas).unwrap_or(0),
            ready: status.and_then(|s| s.ready_replicas).unwrap_or(0),
            available: status.and_then(|s| s.available_replicas).unwrap_or(0),
        }
    }

    /// Running once every desired replica is ready, Creating while none are
    pub fn phase(&self) -> MCPServerPhase {
        if self.desired > 0 && self.ready >= self.desired {
            MCPServerPhase::Running
        } else if self.ready == 0 {
            MCPServerPhase::Creating
        } else {
            MCPServerPhase::Scaling
        }
    }
}

/// Recompute phase, replica counts and workload conditions
pub fn apply_workload_observation(
    status: &mut MCPServerStatus,
    observed: WorkloadObservation,
    service_endpoint: Option<String>,
    generation: i64,
    now: &str,
) {
    let phase = observed.phase();
    status.phase = Some(phase);
    status.replicas = observed.replicas;
    status.ready_replicas = observed.ready;
    status.available_replicas = observed.available;
    status.service_endpoint = service_endpoint;
    status.observed_generation = Some(generation);
    status.message = Some(match phase {
        MCPServerPhase::Running => format!("{} of {} replicas ready", observed.ready, observed.desired),
        MCPServerPhase::Scaling => format!(
            "scaling: {} of {} replicas ready",
            observed.ready, observed.desired
        ),
        _ => "waiting for replicas to become ready".to_string(),
    });

    let running = phase == MCPServerPhase::Running;
    set_condition(
        &mut status.conditions,
        READY,
        running.into(),
        if running { "Running" } else { "NotReady" },
        format!("{}/{} replicas ready", observed.ready, observed.desired),
        now,
    );
    set_condition(
        &mut status.conditions,
        AVAILABLE,
        (observed.available > 0).into(),
        if observed.available > 0 {
            "MinimumReplicasAvailable"
        } else {
            "NoReplicasAvailable"
        },
        format!("{} replicas available", observed.available),
        now,
    );
    set_condition(
        &mut status.conditions,
        PROGRESSING,
        (!running).into(),
        if running {
            "ReplicasReady"
        } else {
            "ReplicasUpdating"
        },
        format!("phase {phase}"),
        now,
    );
}

/// Confirm that SSE settings were applied by a successful convergence
///
/// Second phase of the two-phase commit: only flips the flag for an SSE
/// resolution that the converged objects actually carried.
pub fn confirm_sse_applied(status: &mut MCPServerStatus, applied_sse: bool) {
    if let Some(resolved) = status.resolved_transport.as_mut() {
        if applied_sse && resolved.protocol == TransportProtocol::Sse {
            resolved.sse_config_applied = true;
        }
    }
}

/// Record the outcome of a probe
///
/// When the declared protocol is `auto`, the detected transport is recorded
/// as resolved. A new SSE detection starts unapplied; the flag survives only
/// if SSE was already resolved and applied.
pub fn apply_validation_outcome(
    status: &mut MCPServerStatus,
    outcome: &ValidationOutcome,
    declared: TransportProtocol,
    strict: bool,
    generation: i64,
    now: &str,
) {
    status.validation = Some(outcome.validation.clone());

    if declared == TransportProtocol::Auto {
        if let Some(detected) = outcome.validation.transport_used {
            let already_applied = status.resolved_transport.as_ref().is_some_and(|r| {
                r.protocol == TransportProtocol::Sse && r.sse_config_applied
            });
            status.resolved_transport = Some(ResolvedTransportStatus {
                protocol: detected,
                resolved_generation: generation,
                sse_config_applied: detected == TransportProtocol::Sse && already_applied,
            });
        }
    } else {
        status.resolved_transport = None;
    }

    if outcome.validation.compliant {
        let message = if outcome.state() == ValidationState::AuthRequired {
            "server is compliant and requires authentication"
        } else {
            "server is protocol compliant"
        };
        set_condition(
            &mut status.conditions,
            DEGRADED,
            ConditionStatus::False,
            degraded_reasons::VALIDATION_PASSED,
            message,
            now,
        );
        return;
    }

    let reason = if strict {
        degraded_reasons::VALIDATION_FAILED_STRICT
    } else if outcome.mismatch {
        degraded_reasons::PROTOCOL_MISMATCH
    } else {
        degraded_reasons::VALIDATION_FAILED
    };
    set_condition(
        &mut status.conditions,
        DEGRADED,
        ConditionStatus::True,
        reason,
        issue_summary(outcome),
        now,
    );
}

fn issue_summary(outcome: &ValidationOutcome) -> String {
    let v = &outcome.validation;
    let detail = v
        .issues
        .first()
        .map(|i| format!("{}: {}", i.code.as_str(), i.message))
        .unwrap_or_else(|| "server is not protocol compliant".to_string());
    format!("validation {} (attempt {}): {detail}", v.state.as_str(), v.attempts)
}

/// Record a switched-off validation
pub fn apply_validation_disabled(status: &mut MCPServerStatus, generation: i64) {
    status.validation = Some(crate::controller::validation::disabled_validation(generation));
    remove_condition(&mut status.conditions, DEGRADED);
}

/// Record an infrastructure failure
pub fn apply_reconcile_failure(status: &mut MCPServerStatus, message: &str, now: &str) {
    status.phase = Some(MCPServerPhase::Failed);
    status.message = Some(message.to_string());
    set_condition(
        &mut status.conditions,
        READY,
        ConditionStatus::False,
        "ReconcileError",
        message,
        now,
    );
}

/// Record that deletion has started
pub fn apply_terminating(status: &mut MCPServerStatus, now: &str) {
    status.phase = Some(MCPServerPhase::Terminating);
    status.message = Some("MCP server is being deleted".to_string());
    set_condition(
        &mut status.conditions,
        READY,
        ConditionStatus::False,
        "Terminating",
        "MCP server is being deleted",
        now,
    );
}

/// Initialize an empty phase
pub fn apply_initial_phase(status: &mut MCPServerStatus) {
    if status.phase.is_none() {
        status.phase = Some(MCPServerPhase::Creating);
        status.message = Some("creating MCP server resources".to_string());
    }
}
