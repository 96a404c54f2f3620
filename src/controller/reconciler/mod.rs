//! # Reconciler
//!
//! Drives an MCPServer toward its declared state.
//!
//! One reconcile pass:
//!
//! 1. Re-fetch the resource; a vanished resource ends the pass
//! 2. Deletion: tear down children, release the finalizer
//! 3. Ensure the finalizer
//! 4. Recovery: a spec edit after a failed validation resets the record
//! 5. Strict terminal failure: keep the workload deleted
//! 6. Initialize the phase
//! 7. Converge children (ServiceAccount, transport objects, autoscaler, Ingress)
//! 8. Observe the Deployment and record phase and conditions
//! 9. Probe the server when due and record the outcome
//! 10. Requeue according to the validation backoff
//!
//! Status is only ever written through [`retry::commit_status`], which
//! re-reads the resource and skips writes that would not change anything.

mod children;
mod client;
#[cfg(test)]
pub(crate) mod fake;
mod recovery;
mod retry;
pub mod status;
mod types;

pub use client::{KubeStoreClient, MCPKubeClient};
pub use recovery::{apply_recovery, apply_terminal_failure, needs_recovery};
pub use types::{Reconciler, ReconcilerError};

use std::sync::Arc;
use std::time::Instant;

use kube::runtime::events::EventType;
use kube::{Resource, ResourceExt};
use kube_runtime::controller::Action;
use tracing::{debug, info, warn, Instrument};

use crate::controller::builders::service_endpoint;
use crate::controller::transport::{transport_manager_for, TransportManager};
use crate::controller::validation::{
    apply_probe_result, is_terminal_strict_failure, retry_interval, should_validate,
    ValidationOptions,
};
use crate::crd::{MCPServer, MCPServerPhase, TransportProtocol, ValidationState};
use crate::observability::events::{actions, reasons};
use crate::observability::metrics;

use self::retry::{commit_status, ensure_finalizer, remove_finalizer, retry_on_conflict};
use self::status::WorkloadObservation;

/// Reconcile entry point handed to the controller runtime
pub async fn reconcile(server: Arc<MCPServer>, ctx: Arc<Reconciler>) -> Result<Action, ReconcilerError> {
    let span = tracing::span!(
        tracing::Level::INFO,
        "controller.reconcile",
        resource.name = %server.name_any(),
        resource.namespace = %server.namespace().unwrap_or_default(),
        resource.generation = server.generation(),
    );

    let start = Instant::now();
    let result = reconcile_server(&server, &ctx).instrument(span).await;
    metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());
    metrics::increment_reconciliations(if result.is_ok() { "success" } else { "error" });
    result
}

async fn reconcile_server(server: &MCPServer, ctx: &Reconciler) -> Result<Action, ReconcilerError> {
    let name = server.name_any();
    let namespace = server
        .namespace()
        .ok_or_else(|| ReconcilerError::MissingNamespace(name.clone()))?;
    let kube = ctx.kube.as_ref();
    let retries = ctx.config.conflict_retries;

    // The watch event may be stale
    let Some(server) = kube.get_server(&namespace, &name).await? else {
        debug!("MCPServer no longer exists");
        return Ok(Action::await_change());
    };

    if server.is_being_deleted() {
        return finalize(&server, &namespace, ctx).await;
    }

    let Some(mut server) = ensure_finalizer(kube, &namespace, &name, retries).await? else {
        return Ok(Action::await_change());
    };
    let generation = server.generation();

    if server
        .status
        .as_ref()
        .is_some_and(|s| needs_recovery(s, generation))
    {
        info!(generation, "spec changed after failed validation, starting recovery");
        let Some(updated) = commit_status(kube, &namespace, &name, retries, |latest, status| {
            if needs_recovery(status, latest.generation()) {
                apply_recovery(status);
            }
        })
        .await?
        else {
            return Ok(Action::await_change());
        };
        publish(
            ctx,
            &updated,
            EventType::Normal,
            reasons::RECOVERY_ATTEMPT,
            actions::RECONCILE,
            format!("spec generation {generation} changed, retrying validation"),
        )
        .await;
        server = updated;
    }

    let validation = server.status.as_ref().and_then(|s| s.validation.as_ref());
    if is_terminal_strict_failure(&server.spec, validation, &ctx.config) {
        return enforce_terminal_failure(&server, &namespace, ctx).await;
    }

    if server.status.as_ref().and_then(|s| s.phase).is_none() {
        let Some(updated) = commit_status(kube, &namespace, &name, retries, |_, status| {
            status::apply_initial_phase(status)
        })
        .await?
        else {
            return Ok(Action::await_change());
        };
        publish(
            ctx,
            &updated,
            EventType::Normal,
            reasons::CREATING,
            actions::RECONCILE,
            "creating MCP server resources".to_string(),
        )
        .await;
        server = updated;
    }

    let manager = transport_manager_for(&server);
    if let Err(e) = converge_children(&server, &namespace, manager.as_ref(), ctx).await {
        return record_failure(&server, &namespace, e, ctx).await;
    }

    let Some(server) = observe_workload(&server, &namespace, manager.as_ref(), ctx).await? else {
        return Ok(Action::await_change());
    };

    let Some(server) = run_validation(&server, &namespace, manager.as_ref(), ctx).await? else {
        return Ok(Action::await_change());
    };

    let validation = server.status.as_ref().and_then(|s| s.validation.as_ref());
    if validation.is_some_and(|v| v.state == ValidationState::Failed)
        && is_terminal_strict_failure(&server.spec, validation, &ctx.config)
    {
        return enforce_terminal_failure(&server, &namespace, ctx).await;
    }

    Ok(next_action(&server, ctx))
}

/// Create or update every child object the spec asks for
async fn converge_children(
    server: &MCPServer,
    namespace: &str,
    manager: &dyn TransportManager,
    ctx: &Reconciler,
) -> Result<(), ReconcilerError> {
    let kube = ctx.kube.as_ref();
    let retries = ctx.config.conflict_retries;
    let name = server.name_any();
    let name = name.as_str();

    children::ensure_service_account(kube, namespace, server).await?;

    retry_on_conflict(retries, move || async move {
        match kube.get_deployment(namespace, name).await? {
            None => manager.create_resources(kube, server).await,
            Some(_) => manager.update_resources(kube, server).await,
        }
    })
    .await?;

    retry_on_conflict(retries, move || children::converge_hpa(kube, namespace, server)).await?;

    let ingress_port = if manager.requires_external_access() {
        manager.service_port()
    } else {
        None
    };
    retry_on_conflict(retries, move || {
        children::converge_ingress(kube, namespace, server, ingress_port)
    })
    .await
}

/// Record phase, replica counts and workload conditions from the Deployment
async fn observe_workload(
    server: &MCPServer,
    namespace: &str,
    manager: &dyn TransportManager,
    ctx: &Reconciler,
) -> Result<Option<MCPServer>, ReconcilerError> {
    let kube = ctx.kube.as_ref();
    let name = server.name_any();
    let generation = server.generation();

    let deployment = kube.get_deployment(namespace, &name).await?;
    let observed = WorkloadObservation::from_deployment(deployment.as_ref());
    let endpoint = manager
        .service_port()
        .and_then(|port| service_endpoint(server, port));
    let applied_sse = manager.sse_settings().is_some();
    let declared = server.spec.transport.protocol;
    let now = status::now();

    let updated = commit_status(kube, namespace, &name, ctx.config.conflict_retries, |_, status| {
        status::apply_workload_observation(status, observed, endpoint.clone(), generation, &now);
        status::confirm_sse_applied(status, applied_sse);
        if declared != TransportProtocol::Auto {
            status.resolved_transport = None;
        }
    })
    .await?;

    metrics::set_server_replicas(namespace, &name, observed.replicas, observed.ready);
    metrics::set_server_features(
        namespace,
        &name,
        server.spec.ingress_enabled(),
        server.spec.autoscaling_enabled(),
    );
    debug!(
        phase = %observed.phase(),
        desired = observed.desired,
        ready = observed.ready,
        "observed workload"
    );
    Ok(updated)
}

/// Probe the running server when due and record the outcome
async fn run_validation(
    server: &MCPServer,
    namespace: &str,
    manager: &dyn TransportManager,
    ctx: &Reconciler,
) -> Result<Option<MCPServer>, ReconcilerError> {
    let kube = ctx.kube.as_ref();
    let retries = ctx.config.conflict_retries;
    let name = server.name_any();
    let generation = server.generation();

    if !server.spec.validation.enabled || !manager.requires_service() {
        return commit_status(kube, namespace, &name, retries, |_, status| {
            status::apply_validation_disabled(status, generation)
        })
        .await;
    }

    let current = server.status.clone().unwrap_or_default();
    if !should_validate(&server.spec, &current, generation) {
        return Ok(Some(server.clone()));
    }
    let Some(endpoint) = current.service_endpoint.clone() else {
        return Ok(Some(server.clone()));
    };

    let options = ValidationOptions {
        timeout: ctx.config.validation_timeout,
        configured_path: server.spec.transport.path().to_string(),
        required_capabilities: server.spec.validation.required_capabilities.clone(),
        strict_mode: server.spec.validation.strict_mode,
    };
    let result = ctx.validator.validate(&endpoint, &options).await;

    let declared = server.spec.transport.protocol;
    let outcome = apply_probe_result(
        current.validation.as_ref(),
        &result,
        declared,
        generation,
        &ctx.config,
        status::now(),
    );
    let state = outcome.state();
    info!(
        endpoint = %endpoint,
        state = state.as_str(),
        attempt = outcome.validation.attempts,
        compliant = outcome.validation.compliant,
        detected = ?outcome.validation.transport_used,
        "protocol validation finished"
    );

    metrics::observe_validation_duration(result.duration.as_secs_f64());
    metrics::increment_validations(state.as_str());
    for issue in &outcome.validation.issues {
        metrics::increment_validation_issue(issue.code.as_str());
    }
    metrics::set_server_compliant(namespace, &name, outcome.validation.compliant);

    let strict = server.spec.validation.strict_mode;
    let now = status::now();
    let updated = commit_status(kube, namespace, &name, retries, |_, status| {
        status::apply_validation_outcome(status, &outcome, declared, strict, generation, &now)
    })
    .await?;

    let (type_, reason) = match state {
        ValidationState::Passed | ValidationState::AuthRequired => {
            (EventType::Normal, reasons::VALIDATION_PASSED)
        }
        _ if outcome.mismatch => (EventType::Warning, reasons::PROTOCOL_MISMATCH),
        ValidationState::Failed => (EventType::Warning, reasons::VALIDATION_FAILED),
        _ => (EventType::Warning, reasons::VALIDATION_RETRY),
    };
    let note = outcome
        .validation
        .issues
        .first()
        .map(|i| i.message.clone())
        .unwrap_or_else(|| format!("validation {}", state.as_str()));
    if let Some(updated) = updated.as_ref() {
        publish(ctx, updated, type_, reason, actions::VALIDATE, note).await;
    }

    Ok(updated)
}

/// Requeue delay derived from the validation record
///
/// A freshly detected SSE transport requeues promptly so the next pass
/// applies the SSE workload settings.
fn next_action(server: &MCPServer, ctx: &Reconciler) -> Action {
    let status = server.status.as_ref();
    let mut interval = retry_interval(status.and_then(|s| s.validation.as_ref()));

    let sse_pending = status
        .and_then(|s| s.resolved_transport.as_ref())
        .is_some_and(|r| r.protocol == TransportProtocol::Sse && !r.sse_config_applied);
    if sse_pending {
        interval = if interval.is_zero() {
            ctx.config.sse_apply_requeue
        } else {
            interval.min(ctx.config.sse_apply_requeue)
        };
        metrics::increment_requeues_total("sse-apply");
    } else if !interval.is_zero() {
        metrics::increment_requeues_total("validation-retry");
    }

    if interval.is_zero() {
        Action::await_change()
    } else {
        Action::requeue(interval)
    }
}

/// Delete the workload and hold the resource in `ValidationFailed`
///
/// Safe to repeat: deleting a missing Deployment and re-committing the same
/// status are no-ops.
async fn enforce_terminal_failure(
    server: &MCPServer,
    namespace: &str,
    ctx: &Reconciler,
) -> Result<Action, ReconcilerError> {
    let kube = ctx.kube.as_ref();
    let name = server.name_any();
    let first_time = server.status.as_ref().and_then(|s| s.phase) != Some(MCPServerPhase::ValidationFailed);

    if first_time {
        warn!("strict validation failed, deleting deployment");
    }
    kube.delete_deployment(namespace, &name).await?;

    let now = status::now();
    let updated = commit_status(kube, namespace, &name, ctx.config.conflict_retries, |_, status| {
        apply_terminal_failure(status, &now)
    })
    .await?;

    metrics::set_server_replicas(namespace, &name, 0, 0);
    metrics::set_server_compliant(namespace, &name, false);

    if let (true, Some(updated)) = (first_time, updated.as_ref()) {
        let message = updated
            .status
            .as_ref()
            .and_then(|s| s.message.clone())
            .unwrap_or_default();
        publish(
            ctx,
            updated,
            EventType::Warning,
            reasons::DEPLOYMENT_DELETED,
            actions::DELETE,
            message,
        )
        .await;
    }
    Ok(Action::await_change())
}

/// Record an infrastructure error and retry after a fixed delay
async fn record_failure(
    server: &MCPServer,
    namespace: &str,
    error: ReconcilerError,
    ctx: &Reconciler,
) -> Result<Action, ReconcilerError> {
    warn!(error = %error, "failed to converge child resources");
    let message = error.to_string();
    let now = status::now();
    let updated = commit_status(
        ctx.kube.as_ref(),
        namespace,
        &server.name_any(),
        ctx.config.conflict_retries,
        |_, status| status::apply_reconcile_failure(status, &message, &now),
    )
    .await?;

    if let Some(updated) = updated.as_ref() {
        publish(
            ctx,
            updated,
            EventType::Warning,
            reasons::RECONCILE_ERROR,
            actions::RECONCILE,
            message.clone(),
        )
        .await;
    }
    metrics::increment_requeues_total(error.as_label());
    Ok(Action::requeue(ctx.config.error_requeue))
}

/// Tear down children and release the finalizer
///
/// Cleanup is best-effort; only the finalizer removal must succeed.
async fn finalize(server: &MCPServer, namespace: &str, ctx: &Reconciler) -> Result<Action, ReconcilerError> {
    if !server.has_finalizer() {
        return Ok(Action::await_change());
    }
    let kube = ctx.kube.as_ref();
    let retries = ctx.config.conflict_retries;
    let name = server.name_any();
    info!("MCPServer is being deleted, cleaning up");

    if server.status.as_ref().and_then(|s| s.phase) != Some(MCPServerPhase::Terminating) {
        let now = status::now();
        match commit_status(kube, namespace, &name, retries, |_, status| {
            status::apply_terminating(status, &now)
        })
        .await
        {
            Ok(_) => {
                publish(
                    ctx,
                    server,
                    EventType::Normal,
                    reasons::TERMINATING,
                    actions::DELETE,
                    "deleting MCP server resources".to_string(),
                )
                .await;
            }
            Err(e) => warn!(error = %e, "failed to record terminating phase"),
        }
    }

    let manager = transport_manager_for(server);
    if let Err(e) = manager.delete_resources(kube, server).await {
        warn!(error = %e, "failed to delete transport resources");
    }
    if let Err(e) = kube.delete_hpa(namespace, &name).await {
        warn!(error = %e, "failed to delete autoscaler");
    }
    if let Err(e) = kube.delete_ingress(namespace, &name).await {
        warn!(error = %e, "failed to delete ingress");
    }
    metrics::remove_server_metrics(namespace, &name);

    remove_finalizer(kube, namespace, &name, retries).await?;
    info!("finalizer removed");
    Ok(Action::await_change())
}

async fn publish(
    ctx: &Reconciler,
    server: &MCPServer,
    type_: EventType,
    reason: &str,
    action: &str,
    note: String,
) {
    ctx.events
        .publish(&server.object_ref(&()), type_, reason, action, Some(note))
        .await;
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::fake::FakeKube;
    use super::status::{degraded_reasons, find_condition};
    use super::*;
    use crate::config::ControllerConfig;
    use crate::constants;
    use crate::controller::builders::test_support;
    use crate::controller::validation::{MockProtocolValidator, ProbeResult};
    use crate::crd::condition_types::{DEGRADED, READY};
    use crate::crd::{ConditionStatus, IssueCode, MCPServerStatus, ValidationIssue};
    use crate::observability::events::NoopEventPublisher;

    const NS: &str = "tools";
    const NAME: &str = "weather";

    struct Harness {
        kube: Arc<FakeKube>,
        ctx: Arc<Reconciler>,
    }

    impl Harness {
        fn new(spec: serde_json::Value, probes: Vec<ProbeResult>) -> Self {
            Self::with_server(test_support::server(spec), probes)
        }

        fn with_server(server: MCPServer, probes: Vec<ProbeResult>) -> Self {
            let kube = Arc::new(FakeKube::default());
            kube.insert_server(server);

            let mut validator = MockProtocolValidator::new();
            let count = probes.len();
            let mut probes = probes.into_iter();
            validator
                .expect_validate()
                .times(count)
                .returning(move |_, _| probes.next().expect("unexpected probe"));

            let ctx = Arc::new(Reconciler::new(
                Arc::clone(&kube) as Arc<dyn MCPKubeClient>,
                Arc::new(validator),
                Arc::new(NoopEventPublisher),
                ControllerConfig::default(),
            ));
            Self { kube, ctx }
        }

        async fn run(&self) -> Action {
            let server = self.kube.server(NS, NAME).expect("server should exist");
            reconcile(Arc::new(server), Arc::clone(&self.ctx))
                .await
                .expect("reconcile should succeed")
        }

        fn status(&self) -> MCPServerStatus {
            self.kube
                .server(NS, NAME)
                .and_then(|s| s.status)
                .expect("status should be set")
        }
    }

    fn probe_ok(detected: TransportProtocol) -> ProbeResult {
        ProbeResult {
            success: true,
            protocol_version: Some("2025-06-18".to_string()),
            capabilities: vec!["tools".to_string()],
            detected_transport: Some(detected),
            ..Default::default()
        }
    }

    fn probe_unreachable() -> ProbeResult {
        ProbeResult {
            issues: vec![ValidationIssue::error(IssueCode::ConnectionFailed, "connection refused")],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn first_pass_creates_children_and_waits_for_readiness() {
        let h = Harness::new(json!({ "image": "example/mcp:1" }), vec![]);

        let action = h.run().await;

        assert_eq!(action, Action::requeue(Duration::from_secs(30)));
        let server = h.kube.server(NS, NAME).expect("server");
        assert!(server.has_finalizer());
        assert!(h.kube.deployment(NS, NAME).is_some());
        assert!(h.kube.service(NS, NAME).is_some());
        assert!(h.kube.service_account(NS, NAME).is_some());
        assert!(h.kube.hpa(NS, NAME).is_none());
        assert!(h.kube.ingress(NS, NAME).is_none());

        let status = h.status();
        assert_eq!(status.phase, Some(MCPServerPhase::Creating));
        assert_eq!(
            status.service_endpoint.as_deref(),
            Some("http://weather.tools.svc.cluster.local:8080")
        );
        assert_eq!(status.observed_generation, Some(1));
    }

    #[tokio::test]
    async fn steady_state_reconcile_writes_nothing() {
        let h = Harness::new(
            json!({ "image": "example/mcp:1" }),
            vec![probe_ok(TransportProtocol::StreamableHttp)],
        );
        h.run().await;
        h.kube.set_deployment_ready(NS, NAME, 1);
        assert_eq!(h.run().await, Action::await_change());

        let writes = h.kube.total_writes();
        assert_eq!(h.run().await, Action::await_change());
        assert_eq!(h.run().await, Action::await_change());
        assert_eq!(h.kube.total_writes(), writes);

        let status = h.status();
        assert_eq!(status.phase, Some(MCPServerPhase::Running));
        let validation = status.validation.expect("validation");
        assert_eq!(validation.state, ValidationState::Passed);
        assert_eq!(
            status.resolved_transport.map(|r| r.protocol),
            Some(TransportProtocol::StreamableHttp)
        );
    }

    #[tokio::test]
    async fn detected_sse_is_applied_on_the_next_pass() {
        let h = Harness::new(
            json!({ "image": "example/mcp:1" }),
            vec![probe_ok(TransportProtocol::Sse)],
        );
        h.run().await;
        h.kube.set_deployment_ready(NS, NAME, 1);

        // Detection records the protocol but not the receipt
        assert_eq!(h.run().await, Action::requeue(Duration::from_secs(5)));
        let resolved = h.status().resolved_transport.expect("resolved transport");
        assert_eq!(resolved.protocol, TransportProtocol::Sse);
        assert!(!resolved.sse_config_applied);
        let grace = h
            .kube
            .deployment(NS, NAME)
            .and_then(|d| d.spec)
            .and_then(|s| s.template.spec)
            .and_then(|s| s.termination_grace_period_seconds);
        assert_ne!(grace, Some(60));

        // Convergence applies the settings, then confirms them
        assert_eq!(h.run().await, Action::await_change());
        let resolved = h.status().resolved_transport.expect("resolved transport");
        assert!(resolved.sse_config_applied);
        let deployment = h.kube.deployment(NS, NAME).expect("deployment");
        let spec = deployment.spec.expect("deployment spec");
        assert_eq!(
            spec.template.spec.and_then(|s| s.termination_grace_period_seconds),
            Some(60)
        );
        assert_eq!(h.kube.writes("deployment.replace"), 1);
    }

    #[tokio::test]
    async fn autoscaled_replicas_are_left_alone() {
        let h = Harness::new(
            json!({
                "image": "example/mcp:1",
                "replicas": 3,
                "hpa": { "enabled": true, "minReplicas": 2, "maxReplicas": 10 },
                "validation": { "enabled": false }
            }),
            vec![],
        );
        h.run().await;
        let created = h.kube.deployment(NS, NAME).and_then(|d| d.spec).and_then(|s| s.replicas);
        assert_eq!(created, Some(3));
        assert!(h.kube.hpa(NS, NAME).is_some());

        h.kube.scale_deployment(NS, NAME, 7);
        h.kube.set_deployment_ready(NS, NAME, 7);
        assert_eq!(h.run().await, Action::await_change());

        let replicas = h.kube.deployment(NS, NAME).and_then(|d| d.spec).and_then(|s| s.replicas);
        assert_eq!(replicas, Some(7));
        assert_eq!(h.kube.writes("deployment.replace"), 0);
        let status = h.status();
        assert_eq!(status.phase, Some(MCPServerPhase::Running));
        assert_eq!(status.ready_replicas, 7);
        assert_eq!(
            status.validation.map(|v| v.state),
            Some(ValidationState::Disabled)
        );
    }

    #[tokio::test]
    async fn mismatch_without_strict_mode_only_degrades() {
        let h = Harness::new(
            json!({
                "image": "example/mcp:1",
                "transport": { "protocol": "streamable-http" }
            }),
            vec![probe_ok(TransportProtocol::Sse), probe_ok(TransportProtocol::Sse)],
        );
        h.run().await;
        h.kube.set_deployment_ready(NS, NAME, 1);

        assert_eq!(h.run().await, Action::requeue(Duration::from_secs(30)));
        let status = h.status();
        let validation = status.validation.as_ref().expect("validation");
        assert_eq!(validation.state, ValidationState::Validating);
        assert_eq!(validation.attempts, 1);
        assert!(validation.issues.iter().any(|i| i.code == IssueCode::ProtocolMismatch));
        let degraded = find_condition(&status.conditions, DEGRADED).expect("degraded");
        assert_eq!(degraded.status, ConditionStatus::True);
        assert_eq!(degraded.reason.as_deref(), Some(degraded_reasons::PROTOCOL_MISMATCH));

        assert_eq!(h.run().await, Action::await_change());
        let status = h.status();
        assert_eq!(status.validation.map(|v| v.state), Some(ValidationState::Failed));
        assert_eq!(status.phase, Some(MCPServerPhase::Running));
        assert!(h.kube.deployment(NS, NAME).is_some());

        // Failed is terminal without a spec edit
        assert_eq!(h.run().await, Action::await_change());
    }

    #[tokio::test]
    async fn strict_failure_deletes_workload_until_spec_changes() {
        let h = Harness::new(
            json!({
                "image": "example/mcp:1",
                "transport": { "protocol": "streamable-http" },
                "validation": { "strictMode": true }
            }),
            vec![probe_ok(TransportProtocol::Sse), probe_ok(TransportProtocol::Sse)],
        );
        h.run().await;
        h.kube.set_deployment_ready(NS, NAME, 1);
        h.run().await;
        assert_eq!(h.run().await, Action::await_change());

        assert!(h.kube.deployment(NS, NAME).is_none());
        let status = h.status();
        assert_eq!(status.phase, Some(MCPServerPhase::ValidationFailed));
        assert_eq!(status.ready_replicas, 0);
        let degraded = find_condition(&status.conditions, DEGRADED).expect("degraded");
        assert_eq!(degraded.reason.as_deref(), Some(degraded_reasons::DEPLOYMENT_DELETED));
        let ready = find_condition(&status.conditions, READY).expect("ready");
        assert_eq!(ready.status, ConditionStatus::False);

        // Re-entry keeps the workload deleted without further writes
        let writes = h.kube.total_writes();
        assert_eq!(h.run().await, Action::await_change());
        assert!(h.kube.deployment(NS, NAME).is_none());
        assert_eq!(h.kube.total_writes(), writes);

        // Fixing the declared protocol recovers
        h.kube.edit_server(NS, NAME, |s| {
            s.spec.transport.protocol = TransportProtocol::Sse;
        });
        assert_eq!(h.run().await, Action::requeue(Duration::from_secs(30)));
        assert!(h.kube.deployment(NS, NAME).is_some());
        let status = h.status();
        assert_eq!(status.phase, Some(MCPServerPhase::Creating));
        let validation = status.validation.expect("validation");
        assert_eq!(validation.state, ValidationState::Pending);
        assert_eq!(validation.attempts, 0);
        assert!(validation.issues.is_empty());
        assert!(find_condition(&status.conditions, DEGRADED).is_none());
    }

    #[tokio::test]
    async fn transient_failures_back_off_then_fail() {
        let h = Harness::new(
            json!({ "image": "example/mcp:1" }),
            (0..5).map(|_| probe_unreachable()).collect(),
        );
        h.run().await;
        h.kube.set_deployment_ready(NS, NAME, 1);

        let mut actions = Vec::new();
        for _ in 0..5 {
            actions.push(h.run().await);
        }
        assert_eq!(
            actions,
            vec![
                Action::requeue(Duration::from_secs(30)),
                Action::requeue(Duration::from_secs(30)),
                Action::requeue(Duration::from_secs(60)),
                Action::requeue(Duration::from_secs(60)),
                Action::await_change(),
            ]
        );
        let validation = h.status().validation.expect("validation");
        assert_eq!(validation.state, ValidationState::Failed);
        assert_eq!(validation.attempts, 5);
    }

    #[tokio::test]
    async fn deletion_removes_children_and_finalizer() {
        let h = Harness::new(json!({ "image": "example/mcp:1" }), vec![]);
        h.run().await;
        assert!(h.kube.deployment(NS, NAME).is_some());

        h.kube.delete_server(NS, NAME);
        assert_eq!(h.run().await, Action::await_change());

        assert!(h.kube.server(NS, NAME).is_none());
        assert!(h.kube.deployment(NS, NAME).is_none());
        assert!(h.kube.service(NS, NAME).is_none());
    }

    #[tokio::test]
    async fn conflicting_writes_are_retried() {
        let h = Harness::new(json!({ "image": "example/mcp:1" }), vec![]);
        h.kube.inject_finalizer_conflicts(2);
        h.kube.inject_status_conflicts(2);

        h.run().await;

        let server = h.kube.server(NS, NAME).expect("server");
        assert!(server
            .finalizers()
            .iter()
            .any(|f| f == constants::FINALIZER));
        assert_eq!(h.status().phase, Some(MCPServerPhase::Creating));
    }

    #[tokio::test]
    async fn child_errors_mark_the_resource_failed() {
        let mut server = test_support::server(json!({ "image": "example/mcp:1" }));
        server.metadata.uid = None;
        let h = Harness::with_server(server, vec![]);

        assert_eq!(h.run().await, Action::requeue(Duration::from_secs(120)));
        let status = h.status();
        assert_eq!(status.phase, Some(MCPServerPhase::Failed));
        let ready = find_condition(&status.conditions, READY).expect("ready");
        assert_eq!(ready.reason.as_deref(), Some("ReconcileError"));
        assert!(h.kube.deployment(NS, NAME).is_none());
    }

    #[tokio::test]
    async fn custom_transport_without_port_skips_service_and_validation() {
        let h = Harness::new(
            json!({
                "image": "example/mcp:1",
                "transport": { "type": "custom", "custom": { "command": ["/bin/server"] } },
                "ingress": { "enabled": true, "host": "mcp.example.com" }
            }),
            vec![],
        );
        assert_eq!(h.run().await, Action::await_change());

        assert!(h.kube.deployment(NS, NAME).is_some());
        assert!(h.kube.service(NS, NAME).is_none());
        assert!(h.kube.ingress(NS, NAME).is_none());
        let status = h.status();
        assert_eq!(status.service_endpoint, None);
        assert_eq!(status.validation.map(|v| v.state), Some(ValidationState::Disabled));
    }

    #[tokio::test]
    async fn live_template_edits_are_reverted_without_touching_autoscaled_replicas() {
        let h = Harness::new(
            json!({
                "image": "example/mcp:1",
                "replicas": 3,
                "hpa": { "enabled": true, "minReplicas": 2, "maxReplicas": 10 },
                "validation": { "enabled": false }
            }),
            vec![],
        );
        h.run().await;
        h.kube.scale_deployment(NS, NAME, 7);
        h.kube.set_deployment_ready(NS, NAME, 7);
        h.run().await;
        assert_eq!(h.kube.writes("deployment.replace"), 0);

        h.kube.edit_deployment(NS, NAME, |d| {
            if let Some(pod) = d.spec.as_mut().and_then(|s| s.template.spec.as_mut()) {
                pod.containers[0].image = Some("other/image:9".to_string());
            }
        });
        assert_eq!(h.run().await, Action::await_change());

        let spec = h.kube.deployment(NS, NAME).and_then(|d| d.spec).expect("deployment spec");
        assert_eq!(spec.replicas, Some(7));
        let image = spec
            .template
            .spec
            .and_then(|p| p.containers.into_iter().next())
            .and_then(|c| c.image);
        assert_eq!(image.as_deref(), Some("example/mcp:1"));
        assert_eq!(h.kube.writes("deployment.replace"), 1);

        // Reverted object is steady again
        h.run().await;
        assert_eq!(h.kube.writes("deployment.replace"), 1);
    }

    #[tokio::test]
    async fn failed_sse_convergence_keeps_receipt_unconfirmed() {
        let h = Harness::new(
            json!({ "image": "example/mcp:1" }),
            vec![probe_ok(TransportProtocol::Sse)],
        );
        h.run().await;
        h.kube.set_deployment_ready(NS, NAME, 1);
        assert_eq!(h.run().await, Action::requeue(Duration::from_secs(5)));

        h.kube.fail_writes("deployment.replace", 1);
        assert_eq!(h.run().await, Action::requeue(Duration::from_secs(120)));
        let status = h.status();
        assert_eq!(status.phase, Some(MCPServerPhase::Failed));
        let resolved = status.resolved_transport.expect("resolved transport");
        assert_eq!(resolved.protocol, TransportProtocol::Sse);
        assert!(!resolved.sse_config_applied);

        assert_eq!(h.run().await, Action::await_change());
        let status = h.status();
        assert_eq!(status.phase, Some(MCPServerPhase::Running));
        assert!(status.resolved_transport.expect("resolved transport").sse_config_applied);
        assert_eq!(h.kube.writes("deployment.replace"), 1);
    }

    #[tokio::test]
    async fn deletion_releases_finalizer_when_cleanup_fails() {
        let h = Harness::new(json!({ "image": "example/mcp:1" }), vec![]);
        h.run().await;
        h.kube.fail_writes("service.delete", 1);
        h.kube.fail_writes("hpa.delete", 1);
        h.kube.fail_writes("ingress.delete", 1);

        h.kube.delete_server(NS, NAME);
        assert_eq!(h.run().await, Action::await_change());

        // Owner references leave the rest to the garbage collector
        assert!(h.kube.server(NS, NAME).is_none());
        assert!(h.kube.service(NS, NAME).is_some());
    }

    #[tokio::test]
    async fn deletion_retries_conflicting_finalizer_removal() {
        let h = Harness::new(json!({ "image": "example/mcp:1" }), vec![]);
        h.run().await;
        h.kube.delete_server(NS, NAME);
        h.kube.inject_finalizer_conflicts(2);

        assert_eq!(h.run().await, Action::await_change());
        assert!(h.kube.server(NS, NAME).is_none());
    }

    #[tokio::test]
    async fn exhausted_finalizer_retries_surface_as_error() {
        let h = Harness::new(json!({ "image": "example/mcp:1" }), vec![]);
        h.run().await;
        h.kube.delete_server(NS, NAME);
        h.kube.inject_finalizer_conflicts(ControllerConfig::default().conflict_retries);

        let server = h.kube.server(NS, NAME).expect("server");
        let error = reconcile(Arc::new(server), Arc::clone(&h.ctx))
            .await
            .expect_err("finalizer removal should give up");
        assert!(error.is_conflict());
        let server = h.kube.server(NS, NAME).expect("server is kept");
        assert!(server.has_finalizer());

        // The next pass finishes the deletion
        assert_eq!(h.run().await, Action::await_change());
        assert!(h.kube.server(NS, NAME).is_none());
    }
}
