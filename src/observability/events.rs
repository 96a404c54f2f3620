//! # Kubernetes Events
//!
//! Trait-based abstraction over `kube::runtime::events::Recorder` so the
//! reconciler can emit events visible via `kubectl describe mcps`.
//!
//! Events are fire-and-forget: failures are logged and never propagate.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

/// Publishes Kubernetes events about MCPServer resources
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Production implementation wrapping the kube event recorder
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl std::fmt::Debug for KubeEventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeEventPublisher").finish_non_exhaustive()
    }
}

impl KubeEventPublisher {
    /// `controller_name` appears as the reporting component on every event
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(reason, action, error = %e, "Failed to publish Kubernetes event");
        }
    }
}

/// Discards every event
#[derive(Debug, Default)]
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        _type_: EventType,
        _reason: &str,
        _action: &str,
        _note: Option<String>,
    ) {
    }
}

/// Event reasons, shown in the REASON column of `kubectl get events`
pub mod reasons {
    pub const CREATING: &str = "Creating";
    pub const VALIDATION_PASSED: &str = "ValidationPassed";
    pub const VALIDATION_RETRY: &str = "ValidationRetry";
    pub const VALIDATION_FAILED: &str = "ValidationFailed";
    pub const PROTOCOL_MISMATCH: &str = "ProtocolMismatch";
    /// Strict validation deleted the workload
    pub const DEPLOYMENT_DELETED: &str = "DeploymentDeleted";
    /// A spec edit after a failure reset validation
    pub const RECOVERY_ATTEMPT: &str = "RecoveryAttempt";
    pub const TERMINATING: &str = "Terminating";
    pub const RECONCILE_ERROR: &str = "ReconcileError";
}

/// Event actions, shown in the ACTION column of `kubectl get events`
pub mod actions {
    pub const RECONCILE: &str = "Reconcile";
    pub const VALIDATE: &str = "Validate";
    pub const DELETE: &str = "Delete";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_publisher_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NoopEventPublisher>();
    }

    #[tokio::test]
    async fn noop_publisher_does_not_panic() {
        NoopEventPublisher
            .publish(
                &ObjectReference::default(),
                EventType::Warning,
                reasons::PROTOCOL_MISMATCH,
                actions::VALIDATE,
                Some("declared sse, detected streamable-http".to_string()),
            )
            .await;
    }
}
