//! # Reconciler Types
//!
//! Reconciler context and error taxonomy.

use std::sync::Arc;

use kube::Client;
use thiserror::Error;

use crate::config::ControllerConfig;
use crate::constants;
use crate::controller::validation::{HttpProtocolValidator, ProtocolValidator};
use crate::observability::events::{EventPublisher, KubeEventPublisher};

use super::client::{KubeStoreClient, MCPKubeClient};

/// Reconciler errors
///
/// Infrastructure errors surface as a `Failed` phase with a fixed requeue.
/// Conflicts only surface once the bounded retry is exhausted.
#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
    #[error("optimistic concurrency conflict writing {kind} {name}")]
    Conflict { kind: &'static str, name: String },
    #[error("resource {0} is missing a namespace")]
    MissingNamespace(String),
    #[error("resource is missing field {0}")]
    MissingField(&'static str),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ReconcilerError {
    /// Stale resourceVersion rejection
    pub fn is_conflict(&self) -> bool {
        match self {
            ReconcilerError::Conflict { .. } => true,
            ReconcilerError::Kube(kube::Error::Api(ae)) => ae.code == 409,
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ReconcilerError::Kube(kube::Error::Api(ae)) if ae.code == 404)
    }

    /// Stable label for metrics
    pub fn as_label(&self) -> &'static str {
        match self {
            ReconcilerError::Kube(_) => "kube",
            ReconcilerError::Conflict { .. } => "conflict",
            ReconcilerError::MissingNamespace(_) | ReconcilerError::MissingField(_) => "invalid",
            ReconcilerError::Serialization(_) => "serialization",
        }
    }
}

/// Reconciler context
///
/// Shared across all reconcile invocations. Holds no per-resource mutable
/// state: invocations for different resources run concurrently.
pub struct Reconciler {
    pub kube: Arc<dyn MCPKubeClient>,
    pub validator: Arc<dyn ProtocolValidator>,
    pub events: Arc<dyn EventPublisher>,
    pub config: ControllerConfig,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(
        kube: Arc<dyn MCPKubeClient>,
        validator: Arc<dyn ProtocolValidator>,
        events: Arc<dyn EventPublisher>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            kube,
            validator,
            events,
            config,
        }
    }

    /// Production context backed by the Kubernetes API
    pub fn from_client(client: Client, config: ControllerConfig) -> Self {
        let events = Arc::new(KubeEventPublisher::new(
            client.clone(),
            constants::CONTROLLER_NAME,
        ));
        Self {
            kube: Arc::new(KubeStoreClient::new(client)),
            validator: Arc::new(HttpProtocolValidator::new()),
            events,
            config,
        }
    }
}
