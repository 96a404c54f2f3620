//! # Transport Managers
//!
//! Build and converge the workload and endpoint objects for each transport
//! variant.
//!
//! - `http` - Streamable HTTP / SSE server behind a Service
//! - `custom` - Arbitrary command, Service only when a port is declared
//! - `sse` - Pure SSE workload settings
//!
//! [`transport_manager_for`] selects the variant once per reconcile.
//!
//! Convergence is idempotent: objects are built from the spec, compared on the
//! fields the operator owns and only written when they drifted. When an
//! autoscaler is enabled the Deployment replica count is never written after
//! creation.

mod custom;
mod http;
mod sse;

pub use custom::CustomTransportManager;
pub use http::HttpTransportManager;
pub use sse::*;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::ResourceExt;
use tracing::{debug, info};

use crate::controller::builders::{
    deployment_needs_update, merge_deployment, merge_service, service_needs_update,
};
use crate::controller::reconciler::{MCPKubeClient, ReconcilerError};
use crate::crd::{MCPServer, TransportType};

/// Builds and applies the objects of one transport variant
#[async_trait]
pub trait TransportManager: Send + Sync {
    fn transport_type(&self) -> TransportType;

    /// The variant exposes a network endpoint through a Service
    fn requires_service(&self) -> bool;

    /// The variant can be routed to from outside the cluster
    fn requires_external_access(&self) -> bool;

    /// Port the Service exposes, when there is one
    fn service_port(&self) -> Option<i32>;

    /// SSE settings baked into the built objects
    fn sse_settings(&self) -> Option<&SseSettings>;

    /// Create the workload and endpoint objects that do not exist yet
    async fn create_resources(
        &self,
        kube: &dyn MCPKubeClient,
        server: &MCPServer,
    ) -> Result<(), ReconcilerError>;

    /// Converge existing objects toward the spec
    async fn update_resources(
        &self,
        kube: &dyn MCPKubeClient,
        server: &MCPServer,
    ) -> Result<(), ReconcilerError>;

    /// Delete the workload and endpoint objects, ignoring missing ones
    async fn delete_resources(
        &self,
        kube: &dyn MCPKubeClient,
        server: &MCPServer,
    ) -> Result<(), ReconcilerError>;
}

/// Select the transport manager for a server
///
/// SSE settings follow the declared protocol, or the resolved one recorded
/// in status when the declared protocol is `auto`.
pub fn transport_manager_for(server: &MCPServer) -> Box<dyn TransportManager> {
    let transport = &server.spec.transport;
    match transport.r#type {
        TransportType::Http => {
            let resolved = server
                .status
                .as_ref()
                .and_then(|s| s.resolved_transport.as_ref());
            let sse = sse_settings(
                transport.protocol,
                effective_protocol(transport.protocol, resolved),
                &transport.sse_config(),
            );
            Box::new(HttpTransportManager::new(
                transport.container_port(server.spec.port),
                sse,
            ))
        }
        TransportType::Custom => Box::new(CustomTransportManager::new(
            transport.custom.clone().unwrap_or_default(),
        )),
    }
}

fn namespace_of(server: &MCPServer) -> Result<String, ReconcilerError> {
    server
        .namespace()
        .ok_or_else(|| ReconcilerError::MissingNamespace(server.name_any()))
}

/// Create the Deployment if absent
async fn create_deployment_if_absent(
    kube: &dyn MCPKubeClient,
    namespace: &str,
    desired: &Deployment,
) -> Result<(), ReconcilerError> {
    let name = desired.name_any();
    if kube.get_deployment(namespace, &name).await?.is_none() {
        info!(deployment = %name, "creating deployment");
        kube.create_deployment(namespace, desired).await?;
    }
    Ok(())
}

/// Create or update the Deployment
///
/// `owns_replicas` is false while an autoscaler manages the replica count.
async fn apply_deployment(
    kube: &dyn MCPKubeClient,
    namespace: &str,
    desired: &Deployment,
    owns_replicas: bool,
) -> Result<(), ReconcilerError> {
    let name = desired.name_any();
    match kube.get_deployment(namespace, &name).await? {
        None => {
            info!(deployment = %name, "creating deployment");
            kube.create_deployment(namespace, desired).await?;
        }
        Some(existing) if deployment_needs_update(&existing, desired, owns_replicas) => {
            info!(deployment = %name, owns_replicas, "updating drifted deployment");
            let merged = merge_deployment(&existing, desired, owns_replicas);
            kube.replace_deployment(namespace, &merged).await?;
        }
        Some(_) => debug!(deployment = %name, "deployment up to date"),
    }
    Ok(())
}

async fn create_service_if_absent(
    kube: &dyn MCPKubeClient,
    namespace: &str,
    desired: &Service,
) -> Result<(), ReconcilerError> {
    let name = desired.name_any();
    if kube.get_service(namespace, &name).await?.is_none() {
        info!(service = %name, "creating service");
        kube.create_service(namespace, desired).await?;
    }
    Ok(())
}

async fn apply_service(
    kube: &dyn MCPKubeClient,
    namespace: &str,
    desired: &Service,
) -> Result<(), ReconcilerError> {
    let name = desired.name_any();
    match kube.get_service(namespace, &name).await? {
        None => {
            info!(service = %name, "creating service");
            kube.create_service(namespace, desired).await?;
        }
        Some(existing) if service_needs_update(&existing, desired) => {
            info!(service = %name, "updating drifted service");
            kube.replace_service(namespace, &merge_service(&existing, desired))
                .await?;
        }
        Some(_) => debug!(service = %name, "service up to date"),
    }
    Ok(())
}
