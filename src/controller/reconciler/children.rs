//! # Auxiliary Children
//!
//! Convergence for the objects that sit beside the transport workload: the
//! default ServiceAccount, the autoscaler and the Ingress.

use kube::ResourceExt;
use tracing::{debug, info};

use crate::controller::builders::{
    build_hpa, build_ingress, build_service_account, hpa_needs_update, ingress_needs_update,
    merge_hpa, merge_ingress,
};
use crate::crd::MCPServer;

use super::client::MCPKubeClient;
use super::types::ReconcilerError;

/// Create the per-server ServiceAccount when the spec names none
///
/// An existing account is left alone.
pub async fn ensure_service_account(
    kube: &dyn MCPKubeClient,
    namespace: &str,
    server: &MCPServer,
) -> Result<(), ReconcilerError> {
    if server.spec.service_account_name.is_some() {
        return Ok(());
    }
    let name = server.name_any();
    if kube.get_service_account(namespace, &name).await?.is_none() {
        info!(service_account = %name, "creating service account");
        kube.create_service_account(namespace, &build_service_account(server)?)
            .await?;
    }
    Ok(())
}

/// Apply the autoscaler when enabled, delete it otherwise
pub async fn converge_hpa(
    kube: &dyn MCPKubeClient,
    namespace: &str,
    server: &MCPServer,
) -> Result<(), ReconcilerError> {
    let name = server.name_any();
    let config = match server.spec.hpa.as_ref() {
        Some(config) if config.enabled => config,
        _ => {
            if kube.get_hpa(namespace, &name).await?.is_some() {
                info!(hpa = %name, "deleting disabled autoscaler");
                kube.delete_hpa(namespace, &name).await?;
            }
            return Ok(());
        }
    };

    let desired = build_hpa(server, config)?;
    match kube.get_hpa(namespace, &name).await? {
        None => {
            info!(hpa = %name, "creating autoscaler");
            kube.create_hpa(namespace, &desired).await?;
        }
        Some(existing) if hpa_needs_update(&existing, &desired) => {
            info!(hpa = %name, "updating drifted autoscaler");
            kube.replace_hpa(namespace, &merge_hpa(&existing, &desired))
                .await?;
        }
        Some(_) => debug!(hpa = %name, "autoscaler up to date"),
    }
    Ok(())
}

/// Apply the Ingress when enabled and the transport is routable
///
/// `port` is the Service port, absent for transports without a Service.
pub async fn converge_ingress(
    kube: &dyn MCPKubeClient,
    namespace: &str,
    server: &MCPServer,
    port: Option<i32>,
) -> Result<(), ReconcilerError> {
    let name = server.name_any();
    let (config, port) = match (server.spec.ingress.as_ref(), port) {
        (Some(config), Some(port)) if config.enabled => (config, port),
        _ => {
            if kube.get_ingress(namespace, &name).await?.is_some() {
                info!(ingress = %name, "deleting disabled ingress");
                kube.delete_ingress(namespace, &name).await?;
            }
            return Ok(());
        }
    };

    let desired = build_ingress(server, config, port)?;
    match kube.get_ingress(namespace, &name).await? {
        None => {
            info!(ingress = %name, "creating ingress");
            kube.create_ingress(namespace, &desired).await?;
        }
        Some(existing) if ingress_needs_update(&existing, &desired) => {
            info!(ingress = %name, "updating drifted ingress");
            kube.replace_ingress(namespace, &merge_ingress(&existing, &desired))
                .await?;
        }
        Some(_) => debug!(ingress = %name, "ingress up to date"),
    }
    Ok(())
}
