//! # Watch Loop
//!
//! Runs the MCPServer controller.
//!
//! Changes to owned Deployments, Services, HorizontalPodAutoscalers and
//! Ingresses trigger a reconcile of their MCPServer, so rollout progress is
//! observed without polling.

use std::sync::Arc;

use anyhow::Result;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use kube::{Api, Client};
use kube_runtime::watcher::Config as WatcherConfig;
use kube_runtime::Controller;
use tracing::{debug, error, info};

use crate::controller::reconciler::{reconcile, Reconciler};
use crate::controller::server::ServerState;
use crate::crd::MCPServer;

use super::error_policy::error_policy;

/// Watcher timeout (seconds), below the client read timeout so idle watches
/// are closed by the API server first
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Scope the watches to one namespace, or all namespaces when `None`
fn api_for<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope, DynamicType = ()>,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

/// Run the controller until a shutdown signal arrives
pub async fn run_watch_loop(
    client: Client,
    namespace: Option<String>,
    reconciler: Arc<Reconciler>,
    server_state: Arc<ServerState>,
) -> Result<()> {
    let namespace = namespace.as_deref();
    let servers: Api<MCPServer> = api_for(&client, namespace);
    let watcher_config = || WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS);

    info!(
        namespace = namespace.unwrap_or("<all>"),
        "Starting MCPServer controller"
    );

    Controller::new(servers, watcher_config())
        .owns(api_for::<Deployment>(&client, namespace), watcher_config())
        .owns(api_for::<Service>(&client, namespace), watcher_config())
        .owns(
            api_for::<HorizontalPodAutoscaler>(&client, namespace),
            watcher_config(),
        )
        .owns(api_for::<Ingress>(&client, namespace), watcher_config())
        .shutdown_on_signal()
        .run(reconcile, error_policy, reconciler)
        .for_each(|result| {
            match result {
                Ok((object, action)) => {
                    debug!(resource = %object, ?action, "Reconciliation completed");
                }
                Err(e) => error!(error = %e, "Controller stream error"),
            }
            std::future::ready(())
        })
        .await;

    server_state
        .is_ready
        .store(false, std::sync::atomic::Ordering::Relaxed);
    info!("Controller stopped");
    Ok(())
}
