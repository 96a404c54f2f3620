//! # Store Client
//!
//! Trait abstracting the Kubernetes API operations the reconciler performs,
//! so the engine can run against an in-memory store in tests.
//!
//! Writes that replace an existing object carry its `resourceVersion`; the API
//! server rejects stale versions with 409, surfaced as [`ReconcilerError::Conflict`].

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::{Service, ServiceAccount};
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::{Api, DeleteParams, Patch, PatchParams, PostParams};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use tracing::debug;

use crate::constants;
use crate::crd::MCPServer;

use super::types::ReconcilerError;

/// Kubernetes operations used by the reconciler
#[async_trait]
pub trait MCPKubeClient: Send + Sync {
    async fn get_server(&self, namespace: &str, name: &str)
        -> Result<Option<MCPServer>, ReconcilerError>;
    /// Replace metadata and spec (used for finalizers), guarded by resourceVersion
    async fn replace_server(&self, server: &MCPServer) -> Result<MCPServer, ReconcilerError>;
    /// Replace the status subresource, guarded by resourceVersion
    async fn replace_server_status(&self, server: &MCPServer)
        -> Result<MCPServer, ReconcilerError>;

    async fn get_deployment(&self, namespace: &str, name: &str)
        -> Result<Option<Deployment>, ReconcilerError>;
    async fn create_deployment(&self, namespace: &str, deployment: &Deployment)
        -> Result<Deployment, ReconcilerError>;
    async fn replace_deployment(&self, namespace: &str, deployment: &Deployment)
        -> Result<Deployment, ReconcilerError>;
    /// Idempotent: a missing Deployment is not an error
    async fn delete_deployment(&self, namespace: &str, name: &str) -> Result<(), ReconcilerError>;

    async fn get_service(&self, namespace: &str, name: &str)
        -> Result<Option<Service>, ReconcilerError>;
    async fn create_service(&self, namespace: &str, service: &Service)
        -> Result<Service, ReconcilerError>;
    async fn replace_service(&self, namespace: &str, service: &Service)
        -> Result<Service, ReconcilerError>;
    async fn delete_service(&self, namespace: &str, name: &str) -> Result<(), ReconcilerError>;

    async fn get_service_account(&self, namespace: &str, name: &str)
        -> Result<Option<ServiceAccount>, ReconcilerError>;
    async fn create_service_account(&self, namespace: &str, account: &ServiceAccount)
        -> Result<ServiceAccount, ReconcilerError>;

    async fn get_hpa(&self, namespace: &str, name: &str)
        -> Result<Option<HorizontalPodAutoscaler>, ReconcilerError>;
    async fn create_hpa(&self, namespace: &str, hpa: &HorizontalPodAutoscaler)
        -> Result<HorizontalPodAutoscaler, ReconcilerError>;
    async fn replace_hpa(&self, namespace: &str, hpa: &HorizontalPodAutoscaler)
        -> Result<HorizontalPodAutoscaler, ReconcilerError>;
    async fn delete_hpa(&self, namespace: &str, name: &str) -> Result<(), ReconcilerError>;

    async fn get_ingress(&self, namespace: &str, name: &str)
        -> Result<Option<Ingress>, ReconcilerError>;
    async fn create_ingress(&self, namespace: &str, ingress: &Ingress)
        -> Result<Ingress, ReconcilerError>;
    async fn replace_ingress(&self, namespace: &str, ingress: &Ingress)
        -> Result<Ingress, ReconcilerError>;
    async fn delete_ingress(&self, namespace: &str, name: &str) -> Result<(), ReconcilerError>;
}

/// Real Kubernetes client implementation
#[derive(Clone)]
pub struct KubeStoreClient {
    client: Client,
}

impl Debug for KubeStoreClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStoreClient").finish_non_exhaustive()
    }
}

impl KubeStoreClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope, DynamicType = ()>,
    {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Map a 409 into the conflict variant so callers can retry
fn classify<T>(kind: &'static str, name: &str, result: Result<T, kube::Error>) -> Result<T, ReconcilerError> {
    match result {
        Ok(value) => Ok(value),
        Err(kube::Error::Api(ae)) if ae.code == 409 => Err(ReconcilerError::Conflict {
            kind,
            name: name.to_string(),
        }),
        Err(e) => Err(e.into()),
    }
}

async fn get_opt<K>(api: Api<K>, name: &str) -> Result<Option<K>, ReconcilerError>
where
    K: Resource + Clone + DeserializeOwned + Debug,
{
    Ok(api.get_opt(name).await?)
}

async fn create<K>(api: Api<K>, kind: &'static str, obj: &K) -> Result<K, ReconcilerError>
where
    K: Resource + Clone + DeserializeOwned + Serialize + Debug,
{
    let name = obj.name_any();
    debug!(kind, name = %name, "creating object");
    classify(kind, &name, api.create(&PostParams::default(), obj).await)
}

async fn replace<K>(api: Api<K>, kind: &'static str, obj: &K) -> Result<K, ReconcilerError>
where
    K: Resource + Clone + DeserializeOwned + Serialize + Debug,
{
    let name = obj.name_any();
    debug!(kind, name = %name, "replacing object");
    classify(kind, &name, api.replace(&name, &PostParams::default(), obj).await)
}

async fn delete<K>(api: Api<K>, kind: &'static str, name: &str) -> Result<(), ReconcilerError>
where
    K: Resource + Clone + DeserializeOwned + Debug,
{
    match api.delete(name, &DeleteParams::background()).await {
        Ok(_) => {
            debug!(kind, name = %name, "deleted object");
            Ok(())
        }
        Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl MCPKubeClient for KubeStoreClient {
    async fn get_server(&self, namespace: &str, name: &str) -> Result<Option<MCPServer>, ReconcilerError> {
        get_opt(self.api::<MCPServer>(namespace), name).await
    }

    async fn replace_server(&self, server: &MCPServer) -> Result<MCPServer, ReconcilerError> {
        let namespace = server
            .namespace()
            .ok_or_else(|| ReconcilerError::MissingNamespace(server.name_any()))?;
        replace(self.api::<MCPServer>(&namespace), "MCPServer", server).await
    }

    async fn replace_server_status(&self, server: &MCPServer) -> Result<MCPServer, ReconcilerError> {
        let name = server.name_any();
        let namespace = server
            .namespace()
            .ok_or_else(|| ReconcilerError::MissingNamespace(name.clone()))?;
        let api = self.api::<MCPServer>(&namespace);
        // A merge patch carrying resourceVersion is rejected with 409 when stale
        let patch = serde_json::json!({
            "metadata": { "resourceVersion": server.resource_version() },
            "status": server.status,
        });
        classify(
            "MCPServer status",
            &name,
            api.patch_status(
                &name,
                &PatchParams::apply(constants::CONTROLLER_NAME),
                &Patch::Merge(&patch),
            )
            .await,
        )
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Option<Deployment>, ReconcilerError> {
        get_opt(self.api::<Deployment>(namespace), name).await
    }

    async fn create_deployment(&self, namespace: &str, deployment: &Deployment) -> Result<Deployment, ReconcilerError> {
        create(self.api(namespace), "Deployment", deployment).await
    }

    async fn replace_deployment(&self, namespace: &str, deployment: &Deployment) -> Result<Deployment, ReconcilerError> {
        replace(self.api(namespace), "Deployment", deployment).await
    }

    async fn delete_deployment(&self, namespace: &str, name: &str) -> Result<(), ReconcilerError> {
        delete(self.api::<Deployment>(namespace), "Deployment", name).await
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>, ReconcilerError> {
        get_opt(self.api::<Service>(namespace), name).await
    }

    async fn create_service(&self, namespace: &str, service: &Service) -> Result<Service, ReconcilerError> {
        create(self.api(namespace), "Service", service).await
    }

    async fn replace_service(&self, namespace: &str, service: &Service) -> Result<Service, ReconcilerError> {
        replace(self.api(namespace), "Service", service).await
    }

    async fn delete_service(&self, namespace: &str, name: &str) -> Result<(), ReconcilerError> {
        delete(self.api::<Service>(namespace), "Service", name).await
    }

    async fn get_service_account(&self, namespace: &str, name: &str) -> Result<Option<ServiceAccount>, ReconcilerError> {
        get_opt(self.api::<ServiceAccount>(namespace), name).await
    }

    async fn create_service_account(&self, namespace: &str, account: &ServiceAccount) -> Result<ServiceAccount, ReconcilerError> {
        create(self.api(namespace), "ServiceAccount", account).await
    }

    async fn get_hpa(&self, namespace: &str, name: &str) -> Result<Option<HorizontalPodAutoscaler>, ReconcilerError> {
        get_opt(self.api::<HorizontalPodAutoscaler>(namespace), name).await
    }

    async fn create_hpa(&self, namespace: &str, hpa: &HorizontalPodAutoscaler) -> Result<HorizontalPodAutoscaler, ReconcilerError> {
        create(self.api(namespace), "HorizontalPodAutoscaler", hpa).await
    }

    async fn replace_hpa(&self, namespace: &str, hpa: &HorizontalPodAutoscaler) -> Result<HorizontalPodAutoscaler, ReconcilerError> {
        replace(self.api(namespace), "HorizontalPodAutoscaler", hpa).await
    }

    async fn delete_hpa(&self, namespace: &str, name: &str) -> Result<(), ReconcilerError> {
        delete(self.api::<HorizontalPodAutoscaler>(namespace), "HorizontalPodAutoscaler", name).await
    }

    async fn get_ingress(&self, namespace: &str, name: &str) -> Result<Option<Ingress>, ReconcilerError> {
        get_opt(self.api::<Ingress>(namespace), name).await
    }

    async fn create_ingress(&self, namespace: &str, ingress: &Ingress) -> Result<Ingress, ReconcilerError> {
        create(self.api(namespace), "Ingress", ingress).await
    }

    async fn replace_ingress(&self, namespace: &str, ingress: &Ingress) -> Result<Ingress, ReconcilerError> {
        replace(self.api(namespace), "Ingress", ingress).await
    }

    async fn delete_ingress(&self, namespace: &str, name: &str) -> Result<(), ReconcilerError> {
        delete(self.api::<Ingress>(namespace), "Ingress", name).await
    }
}
