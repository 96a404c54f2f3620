//! In-memory [`MCPKubeClient`] for reconciler tests.
//!
//! Mirrors the API server behaviors the reconciler depends on:
//! resourceVersion compare-and-swap on every write, status writes that leave
//! spec and metadata alone, and removal of a deleted object once its last
//! finalizer is gone. Every write is counted per operation.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentStatus};
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::{Service, ServiceAccount};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::{Resource, ResourceExt};

use crate::crd::MCPServer;

use super::client::MCPKubeClient;
use super::types::ReconcilerError;

type Key = (String, String);

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

fn api_error(code: u16, reason: &str) -> ReconcilerError {
    ReconcilerError::Kube(kube::Error::Api(kube::error::ErrorResponse {
        status: "Failure".to_string(),
        message: reason.to_string(),
        reason: reason.to_string(),
        code,
    }))
}

struct Table<K>(BTreeMap<Key, K>);

impl<K> Default for Table<K> {
    fn default() -> Self {
        Self(BTreeMap::new())
    }
}

impl<K: Resource + Clone> Table<K> {
    fn get(&self, namespace: &str, name: &str) -> Option<K> {
        self.0.get(&key(namespace, name)).cloned()
    }

    fn create(&mut self, namespace: &str, obj: &K, version: String) -> Result<K, ReconcilerError> {
        let k = key(namespace, &obj.name_any());
        if self.0.contains_key(&k) {
            return Err(api_error(409, "AlreadyExists"));
        }
        let mut stored = obj.clone();
        stored.meta_mut().namespace = Some(namespace.to_string());
        stored.meta_mut().resource_version = Some(version);
        self.0.insert(k, stored.clone());
        Ok(stored)
    }

    fn replace(
        &mut self,
        kind: &'static str,
        namespace: &str,
        obj: &K,
        version: String,
    ) -> Result<K, ReconcilerError> {
        let name = obj.name_any();
        let Some(existing) = self.0.get_mut(&key(namespace, &name)) else {
            return Err(api_error(404, "NotFound"));
        };
        if obj.meta().resource_version.is_some()
            && obj.meta().resource_version != existing.meta().resource_version
        {
            return Err(ReconcilerError::Conflict { kind, name });
        }
        let mut stored = obj.clone();
        stored.meta_mut().namespace = Some(namespace.to_string());
        stored.meta_mut().resource_version = Some(version);
        *existing = stored.clone();
        Ok(stored)
    }

    fn delete(&mut self, namespace: &str, name: &str) -> bool {
        self.0.remove(&key(namespace, name)).is_some()
    }
}

#[derive(Default)]
struct Inner {
    version: u64,
    servers: Table<MCPServer>,
    deployments: Table<Deployment>,
    services: Table<Service>,
    service_accounts: Table<ServiceAccount>,
    hpas: Table<HorizontalPodAutoscaler>,
    ingresses: Table<Ingress>,
    writes: BTreeMap<&'static str, usize>,
    status_conflicts: u32,
    finalizer_conflicts: u32,
    failures: BTreeMap<&'static str, u32>,
}

impl Inner {
    fn next_version(&mut self) -> String {
        self.version += 1;
        self.version.to_string()
    }

    fn record(&mut self, op: &'static str) {
        *self.writes.entry(op).or_default() += 1;
    }

    /// Consume one injected failure for `op`, if any
    fn fail(&mut self, op: &'static str) -> Result<(), ReconcilerError> {
        match self.failures.get_mut(op) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(api_error(500, "InternalError"))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Default)]
pub struct FakeKube {
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for FakeKube {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeKube").finish_non_exhaustive()
    }
}

impl FakeKube {
    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("fake store lock poisoned")
    }

    /// Store a server as if a user applied it
    pub fn insert_server(&self, server: MCPServer) {
        let mut inner = self.lock();
        let version = inner.next_version();
        let namespace = server.namespace().expect("server needs a namespace");
        inner
            .servers
            .create(&namespace, &server, version)
            .expect("server should not exist yet");
    }

    /// Apply a user edit to the spec, bumping the generation
    pub fn edit_server(&self, namespace: &str, name: &str, edit: impl FnOnce(&mut MCPServer)) {
        let mut inner = self.lock();
        let version = inner.next_version();
        let k = key(namespace, name);
        let server = inner.servers.0.get_mut(&k).expect("server should exist");
        edit(server);
        server.metadata.generation = Some(server.generation() + 1);
        server.metadata.resource_version = Some(version);
    }

    /// Mark a server deleted; it disappears once no finalizer remains
    pub fn delete_server(&self, namespace: &str, name: &str) {
        let mut inner = self.lock();
        let version = inner.next_version();
        let k = key(namespace, name);
        let Some(server) = inner.servers.0.get_mut(&k) else {
            return;
        };
        if server.finalizers().is_empty() {
            inner.servers.0.remove(&k);
            return;
        }
        server.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
        server.metadata.resource_version = Some(version);
    }

    /// Report the Deployment rollout as the deployment controller would
    pub fn set_deployment_ready(&self, namespace: &str, name: &str, ready: i32) {
        let mut inner = self.lock();
        let version = inner.next_version();
        let deployment = inner
            .deployments
            .0
            .get_mut(&key(namespace, name))
            .expect("deployment should exist");
        deployment.status = Some(DeploymentStatus {
            replicas: Some(ready),
            ready_replicas: Some(ready),
            available_replicas: Some(ready),
            ..Default::default()
        });
        deployment.metadata.resource_version = Some(version);
    }

    /// Change the replica count as an autoscaler would
    pub fn scale_deployment(&self, namespace: &str, name: &str, replicas: i32) {
        let mut inner = self.lock();
        let version = inner.next_version();
        let deployment = inner
            .deployments
            .0
            .get_mut(&key(namespace, name))
            .expect("deployment should exist");
        if let Some(spec) = deployment.spec.as_mut() {
            spec.replicas = Some(replicas);
        }
        deployment.metadata.resource_version = Some(version);
    }

    /// Edit the live Deployment out of band, as a user with kubectl would
    pub fn edit_deployment(&self, namespace: &str, name: &str, edit: impl FnOnce(&mut Deployment)) {
        let mut inner = self.lock();
        let version = inner.next_version();
        let deployment = inner
            .deployments
            .0
            .get_mut(&key(namespace, name))
            .expect("deployment should exist");
        edit(deployment);
        deployment.metadata.resource_version = Some(version);
    }

    /// Fail the next `count` writes of one operation with a server error
    pub fn fail_writes(&self, op: &'static str, count: u32) {
        self.lock().failures.insert(op, count);
    }

    /// Reject the next `count` status writes with a conflict
    pub fn inject_status_conflicts(&self, count: u32) {
        self.lock().status_conflicts = count;
    }

    /// Reject the next `count` finalizer writes with a conflict
    pub fn inject_finalizer_conflicts(&self, count: u32) {
        self.lock().finalizer_conflicts = count;
    }

    pub fn server(&self, namespace: &str, name: &str) -> Option<MCPServer> {
        self.lock().servers.get(namespace, name)
    }

    pub fn deployment(&self, namespace: &str, name: &str) -> Option<Deployment> {
        self.lock().deployments.get(namespace, name)
    }

    pub fn service(&self, namespace: &str, name: &str) -> Option<Service> {
        self.lock().services.get(namespace, name)
    }

    pub fn hpa(&self, namespace: &str, name: &str) -> Option<HorizontalPodAutoscaler> {
        self.lock().hpas.get(namespace, name)
    }

    pub fn ingress(&self, namespace: &str, name: &str) -> Option<Ingress> {
        self.lock().ingresses.get(namespace, name)
    }

    pub fn service_account(&self, namespace: &str, name: &str) -> Option<ServiceAccount> {
        self.lock().service_accounts.get(namespace, name)
    }

    /// Successful writes for one operation, e.g. `"deployment.replace"`
    pub fn writes(&self, op: &str) -> usize {
        self.lock().writes.get(op).copied().unwrap_or(0)
    }

    pub fn total_writes(&self) -> usize {
        self.lock().writes.values().sum()
    }
}

#[async_trait]
impl MCPKubeClient for FakeKube {
    async fn get_server(&self, namespace: &str, name: &str) -> Result<Option<MCPServer>, ReconcilerError> {
        Ok(self.server(namespace, name))
    }

    async fn replace_server(&self, server: &MCPServer) -> Result<MCPServer, ReconcilerError> {
        let mut inner = self.lock();
        inner.fail("server.replace")?;
        let name = server.name_any();
        let namespace = server
            .namespace()
            .ok_or_else(|| ReconcilerError::MissingNamespace(name.clone()))?;
        if inner.finalizer_conflicts > 0 {
            inner.finalizer_conflicts -= 1;
            return Err(ReconcilerError::Conflict { kind: "MCPServer", name });
        }
        let stored = inner
            .servers
            .get(&namespace, &name)
            .ok_or_else(|| api_error(404, "NotFound"))?;

        // The status subresource is not writable through the main resource
        let mut incoming = server.clone();
        incoming.status = stored.status.clone();
        let version = inner.next_version();
        let updated = inner.servers.replace("MCPServer", &namespace, &incoming, version)?;
        inner.record("server.replace");

        if updated.metadata.deletion_timestamp.is_some() && updated.finalizers().is_empty() {
            inner.servers.delete(&namespace, &name);
        }
        Ok(updated)
    }

    async fn replace_server_status(&self, server: &MCPServer) -> Result<MCPServer, ReconcilerError> {
        let mut inner = self.lock();
        inner.fail("server.status")?;
        let name = server.name_any();
        let namespace = server
            .namespace()
            .ok_or_else(|| ReconcilerError::MissingNamespace(name.clone()))?;
        if inner.status_conflicts > 0 {
            inner.status_conflicts -= 1;
            return Err(ReconcilerError::Conflict {
                kind: "MCPServer status",
                name,
            });
        }
        let mut stored = inner
            .servers
            .get(&namespace, &name)
            .ok_or_else(|| api_error(404, "NotFound"))?;
        if server.resource_version() != stored.resource_version() {
            return Err(ReconcilerError::Conflict {
                kind: "MCPServer status",
                name,
            });
        }
        stored.status = server.status.clone();
        let version = inner.next_version();
        let updated = inner.servers.replace("MCPServer", &namespace, &stored, version)?;
        inner.record("server.status");
        Ok(updated)
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Option<Deployment>, ReconcilerError> {
        Ok(self.deployment(namespace, name))
    }

    async fn create_deployment(&self, namespace: &str, deployment: &Deployment) -> Result<Deployment, ReconcilerError> {
        let mut inner = self.lock();
        inner.fail("deployment.create")?;
        let version = inner.next_version();
        let created = inner.deployments.create(namespace, deployment, version)?;
        inner.record("deployment.create");
        Ok(created)
    }

    async fn replace_deployment(&self, namespace: &str, deployment: &Deployment) -> Result<Deployment, ReconcilerError> {
        let mut inner = self.lock();
        inner.fail("deployment.replace")?;
        let version = inner.next_version();
        // Rollout status belongs to the deployment controller
        let mut incoming = deployment.clone();
        incoming.status = inner
            .deployments
            .get(namespace, &deployment.name_any())
            .and_then(|d| d.status);
        let replaced = inner
            .deployments
            .replace("Deployment", namespace, &incoming, version)?;
        inner.record("deployment.replace");
        Ok(replaced)
    }

    async fn delete_deployment(&self, namespace: &str, name: &str) -> Result<(), ReconcilerError> {
        let mut inner = self.lock();
        inner.fail("deployment.delete")?;
        if inner.deployments.delete(namespace, name) {
            inner.record("deployment.delete");
        }
        Ok(())
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>, ReconcilerError> {
        Ok(self.service(namespace, name))
    }

    async fn create_service(&self, namespace: &str, service: &Service) -> Result<Service, ReconcilerError> {
        let mut inner = self.lock();
        inner.fail("service.create")?;
        let version = inner.next_version();
        let created = inner.services.create(namespace, service, version)?;
        inner.record("service.create");
        Ok(created)
    }

    async fn replace_service(&self, namespace: &str, service: &Service) -> Result<Service, ReconcilerError> {
        let mut inner = self.lock();
        inner.fail("service.replace")?;
        let version = inner.next_version();
        let replaced = inner.services.replace("Service", namespace, service, version)?;
        inner.record("service.replace");
        Ok(replaced)
    }

    async fn delete_service(&self, namespace: &str, name: &str) -> Result<(), ReconcilerError> {
        let mut inner = self.lock();
        inner.fail("service.delete")?;
        if inner.services.delete(namespace, name) {
            inner.record("service.delete");
        }
        Ok(())
    }

    async fn get_service_account(&self, namespace: &str, name: &str) -> Result<Option<ServiceAccount>, ReconcilerError> {
        Ok(self.service_account(namespace, name))
    }

    async fn create_service_account(&self, namespace: &str, account: &ServiceAccount) -> Result<ServiceAccount, ReconcilerError> {
        let mut inner = self.lock();
        inner.fail("service_account.create")?;
        let version = inner.next_version();
        let created = inner.service_accounts.create(namespace, account, version)?;
        inner.record("service_account.create");
        Ok(created)
    }

    async fn get_hpa(&self, namespace: &str, name: &str) -> Result<Option<HorizontalPodAutoscaler>, ReconcilerError> {
        Ok(self.hpa(namespace, name))
    }

    async fn create_hpa(&self, namespace: &str, hpa: &HorizontalPodAutoscaler) -> Result<HorizontalPodAutoscaler, ReconcilerError> {
        let mut inner = self.lock();
        inner.fail("hpa.create")?;
        let version = inner.next_version();
        let created = inner.hpas.create(namespace, hpa, version)?;
        inner.record("hpa.create");
        Ok(created)
    }

    async fn replace_hpa(&self, namespace: &str, hpa: &HorizontalPodAutoscaler) -> Result<HorizontalPodAutoscaler, ReconcilerError> {
        let mut inner = self.lock();
        inner.fail("hpa.replace")?;
        let version = inner.next_version();
        let replaced = inner
            .hpas
            .replace("HorizontalPodAutoscaler", namespace, hpa, version)?;
        inner.record("hpa.replace");
        Ok(replaced)
    }

    async fn delete_hpa(&self, namespace: &str, name: &str) -> Result<(), ReconcilerError> {
        let mut inner = self.lock();
        inner.fail("hpa.delete")?;
        if inner.hpas.delete(namespace, name) {
            inner.record("hpa.delete");
        }
        Ok(())
    }

    async fn get_ingress(&self, namespace: &str, name: &str) -> Result<Option<Ingress>, ReconcilerError> {
        Ok(self.ingress(namespace, name))
    }

    async fn create_ingress(&self, namespace: &str, ingress: &Ingress) -> Result<Ingress, ReconcilerError> {
        let mut inner = self.lock();
        inner.fail("ingress.create")?;
        let version = inner.next_version();
        let created = inner.ingresses.create(namespace, ingress, version)?;
        inner.record("ingress.create");
        Ok(created)
    }

    async fn replace_ingress(&self, namespace: &str, ingress: &Ingress) -> Result<Ingress, ReconcilerError> {
        let mut inner = self.lock();
        inner.fail("ingress.replace")?;
        let version = inner.next_version();
        let replaced = inner.ingresses.replace("Ingress", namespace, ingress, version)?;
        inner.record("ingress.replace");
        Ok(replaced)
    }

    async fn delete_ingress(&self, namespace: &str, name: &str) -> Result<(), ReconcilerError> {
        let mut inner = self.lock();
        inner.fail("ingress.delete")?;
        if inner.ingresses.delete(namespace, name) {
            inner.record("ingress.delete");
        }
        Ok(())
    }
}
