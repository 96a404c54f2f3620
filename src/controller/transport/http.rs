//! HTTP transport manager.

use async_trait::async_trait;
use kube::ResourceExt;

use crate::controller::builders::{build_deployment, build_service, WorkloadTemplate};
use crate::controller::reconciler::{MCPKubeClient, ReconcilerError};
use crate::crd::{MCPServer, TransportType};

use super::{
    apply_deployment, apply_service, create_deployment_if_absent, create_service_if_absent,
    namespace_of, SseSettings, TransportManager,
};

/// Streamable HTTP or SSE server fronted by a ClusterIP Service
#[derive(Debug, Clone, PartialEq)]
pub struct HttpTransportManager {
    port: i32,
    sse: Option<SseSettings>,
}

impl HttpTransportManager {
    pub fn new(port: i32, sse: Option<SseSettings>) -> Self {
        Self { port, sse }
    }

    fn template(&self, server: &MCPServer) -> WorkloadTemplate {
        WorkloadTemplate {
            port: Some(self.port),
            command: Vec::new(),
            args: server.spec.args.clone(),
            sse: self.sse.clone(),
        }
    }
}

#[async_trait]
impl TransportManager for HttpTransportManager {
    fn transport_type(&self) -> TransportType {
        TransportType::Http
    }

    fn requires_service(&self) -> bool {
        true
    }

    fn requires_external_access(&self) -> bool {
        true
    }

    fn service_port(&self) -> Option<i32> {
        Some(self.port)
    }

    fn sse_settings(&self) -> Option<&SseSettings> {
        self.sse.as_ref()
    }

    async fn create_resources(
        &self,
        kube: &dyn MCPKubeClient,
        server: &MCPServer,
    ) -> Result<(), ReconcilerError> {
        let namespace = namespace_of(server)?;
        let deployment = build_deployment(server, &self.template(server))?;
        create_deployment_if_absent(kube, &namespace, &deployment).await?;
        let service = build_service(server, self.port, self.sse.as_ref())?;
        create_service_if_absent(kube, &namespace, &service).await
    }

    async fn update_resources(
        &self,
        kube: &dyn MCPKubeClient,
        server: &MCPServer,
    ) -> Result<(), ReconcilerError> {
        let namespace = namespace_of(server)?;
        let deployment = build_deployment(server, &self.template(server))?;
        apply_deployment(
            kube,
            &namespace,
            &deployment,
            !server.spec.autoscaling_enabled(),
        )
        .await?;
        let service = build_service(server, self.port, self.sse.as_ref())?;
        apply_service(kube, &namespace, &service).await
    }

    async fn delete_resources(
        &self,
        kube: &dyn MCPKubeClient,
        server: &MCPServer,
    ) -> Result<(), ReconcilerError> {
        let namespace = namespace_of(server)?;
        let name = server.name_any();
        kube.delete_service(&namespace, &name).await?;
        kube.delete_deployment(&namespace, &name).await
    }
}
