//! Custom transport manager.
//!
//! Runs an arbitrary command. A Service (and with it probing and external
//! access) only exists when the custom transport declares a port.

use async_trait::async_trait;
use kube::ResourceExt;
use tracing::info;

use crate::controller::builders::{build_deployment, build_service, WorkloadTemplate};
use crate::controller::reconciler::{MCPKubeClient, ReconcilerError};
use crate::crd::{CustomTransportConfig, MCPServer, TransportType};

use super::{
    apply_deployment, apply_service, create_deployment_if_absent, create_service_if_absent,
    namespace_of, SseSettings, TransportManager,
};

#[derive(Debug, Clone, PartialEq)]
pub struct CustomTransportManager {
    config: CustomTransportConfig,
}

impl CustomTransportManager {
    pub fn new(config: CustomTransportConfig) -> Self {
        Self { config }
    }

    fn template(&self, server: &MCPServer) -> WorkloadTemplate {
        let mut args = self.config.args.clone();
        args.extend(server.spec.args.iter().cloned());
        WorkloadTemplate {
            port: self.config.port,
            command: self.config.command.clone(),
            args,
            sse: None,
        }
    }
}

#[async_trait]
impl TransportManager for CustomTransportManager {
    fn transport_type(&self) -> TransportType {
        TransportType::Custom
    }

    fn requires_service(&self) -> bool {
        self.config.port.is_some()
    }

    fn requires_external_access(&self) -> bool {
        self.config.port.is_some()
    }

    fn service_port(&self) -> Option<i32> {
        self.config.port
    }

    fn sse_settings(&self) -> Option<&SseSettings> {
        None
    }

    async fn create_resources(
        &self,
        kube: &dyn MCPKubeClient,
        server: &MCPServer,
    ) -> Result<(), ReconcilerError> {
        let namespace = namespace_of(server)?;
        let deployment = build_deployment(server, &self.template(server))?;
        create_deployment_if_absent(kube, &namespace, &deployment).await?;
        if let Some(port) = self.config.port {
            let service = build_service(server, port, None)?;
            create_service_if_absent(kube, &namespace, &service).await?;
        }
        Ok(())
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

        match self.config.port {
            Some(port) => {
                let service = build_service(server, port, None)?;
                apply_service(kube, &namespace, &service).await
            }
            None => {
                // A port was removed from the spec
                let name = server.name_any();
                if kube.get_service(&namespace, &name).await?.is_some() {
                    info!(service = %name, "deleting service of portless custom transport");
                    kube.delete_service(&namespace, &name).await?;
                }
                Ok(())
            }
        }
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
