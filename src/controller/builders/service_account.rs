//! ServiceAccount builder.

use k8s_openapi::api::core::v1::ServiceAccount;

use crate::controller::reconciler::ReconcilerError;
use crate::crd::MCPServer;

use super::owned_metadata;

/// ServiceAccount the pods run as when the spec names none
pub fn build_service_account(server: &MCPServer) -> Result<ServiceAccount, ReconcilerError> {
    Ok(ServiceAccount {
        metadata: owned_metadata(server)?,
        ..Default::default()
    })
}
