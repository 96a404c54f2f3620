//! # Child Object Builders
//!
//! Pure functions turning an MCPServer into the Kubernetes objects the
//! operator owns. No API access happens here; the transport managers and the
//! reconciler decide what to create, update or delete.
//!
//! Every object carries a controller owner reference to its MCPServer so the
//! garbage collector removes it with the parent.

mod autoscaler;
mod deployment;
mod ingress;
mod service;
mod service_account;

pub use autoscaler::*;
pub use deployment::*;
pub use ingress::*;
pub use service::*;
pub use service_account::*;

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{Resource, ResourceExt};

use crate::constants;
use crate::controller::reconciler::ReconcilerError;
use crate::crd::MCPServer;

/// Labels selecting the server's pods
pub fn selector_labels(server: &MCPServer) -> BTreeMap<String, String> {
    BTreeMap::from([(constants::NAME_LABEL.to_string(), server.name_any())])
}

/// Labels applied to every owned object
pub fn common_labels(server: &MCPServer) -> BTreeMap<String, String> {
    let mut labels = selector_labels(server);
    labels.insert(
        constants::MANAGED_BY_LABEL.to_string(),
        constants::CONTROLLER_NAME.to_string(),
    );
    labels
}

/// Metadata for a child object named after the server
pub(crate) fn owned_metadata(server: &MCPServer) -> Result<ObjectMeta, ReconcilerError> {
    let namespace = server
        .namespace()
        .ok_or_else(|| ReconcilerError::MissingNamespace(server.name_any()))?;
    let owner = server
        .controller_owner_ref(&())
        .ok_or(ReconcilerError::MissingField("metadata.uid"))?;
    Ok(ObjectMeta {
        name: Some(server.name_any()),
        namespace: Some(namespace),
        labels: Some(common_labels(server)),
        owner_references: Some(vec![owner]),
        ..Default::default()
    })
}

/// In-cluster URL of the server's Service
pub fn service_endpoint(server: &MCPServer, port: i32) -> Option<String> {
    let namespace = server.namespace()?;
    Some(format!(
        "http://{}.{}.svc.cluster.local:{}",
        server.name_any(),
        namespace,
        port
    ))
}

#[cfg(test)]
pub(crate) mod test_support {
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    use crate::crd::{MCPServer, MCPServerSpec};

    /// An MCPServer as the API server would return it
    pub fn server(spec: serde_json::Value) -> MCPServer {
        let spec: MCPServerSpec = serde_json::from_value(spec).expect("spec should deserialize");
        MCPServer {
            metadata: ObjectMeta {
                name: Some("weather".to_string()),
                namespace: Some("tools".to_string()),
                uid: Some("0a1b2c3d".to_string()),
                generation: Some(1),
                ..Default::default()
            },
            spec,
            status: None,
        }
    }
}
