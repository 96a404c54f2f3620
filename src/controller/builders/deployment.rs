//! Deployment builder and drift detection.
//!
//! The built Deployment carries a sha256 of the fields the operator owns
//! (selector, pod template, strategy), so a spec change shows up as a hash
//! change. Out-of-band edits to the live object are caught by comparing a
//! projection of the fields the builder sets; fields the API server defaults
//! are left out of it, otherwise every pass would report drift.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{
    Deployment, DeploymentSpec, DeploymentStrategy, RollingUpdateDeployment,
};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, PodSpec, PodTemplateSpec, Probe, TCPSocketAction,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;
use sha2::{Digest, Sha256};

use crate::constants;
use crate::controller::reconciler::ReconcilerError;
use crate::controller::transport::SseSettings;
use crate::crd::MCPServer;

use super::{owned_metadata, selector_labels};

/// Container name of the MCP server
pub const CONTAINER_NAME: &str = "mcp-server";

/// Variant-specific pieces of the workload
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkloadTemplate {
    /// Port to expose and probe, none for portless custom servers
    pub port: Option<i32>,
    pub command: Vec<String>,
    pub args: Vec<String>,
    pub sse: Option<SseSettings>,
}

/// Build the server Deployment
pub fn build_deployment(
    server: &MCPServer,
    template: &WorkloadTemplate,
) -> Result<Deployment, ReconcilerError> {
    let labels = selector_labels(server);
    let spec = &server.spec;

    let env: Vec<EnvVar> = spec
        .env
        .iter()
        .map(|e| EnvVar {
            name: e.name.clone(),
            value: Some(e.value.clone()),
            ..Default::default()
        })
        .collect();

    let container = Container {
        name: CONTAINER_NAME.to_string(),
        image: Some(spec.image.clone()),
        command: (!template.command.is_empty()).then(|| template.command.clone()),
        args: (!template.args.is_empty()).then(|| template.args.clone()),
        env: (!env.is_empty()).then_some(env),
        ports: template.port.map(|port| {
            vec![ContainerPort {
                name: Some("mcp".to_string()),
                container_port: port,
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]
        }),
        readiness_probe: template.port.map(|port| Probe {
            tcp_socket: Some(TCPSocketAction {
                port: IntOrString::Int(port),
                ..Default::default()
            }),
            period_seconds: Some(10),
            ..Default::default()
        }),
        ..Default::default()
    };

    let strategy = template.sse.as_ref().map(|_| DeploymentStrategy {
        type_: Some("RollingUpdate".to_string()),
        rolling_update: Some(RollingUpdateDeployment {
            max_unavailable: Some(IntOrString::Int(0)),
            max_surge: Some(IntOrString::Int(1)),
        }),
    });

    let service_account = spec
        .service_account_name
        .clone()
        .unwrap_or_else(|| server.name_any());

    let mut deployment = Deployment {
        metadata: owned_metadata(server)?,
        spec: Some(DeploymentSpec {
            replicas: Some(spec.replicas),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            strategy,
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    service_account_name: Some(service_account),
                    termination_grace_period_seconds: template
                        .sse
                        .as_ref()
                        .map(|s| s.termination_grace_period_seconds),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    };

    let hash = template_hash(&deployment)?;
    deployment
        .annotations_mut()
        .insert(constants::TEMPLATE_HASH_ANNOTATION.to_string(), hash);
    Ok(deployment)
}

/// sha256 over the operator-owned fields of a Deployment
pub fn template_hash(deployment: &Deployment) -> Result<String, ReconcilerError> {
    let spec = deployment
        .spec
        .as_ref()
        .ok_or(ReconcilerError::MissingField("spec"))?;
    let owned = serde_json::to_vec(&(&spec.selector, &spec.template, &spec.strategy))?;
    let digest = Sha256::digest(&owned);
    Ok(digest.iter().map(|b| format!("{b:02x}")).collect())
}

fn stored_hash(deployment: &Deployment) -> Option<&str> {
    deployment
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(constants::TEMPLATE_HASH_ANNOTATION))
        .map(String::as_str)
}

/// Whether the live Deployment has drifted from the desired one
///
/// The replica count only counts as drift when the operator owns it.
pub fn deployment_needs_update(
    existing: &Deployment,
    desired: &Deployment,
    owns_replicas: bool,
) -> bool {
    let (Some(live), Some(want)) = (existing.spec.as_ref(), desired.spec.as_ref()) else {
        return true;
    };
    live.selector != want.selector
        || stored_hash(existing) != stored_hash(desired)
        || OwnedFields::of(existing, desired) != OwnedFields::of(desired, desired)
        || (owns_replicas && live.replicas != want.replicas)
}

/// Container fields set by [`build_deployment`]
#[derive(Debug, PartialEq)]
struct OwnedContainer {
    name: String,
    image: Option<String>,
    command: Vec<String>,
    args: Vec<String>,
    env: Vec<(String, String)>,
    ports: Vec<(Option<String>, i32, Option<String>)>,
    readiness: Option<(Option<IntOrString>, Option<i32>)>,
}

impl OwnedContainer {
    fn of(container: &Container) -> Self {
        Self {
            name: container.name.clone(),
            image: container.image.clone(),
            command: container.command.clone().unwrap_or_default(),
            args: container.args.clone().unwrap_or_default(),
            // An empty value and a missing one are stored the same way
            env: container
                .env
                .iter()
                .flatten()
                .map(|e| (e.name.clone(), e.value.clone().unwrap_or_default()))
                .collect(),
            ports: container
                .ports
                .iter()
                .flatten()
                .map(|p| (p.name.clone(), p.container_port, p.protocol.clone()))
                .collect(),
            readiness: container.readiness_probe.as_ref().map(|probe| {
                (
                    probe.tcp_socket.as_ref().map(|t| t.port.clone()),
                    probe.period_seconds,
                )
            }),
        }
    }
}

/// Pod template and strategy fields set by [`build_deployment`]
///
/// Grace period and strategy are only compared when the desired object sets
/// them; the API server fills in its own defaults otherwise.
#[derive(Debug, PartialEq)]
struct OwnedFields {
    template_labels: Option<BTreeMap<String, String>>,
    service_account: Option<String>,
    termination_grace_period_seconds: Option<i64>,
    strategy: Option<DeploymentStrategy>,
    containers: Vec<OwnedContainer>,
}

impl OwnedFields {
    fn of(deployment: &Deployment, desired: &Deployment) -> Self {
        let spec = deployment.spec.as_ref();
        let want = desired.spec.as_ref();
        let pod = spec.and_then(|s| s.template.spec.as_ref());
        let want_pod = want.and_then(|s| s.template.spec.as_ref());

        let grace_owned = want_pod.is_some_and(|p| p.termination_grace_period_seconds.is_some());
        let strategy_owned = want.is_some_and(|s| s.strategy.is_some());

        Self {
            template_labels: spec
                .and_then(|s| s.template.metadata.as_ref())
                .and_then(|m| m.labels.clone()),
            service_account: pod.and_then(|p| p.service_account_name.clone()),
            termination_grace_period_seconds: pod
                .and_then(|p| p.termination_grace_period_seconds)
                .filter(|_| grace_owned),
            strategy: spec
                .and_then(|s| s.strategy.clone())
                .filter(|_| strategy_owned),
            containers: pod
                .map(|p| p.containers.iter().map(OwnedContainer::of).collect())
                .unwrap_or_default(),
        }
    }
}

/// Apply the operator-owned fields of `desired` onto the live Deployment
///
/// Keeps the live object's metadata (resourceVersion included) and, when an
/// autoscaler owns scaling, its replica count.
pub fn merge_deployment(existing: &Deployment, desired: &Deployment, owns_replicas: bool) -> Deployment {
    let mut merged = existing.clone();
    let Some(want) = desired.spec.clone() else {
        return merged;
    };

    if let Some(hash) = stored_hash(desired) {
        merged.annotations_mut().insert(
            constants::TEMPLATE_HASH_ANNOTATION.to_string(),
            hash.to_string(),
        );
    }
    if let Some(labels) = desired.metadata.labels.clone() {
        merged.labels_mut().extend(labels);
    }

    let live_replicas = existing.spec.as_ref().and_then(|s| s.replicas);
    let spec = merged.spec.get_or_insert_with(Default::default);
    spec.selector = want.selector;
    spec.template = want.template;
    spec.strategy = want.strategy;
    spec.replicas = if owns_replicas {
        want.replicas
    } else {
        live_replicas
    };
    merged
}
