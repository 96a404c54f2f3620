//! # Optimistic Concurrency
//!
//! Bounded read-modify-write loops for status and finalizer writes.
//!
//! Each cycle re-fetches the latest MCPServer, applies a pure mutation and
//! attempts a resourceVersion-guarded write. A conflict restarts the cycle.

use tracing::{debug, warn};

use crate::constants;
use crate::crd::{MCPServer, MCPServerStatus};

use super::client::MCPKubeClient;
use super::types::ReconcilerError;

/// Commit a status delta with optimistic concurrency
///
/// `delta` receives the freshly fetched resource and a copy of its status to
/// mutate. Nothing is written when the mutated status equals the stored one.
///
/// Returns the latest resource, or `None` if it no longer exists.
pub async fn commit_status<F>(
    kube: &dyn MCPKubeClient,
    namespace: &str,
    name: &str,
    attempts: u32,
    delta: F,
) -> Result<Option<MCPServer>, ReconcilerError>
where
    F: Fn(&MCPServer, &mut MCPServerStatus),
{
    for attempt in 1..=attempts {
        let Some(mut latest) = kube.get_server(namespace, name).await? else {
            debug!(namespace, name, "resource gone, skipping status commit");
            return Ok(None);
        };

        let mut status = latest.status.clone().unwrap_or_default();
        delta(&latest, &mut status);

        if latest.status.as_ref() == Some(&status) {
            debug!(namespace, name, "status unchanged, skipping write");
            return Ok(Some(latest));
        }

        latest.status = Some(status);
        match kube.replace_server_status(&latest).await {
            Ok(updated) => return Ok(Some(updated)),
            Err(e) if e.is_conflict() => {
                warn!(namespace, name, attempt, "status write conflict, retrying");
            }
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        }
    }

    Err(ReconcilerError::Conflict {
        kind: "MCPServer status",
        name: name.to_string(),
    })
}

/// Add the deletion guard if absent
pub async fn ensure_finalizer(
    kube: &dyn MCPKubeClient,
    namespace: &str,
    name: &str,
    attempts: u32,
) -> Result<Option<MCPServer>, ReconcilerError> {
    update_finalizers(kube, namespace, name, attempts, |finalizers| {
        if finalizers.iter().any(|f| f == constants::FINALIZER) {
            false
        } else {
            finalizers.push(constants::FINALIZER.to_string());
            true
        }
    })
    .await
}

/// Remove the deletion guard if present
pub async fn remove_finalizer(
    kube: &dyn MCPKubeClient,
    namespace: &str,
    name: &str,
    attempts: u32,
) -> Result<Option<MCPServer>, ReconcilerError> {
    update_finalizers(kube, namespace, name, attempts, |finalizers| {
        let before = finalizers.len();
        finalizers.retain(|f| f != constants::FINALIZER);
        finalizers.len() != before
    })
    .await
}

/// `edit` returns whether it changed the list
async fn update_finalizers<F>(
    kube: &dyn MCPKubeClient,
    namespace: &str,
    name: &str,
    attempts: u32,
    edit: F,
) -> Result<Option<MCPServer>, ReconcilerError>
where
    F: Fn(&mut Vec<String>) -> bool,
{
    for attempt in 1..=attempts {
        let Some(mut latest) = kube.get_server(namespace, name).await? else {
            return Ok(None);
        };

        let mut finalizers = latest.metadata.finalizers.clone().unwrap_or_default();
        if !edit(&mut finalizers) {
            return Ok(Some(latest));
        }

        latest.metadata.finalizers = Some(finalizers);
        match kube.replace_server(&latest).await {
            Ok(updated) => return Ok(Some(updated)),
            Err(e) if e.is_conflict() => {
                warn!(namespace, name, attempt, "finalizer write conflict, retrying");
            }
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        }
    }

    Err(ReconcilerError::Conflict {
        kind: "MCPServer finalizers",
        name: name.to_string(),
    })
}

/// Retry an idempotent operation on conflict
///
/// Used for child object convergence, where each call re-reads the object it
/// updates.
pub async fn retry_on_conflict<T, F, Fut>(attempts: u32, mut op: F) -> Result<T, ReconcilerError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, ReconcilerError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(e) if e.is_conflict() && attempt < attempts => {
                warn!(attempt, error = %e, "conflict, retrying");
                attempt += 1;
            }
            result => return result,
        }
    }
}
