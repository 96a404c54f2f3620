//! # Error Policy
//!
//! Requeue policy for reconcile errors that escaped the reconciler.
//!
//! Child convergence failures are recorded in status by the reconciler
//! itself. What reaches this policy is a failure to read the resource or to
//! commit status after the bounded conflict retries.

use std::sync::Arc;

use kube::ResourceExt;
use kube_runtime::controller::Action;
use tracing::error;

use crate::controller::reconciler::{Reconciler, ReconcilerError};
use crate::crd::MCPServer;
use crate::observability::metrics;

/// Log the error and requeue after the configured delay
pub fn error_policy(server: Arc<MCPServer>, error: &ReconcilerError, ctx: Arc<Reconciler>) -> Action {
    let name = server.name_any();
    let namespace = server.namespace().unwrap_or_default();

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.reconcile.error",
        resource.name = %name,
        resource.namespace = %namespace,
        error.kind = error.as_label(),
    );
    let _error_guard = error_span.enter();

    error!(error = %error, "Reconciliation failed for {}/{}", namespace, name);
    metrics::increment_requeues_total(error.as_label());
    Action::requeue(ctx.config.error_requeue)
}
