//! # Observability
//!
//! Prometheus metrics and Kubernetes events for the MCP Server Operator.
//!
//! Both sinks are fire-and-forget: nothing in this module returns an error to
//! the reconciler.

pub mod events;
pub mod metrics;
