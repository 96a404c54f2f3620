//! # MCP Server Operator
//!
//! A Kubernetes operator that deploys Model Context Protocol servers and
//! continuously validates that they speak the protocol they declare.
//!
//! ## Overview
//!
//! For every `MCPServer` resource the operator:
//!
//! 1. **Converges the workload** - Deployment, Service, optional autoscaler and Ingress
//! 2. **Probes the running server** - MCP `initialize` handshake over Streamable HTTP, falling back to legacy SSE
//! 3. **Records the outcome** - phase, conditions and a structured validation record in status
//! 4. **Escalates failures** - strict mode deletes a non-compliant workload until the spec is fixed
//!
//! With `protocol: auto` the detected transport is recorded and SSE-specific
//! workload settings are applied on the following reconcile.

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod runtime;

pub use crd::*;
