//! # Controller
//!
//! Reconciliation of MCPServer resources.
//!
//! - `reconciler` - Reconcile loop, status ledger and optimistic concurrency
//! - `transport` - Transport managers building the workload and endpoint objects
//! - `builders` - Pure child object builders
//! - `validation` - Protocol prober and validation state machine
//! - `server` - Metrics and health probe HTTP server

pub mod builders;
pub mod reconciler;
pub mod server;
pub mod transport;
pub mod validation;
