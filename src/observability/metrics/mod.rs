//! # Metrics Module
//!
//! Prometheus metrics for monitoring the operator, organized by responsibility.
//!
//! ## Sub-modules
//!
//! - `registry` - Metrics registry setup and registration
//! - `controller_metrics` - Reconciliation, requeue and per-resource state metrics
//! - `validation_metrics` - Protocol validation probe metrics

pub mod controller_metrics;
pub mod registry;
pub mod validation_metrics;

pub use controller_metrics::*;
pub use registry::*;
pub use validation_metrics::*;
