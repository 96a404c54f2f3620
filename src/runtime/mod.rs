//! # Runtime Module
//!
//! Runtime components for the MCP Server Operator: initialization, the
//! controller watch loop and reconcile error handling.

pub mod error_policy;
pub mod initialization;
pub mod watch_loop;

pub use error_policy::*;
pub use initialization::*;
pub use watch_loop::*;
