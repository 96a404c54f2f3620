//! # Constants
//!
//! Default values shared across the operator.

/// Field manager and event reporting component name
pub const CONTROLLER_NAME: &str = "mcp-server-operator";

/// Deletion guard added to every managed MCPServer
pub const FINALIZER: &str = "mcp.x-k8s.io/finalizer";

/// Annotation carrying the hash of the operator-owned Deployment fields
pub const TEMPLATE_HASH_ANNOTATION: &str = "mcp.x-k8s.io/template-hash";

pub const NAME_LABEL: &str = "app.kubernetes.io/name";
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Container port when the spec does not set one
pub const DEFAULT_SERVER_PORT: i32 = 8080;
/// MCP endpoint path when the spec does not set one
pub const DEFAULT_MCP_PATH: &str = "/mcp";
/// Legacy SSE stream path probed when the streamable endpoint is absent
pub const DEFAULT_SSE_PATH: &str = "/sse";

pub const DEFAULT_SSE_TERMINATION_GRACE_PERIOD_SECS: i64 = 60;
pub const DEFAULT_SSE_SESSION_AFFINITY_TIMEOUT_SECS: i32 = 10800;

pub const DEFAULT_MAX_VALIDATION_ATTEMPTS: i32 = 5;
pub const DEFAULT_MAX_PERMANENT_ERROR_ATTEMPTS: i32 = 2;
pub const DEFAULT_VALIDATION_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_ERROR_REQUEUE_SECS: u64 = 120;
pub const DEFAULT_CONFLICT_RETRY_ATTEMPTS: u32 = 5;
pub const DEFAULT_SSE_APPLY_REQUEUE_SECS: u64 = 5;

/// Validation retry backoff steps
pub const VALIDATION_RETRY_SHORT_SECS: u64 = 30;
pub const VALIDATION_RETRY_MEDIUM_SECS: u64 = 60;
pub const VALIDATION_RETRY_LONG_SECS: u64 = 120;

pub const DEFAULT_METRICS_PORT: u16 = 8080;
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;
