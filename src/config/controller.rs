//! # Controller Configuration
//!
//! Reconciler tunables: validation thresholds, probe timeout and requeue delays.

use std::time::Duration;

use super::env_var_or_default;
use crate::constants::*;

/// Reconciler tunables
///
/// Built once and handed to the reconciler context. The reconciler never reads
/// the environment itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Transient (connectivity-class) probe failures tolerated before `Failed`
    /// Default: 5
    pub max_validation_attempts: i32,
    /// Permanent (configuration-class) probe failures tolerated before `Failed`
    /// Default: 2
    pub max_permanent_error_attempts: i32,
    /// Upper bound for a single protocol probe
    /// Default: 30s
    pub validation_timeout: Duration,
    /// Requeue delay after an infrastructure error
    /// Default: 2m
    pub error_requeue: Duration,
    /// Optimistic concurrency retries for status and finalizer writes
    /// Default: 5
    pub conflict_retries: u32,
    /// Requeue delay after SSE detection so the settings get applied promptly
    /// Default: 5s
    pub sse_apply_requeue: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_validation_attempts: DEFAULT_MAX_VALIDATION_ATTEMPTS,
            max_permanent_error_attempts: DEFAULT_MAX_PERMANENT_ERROR_ATTEMPTS,
            validation_timeout: Duration::from_secs(DEFAULT_VALIDATION_TIMEOUT_SECS),
            error_requeue: Duration::from_secs(DEFAULT_ERROR_REQUEUE_SECS),
            conflict_retries: DEFAULT_CONFLICT_RETRY_ATTEMPTS,
            sse_apply_requeue: Duration::from_secs(DEFAULT_SSE_APPLY_REQUEUE_SECS),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            max_validation_attempts: env_var_or_default(
                "MAX_VALIDATION_ATTEMPTS",
                DEFAULT_MAX_VALIDATION_ATTEMPTS,
            )
            .max(1),
            max_permanent_error_attempts: env_var_or_default(
                "MAX_PERMANENT_ERROR_ATTEMPTS",
                DEFAULT_MAX_PERMANENT_ERROR_ATTEMPTS,
            )
            .max(1),
            validation_timeout: Duration::from_secs(env_var_or_default(
                "VALIDATION_TIMEOUT_SECS",
                DEFAULT_VALIDATION_TIMEOUT_SECS,
            )),
            error_requeue: Duration::from_secs(env_var_or_default(
                "ERROR_REQUEUE_SECS",
                DEFAULT_ERROR_REQUEUE_SECS,
            )),
            conflict_retries: env_var_or_default(
                "CONFLICT_RETRY_ATTEMPTS",
                DEFAULT_CONFLICT_RETRY_ATTEMPTS,
            )
            .max(1),
            sse_apply_requeue: Duration::from_secs(env_var_or_default(
                "SSE_APPLY_REQUEUE_SECS",
                DEFAULT_SSE_APPLY_REQUEUE_SECS,
            )),
        }
    }
}
