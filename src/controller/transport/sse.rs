//! SSE workload settings.
//!
//! Legacy HTTP+SSE servers hold long-lived streams open. While SSE is the
//! effective protocol the workload gets a longer termination grace period, a
//! rolling update that never takes a pod down before its replacement is
//! ready, and optionally ClientIP session affinity.

use crate::crd::{ResolvedTransportStatus, SseConfig, TransportProtocol};

/// Settings applied to the workload while SSE is in effect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseSettings {
    pub termination_grace_period_seconds: i64,
    /// Set only when session affinity is opted into
    pub session_affinity_timeout_seconds: Option<i32>,
}

/// Protocol the workload should be shaped for
///
/// A declared protocol wins. `auto` defers to the protocol recorded by
/// detection, regardless of whether its settings were confirmed applied yet.
pub fn effective_protocol(
    declared: TransportProtocol,
    resolved: Option<&ResolvedTransportStatus>,
) -> Option<TransportProtocol> {
    match declared {
        TransportProtocol::Auto => resolved.map(|r| r.protocol),
        other => Some(other),
    }
}

/// SSE settings for a declared/resolved protocol pair, none when not SSE
pub fn sse_settings(
    declared: TransportProtocol,
    resolved: Option<TransportProtocol>,
    config: &SseConfig,
) -> Option<SseSettings> {
    let is_sse = match declared {
        TransportProtocol::Sse => true,
        TransportProtocol::Auto => resolved == Some(TransportProtocol::Sse),
        TransportProtocol::StreamableHttp => false,
    };
    is_sse.then(|| SseSettings {
        termination_grace_period_seconds: config.termination_grace_period_seconds,
        session_affinity_timeout_seconds: config
            .session_affinity
            .then_some(config.session_affinity_timeout_seconds),
    })
}
