//! Prometheus metrics for the bridge.
//!
//! - `bridge_matrix_events_total{type}` - Matrix events routed by type
//! - `bridge_irc_actions_total{action}` - IRC actions sent by kind
//! - `bridge_errors_total{code}` - Errors caught at the dispatch boundary
//! - `bridge_irc_clients` - IRC client handles alive in the pool

use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

// ========================================================================
// Counters (monotonic increasing)
// ========================================================================

/// Matrix events routed, by event type.
pub static MATRIX_EVENTS: OnceLock<IntCounterVec> = OnceLock::new();

/// IRC actions dispatched, by kind (say, action, notice, topic).
pub static IRC_ACTIONS: OnceLock<IntCounterVec> = OnceLock::new();

/// Errors reported at the router/appservice boundary, by error code.
pub static ERRORS: OnceLock<IntCounterVec> = OnceLock::new();

// ========================================================================
// Gauges (can increase/decrease)
// ========================================================================

/// IRC client handles in the connection pool.
pub static IRC_CLIENTS: OnceLock<IntGauge> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Safe to call more than once; only the first call registers.
pub fn init() {
    let r = registry();

    macro_rules! register {
        ($metric:ident, $init:expr) => {
            if $metric.get().is_none() {
                match $init {
                    Ok(m) => {
                        if let Err(e) = r.register(Box::new(m.clone())) {
                            tracing::warn!(error = %e, concat!("Failed to register metric ", stringify!($metric)));
                        }
                        let _ = $metric.set(m);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, concat!("Failed to create metric ", stringify!($metric)));
                    }
                }
            }
        };
    }

    register!(MATRIX_EVENTS, IntCounterVec::new(Opts::new("bridge_matrix_events_total", "Matrix events routed by type"), &["type"]));
    register!(IRC_ACTIONS, IntCounterVec::new(Opts::new("bridge_irc_actions_total", "IRC actions sent by kind"), &["action"]));
    register!(ERRORS, IntCounterVec::new(Opts::new("bridge_errors_total", "Errors caught at the dispatch boundary"), &["code"]));
    register!(IRC_CLIENTS, IntGauge::new("bridge_irc_clients", "IRC client handles in the pool"));
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

// ============================================================================
// Recording helpers (no-ops until init() has run)
// ============================================================================

#[inline]
pub fn record_event(event_type: &str) {
    if let Some(c) = MATRIX_EVENTS.get() {
        c.with_label_values(&[event_type]).inc();
    }
}

#[inline]
pub fn record_irc_action(action: &str) {
    if let Some(c) = IRC_ACTIONS.get() {
        c.with_label_values(&[action]).inc();
    }
}

#[inline]
pub fn record_error(code: &str) {
    if let Some(c) = ERRORS.get() {
        c.with_label_values(&[code]).inc();
    }
}

#[inline]
pub fn inc_irc_clients() {
    if let Some(g) = IRC_CLIENTS.get() {
        g.inc();
    }
}
