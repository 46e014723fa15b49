//! Prometheus metrics for pulse.
//!
//! Covers:
//! - Request attempts (duration, outcome, retries)
//! - Event stream state, reconnects, traffic and delivery latency
//! - Cache invalidations triggered by push notifications
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. If registration fails,
//! it indicates a fatal configuration error (e.g., duplicate metric names)
//! that should cause an immediate crash at startup rather than silent failure.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, Encoder,
    GaugeVec, HistogramVec, TextEncoder,
};

use crate::error::{TelemetryError, TelemetryResult};

/// Request attempt duration in milliseconds.
pub static REQUEST_DURATION_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "pulse_request_duration_ms",
        "Request attempt duration in milliseconds",
        &["method"],
        vec![5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0]
    )
    .unwrap()
});

/// Request attempts by outcome.
/// Labels: outcome (success/protocol_error/transport_error/timeout)
pub static REQUEST_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pulse_request_total",
        "Total request attempts",
        &["method", "outcome"]
    )
    .unwrap()
});

/// Retries scheduled after a failed attempt.
pub static REQUEST_RETRY_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pulse_request_retry_total",
        "Total request retries",
        &["method"]
    )
    .unwrap()
});

/// Event stream state machine current state.
/// Labels: state (disconnected/connecting/connected/reconnecting/failed)
pub static STREAM_STATE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "pulse_stream_state",
        "Event stream state machine current state (1=active, 0=inactive)",
        &["state"]
    )
    .unwrap()
});

/// Reconnection attempts.
pub static STREAM_RECONNECT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pulse_stream_reconnect_total",
        "Total event stream reconnection attempts",
        &["reason"]
    )
    .unwrap()
});

/// Frames by direction (inbound/outbound).
pub static STREAM_MESSAGES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pulse_stream_messages_total",
        "Total event stream frames",
        &["direction"]
    )
    .unwrap()
});

/// Inbound frames dropped before dispatch.
pub static STREAM_DROPPED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pulse_stream_dropped_frames_total",
        "Inbound frames dropped as structurally invalid",
        &["reason"]
    )
    .unwrap()
});

/// Sender timestamp to receipt, in milliseconds.
pub static STREAM_LATENCY_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "pulse_stream_latency_ms",
        "Event delivery latency in milliseconds (includes clock skew)",
        &["kind"],
        vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 5000.0]
    )
    .unwrap()
});

/// Cache invalidations triggered by push notifications.
pub static CACHE_INVALIDATIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pulse_cache_invalidations_total",
        "Cache invalidations triggered by stream events",
        &["key"]
    )
    .unwrap()
});

const STREAM_STATES: [&str; 5] = [
    "disconnected",
    "connecting",
    "connected",
    "reconnecting",
    "failed",
];

/// Metrics helper functions.
pub struct Metrics;

impl Metrics {
    /// Record one finished request attempt.
    pub fn request_attempt(method: &str, outcome: &str, duration_ms: f64) {
        REQUEST_DURATION_MS
            .with_label_values(&[method])
            .observe(duration_ms);
        REQUEST_TOTAL.with_label_values(&[method, outcome]).inc();
    }

    /// Record a scheduled retry.
    pub fn request_retry(method: &str) {
        REQUEST_RETRY_TOTAL.with_label_values(&[method]).inc();
    }

    /// Set stream state. Only the active state is 1, all others 0.
    pub fn stream_state_set(state: &str) {
        for s in &STREAM_STATES {
            STREAM_STATE.with_label_values(&[s]).set(0.0);
        }
        STREAM_STATE.with_label_values(&[state]).set(1.0);
    }

    /// Record a reconnection attempt.
    pub fn stream_reconnect(reason: &str) {
        STREAM_RECONNECT_TOTAL.with_label_values(&[reason]).inc();
    }

    /// Record an accepted inbound frame.
    pub fn stream_received(kind: &str, latency_ms: f64) {
        STREAM_MESSAGES_TOTAL.with_label_values(&["inbound"]).inc();
        STREAM_LATENCY_MS
            .with_label_values(&[kind])
            .observe(latency_ms);
    }

    /// Record a transmitted frame.
    pub fn stream_sent() {
        STREAM_MESSAGES_TOTAL.with_label_values(&["outbound"]).inc();
    }

    /// Record a dropped inbound frame.
    pub fn stream_dropped(reason: &str) {
        STREAM_DROPPED_TOTAL.with_label_values(&[reason]).inc();
    }

    /// Record a cache invalidation.
    pub fn cache_invalidated(key: &str) {
        CACHE_INVALIDATIONS_TOTAL.with_label_values(&[key]).inc();
    }

    /// Render the default registry in the Prometheus text format.
    pub fn render() -> TelemetryResult<String> {
        let mut buf = Vec::new();
        TextEncoder::new()
            .encode(&prometheus::gather(), &mut buf)
            .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
        String::from_utf8(buf).map_err(|e| TelemetryError::Metrics(e.to_string()))
    }
}
