//! Metrics and telemetry for the federation layer
//!
//! Prometheus metrics for remote find/fetch traffic, coalescing
//! effectiveness, backend failures and coordinator size.
//!
//! Recording is process-wide and can be switched off with
//! `monitoring.metrics_enabled = false` (see [`configure`]); the `record_*`
//! helpers are then no-ops.

use crate::config::MonitoringConfig;
use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_histogram_vec, Counter,
    CounterVec, Encoder, Gauge, HistogramVec, TextEncoder,
};
use std::sync::atomic::{AtomicBool, Ordering};

static METRICS_ENABLED: AtomicBool = AtomicBool::new(true);

lazy_static! {
    // === Request Counters ===

    /// Find requests by outcome (sent, cached, error)
    pub static ref FIND_REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "remote_find_requests_total",
        "Remote find requests by outcome",
        &["status"]
    ).unwrap();

    /// Fetch calls by outcome (sent, fast_path, coalesced, error)
    pub static ref FETCH_REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "remote_fetch_requests_total",
        "Remote fetch calls by outcome",
        &["status"]
    ).unwrap();

    /// Failures attributed to a backend
    pub static ref BACKEND_FAILURES_TOTAL: CounterVec = register_counter_vec!(
        "remote_backend_failures_total",
        "Failures recorded against a backend",
        &["backend"]
    ).unwrap();

    // === Latency Histograms ===

    /// Bulk fetch round trip
    pub static ref FETCH_DURATION: HistogramVec = register_histogram_vec!(
        "remote_fetch_duration_seconds",
        "Bulk fetch latency in seconds",
        &["status"],
        vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]
    ).unwrap();

    // === Coordinator ===

    /// Tracked fetch keys
    pub static ref COORDINATOR_ENTRIES: Gauge = register_gauge!(
        "remote_coordinator_entries",
        "Fetch keys tracked by the request coordinator"
    ).unwrap();

    /// Entries removed by eviction sweeps
    pub static ref COORDINATOR_EVICTIONS: Counter = register_counter!(
        "remote_coordinator_evictions_total",
        "Coordinator entries evicted by age"
    ).unwrap();
}

/// Apply the monitoring configuration to metric recording
pub fn configure(config: &MonitoringConfig) {
    set_enabled(config.metrics_enabled);
}

/// Turn recording on or off for the whole process
pub fn set_enabled(enabled: bool) {
    METRICS_ENABLED.store(enabled, Ordering::Relaxed);
}

/// True if the `record_*` helpers record
#[inline]
pub fn is_enabled() -> bool {
    METRICS_ENABLED.load(Ordering::Relaxed)
}

/// Get metrics in Prometheus text format
pub fn gather_metrics() -> Result<String, String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| format!("Failed to encode metrics: {}", e))?;

    String::from_utf8(buffer).map_err(|e| format!("Metrics contain invalid UTF-8: {}", e))
}

/// Record a find outcome
#[inline]
pub fn record_find(status: &str) {
    if !is_enabled() {
        return;
    }
    FIND_REQUESTS_TOTAL.with_label_values(&[status]).inc();
}

/// Record a fetch outcome
#[inline]
pub fn record_fetch(status: &str) {
    if !is_enabled() {
        return;
    }
    FETCH_REQUESTS_TOTAL.with_label_values(&[status]).inc();
}

/// Record a bulk fetch round trip
#[inline]
pub fn record_fetch_duration(duration_secs: f64, success: bool) {
    if !is_enabled() {
        return;
    }
    let status = if success { "success" } else { "error" };
    FETCH_DURATION.with_label_values(&[status]).observe(duration_secs);
}

/// Record a backend failure
#[inline]
pub fn record_backend_failure(backend: &str) {
    if !is_enabled() {
        return;
    }
    BACKEND_FAILURES_TOTAL.with_label_values(&[backend]).inc();
}

/// Update coordinator size
#[inline]
pub fn update_coordinator_entries(count: usize) {
    if !is_enabled() {
        return;
    }
    COORDINATOR_ENTRIES.set(count as f64);
}

/// Record evicted coordinator entries
#[inline]
pub fn record_evictions(count: usize) {
    if !is_enabled() {
        return;
    }
    COORDINATOR_EVICTIONS.inc_by(count as f64);
}
