//! Prometheus metrics for the trigger keeper.
//!
//! Every series is labelled with the keeper name (`bot`) so several keepers can
//! share one process and one registry.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()`. A registration failure means duplicate
//! metric names, which is a startup configuration error. These panics can only
//! happen during static initialization.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, Encoder,
    GaugeVec, HistogramVec, TextEncoder,
};

use crate::error::{TelemetryError, TelemetryResult};

// =========================================================================
// Scan cycle
// =========================================================================

/// Duration of one full scan cycle in milliseconds.
pub static CYCLE_DURATION_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "keeper_cycle_duration_ms",
        "Duration of a full scan cycle in milliseconds",
        &["bot"],
        vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0]
    )
    .unwrap()
});

/// Ticks skipped because the previous cycle was still running.
pub static MUTEX_BUSY_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "keeper_mutex_busy_total",
        "Scan ticks skipped because a cycle was already running",
        &["bot"]
    )
    .unwrap()
});

/// Lock acquisitions that hit their timeout.
/// Labels: bot, lock
pub static LOCK_TIMEOUT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "keeper_lock_timeout_total",
        "Lock acquisitions that timed out",
        &["bot", "lock"]
    )
    .unwrap()
});

/// Unix timestamp (ms) of the last completed cycle.
pub static LAST_CYCLE_TIMESTAMP_MS: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "keeper_last_cycle_timestamp_ms",
        "Unix timestamp in milliseconds of the last completed scan cycle",
        &["bot"]
    )
    .unwrap()
});

/// Market scans aborted by a price, listing or snapshot failure.
/// Labels: bot, market_kind
pub static MARKET_SCAN_FAILED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "keeper_market_scan_failed_total",
        "Market scans aborted by an isolated failure",
        &["bot", "market_kind"]
    )
    .unwrap()
});

// =========================================================================
// Triggers
// =========================================================================

/// Trigger submissions dispatched.
/// Labels: bot, market_kind
pub static TRIGGER_SUBMITTED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "keeper_trigger_submitted_total",
        "Trigger submissions dispatched",
        &["bot", "market_kind"]
    )
    .unwrap()
});

/// Trigger submissions that landed.
/// Labels: bot, market_kind
pub static TRIGGER_SUCCESS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "keeper_trigger_success_total",
        "Trigger submissions that succeeded",
        &["bot", "market_kind"]
    )
    .unwrap()
});

/// Failed trigger submissions by classified error code.
/// Labels: code, identity, bot
pub static TRIGGER_ERROR_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "keeper_trigger_error_total",
        "Failed trigger submissions by error code",
        &["code", "identity", "bot"]
    )
    .unwrap()
});

/// Candidates skipped because their cooldown entry was still fresh.
pub static COOLDOWN_SKIPPED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "keeper_cooldown_skipped_total",
        "Trigger candidates skipped by the per-order cooldown",
        &["bot"]
    )
    .unwrap()
});

/// Trigger submissions currently in flight.
pub static TRIGGERS_IN_FLIGHT: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "keeper_triggers_in_flight",
        "Trigger submissions awaiting an outcome",
        &["bot"]
    )
    .unwrap()
});

// =========================================================================
// Account index
// =========================================================================

/// Number of accounts held by the current account index.
pub static ACCOUNT_INDEX_SIZE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "keeper_account_index_size",
        "Accounts held by the current account index",
        &["bot"]
    )
    .unwrap()
});

/// Account index rebuilds.
/// Labels: bot, result (swapped/failed)
pub static ACCOUNT_INDEX_RESYNC_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "keeper_account_index_resync_total",
        "Account index rebuilds by result",
        &["bot", "result"]
    )
    .unwrap()
});

/// Metrics facade for easy access.
pub struct Metrics;

impl Metrics {
    /// Record a completed cycle's duration.
    pub fn cycle_duration(bot: &str, duration_ms: f64) {
        CYCLE_DURATION_MS
            .with_label_values(&[bot])
            .observe(duration_ms);
    }

    /// Record a tick skipped by the single-flight lock.
    pub fn mutex_busy(bot: &str) {
        MUTEX_BUSY_TOTAL.with_label_values(&[bot]).inc();
    }

    /// Record a lock timeout.
    pub fn lock_timeout(bot: &str, lock: &str) {
        LOCK_TIMEOUT_TOTAL.with_label_values(&[bot, lock]).inc();
    }

    /// Record the completion time of a cycle.
    pub fn last_cycle_timestamp(bot: &str, timestamp_ms: f64) {
        LAST_CYCLE_TIMESTAMP_MS
            .with_label_values(&[bot])
            .set(timestamp_ms);
    }

    /// Record an isolated market scan failure.
    pub fn market_scan_failed(bot: &str, market_kind: &str) {
        MARKET_SCAN_FAILED_TOTAL
            .with_label_values(&[bot, market_kind])
            .inc();
    }

    /// Record a dispatched trigger. Increments the in-flight gauge.
    pub fn trigger_submitted(bot: &str, market_kind: &str) {
        TRIGGER_SUBMITTED_TOTAL
            .with_label_values(&[bot, market_kind])
            .inc();
        TRIGGERS_IN_FLIGHT.with_label_values(&[bot]).inc();
    }

    /// Record a successful trigger.
    pub fn trigger_success(bot: &str, market_kind: &str) {
        TRIGGER_SUCCESS_TOTAL
            .with_label_values(&[bot, market_kind])
            .inc();
    }

    /// Record a failed trigger against its error code and submitting identity.
    pub fn trigger_error(code: &str, identity: &str, bot: &str) {
        TRIGGER_ERROR_TOTAL
            .with_label_values(&[code, identity, bot])
            .inc();
    }

    /// Record a trigger outcome being handled. Decrements the in-flight gauge.
    pub fn trigger_completed(bot: &str) {
        TRIGGERS_IN_FLIGHT.with_label_values(&[bot]).dec();
    }

    /// Record a candidate skipped by the cooldown.
    pub fn cooldown_skipped(bot: &str) {
        COOLDOWN_SKIPPED_TOTAL.with_label_values(&[bot]).inc();
    }

    /// Set the current account index size.
    pub fn account_index_size(bot: &str, size: usize) {
        ACCOUNT_INDEX_SIZE
            .with_label_values(&[bot])
            .set(size as f64);
    }

    /// Record an account index rebuild result.
    pub fn account_index_resync(bot: &str, result: &str) {
        ACCOUNT_INDEX_RESYNC_TOTAL
            .with_label_values(&[bot, result])
            .inc();
    }

    /// Encode every registered metric in the Prometheus text format.
    pub fn render() -> TelemetryResult<String> {
        let encoder = TextEncoder::new();
        let families = prometheus::gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&families, &mut buffer)
            .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::Metrics(e.to_string()))
    }
}
