//! Prometheus metrics for the sync engine
//!
//! Provides observability metrics for monitoring scheduled and on-demand runs.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram, CounterVec, Encoder, Gauge,
    Histogram, TextEncoder,
};

lazy_static! {
    /// Histogram: run duration (seconds)
    pub static ref RUN_DURATION: Histogram = register_histogram!(
        "sheetsync_run_duration_seconds",
        "Duration of sync runs",
        vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0]
    )
    .expect("Failed to create run_duration metric");

    /// Counter: runs by outcome (success/failed/skipped)
    pub static ref RUNS: CounterVec = register_counter_vec!(
        "sheetsync_runs_total",
        "Total sync runs by outcome",
        &["outcome"]
    )
    .expect("Failed to create runs metric");

    /// Counter: rows by outcome (created/updated/skipped/error)
    pub static ref ROWS: CounterVec = register_counter_vec!(
        "sheetsync_rows_total",
        "Total processed rows by outcome",
        &["outcome"]
    )
    .expect("Failed to create rows metric");

    /// Counter: API errors by operation
    pub static ref API_ERRORS: CounterVec = register_counter_vec!(
        "sheetsync_api_errors_total",
        "Total API errors by operation",
        &["operation", "integration"]
    )
    .expect("Failed to create api_errors metric");

    /// Gauge: unix timestamp of the last finished run
    pub static ref LAST_RUN_TIMESTAMP: Gauge = register_gauge!(
        "sheetsync_last_run_timestamp_seconds",
        "Unix timestamp of the last finished run"
    )
    .expect("Failed to create last_run_timestamp metric");

    /// Gauge: service health status (1 = healthy, 0 = unhealthy)
    pub static ref HEALTH_STATUS: Gauge = register_gauge!(
        "sheetsync_health_status",
        "Service health status (1 = healthy, 0 = unhealthy)"
    )
    .expect("Failed to create health_status metric");
}

/// Record a finished run
pub fn record_run(outcome: &str, duration_secs: f64) {
    RUNS.with_label_values(&[outcome]).inc();
    RUN_DURATION.observe(duration_secs);
    LAST_RUN_TIMESTAMP.set(chrono::Utc::now().timestamp() as f64);
}

/// Record a run rejected by the single-flight guard
pub fn record_run_skipped() {
    RUNS.with_label_values(&["skipped"]).inc();
}

/// Record a processed row
pub fn record_row(outcome: &str) {
    ROWS.with_label_values(&[outcome]).inc();
}

/// Increment API error counter
pub fn record_api_error(operation: &str, integration: &str) {
    API_ERRORS
        .with_label_values(&[operation, integration])
        .inc();
}

/// Set health status
pub fn set_health_status(healthy: bool) {
    HEALTH_STATUS.set(if healthy { 1.0 } else { 0.0 });
}

/// Encode all metrics as Prometheus text format
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
