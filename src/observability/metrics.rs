use std::time::Instant;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

// ---------------------------------------------------------------------------
// Metrics catalog
// ---------------------------------------------------------------------------

/// Register all metric descriptors at startup.
///
/// This must be called once before any metrics are recorded.
/// Descriptors provide human-readable descriptions for Prometheus.
pub fn describe_all_metrics() {
    // -- HTTP --
    describe_counter!(
        "seekbridge_http_requests_total",
        "Stream and link requests by route and status"
    );

    // -- Stream sessions --
    describe_gauge!(
        "seekbridge_stream_sessions_active",
        "Stream sessions currently open"
    );
    describe_counter!(
        "seekbridge_stream_sessions_closed_total",
        "Closed stream sessions by close reason"
    );
    describe_counter!(
        "seekbridge_stream_bytes_sent_total",
        "Body bytes handed to client connections"
    );
    describe_histogram!(
        "seekbridge_stream_session_duration_seconds",
        "Session lifetime from lookup to close"
    );

    // -- Remote store --
    describe_histogram!(
        "seekbridge_remote_lookup_duration_seconds",
        "Object lookup latency"
    );
    describe_counter!(
        "seekbridge_remote_lookup_errors_total",
        "Object lookups that failed"
    );
    describe_counter!(
        "seekbridge_remote_fetch_total",
        "Bounded fetch calls by location shape"
    );
    describe_counter!(
        "seekbridge_remote_fetch_bytes_total",
        "Bytes returned by bounded fetch calls"
    );
    describe_histogram!(
        "seekbridge_remote_fetch_duration_seconds",
        "Bounded fetch latency"
    );
    describe_counter!(
        "seekbridge_remote_fetch_errors_total",
        "Bounded fetch calls that failed"
    );
    describe_counter!(
        "seekbridge_remote_fetch_retries_total",
        "Bounded fetch retries"
    );

    // -- System --
    describe_gauge!("seekbridge_uptime_seconds", "Process uptime");
    describe_counter!(
        "seekbridge_panic_total",
        "Total panics caught (should always be 0)"
    );
    describe_gauge!(
        "seekbridge_shutdown_in_progress",
        "1 if graceful shutdown is in progress, 0 otherwise"
    );
}

// ---------------------------------------------------------------------------
// Metric recording helpers
// ---------------------------------------------------------------------------

// -- HTTP --

pub fn inc_http_request(route: &str, status: u16) {
    counter!("seekbridge_http_requests_total", "route" => route.to_string(), "status" => status_class(status)).increment(1);
}

// -- Stream sessions --

pub fn inc_sessions_active() {
    gauge!("seekbridge_stream_sessions_active").increment(1.0);
}

pub fn dec_sessions_active() {
    gauge!("seekbridge_stream_sessions_active").decrement(1.0);
}

pub fn inc_session_closed(reason: &str) {
    counter!("seekbridge_stream_sessions_closed_total", "reason" => reason.to_string())
        .increment(1);
}

pub fn add_stream_bytes_sent(bytes: u64) {
    counter!("seekbridge_stream_bytes_sent_total").increment(bytes);
}

pub fn record_session_duration(seconds: f64) {
    histogram!("seekbridge_stream_session_duration_seconds").record(seconds);
}

// -- Remote store --

pub fn record_lookup_duration(seconds: f64) {
    histogram!("seekbridge_remote_lookup_duration_seconds").record(seconds);
}

pub fn inc_lookup_error() {
    counter!("seekbridge_remote_lookup_errors_total").increment(1);
}

pub fn inc_remote_fetch(location: &str) {
    counter!("seekbridge_remote_fetch_total", "location" => location.to_string()).increment(1);
}

pub fn add_remote_fetch_bytes(bytes: u64) {
    counter!("seekbridge_remote_fetch_bytes_total").increment(bytes);
}

pub fn record_remote_fetch_duration(location: &str, seconds: f64) {
    histogram!("seekbridge_remote_fetch_duration_seconds", "location" => location.to_string())
        .record(seconds);
}

pub fn inc_remote_fetch_error(location: &str) {
    counter!("seekbridge_remote_fetch_errors_total", "location" => location.to_string())
        .increment(1);
}

pub fn inc_remote_fetch_retry() {
    counter!("seekbridge_remote_fetch_retries_total").increment(1);
}

// -- System --

pub fn set_uptime_seconds(seconds: f64) {
    gauge!("seekbridge_uptime_seconds").set(seconds);
}

pub fn inc_panic_total() {
    counter!("seekbridge_panic_total").increment(1);
}

pub fn set_shutdown_in_progress(in_progress: bool) {
    gauge!("seekbridge_shutdown_in_progress").set(if in_progress { 1.0 } else { 0.0 });
}

// ---------------------------------------------------------------------------
// Status code bucket helper
// ---------------------------------------------------------------------------

/// Collapse a status code into its class label (`2xx`, `4xx`, ...).
pub fn status_class(status: u16) -> &'static str {
    match status {
        100..=199 => "1xx",
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        _ => "5xx",
    }
}

// ---------------------------------------------------------------------------
// Uptime tracking task
// ---------------------------------------------------------------------------

/// Spawn a background task that updates the uptime gauge every second.
pub async fn run_uptime_task(start_time: Instant, cancel: tokio_util::sync::CancellationToken) {
    let interval = std::time::Duration::from_secs(1);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(interval) => {
                set_uptime_seconds(start_time.elapsed().as_secs_f64());
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Prometheus recorder installation
// ---------------------------------------------------------------------------

/// Install the Prometheus metrics recorder.
///
/// This sets up the global `metrics` recorder backed by `metrics-exporter-prometheus`.
/// Returns a handle that can render the metrics as Prometheus text exposition format.
pub fn install_prometheus_recorder(
) -> Result<metrics_exporter_prometheus::PrometheusHandle, metrics_exporter_prometheus::BuildError>
{
    metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()
}
