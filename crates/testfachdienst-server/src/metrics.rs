// Metrics module for observability
// Provides counters, gauges, and histograms exposed on the Prometheus endpoint

use std::time::{Duration, Instant};

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the global Prometheus recorder and describe all metrics
///
/// Must be called once, before any metric is recorded.
pub fn install_prometheus_recorder() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    init_metrics();
    Ok(handle)
}

/// Initialize all metric descriptions
pub fn init_metrics() {
    describe_counter!(
        "http_requests_total",
        "Total number of HTTP requests received"
    );
    describe_histogram!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds"
    );
    describe_counter!(
        "http_requests_errors_total",
        "Total number of HTTP request errors"
    );

    describe_counter!(
        "erezept_operations_total",
        "Total number of prescription operations by channel and outcome"
    );

    describe_gauge!(
        "websocket_sessions_active",
        "Number of open STOMP sessions"
    );
    describe_counter!(
        "stomp_frames_total",
        "Total number of STOMP frames received"
    );
    describe_counter!(
        "websocket_queue_overflows_total",
        "STOMP sessions closed because their outbound queue was full"
    );

    describe_counter!("job_runs_total", "Total number of recurring job runs");
    describe_histogram!(
        "job_run_duration_seconds",
        "Recurring job run duration in seconds"
    );

    tracing::info!("Metrics initialized");
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    counter!("http_requests_total", "method" => method.to_string(), "path" => path.to_string(), "status" => status.to_string()).increment(1);
    histogram!("http_request_duration_seconds", "method" => method.to_string(), "path" => path.to_string()).record(duration_secs);

    if status >= 400 {
        counter!("http_requests_errors_total", "method" => method.to_string(), "path" => path.to_string(), "status" => status.to_string()).increment(1);
    }
}

/// Record a prescription operation, `channel` is "rest" or "websocket"
pub fn record_erezept_operation(channel: &'static str, operation: &'static str, outcome: &str) {
    counter!("erezept_operations_total", "channel" => channel, "operation" => operation, "outcome" => outcome.to_string()).increment(1);
}

pub fn record_stomp_frame(command: &'static str) {
    counter!("stomp_frames_total", "command" => command).increment(1);
}

pub fn set_websocket_sessions(count: usize) {
    gauge!("websocket_sessions_active").set(count as f64);
}

pub fn record_websocket_overflow() {
    counter!("websocket_queue_overflows_total").increment(1);
}

/// Record a run of a recurring job
pub fn record_job_run(job_id: &str, success: bool, duration: Duration) {
    let outcome = if success { "success" } else { "failure" };
    counter!("job_runs_total", "job" => job_id.to_string(), "outcome" => outcome).increment(1);
    histogram!("job_run_duration_seconds", "job" => job_id.to_string())
        .record(duration.as_secs_f64());
}

/// Timer helper for measuring operation duration
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
