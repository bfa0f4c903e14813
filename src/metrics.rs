//! Prometheus metrics for the engine.
//!
//! Covers:
//! - WebSocket feed throughput, decode failures and reconnects
//! - Signal cycle latency
//! - Pair lifecycle (start, increase, stop) and skipped allocations
//! - Exchange REST query latency and failures

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{debug, info, warn};

// === Metric Name Constants ===

/// WebSocket message latency metric name.
pub const METRIC_WS_MESSAGE_LATENCY: &str = "ws_message_latency_ms";
/// Signal cycle latency metric name.
pub const METRIC_SIGNAL_CYCLE_LATENCY: &str = "signal_cycle_latency_ms";
/// Exchange query latency metric name.
pub const METRIC_HTTP_REQUEST_LATENCY: &str = "http_request_latency_ms";
/// WebSocket messages received counter metric name.
pub const METRIC_WS_MESSAGES_RECEIVED: &str = "ws_messages_received_total";
/// Undecodable WebSocket payloads counter metric name.
pub const METRIC_WS_DECODE_ERRORS: &str = "ws_decode_errors_total";
/// WebSocket reconnects counter metric name.
pub const METRIC_WS_RECONNECTS: &str = "ws_reconnects_total";
/// Pairs opened counter metric name.
pub const METRIC_PAIRS_STARTED: &str = "pairs_started_total";
/// Pair size increases counter metric name.
pub const METRIC_PAIRS_INCREASED: &str = "pairs_increased_total";
/// Pairs closed counter metric name.
pub const METRIC_PAIRS_STOPPED: &str = "pairs_stopped_total";
/// Skipped allocation batches counter metric name.
pub const METRIC_ALLOCATIONS_SKIPPED: &str = "allocations_skipped_total";
/// Failed exchange queries counter metric name.
pub const METRIC_EXCHANGE_QUERY_FAILURES: &str = "exchange_query_failures_total";
/// Open pairs gauge metric name.
pub const METRIC_OPEN_PAIRS: &str = "open_pairs";

/// Initialize all metric descriptions.
/// Call this once at startup to register metrics with descriptions.
pub fn init_metrics() {
    describe_histogram!(
        METRIC_WS_MESSAGE_LATENCY,
        "WebSocket message processing latency in milliseconds"
    );
    describe_histogram!(
        METRIC_SIGNAL_CYCLE_LATENCY,
        "Time to evaluate every tracked pair in milliseconds"
    );
    describe_histogram!(
        METRIC_HTTP_REQUEST_LATENCY,
        "Exchange REST request latency in milliseconds"
    );

    describe_counter!(
        METRIC_WS_MESSAGES_RECEIVED,
        "Total number of WebSocket messages received"
    );
    describe_counter!(
        METRIC_WS_DECODE_ERRORS,
        "Total number of WebSocket payloads that could not be decoded"
    );
    describe_counter!(
        METRIC_WS_RECONNECTS,
        "Total number of WebSocket reconnections"
    );
    describe_counter!(METRIC_PAIRS_STARTED, "Total number of pairs opened");
    describe_counter!(
        METRIC_PAIRS_INCREASED,
        "Total number of size increases on open pairs"
    );
    describe_counter!(METRIC_PAIRS_STOPPED, "Total number of pairs closed");
    describe_counter!(
        METRIC_ALLOCATIONS_SKIPPED,
        "Total number of allocation batches skipped for lack of capital"
    );
    describe_counter!(
        METRIC_EXCHANGE_QUERY_FAILURES,
        "Total number of failed exchange queries"
    );
    describe_gauge!(METRIC_OPEN_PAIRS, "Number of pairs holding a position");

    debug!("Metrics initialized");
}

/// Serve Prometheus metrics on `addr`. Failure is logged and the engine runs
/// without an exporter.
pub fn install_prometheus_exporter(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => info!(addr = %addr, "Prometheus exporter listening"),
        Err(e) => warn!(addr = %addr, error = %e, "Failed to start Prometheus exporter"),
    }
}

/// Record WebSocket message processing latency.
pub fn record_ws_message_latency(start: Instant) {
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    histogram!(METRIC_WS_MESSAGE_LATENCY).record(latency_ms);
}

/// Record exchange REST request latency.
pub fn record_http_latency(start: Instant, endpoint: &str) {
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    histogram!(METRIC_HTTP_REQUEST_LATENCY, "endpoint" => endpoint.to_string()).record(latency_ms);
}

/// Increment WebSocket messages received counter.
pub fn inc_ws_messages_received() {
    counter!(METRIC_WS_MESSAGES_RECEIVED).increment(1);
}

/// Increment undecodable payload counter.
pub fn inc_ws_decode_errors() {
    counter!(METRIC_WS_DECODE_ERRORS).increment(1);
}

/// Increment WebSocket reconnects counter.
pub fn inc_ws_reconnects() {
    counter!(METRIC_WS_RECONNECTS).increment(1);
}

/// Increment pairs started counter.
pub fn inc_pairs_started() {
    counter!(METRIC_PAIRS_STARTED).increment(1);
}

/// Increment pairs increased counter.
pub fn inc_pairs_increased() {
    counter!(METRIC_PAIRS_INCREASED).increment(1);
}

/// Increment pairs stopped counter, labelled by stop reason.
pub fn inc_pairs_stopped(reason: &'static str) {
    counter!(METRIC_PAIRS_STOPPED, "reason" => reason).increment(1);
}

/// Increment skipped allocations counter.
pub fn inc_allocations_skipped() {
    counter!(METRIC_ALLOCATIONS_SKIPPED).increment(1);
}

/// Increment exchange query failures counter.
pub fn inc_exchange_query_failures(endpoint: &'static str) {
    counter!(METRIC_EXCHANGE_QUERY_FAILURES, "endpoint" => endpoint).increment(1);
}

/// Set the open pairs gauge.
pub fn set_open_pairs(count: usize) {
    gauge!(METRIC_OPEN_PAIRS).set(count as f64);
}

/// RAII guard for timing operations.
/// Automatically records latency when dropped.
pub struct LatencyTimer {
    start: Instant,
    metric_name: &'static str,
}

impl LatencyTimer {
    /// Create a new latency timer for the given metric.
    pub fn new(metric_name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            metric_name,
        }
    }

    /// Get elapsed time in milliseconds (without recording).
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        histogram!(self.metric_name).record(self.elapsed_ms());
    }
}

/// Create a latency timer for one signal cycle.
pub fn timer_signal_cycle() -> LatencyTimer {
    LatencyTimer::new(METRIC_SIGNAL_CYCLE_LATENCY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn latency_timer_measures_time() {
        let timer = LatencyTimer::new("test_metric");
        sleep(Duration::from_millis(10));
        assert!(timer.elapsed_ms() >= 9.0);
    }

    #[test]
    fn helpers_work_without_a_recorder() {
        inc_pairs_stopped("funding");
        set_open_pairs(3);
        record_ws_message_latency(Instant::now());
        drop(timer_signal_cycle());
    }
}
