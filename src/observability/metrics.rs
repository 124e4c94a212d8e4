//! Metrics collection and exposition.
//!
//! # Metrics
//! - `edge_requests_total` (counter): forwarded requests by method, status
//! - `edge_request_duration_seconds` (histogram): forward latency
//! - `edge_preflight_total` (counter): OPTIONS requests answered locally
//! - `edge_upstream_errors_total` (counter): upstream failures by reason
//! - `backend_compilations_total` (counter): compile outcomes
//! - `backend_compile_duration_seconds` (histogram): compiler wall time

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with an HTTP listener on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a request relayed to the upstream.
pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "edge_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("edge_request_duration_seconds", "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

/// Record a preflight answered by the edge.
pub fn record_preflight() {
    counter!("edge_preflight_total").increment(1);
}

/// Record an upstream failure (`unreachable`, `timeout`, `overloaded`).
pub fn record_upstream_error(reason: &'static str) {
    counter!("edge_upstream_errors_total", "reason" => reason).increment(1);
}

/// Record a finished compilation (`success`, `failure`, `error`).
pub fn record_compilation(outcome: &'static str, start: Instant) {
    counter!("backend_compilations_total", "outcome" => outcome).increment(1);
    histogram!("backend_compile_duration_seconds").record(start.elapsed().as_secs_f64());
}
