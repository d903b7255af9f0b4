//! Metrics collection and exposition.
//!
//! # Metrics
//! - `edge_requests_total` (counter): requests by method, status, target
//! - `edge_request_duration_seconds` (histogram): latency distribution
//! - `edge_routing_loops_total` (counter): requests aborted by the phase limit
//! - `edge_middleware_invocations_total` (counter): middleware calls by path, outcome
//! - `edge_deployment_reloads_total` (counter): manifest reloads by outcome

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a completed request.
///
/// `target` is a coarse label (`route`, `image`, `cache`) rather than the path,
/// to keep label cardinality bounded.
pub fn record_request(method: &str, status: u16, target: &'static str, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
        ("target", target.to_string()),
    ];
    counter!("edge_requests_total", &labels).increment(1);
    histogram!("edge_request_duration_seconds", &labels).record(start.elapsed().as_secs_f64());
}

pub fn record_routing_loop() {
    counter!("edge_routing_loops_total").increment(1);
}

pub fn record_middleware(path: &str, outcome: &'static str) {
    counter!(
        "edge_middleware_invocations_total",
        "path" => path.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_deployment_reload(ok: bool) {
    let outcome = if ok { "ok" } else { "error" };
    counter!("edge_deployment_reloads_total", "outcome" => outcome).increment(1);
}
