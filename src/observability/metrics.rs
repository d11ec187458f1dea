//! Metrics collection and exposition.
//!
//! # Metrics
//! - `balancer_requests_total` (counter): forwarded requests by backend, status
//! - `balancer_request_duration_seconds` (histogram): latency per backend
//! - `balancer_no_live_backend_total` (counter): requests refused with 503
//! - `balancer_backend_alive` (gauge): 1=alive, 0=dead
//!
//! Without an installed recorder every call here is a no-op.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter")
        }
    }
}

pub fn record_request(backend: &str, status: u16, start: Instant) {
    counter!(
        "balancer_requests_total",
        "backend" => backend.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("balancer_request_duration_seconds", "backend" => backend.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_no_live_backend() {
    counter!("balancer_no_live_backend_total").increment(1);
}

pub fn record_backend_alive(backend: &str, alive: bool) {
    gauge!("balancer_backend_alive", "backend" => backend.to_string())
        .set(if alive { 1.0 } else { 0.0 });
}
