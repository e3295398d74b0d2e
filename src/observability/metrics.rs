//! Metrics collection and exposition.
//!
//! # Metrics
//! - `lb_requests_total` (counter): requests by method, status, backend
//! - `lb_request_duration_seconds` (histogram): dispatch latency
//! - `lb_backend_in_flight` (gauge): reserved slots per backend
//! - `lb_response_write_failures_total` (counter): abandoned responses per backend

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_request(method: &str, status: u16, backend: &str, start: Instant) {
    metrics::counter!(
        "lb_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "backend" => backend.to_string()
    )
    .increment(1);
    metrics::histogram!(
        "lb_request_duration_seconds",
        "method" => method.to_string(),
        "backend" => backend.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}

pub fn in_flight_reserved(backend: &str) {
    metrics::gauge!("lb_backend_in_flight", "backend" => backend.to_string()).increment(1.0);
}

pub fn in_flight_released(backend: &str) {
    metrics::gauge!("lb_backend_in_flight", "backend" => backend.to_string()).decrement(1.0);
}

pub fn record_write_failure(backend: &str) {
    metrics::counter!("lb_response_write_failures_total", "backend" => backend.to_string()).increment(1);
}
