//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by method, status
//! - `proxy_request_duration_seconds` (histogram): latency distribution
//! - `proxy_rate_limited_total` (counter): admission denials
//! - `proxy_origin_errors_total` (counter): forwarding failures by kind
//! - `proxy_limiter_clients` (gauge): client keys currently tracked
//! - `proxy_limiter_evictions_total` (counter): buckets removed by the sweep
//!
//! Recording is a no-op until a recorder is installed.

use std::net::SocketAddr;
use std::time::Instant;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    metrics::counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("proxy_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited() {
    metrics::counter!("proxy_rate_limited_total").increment(1);
}

pub fn record_origin_error(kind: &'static str) {
    metrics::counter!("proxy_origin_errors_total", "kind" => kind).increment(1);
}

pub fn record_tracked_clients(count: usize) {
    metrics::gauge!("proxy_limiter_clients").set(count as f64);
}

pub fn record_evictions(count: usize) {
    metrics::counter!("proxy_limiter_evictions_total").increment(count as u64);
}
