//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_connections_total` (counter): accepted client connections
//! - `proxy_active_connections` (gauge): handlers currently running
//! - `proxy_requests_total` (counter): parsed requests by kind and route
//! - `proxy_parse_errors_total` (counter): malformed request lines
//! - `proxy_connect_failures_total` (counter): unreachable targets by kind
//! - `proxy_tunnel_bytes_total` (counter): relayed bytes by direction
//!
//! Recording is a no-op until a recorder is installed with [`init_metrics`].

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_connection_opened() {
    metrics::counter!("proxy_connections_total").increment(1);
    metrics::gauge!("proxy_active_connections").increment(1.0);
}

pub fn record_connection_closed() {
    metrics::gauge!("proxy_active_connections").decrement(1.0);
}

pub fn record_request(kind: &'static str, route: &'static str) {
    metrics::counter!("proxy_requests_total", "kind" => kind, "route" => route).increment(1);
}

pub fn record_parse_error() {
    metrics::counter!("proxy_parse_errors_total").increment(1);
}

pub fn record_connect_failure(kind: &'static str) {
    metrics::counter!("proxy_connect_failures_total", "kind" => kind).increment(1);
}

pub fn record_tunnel_bytes(direction: &'static str, bytes: u64) {
    metrics::counter!("proxy_tunnel_bytes_total", "direction" => direction).increment(bytes);
}
