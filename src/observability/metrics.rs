//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by method, status, mode
//! - `proxy_request_duration_seconds` (histogram): latency by mode
//! - `proxy_follow_up_fetches_total` (counter): follow-up fetches by outcome
//!
//! `mode` is `passthrough`, `projected`, `multipart` or `error`. For a
//! multipart response the duration covers the time to the response head,
//! not the streamed body.
//!
//! Recording without an installed exporter is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| e.to_string())?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_request(method: &str, status: u16, mode: &'static str, start: Instant) {
    metrics::counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "mode" => mode
    )
    .increment(1);
    metrics::histogram!("proxy_request_duration_seconds", "mode" => mode)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_follow_up(outcome: &'static str) {
    metrics::counter!("proxy_follow_up_fetches_total", "outcome" => outcome).increment(1);
}
