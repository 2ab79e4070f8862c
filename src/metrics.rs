use lazy_static::lazy_static;
use prometheus::{
    Encoder, Histogram, IntCounter, IntCounterVec, IntGauge, TextEncoder, register_histogram,
    register_int_counter, register_int_counter_vec, register_int_gauge,
};

use crate::models::Outcome;

lazy_static! {
    pub static ref REQUEST_TOTAL: IntCounter = register_int_counter!(
        "gate_requests_total",
        "Total number of accepted connections"
    )
    .unwrap();
    pub static ref RESPONSES: IntCounterVec = register_int_counter_vec!(
        "gate_responses_total",
        "Responses sent, by outcome",
        &["outcome"]
    )
    .unwrap();
    pub static ref STORE_ERRORS: IntCounter =
        register_int_counter!("gate_store_errors_total", "Counter store failures").unwrap();
    pub static ref CONNECTION_ERRORS: IntCounter = register_int_counter!(
        "gate_connection_errors_total",
        "Connections dropped on I/O failure or timeout"
    )
    .unwrap();
    pub static ref REQUEST_LATENCY: Histogram = register_histogram!(
        "gate_request_latency_seconds",
        "Time from accept to response written"
    )
    .unwrap();
    pub static ref ACTIVE_CONNECTIONS: IntGauge =
        register_int_gauge!("gate_active_connections", "Connections being served").unwrap();
}

pub fn record_outcome(outcome: Outcome) {
    RESPONSES.with_label_values(&[outcome.as_str()]).inc();
}

// Prometheus text exposition of the default registry
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!(error = %e, "failed to encode metrics");
    }
    String::from_utf8(buffer).unwrap_or_default()
}
