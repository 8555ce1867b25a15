//! Prometheus metrics for dispatched resource operations.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};
use std::time::Duration;

/// Counter for dispatched operations by resource type, operation and outcome.
pub static OPERATIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "consul_provider_operations_total",
        "Total number of dispatched resource operations",
        &["resource", "operation", "outcome"]
    )
    .expect("Failed to register OPERATIONS")
});

/// Histogram for operation duration by resource type and operation.
pub static OPERATION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "consul_provider_operation_duration_seconds",
        "Resource operation duration in seconds",
        &["resource", "operation"],
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .expect("Failed to register OPERATION_DURATION")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&OPERATIONS);
    Lazy::force(&OPERATION_DURATION);
}

pub fn record_operation(resource: &str, operation: &str, outcome: &str, elapsed: Duration) {
    OPERATIONS
        .with_label_values(&[resource, operation, outcome])
        .inc();
    OPERATION_DURATION
        .with_label_values(&[resource, operation])
        .observe(elapsed.as_secs_f64());
}

/// Render every registered metric in the text exposition format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_operation_is_gathered() {
        init_metrics();
        record_operation("consul_acl_policy", "read", "ok", Duration::from_millis(3));
        let text = gather_metrics();
        assert!(text.contains("consul_provider_operations_total"));
        assert!(text.contains("consul_acl_policy"));
    }
}
