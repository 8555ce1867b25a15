//! Prometheus metrics for Consul API traffic and attachment retries.

use once_cell::sync::Lazy;
use prometheus::{register_counter_vec, CounterVec};

/// Counter for Consul HTTP requests by method, endpoint family and status.
pub static API_REQUESTS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "consul_api_requests_total",
        "Total number of Consul HTTP API requests",
        &["method", "endpoint", "status"]
    )
    .expect("Failed to register API_REQUESTS")
});

/// Counter for attachment read-modify-write attempts that had to be retried.
pub static ATTACHMENT_RETRIES: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "consul_provider_attachment_retries_total",
        "Total number of retried attachment read-modify-write attempts",
        &["resource"]
    )
    .expect("Failed to register ATTACHMENT_RETRIES")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    provider_core::metrics::init_metrics();
    Lazy::force(&API_REQUESTS);
    Lazy::force(&ATTACHMENT_RETRIES);
}

pub fn record_api_request(method: &str, path: &str, status: &str) {
    API_REQUESTS
        .with_label_values(&[method, endpoint_label(path), status])
        .inc();
}

pub fn record_attachment_retry(resource: &str) {
    ATTACHMENT_RETRIES.with_label_values(&[resource]).inc();
}

/// Bounded-cardinality label for an API path: the family, plus the
/// sub-collection for families whose second segment is a fixed word.
fn endpoint_label(path: &str) -> &str {
    let rest = path.trim_start_matches('/').trim_start_matches("v1/");
    let mut segments = rest.splitn(3, '/');
    let family = segments.next().unwrap_or("");
    let fixed_second = matches!(
        family,
        "acl" | "agent" | "catalog" | "connect" | "operator" | "health"
    );
    match segments.next() {
        Some(second) if fixed_second && !second.is_empty() => {
            let offset = path.len() - rest.len();
            &path[offset..offset + family.len() + 1 + second.len()]
        }
        _ => family,
    }
}
