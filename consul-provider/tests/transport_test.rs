//! Request timeouts, blocking reads and cancellation against a slow agent.

mod common;

use common::{config, init_tracing};
use consul_provider::{provider, ConsulClient, ConsulContext, ProviderDefaults};
use provider_core::ErrorKind;
use serde_json::json;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn slow_catalog(delay: Duration) -> MockServer {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/catalog/nodes"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([]))
                .insert_header("X-Consul-Index", "43")
                .set_delay(delay),
        )
        .mount(&server)
        .await;
    server
}

fn context(server: &MockServer) -> ConsulContext {
    ConsulContext::new(
        ConsulClient::with_base_url(server.uri()).with_request_timeout(Duration::from_secs(1)),
        ProviderDefaults::default(),
        5,
    )
}

async fn request_count(server: &MockServer) -> usize {
    server.received_requests().await.map(|r| r.len()).unwrap_or(0)
}

#[tokio::test]
async fn blocking_read_may_outlast_the_request_timeout() {
    let server = slow_catalog(Duration::from_millis(1500)).await;
    let ctx = context(&server);

    let found = provider()
        .read_data_source(
            &ctx,
            "consul_catalog_nodes",
            config(json!({
                "datacenter": "dc1",
                "query_options": [{"wait_index": 42, "wait_time": "3s"}]
            })),
        )
        .await
        .unwrap();
    assert_eq!(found.id, "catalog-nodes-dc1");
    assert_eq!(request_count(&server).await, 1);
}

#[tokio::test]
async fn plain_read_is_bounded_by_the_request_timeout() {
    let server = slow_catalog(Duration::from_millis(1500)).await;
    let ctx = context(&server);

    let err = provider()
        .read_data_source(&ctx, "consul_catalog_nodes", config(json!({"datacenter": "dc1"})))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unavailable);
}

#[tokio::test]
async fn cancelled_read_returns_at_once_without_retrying() {
    let server = slow_catalog(Duration::from_secs(5)).await;
    let token = CancellationToken::new();
    let ctx = context(&server).with_cancellation(token.clone());

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        token.cancel();
    });
    let started = Instant::now();
    let err = provider()
        .read_data_source(
            &ctx,
            "consul_catalog_nodes",
            config(json!({
                "datacenter": "dc1",
                "query_options": [{"wait_index": 42}]
            })),
        )
        .await
        .unwrap_err();
    canceller.await.unwrap();

    assert_eq!(err.kind(), ErrorKind::Unavailable);
    assert!(err.to_string().contains("cancelled"));
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(request_count(&server).await, 1);
}
