//! Server integration tests
//!
//! Tests for the self-metrics HTTP endpoints.

use fadc_exporter::metrics::MetricsCollector;
use fadc_exporter::server;
use reqwest::StatusCode;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Serve `metrics` on an ephemeral port; returns the base URL
async fn spawn_server(metrics: MetricsCollector, cancel: CancellationToken) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(server::serve(listener, metrics, cancel));
    base
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    // Given: A metrics collector with some metrics set
    let metrics = MetricsCollector::new().expect("Failed to create metrics");
    metrics.set_up("adc01", true);
    metrics.record_dispatch("adc01", "virtualServerStatus", 3);
    let base = spawn_server(metrics, CancellationToken::new()).await;

    // When: Fetching /metrics
    let response = reqwest::get(format!("{}/metrics", base)).await.unwrap();

    // Then: Output should be valid Prometheus format
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.text().await.unwrap();
    assert!(body.contains("# HELP"), "Missing HELP comment");
    assert!(body.contains("fadc_exporter_target_up{target=\"adc01\"} 1"));
    assert!(body.contains(
        "fadc_exporter_records_total{measurement=\"virtualServerStatus\",target=\"adc01\"} 3"
    ));
}

#[tokio::test]
async fn test_health_reflects_target_state() {
    // Given: A server over metrics with no target up yet
    let metrics = MetricsCollector::new().expect("Failed to create metrics");
    let base = spawn_server(metrics.clone(), CancellationToken::new()).await;

    // When/Then: Unavailable until a target comes up
    let response = reqwest::get(format!("{}/health", base)).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    metrics.set_up("adc01", false);
    metrics.set_up("adc02", true);
    let response = reqwest::get(format!("{}/health", base)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_root_links_to_metrics_and_health() {
    let metrics = MetricsCollector::new().expect("Failed to create metrics");
    let base = spawn_server(metrics, CancellationToken::new()).await;

    let body = reqwest::get(&base).await.unwrap().text().await.unwrap();

    assert!(body.contains("/metrics"));
    assert!(body.contains("/health"));
}

#[tokio::test]
async fn test_server_shuts_down_on_cancel() {
    // Given: A running server
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(server::serve(
        listener,
        MetricsCollector::new().unwrap(),
        cancel.clone(),
    ));

    // When: Cancelling
    cancel.cancel();

    // Then: serve returns cleanly
    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("server should stop")
        .unwrap();
    assert!(result.is_ok());
}
