//! Status server over a real socket.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::timeout;

use nexus_outreach::channels::{Channel, ChannelLimits};
use nexus_outreach::dispatch::DispatchMetrics;
use nexus_outreach::quota::{ChannelSelection, LimiterConfig, RateLimiter};
use nexus_outreach::status::spawn_status_server;

/// Maximum time any request may take before we consider the test hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

async fn start() -> (SocketAddr, Arc<DispatchMetrics>, Arc<RateLimiter>) {
    let metrics = Arc::new(DispatchMetrics::new());
    let limiter = Arc::new(RateLimiter::new(
        &[
            (Channel::Email, ChannelLimits::new(3, 30)),
            (Channel::Reddit, ChannelLimits::new(1, 5)),
        ],
        LimiterConfig::default(),
    ));
    let (addr, _handle) = spawn_status_server(
        SocketAddr::from(([127, 0, 0, 1], 0)),
        Arc::clone(&metrics),
        Arc::clone(&limiter),
    )
    .await
    .expect("bind status server");
    (addr, metrics, limiter)
}

async fn get(addr: SocketAddr, path: &str) -> reqwest::Response {
    timeout(TEST_TIMEOUT, reqwest::get(format!("http://{addr}{path}")))
        .await
        .expect("request timed out")
        .expect("request failed")
}

#[tokio::test]
async fn health_endpoint_answers() {
    let (addr, _, _) = start().await;
    let resp = get(addr, "/health").await;
    assert!(resp.status().is_success());
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn metrics_endpoint_tracks_sends() {
    let (addr, metrics, _) = start().await;
    metrics.record_sent(Channel::Email);
    metrics.record_send_failure(Channel::Reddit, true);

    let body: Value = get(addr, "/api/metrics").await.json().await.unwrap();
    assert_eq!(body["total_sent"], 1);
    assert_eq!(body["rotation_events"], 1);
    assert_eq!(body["per_channel"]["reddit"]["failed"], 1);
}

#[tokio::test]
async fn quotas_endpoint_reports_exhaustion() {
    let (addr, _, limiter) = start().await;
    let selection = limiter.next_available_among(Some(&[Channel::Reddit])).await;
    assert_eq!(selection, ChannelSelection::Available(Channel::Reddit));
    limiter.record_send(Channel::Reddit).await;

    let body: Value = get(addr, "/api/quotas").await.json().await.unwrap();
    let quotas = body.as_array().unwrap();
    assert_eq!(quotas.len(), 2);

    let reddit = quotas.iter().find(|q| q["channel"] == "reddit").unwrap();
    assert_eq!(reddit["hourly_remaining"], 0);
    assert_eq!(reddit["daily_remaining"], 4);
    assert_eq!(reddit["available"], false);

    let email = quotas.iter().find(|q| q["channel"] == "email").unwrap();
    assert_eq!(email["hourly_remaining"], 3);
    assert_eq!(email["available"], true);
}

#[tokio::test]
async fn cors_headers_are_permissive() {
    let (addr, _, _) = start().await;
    let resp = timeout(
        TEST_TIMEOUT,
        reqwest::Client::new()
            .get(format!("http://{addr}/api/metrics"))
            .header("Origin", "http://dashboard.local")
            .send(),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(
        resp.headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
}
