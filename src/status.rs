//! Read-only HTTP status surface: health, dispatch metrics, quota headroom.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tower_http::cors::CorsLayer;

use crate::dispatch::DispatchMetrics;
use crate::quota::RateLimiter;

#[derive(Clone)]
struct StatusState {
    metrics: Arc<DispatchMetrics>,
    limiter: Arc<RateLimiter>,
}

pub fn status_routes(metrics: Arc<DispatchMetrics>, limiter: Arc<RateLimiter>) -> Router {
    let state = StatusState { metrics, limiter };

    Router::new()
        .route("/health", get(health))
        .route("/api/metrics", get(metrics_snapshot))
        .route("/api/quotas", get(quotas))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind `addr` and serve the status routes in the background.
pub async fn spawn_status_server(
    addr: SocketAddr,
    metrics: Arc<DispatchMetrics>,
    limiter: Arc<RateLimiter>,
) -> std::io::Result<(SocketAddr, tokio::task::JoinHandle<()>)> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local = listener.local_addr()?;
    let app = status_routes(metrics, limiter);
    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "Status server stopped");
        }
    });
    tracing::info!(addr = %local, "Status server started");
    Ok((local, handle))
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "nexus-outreach"
    }))
}

async fn metrics_snapshot(State(state): State<StatusState>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}

async fn quotas(State(state): State<StatusState>) -> impl IntoResponse {
    Json(state.limiter.snapshot().await)
}
