//! Status API Handlers

use crate::metrics::{Metrics, MetricsSnapshot};
use crate::registry::{PeerSnapshot, Registry};
use axum::{extract::State, http::header, response::IntoResponse, Json};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

/// Shared application state for handlers
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub metrics: Arc<Metrics>,
    pub start_time: Instant,
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub uptime_secs: u64,
    pub active_peers: usize,
    pub keepalive_timeout_ms: u64,
    pub counters: MetricsSnapshot,
}

/// Health check handler
pub async fn health_check(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "healthy",
        uptime_secs: state.start_time.elapsed().as_secs(),
        active_peers: state.registry.len().await,
        keepalive_timeout_ms: state.registry.keepalive_timeout().as_millis() as u64,
        counters: state.metrics.snapshot(),
    })
}

/// Registered peers with their remaining time
pub async fn get_peers(State(state): State<AppState>) -> Json<Vec<PeerSnapshot>> {
    let now = state.registry.now_ms();
    Json(state.registry.snapshot(now).await)
}

/// Prometheus scrape endpoint
pub async fn get_metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.metrics.export_prometheus(),
    )
}
