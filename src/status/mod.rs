//! Status API
//!
//! Optional read-only HTTP view of the registry and the lifecycle metrics.

pub mod handlers;

pub use handlers::AppState;

use crate::{metrics::Metrics, registry::Registry, Result};
use anyhow::Context;
use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

/// Status API server
pub struct StatusServer {
    bind_addr: SocketAddr,
    app_state: AppState,
}

impl StatusServer {
    pub fn new(bind_addr: SocketAddr, registry: Arc<Registry>, metrics: Arc<Metrics>) -> Self {
        Self {
            bind_addr,
            app_state: AppState {
                registry,
                metrics,
                start_time: Instant::now(),
            },
        }
    }

    /// Create the status router
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(handlers::health_check))
            .route("/peers", get(handlers::get_peers))
            .route("/metrics", get(handlers::get_metrics))
            .with_state(self.app_state.clone())
            .layer(CorsLayer::permissive())
    }

    /// Start the status API server
    pub async fn start(self) -> Result<()> {
        let app = self.router();

        let listener = TcpListener::bind(self.bind_addr)
            .await
            .with_context(|| format!("Failed to bind status API server to {}", self.bind_addr))?;

        info!("Status API listening on {}", self.bind_addr);

        if let Err(e) = axum::serve(listener, app).await {
            error!("Status API server error: {}", e);
            return Err(e.into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use std::time::Duration;
    use tower::ServiceExt;

    fn create_test_server() -> (StatusServer, Arc<Registry>, Arc<Metrics>) {
        let registry = Arc::new(Registry::new(Duration::from_secs(10)));
        let metrics = Arc::new(Metrics::new());
        let server = StatusServer::new(
            "127.0.0.1:0".parse().unwrap(),
            Arc::clone(&registry),
            Arc::clone(&metrics),
        );
        (server, registry, metrics)
    }

    async fn get_body(router: Router, uri: &str) -> (StatusCode, String) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (server, registry, _) = create_test_server();
        registry.try_admit("10.0.0.1:1".parse().unwrap()).await.unwrap();

        let (status, body) = get_body(server.router(), "/health").await;
        assert_eq!(status, StatusCode::OK);

        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["active_peers"], 1);
        assert_eq!(json["keepalive_timeout_ms"], 10_000);
    }

    #[tokio::test]
    async fn test_peers_endpoint() {
        let (server, registry, _) = create_test_server();
        registry.try_admit("10.0.0.1:4000".parse().unwrap()).await.unwrap();

        let (status, body) = get_body(server.router(), "/peers").await;
        assert_eq!(status, StatusCode::OK);

        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        let peers = json.as_array().unwrap();
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0]["addr"], "10.0.0.1:4000");
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let (server, _, metrics) = create_test_server();
        metrics.peer_admitted();

        let (status, body) = get_body(server.router(), "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("presence_peers_admitted_total 1"));
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let (server, _, _) = create_test_server();
        let (status, _) = get_body(server.router(), "/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
