//! Presence Server
//!
//! Accepts TCP connections, admits one connection per remote address,
//! and keeps the registry in sync with peer liveness.

pub mod admission;
pub mod handler;
pub mod sweeper;

pub use admission::{AdmissionController, AdmissionDecision};
pub use handler::{ConnectionHandler, Packet, KEEP_ALIVE};
pub use sweeper::TimeoutSweeper;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::metrics::Metrics;
use crate::registry::{EvictionReason, Registry};
use crate::Result;

/// Owns the listener, the registry and the background sweeper
pub struct PresenceServer {
    listener: Option<TcpListener>,
    config: Arc<Config>,
    registry: Arc<Registry>,
    metrics: Arc<Metrics>,
    shutdown_flag: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
}

impl PresenceServer {
    /// Create a new PresenceServer
    pub fn new(config: Arc<Config>) -> Self {
        Self::with_metrics(config, Arc::new(Metrics::new()))
    }

    /// Create a server reporting into an existing metrics collector
    pub fn with_metrics(config: Arc<Config>, metrics: Arc<Metrics>) -> Self {
        let registry = Arc::new(Registry::new(config.server.keepalive_timeout));
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            listener: None,
            config,
            registry,
            metrics,
            shutdown_flag: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        }
    }

    /// Validate the configuration and bind the listening socket.
    /// Returns the actual bound address.
    pub async fn bind(&mut self) -> Result<SocketAddr> {
        self.config
            .validate()
            .context("Refusing to start with an invalid configuration")?;

        let bind_addr = self.config.server.bind_addr;

        info!("Binding TCP listener to {}", bind_addr);
        let listener = TcpListener::bind(bind_addr)
            .await
            .with_context(|| format!("Failed to bind listener to {}", bind_addr))?;

        let local_addr = listener.local_addr()?;
        info!("Successfully bound to {}", local_addr);
        self.listener = Some(listener);
        Ok(local_addr)
    }

    /// Bind and serve until shutdown
    pub async fn start(&mut self) -> Result<()> {
        self.bind().await?;
        self.run().await
    }

    /// Serve on the bound listener until shutdown, then evict every peer
    pub async fn run(&self) -> Result<()> {
        let listener = self
            .listener
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("Listener not initialized"))?;

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let sweeper = TimeoutSweeper::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.metrics),
            self.config.server.sweep_interval,
        );
        let sweeper_handle = tokio::spawn(sweeper.run(self.shutdown_tx.subscribe()));

        let admission = AdmissionController::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.metrics),
            self.config.server.buffer_size,
        );

        info!(
            keepalive_timeout = ?self.config.server.keepalive_timeout,
            "Waiting for clients to connect"
        );

        loop {
            if self.shutdown_flag.load(Ordering::Relaxed) {
                info!("Shutdown flag set, stopping connection acceptance");
                break;
            }

            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, addr)) => {
                            let decision = admission.on_accept(stream, addr).await;
                            debug!(
                                peer = %addr,
                                admitted = decision.is_admitted(),
                                "Accepted connection"
                            );
                        }
                        Err(e) => {
                            error!("Error accepting connection: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Received shutdown signal, stopping connection acceptance");
                    self.shutdown_flag.store(true, Ordering::Relaxed);
                    break;
                }
            }
        }

        sweeper_handle.abort();
        self.evict_all().await;
        info!("Connection acceptance loop stopped");
        Ok(())
    }

    async fn evict_all(&self) {
        let evicted = self.registry.evict_all(EvictionReason::Shutdown).await;
        for peer in &evicted {
            self.metrics.peer_evicted(EvictionReason::Shutdown);
            debug!(peer = %peer.addr, "Peer closed on shutdown");
        }
        if !evicted.is_empty() {
            info!("Closed {} peers on shutdown", evicted.len());
        }
    }

    /// Shared client registry
    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    /// Get the bind address if listener is initialized
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener
            .as_ref()
            .and_then(|listener| listener.local_addr().ok())
    }

    /// Initiate graceful shutdown
    pub fn initiate_shutdown(&self) {
        info!("Initiating graceful shutdown of presence server");
        self.shutdown_flag.store(true, Ordering::Relaxed);

        if let Err(e) = self.shutdown_tx.send(()) {
            warn!("No running accept loop to signal: {}", e);
        }
    }

    /// Check if shutdown has been initiated
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown_flag.load(Ordering::Relaxed)
    }

    /// Stop accepting and close every tracked peer
    pub async fn shutdown(&self) -> Result<()> {
        self.initiate_shutdown();
        self.evict_all().await;
        Ok(())
    }
}
