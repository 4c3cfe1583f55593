//! Timeout Sweeper
//!
//! Periodically evicts peers whose last keep-alive is older than the
//! configured timeout.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::metrics::Metrics;
use crate::registry::{EvictedPeer, EvictionReason, Registry};

pub struct TimeoutSweeper {
    registry: Arc<Registry>,
    metrics: Arc<Metrics>,
    interval: Duration,
}

impl TimeoutSweeper {
    pub fn new(registry: Arc<Registry>, metrics: Arc<Metrics>, interval: Duration) -> Self {
        Self {
            registry,
            metrics,
            interval,
        }
    }

    /// Sweep on every tick until a shutdown signal arrives
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        debug!(interval = ?self.interval, "Timeout sweeper started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep_once().await;
                }
                _ = shutdown_rx.recv() => {
                    debug!("Timeout sweeper stopping");
                    break;
                }
            }
        }
    }

    /// One pass over the registry
    pub async fn sweep_once(&self) -> Vec<EvictedPeer> {
        let evicted = self.registry.sweep(self.registry.now_ms()).await;
        for peer in &evicted {
            self.metrics.peer_evicted(EvictionReason::Timeout);
            info!(
                peer = %peer.addr,
                session = %peer.session,
                idle_ms = peer.idle_ms,
                "Client timed out"
            );
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_evicts_after_timeout() {
        let registry = Arc::new(Registry::new(Duration::from_millis(2000)));
        let metrics = Arc::new(Metrics::new());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let peer = registry
            .try_admit("10.0.0.1:5000".parse().unwrap())
            .await
            .unwrap();
        let ip = peer.addr.ip();

        let sweeper = TimeoutSweeper::new(
            Arc::clone(&registry),
            Arc::clone(&metrics),
            Duration::from_millis(250),
        );
        let handle = tokio::spawn(sweeper.run(shutdown_rx));

        sleep(Duration::from_millis(1000)).await;
        peer.liveness.touch(registry.now_ms());

        sleep(Duration::from_millis(1500)).await;
        assert!(registry.contains(ip).await);

        sleep(Duration::from_millis(2000)).await;
        assert!(!registry.contains(ip).await);
        assert_eq!(metrics.snapshot().evicted_timeout, 1);

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_fires_eviction_trigger() {
        let registry = Arc::new(Registry::new(Duration::from_millis(500)));
        let metrics = Arc::new(Metrics::new());
        let peer = registry
            .try_admit("10.0.0.1:5000".parse().unwrap())
            .await
            .unwrap();

        let sweeper = TimeoutSweeper::new(
            Arc::clone(&registry),
            Arc::clone(&metrics),
            Duration::from_millis(250),
        );
        assert!(sweeper.sweep_once().await.is_empty());

        sleep(Duration::from_millis(600)).await;
        let evicted = sweeper.sweep_once().await;
        assert_eq!(evicted.len(), 1);
        assert_eq!(peer.eviction.await, Ok(EvictionReason::Timeout));
    }
}
