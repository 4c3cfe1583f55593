//! Client Registry
//!
//! The shared table of connected peers. Every insertion and removal goes
//! through the single write lock, so admission, timeout eviction and
//! disconnect eviction are serialized against one another.

pub mod peer;

pub use peer::{Admitted, EvictedPeer, EvictionReason, Liveness, PeerSnapshot};

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, RwLock};
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use peer::Peer;

/// Thread-safe collection of connected peers keyed by remote IP
#[derive(Debug)]
pub struct Registry {
    peers: RwLock<HashMap<IpAddr, Peer>>,
    epoch: Instant,
    keepalive_timeout: Duration,
}

impl Registry {
    /// Create an empty registry whose peers time out after `keepalive_timeout`
    pub fn new(keepalive_timeout: Duration) -> Self {
        Self {
            peers: RwLock::new(HashMap::new()),
            epoch: Instant::now(),
            keepalive_timeout,
        }
    }

    pub fn keepalive_timeout(&self) -> Duration {
        self.keepalive_timeout
    }

    fn timeout_ms(&self) -> u64 {
        self.keepalive_timeout.as_millis() as u64
    }

    /// Milliseconds elapsed since the registry was created
    pub fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    /// Admit a peer unless one from the same IP is already registered.
    ///
    /// Returns `None` on rejection; the existing entry is left untouched.
    pub async fn try_admit(&self, addr: SocketAddr) -> Option<Admitted> {
        let mut peers = self.peers.write().await;
        if peers.contains_key(&addr.ip()) {
            return None;
        }

        let now = self.now_ms();
        let session = Uuid::new_v4();
        let liveness = Arc::new(Liveness::new(now));
        let (eviction_tx, eviction) = oneshot::channel();

        peers.insert(
            addr.ip(),
            Peer {
                addr,
                session,
                connected_at: now,
                liveness: Arc::clone(&liveness),
                eviction_tx,
            },
        );

        Some(Admitted {
            addr,
            session,
            liveness,
            eviction,
        })
    }

    /// Remove the peer at `ip` if it still belongs to `session`.
    ///
    /// Returns `None` when the peer was already evicted or the address now
    /// belongs to a later session.
    pub async fn evict(
        &self,
        ip: IpAddr,
        session: Uuid,
        reason: EvictionReason,
    ) -> Option<EvictedPeer> {
        let mut peers = self.peers.write().await;
        match peers.get(&ip) {
            Some(peer) if peer.session == session => {}
            _ => {
                debug!(%ip, %session, %reason, "Peer already evicted");
                return None;
            }
        }

        let now = self.now_ms();
        peers.remove(&ip).map(|peer| peer.evict(reason, now))
    }

    /// Evict every peer whose last keep-alive is older than the timeout at `now_ms`
    pub async fn sweep(&self, now_ms: u64) -> Vec<EvictedPeer> {
        let timeout_ms = self.timeout_ms();
        let mut peers = self.peers.write().await;

        let expired: Vec<IpAddr> = peers
            .iter()
            .filter(|(_, peer)| peer.idle_ms(now_ms) > timeout_ms)
            .map(|(ip, _)| *ip)
            .collect();

        expired
            .into_iter()
            .filter_map(|ip| peers.remove(&ip))
            .map(|peer| peer.evict(EvictionReason::Timeout, now_ms))
            .collect()
    }

    /// Evict all peers, e.g. on shutdown
    pub async fn evict_all(&self, reason: EvictionReason) -> Vec<EvictedPeer> {
        let now = self.now_ms();
        let mut peers = self.peers.write().await;
        peers
            .drain()
            .map(|(_, peer)| peer.evict(reason, now))
            .collect()
    }

    /// Consistent view of all peers at `now_ms`, ordered by address
    pub async fn snapshot(&self, now_ms: u64) -> Vec<PeerSnapshot> {
        let timeout_ms = self.timeout_ms();
        let peers = self.peers.read().await;

        let mut snapshots: Vec<PeerSnapshot> = peers
            .values()
            .map(|peer| PeerSnapshot {
                addr: peer.addr,
                session: peer.session,
                last_keep_alive_ms: peer.liveness.last_keep_alive(),
                remaining_ms: timeout_ms.saturating_sub(peer.idle_ms(now_ms)),
                connected_for_ms: now_ms.saturating_sub(peer.connected_at),
            })
            .collect();
        snapshots.sort_by_key(|snapshot| snapshot.addr);
        snapshots
    }

    pub async fn len(&self) -> usize {
        self.peers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.peers.read().await.is_empty()
    }

    pub async fn contains(&self, ip: IpAddr) -> bool {
        self.peers.read().await.contains_key(&ip)
    }

    /// Session currently registered for `ip`
    pub async fn session_of(&self, ip: IpAddr) -> Option<Uuid> {
        self.peers.read().await.get(&ip).map(|peer| peer.session)
    }

    /// Last keep-alive timestamp of the peer at `ip`
    pub async fn last_keep_alive(&self, ip: IpAddr) -> Option<u64> {
        self.peers
            .read()
            .await
            .get(&ip)
            .map(|peer| peer.liveness.last_keep_alive())
    }
}
