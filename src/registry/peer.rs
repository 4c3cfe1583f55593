//! Peer Types

use serde::Serialize;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::oneshot;
use uuid::Uuid;

/// Why a peer left the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionReason {
    /// No keep-alive within the configured timeout
    Timeout,
    /// The transport closed or failed
    Disconnected,
    /// The server is shutting down
    Shutdown,
}

impl EvictionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvictionReason::Timeout => "timeout",
            EvictionReason::Disconnected => "disconnected",
            EvictionReason::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for EvictionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Liveness clock of a single peer, in milliseconds since the registry epoch.
///
/// Written by the peer's receive task, read by the sweeper and the console.
#[derive(Debug)]
pub struct Liveness {
    last_keep_alive: AtomicU64,
}

impl Liveness {
    pub fn new(now_ms: u64) -> Self {
        Self {
            last_keep_alive: AtomicU64::new(now_ms),
        }
    }

    /// Record a keep-alive observed at `now_ms`. Never moves the clock backwards.
    pub fn touch(&self, now_ms: u64) {
        self.last_keep_alive.fetch_max(now_ms, Ordering::AcqRel);
    }

    pub fn last_keep_alive(&self) -> u64 {
        self.last_keep_alive.load(Ordering::Acquire)
    }
}

/// Registry entry for one admitted connection
#[derive(Debug)]
pub(crate) struct Peer {
    pub addr: SocketAddr,
    pub session: Uuid,
    pub connected_at: u64,
    pub liveness: std::sync::Arc<Liveness>,
    pub eviction_tx: oneshot::Sender<EvictionReason>,
}

impl Peer {
    pub fn idle_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.liveness.last_keep_alive())
    }

    /// Fire the eviction trigger, consuming the entry.
    pub fn evict(self, reason: EvictionReason, now_ms: u64) -> EvictedPeer {
        let idle_ms = self.idle_ms(now_ms);
        // The receive task may already be gone; nothing left to notify then.
        let _ = self.eviction_tx.send(reason);
        EvictedPeer {
            addr: self.addr,
            session: self.session,
            reason,
            idle_ms,
        }
    }
}

/// What the connection handler receives on successful admission
#[derive(Debug)]
pub struct Admitted {
    pub addr: SocketAddr,
    pub session: Uuid,
    pub liveness: std::sync::Arc<Liveness>,
    /// Resolves when the registry evicts this peer
    pub eviction: oneshot::Receiver<EvictionReason>,
}

/// A peer removed from the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictedPeer {
    pub addr: SocketAddr,
    pub session: Uuid,
    pub reason: EvictionReason,
    pub idle_ms: u64,
}

/// Read-only view of a peer for renderers
#[derive(Debug, Clone, Serialize)]
pub struct PeerSnapshot {
    pub addr: SocketAddr,
    pub session: Uuid,
    pub last_keep_alive_ms: u64,
    /// Milliseconds until the peer times out, floored at zero
    pub remaining_ms: u64,
    pub connected_for_ms: u64,
}

impl PeerSnapshot {
    /// Whole seconds left before eviction
    pub fn remaining_secs(&self) -> u64 {
        self.remaining_ms / 1000
    }
}
