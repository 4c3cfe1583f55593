//! Connection Handler
//!
//! One receive loop per peer. Whatever arrives in a single read is treated
//! as one logical message: a payload that is exactly `keep-alive` resets the
//! peer's liveness clock, anything else is logged.

use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tracing::{debug, info, instrument};

use crate::metrics::Metrics;
use crate::registry::{Admitted, EvictionReason, Registry};

/// The only in-band message the server understands
pub const KEEP_ALIVE: &str = "keep-alive";

/// A dispatched message
#[derive(Debug, PartialEq, Eq)]
pub enum Packet<'a> {
    KeepAlive,
    Message(&'a str),
}

impl<'a> Packet<'a> {
    pub fn classify(text: &'a str) -> Self {
        if text == KEEP_ALIVE {
            Packet::KeepAlive
        } else {
            Packet::Message(text)
        }
    }
}

/// Receive loop of a single admitted peer
pub struct ConnectionHandler {
    stream: TcpStream,
    peer: Admitted,
    registry: Arc<Registry>,
    metrics: Arc<Metrics>,
    buffer: Vec<u8>,
    accumulated: BytesMut,
}

impl ConnectionHandler {
    pub fn new(
        stream: TcpStream,
        peer: Admitted,
        registry: Arc<Registry>,
        metrics: Arc<Metrics>,
        buffer_size: usize,
    ) -> Self {
        Self {
            stream,
            peer,
            registry,
            metrics,
            buffer: vec![0u8; buffer_size],
            accumulated: BytesMut::with_capacity(buffer_size),
        }
    }

    /// Run until the peer disconnects or the registry evicts it.
    /// The socket is closed when this returns.
    #[instrument(skip(self), fields(peer = %self.peer.addr, session = %self.peer.session))]
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                reason = &mut self.peer.eviction => {
                    let reason = reason.unwrap_or(EvictionReason::Shutdown);
                    info!(%reason, "Closing evicted peer");
                    break;
                }
                read = self.stream.read(&mut self.buffer) => match read {
                    Ok(0) => {
                        self.disconnect().await;
                        break;
                    }
                    Ok(n) => {
                        self.accumulated.extend_from_slice(&self.buffer[..n]);
                        if !self.accumulated.is_empty() {
                            self.dispatch();
                        }
                        self.accumulated.clear();
                    }
                    Err(e) => {
                        debug!(error = %e, "Read failed");
                        self.disconnect().await;
                        break;
                    }
                }
            }
        }
    }

    fn dispatch(&self) {
        let text = String::from_utf8_lossy(&self.accumulated);
        match Packet::classify(&text) {
            Packet::KeepAlive => {
                self.peer.liveness.touch(self.registry.now_ms());
                self.metrics.keepalive_received();
                debug!("Keep-alive received");
            }
            Packet::Message(message) => {
                self.metrics.message_received();
                info!(%message, "Message received");
            }
        }
    }

    async fn disconnect(&self) {
        let evicted = self
            .registry
            .evict(
                self.peer.addr.ip(),
                self.peer.session,
                EvictionReason::Disconnected,
            )
            .await;

        if evicted.is_some() {
            self.metrics.peer_evicted(EvictionReason::Disconnected);
            let remaining = self.registry.len().await;
            info!(remaining, "Client disconnected");
        }
    }
}
