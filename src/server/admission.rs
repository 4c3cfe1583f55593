//! Admission Controller
//!
//! Decides whether a freshly accepted connection becomes a tracked peer.
//! Only one connection per remote IP is admitted; later ones are closed.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::handler::ConnectionHandler;
use crate::metrics::Metrics;
use crate::registry::Registry;

/// Outcome of one admission decision
#[derive(Debug)]
pub enum AdmissionDecision {
    /// Registered; the handle belongs to the peer's receive task
    Admitted(JoinHandle<()>),
    /// Another peer already holds this address; the socket was closed
    Rejected,
}

impl AdmissionDecision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, AdmissionDecision::Admitted(_))
    }
}

/// Accept-loop policy shared by every inbound connection
#[derive(Clone)]
pub struct AdmissionController {
    registry: Arc<Registry>,
    metrics: Arc<Metrics>,
    buffer_size: usize,
}

impl AdmissionController {
    pub fn new(registry: Arc<Registry>, metrics: Arc<Metrics>, buffer_size: usize) -> Self {
        Self {
            registry,
            metrics,
            buffer_size,
        }
    }

    /// Register `stream` and spawn its receive loop, or close it if the
    /// address is already taken.
    pub async fn on_accept(&self, stream: TcpStream, addr: SocketAddr) -> AdmissionDecision {
        let Some(admitted) = self.registry.try_admit(addr).await else {
            debug!(peer = %addr, "Rejecting connection from already registered address");
            self.metrics.peer_rejected();
            drop(stream);
            return AdmissionDecision::Rejected;
        };

        info!(peer = %addr, session = %admitted.session, "Client connected");
        self.metrics.peer_admitted();

        let handler = ConnectionHandler::new(
            stream,
            admitted,
            Arc::clone(&self.registry),
            Arc::clone(&self.metrics),
            self.buffer_size,
        );
        AdmissionDecision::Admitted(tokio::spawn(handler.run()))
    }
}
