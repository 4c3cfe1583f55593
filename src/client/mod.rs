//! Network Client
//!
//! Thin TCP client used to talk to a presence server. It performs no
//! framing: payloads are written as raw bytes and nothing is read back.

use std::net::{IpAddr, SocketAddr};

use anyhow::Context;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::server::KEEP_ALIVE;
use crate::Result;

pub struct NetworkClient {
    addr: SocketAddr,
    stream: Option<TcpStream>,
}

impl NetworkClient {
    /// Create a client for `ip:port`. Fails if `ip` is not an IP address.
    pub fn new(ip: &str, port: u16) -> Result<Self> {
        let ip: IpAddr = ip
            .parse()
            .with_context(|| format!("Invalid server address: {}", ip))?;

        Ok(Self::from_addr(SocketAddr::new(ip, port)))
    }

    pub fn from_addr(addr: SocketAddr) -> Self {
        Self { addr, stream: None }
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Connect if not already connected. Returns whether a connection is up.
    pub async fn connect(&mut self) -> bool {
        if self.is_connected() {
            info!("Already connected to: {}", self.addr);
            return true;
        }

        match TcpStream::connect(self.addr).await {
            Ok(stream) => {
                debug!("Connected to {}", self.addr);
                self.stream = Some(stream);
                true
            }
            Err(e) => {
                warn!(error = %e, "Connection to {} failed", self.addr);
                false
            }
        }
    }

    /// Write `buffer` to the server. Returns `false` if not connected or the
    /// write fails; a failed write drops the connection.
    pub async fn send(&mut self, buffer: &[u8]) -> bool {
        let Some(stream) = self.stream.as_mut() else {
            debug!("Not connected, dropping packet");
            return false;
        };

        let result = async {
            stream.write_all(buffer).await?;
            stream.flush().await
        }
        .await;

        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    error = %e,
                    packet = %String::from_utf8_lossy(buffer),
                    "Failed to send packet"
                );
                self.stream = None;
                false
            }
        }
    }

    pub async fn send_keep_alive(&mut self) -> bool {
        self.send(KEEP_ALIVE.as_bytes()).await
    }

    /// Close the connection. Calling this while disconnected does nothing.
    pub async fn disconnect(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                debug!(error = %e, "Error while shutting down connection");
            }
            debug!("Disconnected from {}", self.addr);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[test]
    fn test_invalid_ip_is_rejected() {
        assert!(NetworkClient::new("not-an-ip", 1337).is_err());
        assert!(NetworkClient::new("localhost", 1337).is_err());
    }

    #[tokio::test]
    async fn test_send_without_connection_fails() {
        let mut client = NetworkClient::new("127.0.0.1", 1).unwrap();
        assert!(!client.is_connected());
        assert!(!client.send(b"test-msg").await);
    }

    #[tokio::test]
    async fn test_connect_failure_returns_false() {
        // Grab a free port, then close it so nothing is listening
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut client = NetworkClient::from_addr(addr);
        assert!(!client.connect().await);
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_send_raw_bytes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let mut client = NetworkClient::from_addr(addr);
        assert!(client.connect().await);
        assert!(client.connect().await);

        let (mut server_side, _) = listener.accept().await.unwrap();
        assert!(client.send(b"test-msg").await);
        assert!(client.send_keep_alive().await);
        client.disconnect().await;
        client.disconnect().await;
        assert!(!client.is_connected());

        let mut received = Vec::new();
        server_side.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"test-msgkeep-alive");
    }
}
