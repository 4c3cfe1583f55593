//! Presence Library
//!
//! TCP presence tracking server.
//!
//! Accepts inbound connections, admits at most one connection per remote
//! address, tracks peer liveness through `keep-alive` messages and evicts
//! peers that go silent for longer than the configured timeout.

pub mod client;
pub mod config;
pub mod console;
pub mod metrics;
pub mod registry;
pub mod server;
pub mod shutdown;
pub mod status;

pub use client::NetworkClient;
pub use config::Config;
pub use registry::Registry;
pub use server::PresenceServer;
pub use shutdown::ShutdownCoordinator;

/// Common error type for the presence server
pub type Result<T> = anyhow::Result<T>;
