//! Metrics Module
//!
//! Prometheus counters for the peer lifecycle.

pub mod collector;

pub use collector::{Metrics, MetricsSnapshot};
