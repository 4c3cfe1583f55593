//! Metrics Collector

use crate::registry::EvictionReason;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;
use tracing::error;

/// Collects and exports peer lifecycle metrics
pub struct Metrics {
    prometheus_registry: Registry,
    peers_admitted_total: IntCounter,
    peers_rejected_total: IntCounter,
    peers_evicted_total: IntCounterVec,
    keepalives_total: IntCounter,
    messages_total: IntCounter,
    active_peers: IntGauge,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub peers_admitted: u64,
    pub peers_rejected: u64,
    pub evicted_timeout: u64,
    pub evicted_disconnected: u64,
    pub evicted_shutdown: u64,
    pub keepalives: u64,
    pub messages: u64,
    pub active_peers: i64,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        let prometheus_registry = Registry::new();

        let peers_admitted_total = IntCounter::new(
            "presence_peers_admitted_total",
            "Total number of admitted peers",
        )
        .expect("Failed to create peers_admitted_total counter");

        let peers_rejected_total = IntCounter::new(
            "presence_peers_rejected_total",
            "Total connections rejected as duplicate addresses",
        )
        .expect("Failed to create peers_rejected_total counter");

        let peers_evicted_total = IntCounterVec::new(
            Opts::new("presence_peers_evicted_total", "Total evicted peers by reason"),
            &["reason"],
        )
        .expect("Failed to create peers_evicted_total counter");

        let keepalives_total = IntCounter::new(
            "presence_keepalives_total",
            "Total keep-alive messages received",
        )
        .expect("Failed to create keepalives_total counter");

        let messages_total = IntCounter::new(
            "presence_messages_total",
            "Total non keep-alive messages received",
        )
        .expect("Failed to create messages_total counter");

        let active_peers = IntGauge::new("presence_active_peers", "Currently registered peers")
            .expect("Failed to create active_peers gauge");

        prometheus_registry
            .register(Box::new(peers_admitted_total.clone()))
            .expect("Failed to register peers_admitted_total");
        prometheus_registry
            .register(Box::new(peers_rejected_total.clone()))
            .expect("Failed to register peers_rejected_total");
        prometheus_registry
            .register(Box::new(peers_evicted_total.clone()))
            .expect("Failed to register peers_evicted_total");
        prometheus_registry
            .register(Box::new(keepalives_total.clone()))
            .expect("Failed to register keepalives_total");
        prometheus_registry
            .register(Box::new(messages_total.clone()))
            .expect("Failed to register messages_total");
        prometheus_registry
            .register(Box::new(active_peers.clone()))
            .expect("Failed to register active_peers");

        Self {
            prometheus_registry,
            peers_admitted_total,
            peers_rejected_total,
            peers_evicted_total,
            keepalives_total,
            messages_total,
            active_peers,
        }
    }

    pub fn peer_admitted(&self) {
        self.peers_admitted_total.inc();
        self.active_peers.inc();
    }

    pub fn peer_rejected(&self) {
        self.peers_rejected_total.inc();
    }

    pub fn peer_evicted(&self, reason: EvictionReason) {
        self.peers_evicted_total
            .with_label_values(&[reason.as_str()])
            .inc();
        self.active_peers.dec();
    }

    pub fn keepalive_received(&self) {
        self.keepalives_total.inc();
    }

    pub fn message_received(&self) {
        self.messages_total.inc();
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let evicted = |reason: EvictionReason| {
            self.peers_evicted_total
                .with_label_values(&[reason.as_str()])
                .get()
        };

        MetricsSnapshot {
            peers_admitted: self.peers_admitted_total.get(),
            peers_rejected: self.peers_rejected_total.get(),
            evicted_timeout: evicted(EvictionReason::Timeout),
            evicted_disconnected: evicted(EvictionReason::Disconnected),
            evicted_shutdown: evicted(EvictionReason::Shutdown),
            keepalives: self.keepalives_total.get(),
            messages: self.messages_total.get(),
            active_peers: self.active_peers.get(),
        }
    }

    /// Export metrics in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.prometheus_registry.gather();

        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            error!(error = %e, "Failed to encode Prometheus metrics");
            return String::new();
        }

        String::from_utf8_lossy(&buffer).into_owned()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
