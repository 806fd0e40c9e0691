// Copyright (c) Telephone Contributors
// SPDX-License-Identifier: Apache-2.0

//! Network metrics and counters

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Network metrics collector
#[derive(Debug, Clone)]
pub struct NetworkMetrics {
    inner: Arc<NetworkMetricsInner>,
}

#[derive(Debug, Default)]
struct NetworkMetricsInner {
    // Connection metrics
    total_connections: AtomicU64,
    active_connections: AtomicU64,
    inbound_connections: AtomicU64,
    outbound_connections: AtomicU64,
    failed_connections: AtomicU64,

    // Message metrics
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
    bytes_sent: AtomicU64,

    // Error metrics
    send_errors: AtomicU64,
    receive_errors: AtomicU64,
    unrecognized_frames: AtomicU64,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub total_connections: u64,
    pub active_connections: u64,
    pub inbound_connections: u64,
    pub outbound_connections: u64,
    pub failed_connections: u64,
    pub messages_sent: u64,
    pub messages_received: u64,
    pub bytes_sent: u64,
    pub send_errors: u64,
    pub receive_errors: u64,
    pub unrecognized_frames: u64,
}

impl NetworkMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            inner: Arc::new(NetworkMetricsInner::default()),
        }
    }

    // Connection metrics
    pub fn inc_connections(&self, is_inbound: bool) {
        self.inner.total_connections.fetch_add(1, Ordering::Relaxed);
        self.inner.active_connections.fetch_add(1, Ordering::Relaxed);
        if is_inbound {
            self.inner.inbound_connections.fetch_add(1, Ordering::Relaxed);
        } else {
            self.inner.outbound_connections.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn dec_active_connections(&self) {
        self.inner.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn inc_failed_connections(&self) {
        self.inner.failed_connections.fetch_add(1, Ordering::Relaxed);
    }

    // Message metrics
    pub fn inc_messages_sent(&self) {
        self.inner.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_messages_received(&self) {
        self.inner.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_bytes_sent(&self, bytes: u64) {
        self.inner.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
    }

    // Error metrics
    pub fn inc_send_errors(&self) {
        self.inner.send_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_receive_errors(&self) {
        self.inner.receive_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_unrecognized_frames(&self) {
        self.inner.unrecognized_frames.fetch_add(1, Ordering::Relaxed);
    }

    // Getters
    pub fn get_active_connections(&self) -> u64 {
        self.inner.active_connections.load(Ordering::Relaxed)
    }

    pub fn get_messages_sent(&self) -> u64 {
        self.inner.messages_sent.load(Ordering::Relaxed)
    }

    pub fn get_messages_received(&self) -> u64 {
        self.inner.messages_received.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            total_connections: load(&self.inner.total_connections),
            active_connections: load(&self.inner.active_connections),
            inbound_connections: load(&self.inner.inbound_connections),
            outbound_connections: load(&self.inner.outbound_connections),
            failed_connections: load(&self.inner.failed_connections),
            messages_sent: load(&self.inner.messages_sent),
            messages_received: load(&self.inner.messages_received),
            bytes_sent: load(&self.inner.bytes_sent),
            send_errors: load(&self.inner.send_errors),
            receive_errors: load(&self.inner.receive_errors),
            unrecognized_frames: load(&self.inner.unrecognized_frames),
        }
    }
}

impl Default for NetworkMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_counters() {
        let metrics = NetworkMetrics::new();
        metrics.inc_connections(true);
        metrics.inc_connections(false);
        metrics.dec_active_connections();

        let snap = metrics.snapshot();
        assert_eq!(snap.total_connections, 2);
        assert_eq!(snap.active_connections, 1);
        assert_eq!(snap.inbound_connections, 1);
        assert_eq!(snap.outbound_connections, 1);
    }

    #[test]
    fn test_clones_share_state() {
        let metrics = NetworkMetrics::new();
        let clone = metrics.clone();
        clone.inc_messages_sent();
        assert_eq!(metrics.get_messages_sent(), 1);
    }
}
