//! Lock-free relay counters.
//!
//! The reader thread, the pump and every peer session update these from
//! different threads.  Each counter is an `AtomicU64` updated with
//! `Ordering::Relaxed`; the values are only read for reporting and never
//! used to synchronise other memory.
//!
//! Dropped lines are counted here instead of being reported as errors.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Shared counters for one running relay.
#[derive(Debug, Default)]
pub struct RelayMetrics {
    lines_read: AtomicU64,
    lines_delivered: AtomicU64,
    dropped_backpressure: AtomicU64,
    dropped_disconnected: AtomicU64,
    channel_overflow: AtomicU64,
    lines_too_long: AtomicU64,
    decode_substitutions: AtomicU64,
    reconnects: AtomicU64,
    device_reopens: AtomicU64,
    peers_connected: AtomicU64,
}

/// Point-in-time copy of [`RelayMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Lines produced by the reader.
    pub lines_read: u64,
    /// Lines written to a websocket (counted once per peer).
    pub lines_delivered: u64,
    /// Lines given up because a peer's outbound buffer was full.
    pub dropped_backpressure: u64,
    /// Lines given up because the client link was down.
    pub dropped_disconnected: u64,
    /// Lines evicted from the reader → relay hand-off channel.
    pub channel_overflow: u64,
    /// Lines force-emitted at the maximum line length.
    pub lines_too_long: u64,
    /// Placeholder characters substituted while decoding.
    pub decode_substitutions: u64,
    /// Successful client-mode reconnections (the first connect excluded).
    pub reconnects: u64,
    /// Times the reader closed and reopened the serial device.
    pub device_reopens: u64,
    /// Websocket peers currently connected.
    pub peers_connected: u64,
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_line_read(&self) {
        self.lines_read.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivered(&self) {
        self.lines_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped_backpressure(&self) {
        self.dropped_backpressure.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped_disconnected(&self) {
        self.dropped_disconnected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_channel_overflow(&self) {
        self.channel_overflow.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_line_too_long(&self) {
        self.lines_too_long.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_substitutions(&self, n: usize) {
        if n > 0 {
            self.decode_substitutions.fetch_add(n as u64, Ordering::Relaxed);
        }
    }

    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_device_reopen(&self) {
        self.device_reopens.fetch_add(1, Ordering::Relaxed);
    }

    pub fn peer_connected(&self) {
        self.peers_connected.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrements the connected-peer gauge, saturating at zero.
    pub fn peer_disconnected(&self) {
        let _ = self
            .peers_connected
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                Some(n.saturating_sub(1))
            });
    }

    /// Copies every counter.  Counters are read one by one, so a snapshot
    /// taken under load is approximate across fields.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            lines_read: self.lines_read.load(Ordering::Relaxed),
            lines_delivered: self.lines_delivered.load(Ordering::Relaxed),
            dropped_backpressure: self.dropped_backpressure.load(Ordering::Relaxed),
            dropped_disconnected: self.dropped_disconnected.load(Ordering::Relaxed),
            channel_overflow: self.channel_overflow.load(Ordering::Relaxed),
            lines_too_long: self.lines_too_long.load(Ordering::Relaxed),
            decode_substitutions: self.decode_substitutions.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            device_reopens: self.device_reopens.load(Ordering::Relaxed),
            peers_connected: self.peers_connected.load(Ordering::Relaxed),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
