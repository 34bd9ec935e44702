//! Server-mode peer registry and broadcast.
//!
//! # Locking
//!
//! One `std::sync::Mutex` guards the peer map.  Registration, removal and the
//! broadcast snapshot all take it, so a peer that connects while a line is
//! being broadcast is either in the snapshot (and gets the line) or not (and
//! starts with the next one).  The lock is never held while a line is
//! enqueued, let alone while a socket is written.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serialws_core::{Line, OverflowPolicy, RelayMetrics};
use tracing::{debug, info};
use uuid::Uuid;

use crate::application::outbox::{Enqueue, Outbox};
use crate::application::relay::LineSink;

/// Identifies one websocket peer for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerId(Uuid);

impl PeerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PeerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The first group is plenty to tell peers apart in a log.
        let s = self.0.simple().to_string();
        f.write_str(&s[..8])
    }
}

/// A registered peer: who it is, and where its lines go.
pub struct Peer {
    pub id: PeerId,
    pub addr: SocketAddr,
    pub outbox: Outbox,
}

struct Registry {
    peers: HashMap<PeerId, Arc<Peer>>,
    closed: bool,
}

/// All currently connected server-mode peers.
pub struct PeerSet {
    registry: Mutex<Registry>,
    queue_depth: usize,
    policy: OverflowPolicy,
    metrics: Arc<RelayMetrics>,
}

impl PeerSet {
    pub fn new(queue_depth: usize, policy: OverflowPolicy, metrics: Arc<RelayMetrics>) -> Self {
        Self {
            registry: Mutex::new(Registry {
                peers: HashMap::new(),
                closed: false,
            }),
            queue_depth,
            policy,
            metrics,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a peer.  Returns `None` once the set has been closed for shutdown.
    pub fn register(&self, addr: SocketAddr) -> Option<Arc<Peer>> {
        let peer = Arc::new(Peer {
            id: PeerId::new(),
            addr,
            outbox: Outbox::new(self.queue_depth, self.policy),
        });
        let mut registry = self.lock();
        if registry.closed {
            return None;
        }
        registry.peers.insert(peer.id, Arc::clone(&peer));
        let count = registry.peers.len();
        drop(registry);

        self.metrics.peer_connected();
        info!(peer = %peer.id, %addr, peers = count, "peer registered");
        Some(peer)
    }

    /// Removes a peer and closes its outbox.  Lines it never got to write are
    /// counted as dropped.  Idempotent.
    pub fn unregister(&self, id: PeerId) -> bool {
        let removed = self.lock().peers.remove(&id);
        match removed {
            Some(peer) => {
                peer.outbox.close();
                let lost = peer.outbox.clear();
                for _ in 0..lost {
                    self.metrics.record_dropped_disconnected();
                }
                self.metrics.peer_disconnected();
                info!(peer = %id, addr = %peer.addr, "peer unregistered");
                true
            }
            None => false,
        }
    }

    /// Consistent copy of the current peers.
    pub fn snapshot(&self) -> Vec<Arc<Peer>> {
        self.lock().peers.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LineSink for PeerSet {
    fn relay_line(&self, line: &Line) {
        for peer in self.snapshot() {
            match peer.outbox.push(line.clone()) {
                Enqueue::Queued => {}
                Enqueue::Dropped => {
                    self.metrics.record_dropped_backpressure();
                    debug!(peer = %peer.id, policy = %self.policy, "peer buffer full, line dropped");
                }
                // Unregistered after the snapshot was taken.
                Enqueue::Closed => {}
            }
        }
    }

    fn close(&self) {
        let mut registry = self.lock();
        registry.closed = true;
        for peer in registry.peers.values() {
            peer.outbox.close();
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
