//! Client-mode link state and the [`LineSink`] it presents to the relay.
//!
//! The reconnect loop itself lives in `infrastructure::ws_client`; this
//! module holds what the relay and that loop share: the outbound buffer, the
//! connection state, and the rule for lines that arrive while the link is
//! down.
//!
//! | Link state   | `drop-newest` (default)                  | `drop-oldest`                                |
//! |--------------|------------------------------------------|----------------------------------------------|
//! | Connected    | queue; full ⇒ `dropped_backpressure`     | queue; full ⇒ evict oldest                   |
//! | not connected| drop ⇒ `dropped_disconnected`            | hold; evictions ⇒ `dropped_disconnected`     |

use std::sync::Arc;

use serialws_core::{ConnectionState, Line, OverflowPolicy, RelayMetrics};
use tokio::sync::watch;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::{debug, warn};

use crate::application::outbox::{Enqueue, Outbox};
use crate::application::relay::LineSink;

/// The single outbound connection's shared state.
pub struct ClientLink {
    outbox: Outbox,
    policy: OverflowPolicy,
    state: watch::Sender<ConnectionState>,
    closed: CancellationToken,
    metrics: Arc<RelayMetrics>,
}

impl ClientLink {
    pub fn new(queue_depth: usize, policy: OverflowPolicy, metrics: Arc<RelayMetrics>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            outbox: Outbox::new(queue_depth, policy),
            policy,
            state,
            closed: CancellationToken::new(),
            metrics,
        }
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watches state changes; used by tests and the stats log.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Moves the link to `next`.  Transitions outside the lifecycle are
    /// logged and ignored.
    pub fn set_state(&self, next: ConnectionState) {
        self.state.send_if_modified(|current| match current.transition(next) {
            Ok(state) => {
                debug!(from = ?*current, to = ?state, "client link state");
                *current = state;
                true
            }
            Err(e) => {
                warn!("{e}");
                false
            }
        });
    }

    /// Marks the link down.  Under `drop-newest` whatever was still queued is
    /// discarded and counted; under `drop-oldest` it waits for the next
    /// connection.
    pub fn mark_disconnected(&self) {
        if self.state() != ConnectionState::Disconnected {
            self.set_state(ConnectionState::Disconnected);
        }
        if self.policy == OverflowPolicy::DropNewest {
            for _ in 0..self.outbox.clear() {
                self.metrics.record_dropped_disconnected();
            }
        }
    }

    /// Resolves once [`LineSink::close`] has been called.
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.closed.cancelled()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    pub fn metrics(&self) -> &RelayMetrics {
        &self.metrics
    }
}

impl LineSink for ClientLink {
    fn relay_line(&self, line: &Line) {
        let connected = self.state().is_connected();
        if !connected && self.policy == OverflowPolicy::DropNewest {
            self.metrics.record_dropped_disconnected();
            return;
        }
        match self.outbox.push(line.clone()) {
            Enqueue::Queued | Enqueue::Closed => {}
            Enqueue::Dropped if connected => self.metrics.record_dropped_backpressure(),
            Enqueue::Dropped => self.metrics.record_dropped_disconnected(),
        }
    }

    fn close(&self) {
        self.closed.cancel();
        self.outbox.close();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn new_link(policy: OverflowPolicy, depth: usize) -> ClientLink {
        ClientLink::new(depth, policy, Arc::new(RelayMetrics::new()))
    }

    fn connect(link: &ClientLink) {
        link.set_state(ConnectionState::Connecting);
        link.set_state(ConnectionState::Connected);
    }

    #[test]
    fn test_lines_dropped_while_disconnected_by_default() {
        // Arrange
        let link = new_link(OverflowPolicy::DropNewest, 8);

        // Act
        link.relay_line(&Line::from("lost"));

        // Assert
        assert!(link.outbox().is_empty());
        assert_eq!(link.metrics().snapshot().dropped_disconnected, 1);
    }

    #[test]
    fn test_lines_queued_while_connected() {
        let link = new_link(OverflowPolicy::DropNewest, 8);
        connect(&link);

        link.relay_line(&Line::from("kept"));

        assert_eq!(link.outbox().len(), 1);
        assert_eq!(link.metrics().snapshot().dropped_disconnected, 0);
    }

    #[test]
    fn test_drop_oldest_holds_lines_across_outage() {
        // Arrange
        let link = new_link(OverflowPolicy::DropOldest, 2);

        // Act: three lines while down, bounded queue of two
        for l in ["1", "2", "3"] {
            link.relay_line(&Line::from(l));
        }

        // Assert
        assert_eq!(link.outbox().len(), 2);
        assert_eq!(link.metrics().snapshot().dropped_disconnected, 1);
    }

    #[test]
    fn test_disconnect_discards_queue_under_drop_newest() {
        // Arrange
        let link = new_link(OverflowPolicy::DropNewest, 8);
        connect(&link);
        link.relay_line(&Line::from("a"));
        link.relay_line(&Line::from("b"));

        // Act
        link.mark_disconnected();

        // Assert
        assert_eq!(link.state(), ConnectionState::Disconnected);
        assert!(link.outbox().is_empty());
        assert_eq!(link.metrics().snapshot().dropped_disconnected, 2);
    }

    #[test]
    fn test_disconnect_keeps_queue_under_drop_oldest() {
        let link = new_link(OverflowPolicy::DropOldest, 8);
        connect(&link);
        link.relay_line(&Line::from("a"));

        link.mark_disconnected();

        assert_eq!(link.outbox().len(), 1);
    }

    #[test]
    fn test_illegal_transition_is_ignored() {
        let link = new_link(OverflowPolicy::DropNewest, 8);

        link.set_state(ConnectionState::Connected);

        assert_eq!(link.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_subscribers_observe_connect() {
        let link = new_link(OverflowPolicy::DropNewest, 8);
        let mut rx = link.subscribe();

        connect(&link);

        let state = *rx.wait_for(|s| s.is_connected()).await.expect("link alive");
        assert_eq!(state, ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_close_resolves_closed_future() {
        let link = new_link(OverflowPolicy::DropNewest, 8);
        link.close();
        link.closed().await;
        assert!(link.is_closed());
        assert!(link.outbox().is_closed());
    }
}
