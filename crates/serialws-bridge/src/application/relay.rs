//! Transport Relay: the pump that moves lines from the reader to the sink.
//!
//! [`LineSink`] is the seam between the relay and the websocket transports.
//! Server mode plugs in a [`PeerSet`](crate::application::peers::PeerSet),
//! client mode a [`ClientLink`](crate::application::client_link::ClientLink);
//! tests plug in a `MockLineSink`.

use std::sync::Arc;

use serialws_core::Line;
use tracing::{debug, info};

use crate::application::handoff::HandoffReceiver;

/// Destination for relayed lines.
#[cfg_attr(test, mockall::automock)]
pub trait LineSink: Send + Sync {
    /// Enqueues `line` for every live connection.
    ///
    /// Must not wait on network I/O.  A connection that cannot accept the
    /// line loses it (counted in metrics); the others are unaffected.
    fn relay_line(&self, line: &Line);

    /// Stops accepting lines.  Connections flush what is queued and close.
    fn close(&self);
}

/// Relays every line from `rx` to `sink`, in order, until the reader side of
/// the channel is dropped.  Returns the number of lines relayed.
///
/// Cancellation is not observed here.  On shutdown the reader flushes its
/// partial line before dropping the sender, and that line is relayed too.
pub async fn pump(mut rx: HandoffReceiver<Line>, sink: Arc<dyn LineSink>) -> u64 {
    let mut relayed = 0u64;
    while let Some(line) = rx.recv().await {
        debug!(len = line.len(), "relaying line");
        sink.relay_line(&line);
        relayed += 1;
    }
    info!(relayed, "relay pump finished");
    relayed
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::handoff::channel;
    use crate::domain::HandoffPolicy;
    use mockall::Sequence;

    #[tokio::test]
    async fn test_pump_relays_lines_in_order() {
        // Arrange
        let mut sink = MockLineSink::new();
        let mut seq = Sequence::new();
        for expected in ["A", "B", ""] {
            sink.expect_relay_line()
                .withf(move |line| line.as_str() == expected)
                .times(1)
                .in_sequence(&mut seq)
                .return_const(());
        }
        let (tx, rx) = channel(4, HandoffPolicy::Block);
        for l in ["A", "B", ""] {
            tx.send(Line::from(l)).unwrap();
        }
        drop(tx);

        // Act
        let relayed = pump(rx, Arc::new(sink)).await;

        // Assert: expectations are verified when the mock is dropped
        assert_eq!(relayed, 3);
    }

    #[tokio::test]
    async fn test_pump_ends_when_reader_goes_away() {
        let mut sink = MockLineSink::new();
        sink.expect_relay_line().times(0);
        let (tx, rx) = channel::<Line>(4, HandoffPolicy::Block);
        drop(tx);

        assert_eq!(pump(rx, Arc::new(sink)).await, 0);
    }
}
