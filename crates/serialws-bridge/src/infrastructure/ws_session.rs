//! One websocket connection's read/write loop, shared by server peers and the
//! client link.
//!
//! The connection is push-only: every line popped from the [`Outbox`] becomes
//! one text frame, and whatever the other side sends is read and discarded
//! (tungstenite answers pings on its own while we keep reading).  The loop
//! ends when:
//!
//! - the outbox is closed and drained (relay shutdown, a Close frame is sent),
//! - the other side closes or the connection breaks,
//! - a write does not finish within the write timeout, or
//! - the hard-stop token fires (shutdown grace period exceeded).
//!
//! A line whose write fails is counted in `dropped_disconnected`.

use std::fmt;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serialws_core::RelayMetrics;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::application::outbox::Outbox;
use crate::domain::RelayError;

/// How a session ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The outbox was closed and every queued line was written.
    Drained,
    /// The other side closed the connection.
    ClosedByPeer,
    /// The hard-stop token fired.
    Stopped,
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionEnd::Drained => "drained",
            SessionEnd::ClosedByPeer => "closed by peer",
            SessionEnd::Stopped => "stopped",
        })
    }
}

/// Writes lines from `outbox` to `ws` until one of the end conditions above.
///
/// # Errors
///
/// Returns [`RelayError::TransportDisconnect`] when a read or write fails or a
/// write times out.
pub async fn drive_connection<S>(
    ws: WebSocketStream<S>,
    outbox: &Outbox,
    write_timeout: Duration,
    hard_stop: &CancellationToken,
    peer: &str,
    metrics: &RelayMetrics,
) -> Result<SessionEnd, RelayError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut ws_tx, mut ws_rx) = ws.split();
    let disconnect = |reason: String| RelayError::TransportDisconnect {
        peer: peer.to_string(),
        reason,
    };

    loop {
        tokio::select! {
            biased;

            _ = hard_stop.cancelled() => {
                let _ = timeout(write_timeout, ws_tx.send(WsMessage::Close(None))).await;
                return Ok(SessionEnd::Stopped);
            }

            incoming = ws_rx.next() => match incoming {
                Some(Ok(WsMessage::Close(frame))) => {
                    debug!(peer, ?frame, "close frame received");
                    // Flushes tungstenite's queued close reply.
                    let _ = timeout(write_timeout, ws_tx.close()).await;
                    return Ok(SessionEnd::ClosedByPeer);
                }
                Some(Ok(other)) => {
                    trace!(peer, len = other.len(), "ignoring inbound frame");
                }
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) | None => {
                    return Ok(SessionEnd::ClosedByPeer);
                }
                Some(Err(e)) => return Err(disconnect(e.to_string())),
            },

            next = outbox.next() => match next {
                Some(line) => {
                    let frame = WsMessage::Text(line.to_string());
                    let reason = match timeout(write_timeout, ws_tx.send(frame)).await {
                        Ok(Ok(())) => {
                            metrics.record_delivered();
                            continue;
                        }
                        Ok(Err(e)) => e.to_string(),
                        Err(_) => format!("write timed out after {write_timeout:?}"),
                    };
                    // The line already left the outbox; it is lost with the connection.
                    metrics.record_dropped_disconnected();
                    return Err(disconnect(reason));
                }
                None => {
                    let _ = timeout(write_timeout, ws_tx.send(WsMessage::Close(None))).await;
                    return Ok(SessionEnd::Drained);
                }
            },
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
