//! Server mode: websocket accept loop and per-peer session tasks.
//!
//! This module is responsible for:
//!
//! 1. Binding the TCP listener (a failure here is fatal, see [`bind`]).
//! 2. Accepting incoming TCP connections until shutdown is requested.
//! 3. Upgrading each connection to a websocket session.
//! 4. Registering the session in the [`PeerSet`] so it receives every line
//!    relayed from then on, and unregistering it when the session ends.
//!
//! # Scalability
//!
//! Each peer runs in its own Tokio task, tracked in a `JoinSet` owned by the
//! accept loop.  After shutdown is requested the loop stops accepting, then
//! waits for the sessions to drain their outboxes and close.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serialws_core::RelayMetrics;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_tungstenite::accept_async;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::application::peers::PeerSet;
use crate::domain::RelayError;
use crate::infrastructure::ws_session::{drive_connection, SessionEnd};

/// Pause after a failed `accept()` (e.g. out of file descriptors).
const ACCEPT_ERROR_PAUSE: Duration = Duration::from_millis(100);

// ── Public API ────────────────────────────────────────────────────────────────

/// Binds the websocket listener.
///
/// # Errors
///
/// Returns [`RelayError::Bind`] if the address is in use or not permitted.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener, RelayError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| RelayError::Bind { addr, source })
}

/// What every peer session needs.
#[derive(Clone)]
pub struct ServerContext {
    pub peers: Arc<PeerSet>,
    pub write_timeout: Duration,
    /// Aborts sessions that have not drained within the shutdown grace.
    pub hard_stop: CancellationToken,
    pub metrics: Arc<RelayMetrics>,
}

/// Accepts peers until `shutdown` fires, then waits for every session to end.
pub async fn run_accept_loop(listener: TcpListener, ctx: ServerContext, shutdown: CancellationToken) {
    match listener.local_addr() {
        Ok(addr) => info!("websocket server listening on ws://{addr}"),
        Err(e) => warn!("websocket server listening (local address unknown: {e})"),
    }

    let mut sessions = JoinSet::new();
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("shutdown requested; stopping accept loop");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer_addr)) => {
                    info!("new websocket connection from {peer_addr}");
                    sessions.spawn(handle_peer(stream, peer_addr, ctx.clone()));
                }
                Err(e) => {
                    // Transient (e.g. EMFILE): log and keep serving.
                    error!("accept error: {e}");
                    tokio::time::sleep(ACCEPT_ERROR_PAUSE).await;
                }
            },
            // Reap finished sessions so the set does not grow without bound.
            Some(_) = sessions.join_next(), if !sessions.is_empty() => {}
        }
    }

    // No new peers from here on; existing ones drain once the peer set closes.
    drop(listener);
    while sessions.join_next().await.is_some() {}
    info!("all websocket sessions finished");
}

// ── Per-session handler ───────────────────────────────────────────────────────

async fn handle_peer(stream: TcpStream, peer_addr: SocketAddr, ctx: ServerContext) {
    match run_peer(stream, peer_addr, &ctx).await {
        Ok(end) => info!("session {peer_addr} ended: {end}"),
        Err(e) => warn!("session {peer_addr} closed with error: {e:#}"),
    }
}

async fn run_peer(
    stream: TcpStream,
    peer_addr: SocketAddr,
    ctx: &ServerContext,
) -> anyhow::Result<SessionEnd> {
    // Lines are small and latency matters more than packet count.
    if let Err(e) = stream.set_nodelay(true) {
        warn!("session {peer_addr}: could not disable Nagle: {e}");
    }

    let ws_stream = tokio::select! {
        _ = ctx.hard_stop.cancelled() => return Ok(SessionEnd::Stopped),
        handshake = timeout(ctx.write_timeout, accept_async(stream)) => handshake
            .with_context(|| format!("WebSocket handshake with {peer_addr} timed out"))?
            .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?,
    };

    let Some(peer) = ctx.peers.register(peer_addr) else {
        // The relay is shutting down.
        return Ok(SessionEnd::Stopped);
    };

    let label = peer_addr.to_string();
    let result = drive_connection(
        ws_stream,
        &peer.outbox,
        ctx.write_timeout,
        &ctx.hard_stop,
        &label,
        &ctx.metrics,
    )
    .await;
    ctx.peers.unregister(peer.id);

    Ok(result?)
}
