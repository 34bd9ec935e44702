//! Client mode: one outbound websocket connection, reconnected forever.
//!
//! ```text
//!            ┌──────────── backoff sleep ◀───────────┐
//!            ▼                                       │
//!   Disconnected ──▶ Connecting ──fail/timeout──▶ Disconnected
//!                        │
//!                        └──ok──▶ Connected ──drop/error──▶ Disconnected
//! ```
//!
//! The backoff resets after every successful connect.  Only a closed link
//! (relay shutdown) or the hard-stop token ends the loop.

use std::sync::Arc;
use std::time::Duration;

use serialws_core::{Backoff, ConnectionState};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::application::client_link::ClientLink;
use crate::domain::RelayError;
use crate::infrastructure::ws_session::{drive_connection, SessionEnd};

/// Connection parameters for [`run_client_link`].
pub struct ClientOptions {
    pub url: String,
    pub backoff: Backoff,
    pub connect_timeout: Duration,
    pub write_timeout: Duration,
}

/// Keeps `link` connected to `opts.url` until the link is closed.
pub async fn run_client_link(link: Arc<ClientLink>, mut opts: ClientOptions, hard_stop: CancellationToken) {
    let url = opts.url.clone();
    let mut ever_connected = false;

    loop {
        link.set_state(ConnectionState::Connecting);
        let attempt = tokio::select! {
            _ = hard_stop.cancelled() => break,
            _ = link.closed() => break,
            attempt = timeout(opts.connect_timeout, connect_async(url.as_str())) => attempt,
        };

        match attempt {
            Ok(Ok((ws_stream, _response))) => {
                link.set_state(ConnectionState::Connected);
                if ever_connected {
                    link.metrics().record_reconnect();
                    info!(%url, "reconnected");
                } else {
                    info!(%url, "connected");
                }
                ever_connected = true;
                opts.backoff.reset();

                let end = drive_connection(
                    ws_stream,
                    link.outbox(),
                    opts.write_timeout,
                    &hard_stop,
                    &url,
                    link.metrics(),
                )
                .await;
                link.mark_disconnected();

                match end {
                    Ok(SessionEnd::Drained | SessionEnd::Stopped) => break,
                    Ok(SessionEnd::ClosedByPeer) => warn!(%url, "server closed the connection"),
                    Err(e) => warn!(error = %e, "connection lost"),
                }
            }
            Ok(Err(e)) => {
                link.set_state(ConnectionState::Disconnected);
                let err = RelayError::TransportConnect {
                    url: url.clone(),
                    reason: e.to_string(),
                };
                warn!(error = %err, "connect attempt failed");
            }
            Err(_) => {
                link.set_state(ConnectionState::Disconnected);
                let err = RelayError::TransportConnect {
                    url: url.clone(),
                    reason: format!("timed out after {:?}", opts.connect_timeout),
                };
                warn!(error = %err, "connect attempt failed");
            }
        }

        let delay = opts.backoff.next_delay();
        info!(%url, ?delay, attempt = opts.backoff.attempts(), "reconnecting");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = hard_stop.cancelled() => break,
            _ = link.closed() => break,
        }
    }

    link.mark_disconnected();
    info!(%url, "client link stopped");
}
