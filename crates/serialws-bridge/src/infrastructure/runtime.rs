//! Relay lifecycle: [`start`] wires the pipeline, [`RunningHandle::stop`]
//! takes it down in order.
//!
//! ```text
//!  reader thread ──HandoffSender──▶ pump task ──LineSink──▶ PeerSet / ClientLink
//!  (spawn_blocking)                 (tokio)                   │
//!                                                             ▼
//!                                      accept loop + sessions / reconnect loop
//! ```
//!
//! # Startup order
//!
//! 1. Validate the config (`Config` error, nothing acquired yet).
//! 2. Open the serial device (`DeviceOpen` error).
//! 3. Bind the listener in server mode (`Bind` error).  The device handle
//!    is an owned value, so an early return here closes it again.
//! 4. Spawn transport, pump, reader and stats tasks.
//!
//! # Shutdown order
//!
//! 1. Cancel the shutdown token: the reader flushes its partial line and
//!    exits, the accept loop stops accepting.
//! 2. Wait for the pump to relay the last lines.
//! 3. Close the sink: every connection writes what it still has queued,
//!    sends a Close frame and ends.
//! 4. Anything still running after the grace period is hard-stopped.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serialws_core::{ConnectionState, LineFramer, MetricsSnapshot, RelayMetrics};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::application::client_link::ClientLink;
use crate::application::handoff;
use crate::application::line_reader::{LineReader, SourceOpener};
use crate::application::peers::PeerSet;
use crate::application::relay::{self, LineSink};
use crate::domain::{RelayConfig, RelayError, TransportMode};
use crate::infrastructure::reader_thread::ReaderThread;
use crate::infrastructure::serial_port::SerialOpener;
use crate::infrastructure::ws_client::{run_client_link, ClientOptions};
use crate::infrastructure::ws_server::{self, run_accept_loop, ServerContext};

// ── Public API ────────────────────────────────────────────────────────────────

/// Starts the relay on the serial device named in `config`.
///
/// # Errors
///
/// Fails with a [`RelayError`] (`Config`, `DeviceOpen` or `Bind`) wrapped in
/// `anyhow` context.  On failure nothing is left running or open.
pub async fn start(config: RelayConfig) -> anyhow::Result<RunningHandle> {
    let opener = Arc::new(SerialOpener::new(config.serial.clone()));
    start_with_opener(config, opener).await
}

/// Starts the relay reading from whatever `opener` produces.
///
/// # Errors
///
/// See [`start`].
pub async fn start_with_opener(
    config: RelayConfig,
    opener: Arc<dyn SourceOpener>,
) -> anyhow::Result<RunningHandle> {
    config.validate().map_err(RelayError::from)?;

    let metrics = Arc::new(RelayMetrics::new());
    let shutdown = CancellationToken::new();
    let hard_stop = CancellationToken::new();

    let source = opener
        .open()
        .with_context(|| format!("cannot start relay on {}", opener.device()))?;
    let serial = &config.serial;
    let reader = LineReader::new(
        source,
        LineFramer::new(serial.encoding, serial.line_limit(), serial.replace_control_chars),
        shutdown.clone(),
        Arc::clone(&metrics),
    )
    .with_idle_timeout(serial.idle_timeout());

    let transport = &config.transport;
    let (sink, transport_task, local_addr, link_state) = match transport.mode {
        TransportMode::Server => {
            let listener = ws_server::bind(transport.bind).await?;
            let local_addr = listener
                .local_addr()
                .context("websocket listener has no local address")?;
            let peers = Arc::new(PeerSet::new(
                transport.peer_queue_depth,
                transport.backpressure,
                Arc::clone(&metrics),
            ));
            let ctx = ServerContext {
                peers: Arc::clone(&peers),
                write_timeout: transport.write_timeout(),
                hard_stop: hard_stop.clone(),
                metrics: Arc::clone(&metrics),
            };
            let task = tokio::spawn(run_accept_loop(listener, ctx, shutdown.clone()));
            let sink: Arc<dyn LineSink> = peers;
            (sink, task, Some(local_addr), None)
        }
        TransportMode::Client => {
            let url = transport
                .url
                .clone()
                .context("client mode requires transport.url")?;
            let link = Arc::new(ClientLink::new(
                transport.peer_queue_depth,
                transport.backpressure,
                Arc::clone(&metrics),
            ));
            let state = link.subscribe();
            let options = ClientOptions {
                url,
                backoff: transport.backoff.to_backoff(),
                connect_timeout: transport.connect_timeout(),
                write_timeout: transport.write_timeout(),
            };
            let task = tokio::spawn(run_client_link(Arc::clone(&link), options, hard_stop.clone()));
            let sink: Arc<dyn LineSink> = link;
            (sink, task, None, Some(state))
        }
    };

    let (tx, rx) = handoff::channel(config.relay.channel_capacity, config.relay.handoff_policy);
    let pump = tokio::spawn(relay::pump(rx, Arc::clone(&sink)));
    let reader = ReaderThread {
        reader,
        opener: Arc::clone(&opener),
        tx,
        reopen_backoff: serial.reopen_backoff.to_backoff(),
        cancel: shutdown.clone(),
        metrics: Arc::clone(&metrics),
    }
    .spawn();
    let stats = config
        .relay
        .stats_interval()
        .map(|every| tokio::spawn(log_stats(Arc::clone(&metrics), every, shutdown.clone())));

    info!(
        mode = %transport.mode,
        device = %serial.device,
        encoding = %serial.encoding,
        "relay started"
    );

    Ok(RunningHandle {
        shutdown,
        hard_stop,
        sink,
        reader: Some(reader),
        pump: Some(pump),
        transport: Some(transport_task),
        stats,
        metrics,
        local_addr,
        link_state,
        grace: config.relay.shutdown_grace(),
    })
}

// ── Handle ────────────────────────────────────────────────────────────────────

/// A running relay.  Dropping it without [`RunningHandle::stop`] cancels
/// everything without waiting for queued lines.
pub struct RunningHandle {
    shutdown: CancellationToken,
    hard_stop: CancellationToken,
    sink: Arc<dyn LineSink>,
    reader: Option<JoinHandle<()>>,
    pump: Option<JoinHandle<u64>>,
    transport: Option<JoinHandle<()>>,
    stats: Option<JoinHandle<()>>,
    metrics: Arc<RelayMetrics>,
    local_addr: Option<SocketAddr>,
    link_state: Option<watch::Receiver<ConnectionState>>,
    grace: Duration,
}

impl RunningHandle {
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// The bound listener address in server mode (useful with port 0).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Client-link state updates in client mode.
    pub fn link_state(&self) -> Option<watch::Receiver<ConnectionState>> {
        self.link_state.clone()
    }

    /// Resolves when the pipeline stops on its own, which only happens if
    /// the reader thread dies.  Cancel-safe.
    pub async fn wait(&mut self) {
        if let Some(reader) = self.reader.as_mut() {
            if let Err(e) = reader.await {
                error!("serial reader task failed: {e}");
            }
            self.reader = None;
        }
    }

    /// Stops the relay, flushing the partial line and every queued line that
    /// can still be written within the grace period.  Returns the final
    /// counters.
    pub async fn stop(mut self) -> MetricsSnapshot {
        info!("stopping relay");
        self.shutdown.cancel();

        if let Some(reader) = self.reader.take() {
            join_within("serial reader", reader, self.grace).await;
        }
        if let Some(pump) = self.pump.take() {
            join_within("relay pump", pump, self.grace).await;
        }

        self.sink.close();
        if let Some(mut transport) = self.transport.take() {
            if timeout(self.grace, &mut transport).await.is_err() {
                warn!(grace = ?self.grace, "connections did not drain in time; closing them");
                self.hard_stop.cancel();
                let _ = transport.await;
            }
        }
        self.hard_stop.cancel();

        if let Some(stats) = self.stats.take() {
            let _ = stats.await;
        }

        let snapshot = self.metrics.snapshot();
        log_snapshot("final", &snapshot);
        info!("relay stopped");
        snapshot
    }
}

impl Drop for RunningHandle {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.hard_stop.cancel();
    }
}

/// Awaits `handle` for at most `grace`, aborting it on timeout.
async fn join_within<T>(what: &str, mut handle: JoinHandle<T>, grace: Duration) -> Option<T> {
    match timeout(grace, &mut handle).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            error!("{what} task failed: {e}");
            None
        }
        Err(_) => {
            warn!(?grace, "{what} did not stop in time");
            handle.abort();
            None
        }
    }
}

// ── Stats ─────────────────────────────────────────────────────────────────────

async fn log_stats(metrics: Arc<RelayMetrics>, every: Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => log_snapshot("periodic", &metrics.snapshot()),
        }
    }
}

fn log_snapshot(kind: &str, snapshot: &MetricsSnapshot) {
    match serde_json::to_string(snapshot) {
        Ok(json) => info!(target: "serialws::stats", kind, stats = %json, "relay stats"),
        Err(e) => warn!("could not render relay stats: {e}"),
    }
}
