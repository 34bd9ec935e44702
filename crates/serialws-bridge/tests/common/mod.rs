//! Helpers shared by the relay integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use serialws_bridge::domain::RelayConfig;
use serialws_bridge::infrastructure::scripted::{ScriptedOpener, SourceScript};
use serialws_bridge::infrastructure::{start_with_opener, RunningHandle};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

pub type Consumer = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const STEP: Duration = Duration::from_secs(5);

/// Server-mode config on an ephemeral loopback port with stats logging off.
pub fn server_config() -> RelayConfig {
    let mut config = RelayConfig::default();
    config.transport.bind = "127.0.0.1:0".parse().expect("loopback address");
    config.relay.stats_interval_secs = 0;
    config.relay.shutdown_grace_ms = 2_000;
    config
}

pub async fn start_scripted(config: RelayConfig) -> (RunningHandle, SourceScript) {
    let script = SourceScript::new();
    let opener = Arc::new(ScriptedOpener::new("/dev/ttyTEST", script.clone()));
    let handle = start_with_opener(config, opener).await.expect("relay starts");
    (handle, script)
}

pub async fn connect(handle: &RunningHandle) -> Consumer {
    let addr = handle.local_addr().expect("server mode");
    let (ws, _) = timeout(STEP, tokio_tungstenite::connect_async(format!("ws://{addr}")))
        .await
        .expect("connect timed out")
        .expect("websocket handshake");
    ws
}

/// Polls `check` every 10 ms until it holds, panicking after [`STEP`].
pub async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + STEP;
    while !check() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub async fn wait_for_peers(handle: &RunningHandle, n: u64) {
    eventually("peer registration", || handle.metrics().peers_connected == n).await;
}

/// Next text frame, skipping control frames.  `None` once the server closes.
pub async fn next_text(ws: &mut Consumer) -> Option<String> {
    loop {
        let frame = timeout(STEP, ws.next()).await.expect("no frame within timeout");
        match frame {
            Some(Ok(Message::Text(text))) => return Some(text),
            Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return None,
            Some(Ok(_)) => continue,
        }
    }
}
