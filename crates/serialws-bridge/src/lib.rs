//! serialws-bridge library crate.
//!
//! Relays newline-delimited text read from a serial device to websocket
//! consumers, one text message per line.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! serial device (bytes)
//!         ↓
//! [serialws-bridge]
//!   ├── domain/            RelayConfig, RelayError, ConfigError
//!   ├── application/       LineReader, hand-off channel, PeerSet, ClientLink
//!   └── infrastructure/
//!         ├── serial_port    serialport-backed ByteSource
//!         ├── reader_thread  blocking read loop with reopen backoff
//!         ├── ws_server      accept loop, one task per peer
//!         ├── ws_client      outbound link with reconnect
//!         └── runtime        start() / RunningHandle::stop()
//!         ↓
//! websocket consumers (one text frame per line)
//! ```
//!
//! Framing, decoding, queues, backoff and metrics live in `serialws-core`,
//! which does no I/O at all.
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async.
//! - `application` depends on `domain` and `serialws-core`; its only async
//!   pieces are channel and queue waits.
//! - `infrastructure` depends on all other layers plus `tokio`,
//!   `tokio-tungstenite` and `serialport`.
//!
//! # Example
//!
//! ```no_run
//! # async fn demo() -> anyhow::Result<()> {
//! use serialws_bridge::domain::RelayConfig;
//!
//! let mut config = RelayConfig::default();
//! config.serial.device = "/dev/ttyACM0".into();
//! let relay = serialws_bridge::infrastructure::start(config).await?;
//! // ... later
//! let stats = relay.stop().await;
//! println!("relayed {} lines", stats.lines_read);
//! # Ok(())
//! # }
//! ```

/// Domain layer: configuration and error types (no I/O).
pub mod domain;

/// Application layer: line reading and fan-out logic.
pub mod application;

/// Infrastructure layer: serial device, websockets and lifecycle.
pub mod infrastructure;
