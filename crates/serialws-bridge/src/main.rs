//! serialws-bridge: serial line to websocket relay, entry point.
//!
//! Reads newline-delimited text from a serial device and publishes every line
//! as one websocket text message.  In `server` mode browsers and scripts
//! connect to the relay; in `client` mode the relay connects out to a remote
//! endpoint and keeps reconnecting.
//!
//! # Usage
//!
//! ```text
//! serialws-bridge [OPTIONS]
//!
//!   --config <FILE>          TOML config file (CLI flags override it)
//!   --device <PATH>          Serial device [default: /dev/ttyUSB0]
//!   --baud <RATE>            Baud rate [default: 9600]
//!   --mode <server|client>   Transport mode [default: server]
//!   --bind <ADDR>            Server listen address [default: 127.0.0.1:8000]
//!   --url <URL>              Client target, ws:// or wss://
//!   --list-ports             Print the serial ports the OS reports and exit
//!   --print-config           Print the effective config as TOML and exit
//! ```
//!
//! # Precedence
//!
//! Built-in defaults, then the `--config` file, then environment variables
//! (`SERIALWS_*`), then command-line flags.  Log filtering follows `RUST_LOG`
//! when it is set and the configured `log_level` otherwise.
//!
//! # Exit status
//!
//! Non-zero when startup fails: invalid configuration, the device cannot be
//! opened, or the listen address cannot be bound.  Faults after startup are
//! recovered and only logged.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use serialws_core::{OverflowPolicy, TextEncoding};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use serialws_bridge::domain::{Parity, RelayConfig, TransportMode};
use serialws_bridge::infrastructure::config_file::{load_config, render_config};
use serialws_bridge::infrastructure::serial_port::{framing_label, list_ports};
use serialws_bridge::infrastructure::start;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Serial line to websocket relay.
///
/// Every option is optional.  An option that is not given keeps the value from
/// the config file, or the built-in default when there is no file.
#[derive(Debug, Parser)]
#[command(
    name = "serialws-bridge",
    about = "Relays newline-delimited serial input to websocket consumers",
    version
)]
struct Cli {
    /// TOML config file.
    #[arg(long, env = "SERIALWS_CONFIG")]
    config: Option<PathBuf>,

    /// Serial device path, e.g. `/dev/ttyUSB0` or `COM3`.
    #[arg(long, env = "SERIALWS_DEVICE")]
    device: Option<String>,

    /// Baud rate.
    #[arg(long, env = "SERIALWS_BAUD")]
    baud: Option<u32>,

    /// Parity: `none`, `odd` or `even`.
    #[arg(long, env = "SERIALWS_PARITY")]
    parity: Option<Parity>,

    /// Data bits: 7 or 8.
    #[arg(long, env = "SERIALWS_DATA_BITS")]
    data_bits: Option<u8>,

    /// Stop bits: 1 or 2.
    #[arg(long, env = "SERIALWS_STOP_BITS")]
    stop_bits: Option<u8>,

    /// Text encoding of the device output: `utf-8`, `latin-1` or `ascii`.
    #[arg(long, env = "SERIALWS_ENCODING")]
    encoding: Option<TextEncoding>,

    /// Transport mode: `server` or `client`.
    #[arg(long, env = "SERIALWS_MODE")]
    mode: Option<TransportMode>,

    /// Listen address in server mode.
    #[arg(long, env = "SERIALWS_BIND")]
    bind: Option<SocketAddr>,

    /// Target URL in client mode.
    #[arg(long, env = "SERIALWS_URL")]
    url: Option<String>,

    /// Longest line in bytes before it is force-emitted; 0 means unlimited.
    #[arg(long, env = "SERIALWS_MAX_LINE_LENGTH")]
    max_line_length: Option<usize>,

    /// What to do when a consumer falls behind: `drop-oldest` or
    /// `drop-newest`.
    #[arg(long, env = "SERIALWS_BACKPRESSURE")]
    backpressure: Option<OverflowPolicy>,

    /// Lines queued per consumer before the backpressure policy applies.
    #[arg(long, env = "SERIALWS_QUEUE_DEPTH")]
    queue_depth: Option<usize>,

    /// Lines buffered between the serial reader and the relay.
    #[arg(long, env = "SERIALWS_CHANNEL_CAPACITY")]
    channel_capacity: Option<usize>,

    /// Log filter used when `RUST_LOG` is not set, e.g. `debug`.
    #[arg(long, env = "SERIALWS_LOG_LEVEL")]
    log_level: Option<String>,

    /// Print the serial ports the OS reports and exit.
    #[arg(long)]
    list_ports: bool,

    /// Print the effective configuration as TOML and exit.
    #[arg(long)]
    print_config: bool,
}

impl Cli {
    /// Loads the config file (if any), overlays the flags and validates the
    /// result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the merged
    /// configuration fails [`RelayConfig::validate`].
    fn into_relay_config(self) -> anyhow::Result<RelayConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => RelayConfig::default(),
        };

        let serial = &mut config.serial;
        if let Some(device) = self.device {
            serial.device = device;
        }
        if let Some(baud) = self.baud {
            serial.baud_rate = baud;
        }
        if let Some(parity) = self.parity {
            serial.parity = parity;
        }
        if let Some(bits) = self.data_bits {
            serial.data_bits = bits;
        }
        if let Some(bits) = self.stop_bits {
            serial.stop_bits = bits;
        }
        if let Some(encoding) = self.encoding {
            serial.encoding = encoding;
        }
        if let Some(max) = self.max_line_length {
            serial.max_line_length = max;
        }

        let transport = &mut config.transport;
        if let Some(mode) = self.mode {
            transport.mode = mode;
        }
        if let Some(bind) = self.bind {
            transport.bind = bind;
        }
        if let Some(url) = self.url {
            transport.url = Some(url);
        }
        if let Some(policy) = self.backpressure {
            transport.backpressure = policy;
        }
        if let Some(depth) = self.queue_depth {
            transport.peer_queue_depth = depth;
        }

        if let Some(capacity) = self.channel_capacity {
            config.relay.channel_capacity = capacity;
        }
        if let Some(level) = self.log_level {
            config.relay.log_level = level;
        }

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.list_ports {
        return print_ports();
    }

    let print_config = cli.print_config;
    let config = cli.into_relay_config()?;
    if print_config {
        print!("{}", render_config(&config)?);
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.relay.log_level)),
        )
        .init();

    info!(
        device = %config.serial.device,
        baud = config.serial.baud_rate,
        framing = %framing_label(&config.serial),
        mode = %config.transport.mode,
        "serialws-bridge starting"
    );

    let mut relay = start(config).await?;

    tokio::select! {
        _ = shutdown_signal() => info!("shutdown signal received"),
        _ = relay.wait() => error!("serial reader stopped unexpectedly"),
    }

    let stats = relay.stop().await;
    info!(
        lines_read = stats.lines_read,
        lines_delivered = stats.lines_delivered,
        "serialws-bridge stopped"
    );
    Ok(())
}

fn print_ports() -> anyhow::Result<()> {
    let ports = list_ports().context("cannot enumerate serial ports")?;
    if ports.is_empty() {
        println!("no serial ports found");
    }
    for port in ports {
        println!("{port}");
    }
    Ok(())
}

/// Resolves on Ctrl+C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_without_flags_leaves_everything_unset() {
        // Arrange / Act
        let cli = Cli::parse_from(["serialws-bridge"]);

        // Assert
        assert!(cli.device.is_none());
        assert!(cli.mode.is_none());
        assert!(!cli.list_ports);
        assert!(!cli.print_config);
    }

    #[test]
    fn test_into_relay_config_without_flags_is_default() {
        let cli = Cli::parse_from(["serialws-bridge"]);
        let config = cli.into_relay_config().unwrap();
        assert_eq!(config, RelayConfig::default());
    }

    #[test]
    fn test_cli_serial_overrides() {
        // Arrange
        let cli = Cli::parse_from([
            "serialws-bridge",
            "--device",
            "/dev/ttyACM1",
            "--baud",
            "115200",
            "--parity",
            "even",
            "--data-bits",
            "7",
            "--stop-bits",
            "2",
            "--encoding",
            "latin-1",
            "--max-line-length",
            "0",
        ]);

        // Act
        let config = cli.into_relay_config().unwrap();

        // Assert
        assert_eq!(config.serial.device, "/dev/ttyACM1");
        assert_eq!(config.serial.baud_rate, 115_200);
        assert_eq!(config.serial.parity, Parity::Even);
        assert_eq!(config.serial.data_bits, 7);
        assert_eq!(config.serial.stop_bits, 2);
        assert_eq!(config.serial.encoding, TextEncoding::Latin1);
        assert_eq!(config.serial.line_limit(), None);
    }

    #[test]
    fn test_cli_client_mode_with_url() {
        let cli = Cli::parse_from([
            "serialws-bridge",
            "--mode",
            "client",
            "--url",
            "ws://10.0.0.5:9000/feed",
            "--backpressure",
            "drop-newest",
            "--queue-depth",
            "8",
        ]);
        let config = cli.into_relay_config().unwrap();
        assert_eq!(config.transport.mode, TransportMode::Client);
        assert_eq!(config.transport.url.as_deref(), Some("ws://10.0.0.5:9000/feed"));
        assert_eq!(config.transport.backpressure, OverflowPolicy::DropNewest);
        assert_eq!(config.transport.peer_queue_depth, 8);
    }

    #[test]
    fn test_cli_bind_override() {
        let cli = Cli::parse_from(["serialws-bridge", "--bind", "0.0.0.0:9100"]);
        let config = cli.into_relay_config().unwrap();
        assert_eq!(config.transport.bind.to_string(), "0.0.0.0:9100");
    }

    #[test]
    fn test_cli_client_mode_without_url_is_rejected() {
        // Arrange
        let cli = Cli::parse_from(["serialws-bridge", "--mode", "client"]);

        // Act
        let result = cli.into_relay_config();

        // Assert: must return an error, not panic
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_zero_queue_depth_is_rejected() {
        let cli = Cli::parse_from(["serialws-bridge", "--queue-depth", "0"]);
        assert!(cli.into_relay_config().is_err());
    }

    #[test]
    fn test_cli_rejects_unknown_parity() {
        let result = Cli::try_parse_from(["serialws-bridge", "--parity", "mark"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_rejects_malformed_bind_address() {
        let result = Cli::try_parse_from(["serialws-bridge", "--bind", "not-an-address"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_flags_override_config_file() {
        // Arrange: a file that sets the device and baud rate
        let path = std::env::temp_dir().join(format!("serialws-cli-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(&path, "[serial]\ndevice = \"/dev/ttyS4\"\nbaud_rate = 19200\n").unwrap();
        let path_arg = path.to_string_lossy().into_owned();
        let cli = Cli::parse_from([
            "serialws-bridge",
            "--config",
            path_arg.as_str(),
            "--baud",
            "57600",
        ]);

        // Act
        let config = cli.into_relay_config().unwrap();
        let _ = std::fs::remove_file(&path);

        // Assert: the flag wins, the file value survives where no flag is given
        assert_eq!(config.serial.device, "/dev/ttyS4");
        assert_eq!(config.serial.baud_rate, 57_600);
    }

    #[test]
    fn test_cli_missing_config_file_is_an_error() {
        let cli = Cli::parse_from(["serialws-bridge", "--config", "/nonexistent/serialws.toml"]);
        assert!(cli.into_relay_config().is_err());
    }
}
