//! Relay configuration schema.
//!
//! [`RelayConfig`] is the single source of truth for all runtime settings.  It
//! is deserialised from an optional TOML file, overlaid by CLI flags and
//! environment variables in `main.rs`, and then checked once with
//! [`RelayConfig::validate`] before any device or socket is opened.
//!
//! # Example file
//!
//! ```toml
//! [serial]
//! device = "/dev/ttyUSB0"
//! baud_rate = 9600
//! parity = "none"
//! max_line_length = 4096
//! encoding = "utf-8"
//!
//! [transport]
//! mode = "server"
//! bind = "127.0.0.1:8000"
//! backpressure = "drop-newest"
//!
//! [relay]
//! channel_capacity = 32
//! stats_interval_secs = 60
//! ```
//!
//! # Serde default values (for beginners)
//!
//! Every field carries `#[serde(default = "...")]`, so a file only needs the
//! keys that differ from the defaults and an empty file is a valid config.
//!
//! Durations are stored as integer milliseconds (or seconds where noted) so
//! the TOML stays readable without a duration-parsing crate.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serialws_core::{Backoff, OverflowPolicy, TextEncoding};

use crate::domain::error::ConfigError;

// ── Enumerated settings ───────────────────────────────────────────────────────

/// Serial parity bit setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

impl FromStr for Parity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "n" => Ok(Parity::None),
            "odd" | "o" => Ok(Parity::Odd),
            "even" | "e" => Ok(Parity::Even),
            other => Err(format!("unknown parity '{other}' (expected none, odd or even)")),
        }
    }
}

/// Which side of the websocket connection the relay plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportMode {
    /// Accept inbound connections and broadcast every line to all of them.
    #[default]
    Server,
    /// Keep one outbound connection to `transport.url`, reconnecting forever.
    Client,
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransportMode::Server => "server",
            TransportMode::Client => "client",
        })
    }
}

impl FromStr for TransportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "server" => Ok(TransportMode::Server),
            "client" => Ok(TransportMode::Client),
            other => Err(format!("unknown mode '{other}' (expected server or client)")),
        }
    }
}

/// What the serial reader does when the hand-off channel to the relay is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HandoffPolicy {
    /// The reader waits for space.  Serial input is slow enough that the
    /// relay, which never waits on the network, always catches up.
    #[default]
    Block,
    /// The oldest queued line is evicted and counted as a channel overflow.
    DropOldest,
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level relay configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RelayConfig {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub relay: PipelineConfig,
}

/// Serial device and line-framing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Device path, e.g. `/dev/ttyUSB0` or `COM3`.
    #[serde(default = "default_device")]
    pub device: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default)]
    pub parity: Parity,
    /// 7 or 8.
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    /// 1 or 2.
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    /// How long one blocking read waits before reporting "no data yet".
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Silence after which the device is probed for liveness.  0 disables.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Byte cap for one line before it is force-emitted.  0 means unlimited.
    #[serde(default = "default_max_line_length")]
    pub max_line_length: usize,
    #[serde(default)]
    pub encoding: TextEncoding,
    /// Replace C0 control characters (except TAB) and DEL with U+FFFD.
    #[serde(default = "default_true")]
    pub replace_control_chars: bool,
    /// Delay schedule for reopening the device after a runtime fault.
    #[serde(default)]
    pub reopen_backoff: BackoffConfig,
}

/// Websocket transport settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default)]
    pub mode: TransportMode,
    /// Listen address in server mode.
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
    /// Target endpoint in client mode, e.g. `ws://dashboard.local:8000/probe`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Client-mode reconnect schedule.
    #[serde(default)]
    pub backoff: BackoffConfig,
    /// Per-peer overflow policy.
    #[serde(default)]
    pub backpressure: OverflowPolicy,
    /// Outbound lines buffered per peer before the backpressure policy applies.
    #[serde(default = "default_peer_queue_depth")]
    pub peer_queue_depth: usize,
    /// Upper bound on a single websocket write.
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
    /// Upper bound on one client-mode connect attempt (TCP + handshake).
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

/// Exponential backoff schedule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

/// Reader → relay plumbing and operational settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Slots in the hand-off channel between the reader thread and the relay.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    #[serde(default)]
    pub handoff_policy: HandoffPolicy,
    /// Period of the metrics log line.  0 disables it.
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,
    /// How long `stop()` waits for each stage to drain before giving up on it.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
    /// `tracing` filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_device() -> String {
    "/dev/ttyUSB0".to_string()
}
fn default_baud_rate() -> u32 {
    9600
}
fn default_data_bits() -> u8 {
    8
}
fn default_stop_bits() -> u8 {
    1
}
fn default_read_timeout_ms() -> u64 {
    1_000
}
fn default_idle_timeout_secs() -> u64 {
    30
}
fn default_max_line_length() -> usize {
    4096
}
fn default_true() -> bool {
    true
}
fn default_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8000))
}
fn default_peer_queue_depth() -> usize {
    64
}
fn default_write_timeout_ms() -> u64 {
    5_000
}
fn default_connect_timeout_ms() -> u64 {
    10_000
}
fn default_initial_delay_ms() -> u64 {
    500
}
fn default_multiplier() -> f64 {
    2.0
}
fn default_max_delay_ms() -> u64 {
    30_000
}
fn default_channel_capacity() -> usize {
    32
}
fn default_stats_interval_secs() -> u64 {
    60
}
fn default_shutdown_grace_ms() -> u64 {
    5_000
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            baud_rate: default_baud_rate(),
            parity: Parity::default(),
            data_bits: default_data_bits(),
            stop_bits: default_stop_bits(),
            read_timeout_ms: default_read_timeout_ms(),
            idle_timeout_secs: default_idle_timeout_secs(),
            max_line_length: default_max_line_length(),
            encoding: TextEncoding::default(),
            replace_control_chars: default_true(),
            reopen_backoff: BackoffConfig::default(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            mode: TransportMode::default(),
            bind: default_bind(),
            url: None,
            backoff: BackoffConfig::default(),
            backpressure: OverflowPolicy::default(),
            peer_queue_depth: default_peer_queue_depth(),
            write_timeout_ms: default_write_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            multiplier: default_multiplier(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            handoff_policy: HandoffPolicy::default(),
            stats_interval_secs: default_stats_interval_secs(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            log_level: default_log_level(),
        }
    }
}

// ── Derived values ────────────────────────────────────────────────────────────

impl SerialConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// `None` when the idle probe is disabled.
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }

    /// `None` when lines are unlimited.
    pub fn line_limit(&self) -> Option<usize> {
        (self.max_line_length > 0).then_some(self.max_line_length)
    }
}

impl TransportConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl BackoffConfig {
    /// Builds a fresh [`Backoff`] following this schedule.
    pub fn to_backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.initial_delay_ms),
            self.multiplier,
            Duration::from_millis(self.max_delay_ms),
        )
    }

    fn validate(&self, section: &'static str) -> Result<(), ConfigError> {
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(ConfigError::invalid(
                section,
                format!("multiplier must be >= 1, got {}", self.multiplier),
            ));
        }
        if self.initial_delay_ms == 0 {
            return Err(ConfigError::invalid(section, "initial_delay_ms must be > 0"));
        }
        if self.max_delay_ms == 0 {
            return Err(ConfigError::invalid(section, "max_delay_ms must be > 0"));
        }
        if self.initial_delay_ms > self.max_delay_ms {
            return Err(ConfigError::invalid(
                section,
                format!(
                    "initial_delay_ms ({}) exceeds max_delay_ms ({})",
                    self.initial_delay_ms, self.max_delay_ms
                ),
            ));
        }
        Ok(())
    }
}

impl PipelineConfig {
    pub fn stats_interval(&self) -> Option<Duration> {
        (self.stats_interval_secs > 0).then(|| Duration::from_secs(self.stats_interval_secs))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

// ── Validation ────────────────────────────────────────────────────────────────

impl RelayConfig {
    /// Rejects settings that cannot work, before any resource is acquired.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let serial = &self.serial;
        if serial.device.trim().is_empty() {
            return Err(ConfigError::invalid("serial.device", "must not be empty"));
        }
        if serial.baud_rate == 0 {
            return Err(ConfigError::invalid("serial.baud_rate", "must be > 0"));
        }
        if !matches!(serial.data_bits, 7 | 8) {
            return Err(ConfigError::invalid(
                "serial.data_bits",
                format!("unsupported value {} (expected 7 or 8)", serial.data_bits),
            ));
        }
        if !matches!(serial.stop_bits, 1 | 2) {
            return Err(ConfigError::invalid(
                "serial.stop_bits",
                format!("unsupported value {} (expected 1 or 2)", serial.stop_bits),
            ));
        }
        if serial.read_timeout_ms == 0 {
            return Err(ConfigError::invalid("serial.read_timeout_ms", "must be > 0"));
        }
        serial.reopen_backoff.validate("serial.reopen_backoff")?;

        let transport = &self.transport;
        if transport.peer_queue_depth == 0 {
            return Err(ConfigError::invalid("transport.peer_queue_depth", "must be > 0"));
        }
        if transport.write_timeout_ms == 0 {
            return Err(ConfigError::invalid("transport.write_timeout_ms", "must be > 0"));
        }
        if transport.mode == TransportMode::Client {
            match transport.url.as_deref().map(str::trim) {
                None | Some("") => {
                    return Err(ConfigError::invalid(
                        "transport.url",
                        "client mode requires a target url",
                    ))
                }
                Some(url) if !(url.starts_with("ws://") || url.starts_with("wss://")) => {
                    return Err(ConfigError::invalid(
                        "transport.url",
                        format!("'{url}' is not a ws:// or wss:// url"),
                    ))
                }
                Some(_) => {}
            }
            if transport.connect_timeout_ms == 0 {
                return Err(ConfigError::invalid("transport.connect_timeout_ms", "must be > 0"));
            }
        }
        transport.backoff.validate("transport.backoff")?;

        if self.relay.channel_capacity == 0 {
            return Err(ConfigError::invalid("relay.channel_capacity", "must be > 0"));
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
