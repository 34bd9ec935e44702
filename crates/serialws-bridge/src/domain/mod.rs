//! Domain layer for serialws-bridge.
//!
//! Plain data: the configuration schema and the error taxonomy.  Nothing in
//! here performs I/O, so both can be constructed and checked in tests without
//! a serial port or a socket.
//!
//! # What does NOT belong here?
//!
//! - Any `tokio`, `TcpStream`, `WebSocket` or `serialport` types
//! - File I/O or environment variable reading (see `infrastructure::config_file`
//!   and `main.rs`)

pub mod config;
pub mod error;

pub use config::{
    BackoffConfig, HandoffPolicy, Parity, PipelineConfig, RelayConfig, SerialConfig,
    TransportConfig, TransportMode,
};
pub use error::{ConfigError, RelayError};
