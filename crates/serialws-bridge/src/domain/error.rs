//! Error taxonomy for the relay.
//!
//! Only three variants are fatal ([`RelayError::is_fatal`]): they can occur
//! before the relay is running and abort `start`.  Everything else is
//! recovered inside the pipeline: the reader reopens the device, the client
//! link reconnects, and a failing peer is simply removed.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

/// A configuration value that cannot work.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Every failure the relay can observe.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The serial device could not be opened.  Fatal at startup.
    #[error("failed to open serial device {path}: {reason}")]
    DeviceOpen { path: String, reason: String },

    /// No data for the idle timeout and the liveness probe failed.
    #[error("serial device {path} silent for {idle:?} and failed its liveness probe")]
    DeviceTimeout { path: String, idle: Duration },

    /// The source is no longer open.
    #[error("serial device {path} is closed")]
    DeviceClosed { path: String },

    /// A read on an open device failed.
    #[error("read from serial device {path} failed: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// One outbound connect attempt failed.  Retried with backoff.
    #[error("failed to connect to {url}: {reason}")]
    TransportConnect { url: String, reason: String },

    /// An established websocket connection broke.
    #[error("websocket connection to {peer} lost: {reason}")]
    TransportDisconnect { peer: String, reason: String },

    /// The server-mode listener could not be bound.  Fatal at startup.
    #[error("failed to bind websocket listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

impl RelayError {
    /// `true` for errors that abort startup instead of being retried.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RelayError::DeviceOpen { .. } | RelayError::Bind { .. } | RelayError::Config(_)
        )
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
