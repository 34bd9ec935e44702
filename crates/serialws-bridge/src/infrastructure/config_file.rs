//! TOML config file loading.
//!
//! Every key is optional; missing keys take the defaults from
//! [`crate::domain::config`].  A minimal file:
//!
//! ```toml
//! [serial]
//! device = "/dev/ttyACM0"
//! baud_rate = 115200
//!
//! [transport]
//! mode = "client"
//! url = "ws://collector.local:9000/ingest"
//! ```

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::domain::RelayConfig;

#[derive(Debug, Error)]
pub enum ConfigFileError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("cannot render config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Reads and parses `path`.  The result is not validated yet; call
/// [`RelayConfig::validate`] after applying command-line overrides.
///
/// # Errors
///
/// [`ConfigFileError::Io`] if the file cannot be read,
/// [`ConfigFileError::Parse`] if it is not valid TOML for this schema.
pub fn load_config(path: &Path) -> Result<RelayConfig, ConfigFileError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config = toml::from_str(&text).map_err(|source| ConfigFileError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), "config file loaded");
    Ok(config)
}

/// Renders `config` as a complete TOML document (used by `--print-config`).
pub fn render_config(config: &RelayConfig) -> Result<String, ConfigFileError> {
    Ok(toml::to_string_pretty(config)?)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
