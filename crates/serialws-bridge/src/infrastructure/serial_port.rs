//! Serial device access via the `serialport` crate.
//!
//! `serialport` exposes a blocking `std::io::Read` with a per-port timeout.  A
//! read that times out with no data is reported as `Ok(0)` here, which the
//! line reader treats as "nothing yet" and answers with a short sleep.
//!
//! On Unix the port is opened in exclusive mode (the crate's default), so a
//! second relay pointed at the same device fails with `DeviceOpen` instead of
//! stealing half the bytes.

use std::fmt;
use std::io::{self, Read};
use std::time::Duration;

use serialport::{DataBits, Parity as SpParity, SerialPort, SerialPortType, StopBits};
use tracing::info;

use crate::application::line_reader::{ByteSource, SourceOpener};
use crate::domain::{Parity, RelayError, SerialConfig};

// ── Setting conversions ───────────────────────────────────────────────────────

pub fn to_serialport_parity(p: Parity) -> SpParity {
    match p {
        Parity::None => SpParity::None,
        Parity::Odd => SpParity::Odd,
        Parity::Even => SpParity::Even,
    }
}

/// Anything but 7 maps to 8; the config validator rejects other values first.
pub fn to_serialport_data_bits(bits: u8) -> DataBits {
    match bits {
        7 => DataBits::Seven,
        _ => DataBits::Eight,
    }
}

pub fn to_serialport_stop_bits(bits: u8) -> StopBits {
    match bits {
        2 => StopBits::Two,
        _ => StopBits::One,
    }
}

/// `8N1`-style shorthand for logs.
pub fn framing_label(config: &SerialConfig) -> String {
    let parity = match config.parity {
        Parity::None => 'N',
        Parity::Odd => 'O',
        Parity::Even => 'E',
    };
    format!("{}{}{}", config.data_bits, parity, config.stop_bits)
}

// ── Device ────────────────────────────────────────────────────────────────────

/// An open serial port.
pub struct SerialDevice {
    port: Box<dyn SerialPort>,
    name: String,
    open: bool,
}

impl ByteSource for SerialDevice {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(0)
            }
            Err(e) => {
                if matches!(
                    e.kind(),
                    io::ErrorKind::BrokenPipe | io::ErrorKind::NotConnected | io::ErrorKind::NotFound
                ) {
                    self.open = false;
                }
                Err(e)
            }
        }
    }

    fn probe(&mut self) -> io::Result<()> {
        self.port.bytes_to_read().map_err(io::Error::from)?;
        // A USB adapter that was unplugged can keep answering ioctls on a
        // stale descriptor; the device node disappearing is the reliable sign.
        #[cfg(unix)]
        if !std::path::Path::new(&self.name).exists() {
            self.open = false;
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} no longer exists", self.name),
            ));
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Opens the configured serial port.
pub struct SerialOpener {
    config: SerialConfig,
}

impl SerialOpener {
    pub fn new(config: SerialConfig) -> Self {
        Self { config }
    }

    fn read_timeout(&self) -> Duration {
        self.config.read_timeout()
    }
}

impl SourceOpener for SerialOpener {
    fn open(&self) -> Result<Box<dyn ByteSource>, RelayError> {
        let cfg = &self.config;
        let port = serialport::new(&cfg.device, cfg.baud_rate)
            .data_bits(to_serialport_data_bits(cfg.data_bits))
            .stop_bits(to_serialport_stop_bits(cfg.stop_bits))
            .parity(to_serialport_parity(cfg.parity))
            .timeout(self.read_timeout())
            .open()
            .map_err(|e| RelayError::DeviceOpen {
                path: cfg.device.clone(),
                reason: e.to_string(),
            })?;

        info!(
            device = %cfg.device,
            baud = cfg.baud_rate,
            framing = %framing_label(cfg),
            "serial device opened"
        );
        Ok(Box::new(SerialDevice {
            port,
            name: cfg.device.clone(),
            open: true,
        }))
    }

    fn device(&self) -> &str {
        &self.config.device
    }
}

// ── Port listing ──────────────────────────────────────────────────────────────

/// One entry of `--list-ports`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    pub name: String,
    pub kind: &'static str,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
}

impl fmt::Display for PortInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<24} {}", self.name, self.kind)?;
        if let (Some(vid), Some(pid)) = (self.vid, self.pid) {
            write!(f, " {vid:04x}:{pid:04x}")?;
        }
        for part in [&self.manufacturer, &self.product].into_iter().flatten() {
            write!(f, " {part}")?;
        }
        Ok(())
    }
}

/// Serial ports the OS reports.
///
/// On macOS only the `/dev/cu.*` nodes are listed: opening the matching
/// `/dev/tty.*` node blocks until carrier detect.
///
/// # Errors
///
/// Returns the `serialport` error when enumeration itself fails.
pub fn list_ports() -> Result<Vec<PortInfo>, serialport::Error> {
    let ports = serialport::available_ports()?;
    Ok(ports
        .into_iter()
        .filter(|_p| {
            #[cfg(target_os = "macos")]
            {
                !_p.port_name.starts_with("/dev/tty.")
            }
            #[cfg(not(target_os = "macos"))]
            {
                true
            }
        })
        .map(|p| {
            let (kind, manufacturer, product, vid, pid) = match p.port_type {
                SerialPortType::UsbPort(info) => {
                    ("USB", info.manufacturer, info.product, Some(info.vid), Some(info.pid))
                }
                SerialPortType::BluetoothPort => ("Bluetooth", None, None, None, None),
                SerialPortType::PciPort => ("PCI", None, None, None, None),
                SerialPortType::Unknown => ("Unknown", None, None, None, None),
            };
            PortInfo {
                name: p.port_name,
                kind,
                manufacturer,
                product,
                vid,
                pid,
            }
        })
        .collect())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
