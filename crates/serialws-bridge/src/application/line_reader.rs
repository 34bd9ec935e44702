//! Line Reader: turns a fragmented serial byte stream into complete lines.
//!
//! The reader is pull-based and blocking.  It runs on its own OS thread (see
//! `infrastructure::reader_thread`) and hands finished [`Line`]s across to
//! the async side.
//!
//! # The loop in [`LineReader::next_line`]
//!
//! ```text
//!   ready lines queued? ──yes──▶ return the oldest
//!          │ no
//!   cancelled? ──yes──▶ flush the partial line (if any), then return None
//!          │ no
//!   read(up to 1 KiB) ──error──▶ RelayError::Io
//!          │
//!   0 bytes ──▶ idle too long? probe the device (fail ⇒ DeviceTimeout)
//!          │    sleep one poll interval, loop
//!   n bytes ──▶ feed the framer, queue every completed line, loop
//! ```
//!
//! A zero-byte read means "nothing right now", never end-of-stream: a serial
//! line has no EOF, only silence.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serialws_core::{FramedLine, Line, LineFramer, LineKind, RelayMetrics};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::domain::RelayError;

/// Bytes requested per read.
const READ_CHUNK: usize = 1024;

/// Sleep between reads that returned nothing.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

// ── Source abstraction ────────────────────────────────────────────────────────

/// A blocking byte source, normally an open serial device.
///
/// Implemented by `infrastructure::serial_port::SerialDevice` and by the
/// in-memory `infrastructure::scripted::ScriptedSource` used in tests.
pub trait ByteSource: Send {
    /// Reads whatever is available into `buf`.
    ///
    /// Returns `Ok(0)` when no data arrived within the source's own read
    /// timeout.  That is not end-of-stream.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Cheap liveness check used after a long silence.
    fn probe(&mut self) -> io::Result<()>;

    /// `false` once the device has gone away.
    fn is_open(&self) -> bool;

    /// Device path, for logs and errors.
    fn name(&self) -> &str;
}

/// Opens (and reopens) the byte source.
///
/// At most one handle per device is alive at a time: callers drop the
/// previous source before asking for a new one.
pub trait SourceOpener: Send + Sync {
    /// # Errors
    ///
    /// Returns [`RelayError::DeviceOpen`] when the device cannot be opened.
    fn open(&self) -> Result<Box<dyn ByteSource>, RelayError>;

    /// Device path, for logs.
    fn device(&self) -> &str;
}

// ── Reader ────────────────────────────────────────────────────────────────────

/// Produces complete lines from a [`ByteSource`].
pub struct LineReader {
    source: Option<Box<dyn ByteSource>>,
    device: String,
    framer: LineFramer,
    ready: VecDeque<Line>,
    scratch: Vec<u8>,
    idle_timeout: Option<Duration>,
    poll_interval: Duration,
    last_activity: Instant,
    cancel: CancellationToken,
    metrics: Arc<RelayMetrics>,
    finished: bool,
}

impl LineReader {
    pub fn new(
        source: Box<dyn ByteSource>,
        framer: LineFramer,
        cancel: CancellationToken,
        metrics: Arc<RelayMetrics>,
    ) -> Self {
        Self {
            device: source.name().to_string(),
            source: Some(source),
            framer,
            ready: VecDeque::new(),
            scratch: vec![0; READ_CHUNK],
            idle_timeout: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            last_activity: Instant::now(),
            cancel,
            metrics,
            finished: false,
        }
    }

    /// Probe the source after `timeout` of silence.  `None` disables probing.
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Blocks until the next line is available.
    ///
    /// Returns `Ok(None)` once cancellation has been observed and the partial
    /// line (if any) has been handed out.  After that every call returns
    /// `Ok(None)`.
    ///
    /// # Errors
    ///
    /// - [`RelayError::DeviceClosed`] when no source is attached or it closed.
    /// - [`RelayError::Io`] when a read fails.
    /// - [`RelayError::DeviceTimeout`] when the idle probe fails.
    ///
    /// Lines completed before the error are not lost; they are returned by the
    /// following calls.
    pub fn next_line(&mut self) -> Result<Option<Line>, RelayError> {
        loop {
            if let Some(line) = self.ready.pop_front() {
                return Ok(Some(line));
            }
            if self.finished {
                return Ok(None);
            }
            if self.cancel.is_cancelled() {
                self.finished = true;
                for partial in self.framer.flush() {
                    debug!(
                        device = %self.device,
                        bytes = partial.raw_len,
                        "flushing partial line at shutdown"
                    );
                    self.accept(partial);
                }
                continue;
            }

            let n = self.read_chunk()?;
            if n == 0 {
                self.check_idle()?;
                std::thread::sleep(self.poll_interval);
                continue;
            }

            self.last_activity = Instant::now();
            for framed in self.framer.feed(&self.scratch[..n]) {
                self.accept(framed);
            }
        }
    }

    /// Drops the current source.  The partially accumulated line goes with it.
    pub fn detach_source(&mut self) {
        if self.source.take().is_some() {
            let discarded = self.framer.pending_len();
            if discarded > 0 {
                debug!(device = %self.device, discarded, "discarding partial line from closed device");
            }
            self.framer.reset();
        }
    }

    /// Installs a freshly opened source.
    pub fn attach_source(&mut self, source: Box<dyn ByteSource>) {
        self.device = source.name().to_string();
        self.source = Some(source);
        self.last_activity = Instant::now();
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    fn read_chunk(&mut self) -> Result<usize, RelayError> {
        let source = match self.source.as_mut() {
            Some(source) if source.is_open() => source,
            _ => {
                return Err(RelayError::DeviceClosed {
                    path: self.device.clone(),
                })
            }
        };
        source.read(&mut self.scratch).map_err(|e| RelayError::Io {
            path: self.device.clone(),
            source: e,
        })
    }

    fn check_idle(&mut self) -> Result<(), RelayError> {
        let Some(idle) = self.idle_timeout else {
            return Ok(());
        };
        if self.last_activity.elapsed() < idle {
            return Ok(());
        }

        let probe = match self.source.as_mut() {
            Some(source) => source.probe(),
            None => Err(io::Error::from(io::ErrorKind::NotConnected)),
        };
        match probe {
            Ok(()) => {
                debug!(device = %self.device, ?idle, "device idle but responsive");
                self.last_activity = Instant::now();
                Ok(())
            }
            Err(e) => {
                debug!(device = %self.device, error = %e, "liveness probe failed");
                Err(RelayError::DeviceTimeout {
                    path: self.device.clone(),
                    idle,
                })
            }
        }
    }

    fn accept(&mut self, framed: FramedLine) {
        if framed.substitutions > 0 {
            debug!(
                device = %self.device,
                substitutions = framed.substitutions,
                "replaced undecodable or control bytes"
            );
            self.metrics.record_decode_substitutions(framed.substitutions);
        }
        if framed.kind == LineKind::Truncated {
            self.metrics.record_line_too_long();
            warn!(
                device = %self.device,
                max_line_length = ?self.framer.max_line_length(),
                "LineTooLong: no terminator within the limit, emitting the line early"
            );
        }
        self.metrics.record_line_read();
        self.ready.push_back(framed.line);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
