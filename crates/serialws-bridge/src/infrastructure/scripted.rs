//! In-memory serial device for tests.
//!
//! A real serial port needs hardware (or a pty pair) and cannot be told to
//! fail on cue.  [`ScriptedSource`] replays a [`SourceScript`] instead: a queue
//! of byte chunks, I/O errors and "unplug" events that tests append to, even
//! while the relay is running on another thread.
//!
//! # Usage in tests
//!
//! ```ignore
//! let script = SourceScript::new();
//! let opener = Arc::new(ScriptedOpener::new("/dev/ttyTEST", script.clone()));
//! let handle = start_with_opener(config, opener).await?;
//!
//! script.push_line("21.5");      // arrives at every peer as "21.5"
//! script.push_close();           // simulates an unplugged adapter
//! ```

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::application::line_reader::{ByteSource, SourceOpener};
use crate::domain::RelayError;

#[derive(Debug)]
enum Step {
    Bytes(Vec<u8>),
    Fail(io::ErrorKind),
    Close,
}

#[derive(Debug, Default)]
struct ScriptState {
    steps: VecDeque<Step>,
    probe_fails: bool,
    failing_opens: usize,
    opens: usize,
    live_handles: usize,
    max_live_handles: usize,
    probes: usize,
}

/// Shared, cloneable script driving every [`ScriptedSource`] opened from it.
#[derive(Debug, Clone, Default)]
pub struct SourceScript {
    state: Arc<Mutex<ScriptState>>,
}

impl SourceScript {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues one read's worth of bytes.  A chunk larger than the reader's
    /// buffer is split across reads.
    pub fn push_bytes(&self, bytes: impl Into<Vec<u8>>) {
        self.lock().steps.push_back(Step::Bytes(bytes.into()));
    }

    /// Queues `text` followed by `\n`.
    pub fn push_line(&self, text: &str) {
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(b'\n');
        self.push_bytes(bytes);
    }

    /// The next read fails with `kind`.
    pub fn push_error(&self, kind: io::ErrorKind) {
        self.lock().steps.push_back(Step::Fail(kind));
    }

    /// The device disappears: the open handle reports itself closed.
    pub fn push_close(&self) {
        self.lock().steps.push_back(Step::Close);
    }

    pub fn set_probe_fails(&self, fails: bool) {
        self.lock().probe_fails = fails;
    }

    /// The next `n` open attempts fail with `DeviceOpen`.
    pub fn fail_next_opens(&self, n: usize) {
        self.lock().failing_opens = n;
    }

    /// Successful opens so far.
    pub fn opens(&self) -> usize {
        self.lock().opens
    }

    /// Handles currently open.
    pub fn live_handles(&self) -> usize {
        self.lock().live_handles
    }

    /// Most handles ever open at the same time.
    pub fn max_live_handles(&self) -> usize {
        self.lock().max_live_handles
    }

    pub fn probes(&self) -> usize {
        self.lock().probes
    }

    /// `true` once every queued step has been consumed.
    pub fn is_drained(&self) -> bool {
        self.lock().steps.is_empty()
    }
}

/// One open handle on a scripted device.
#[derive(Debug)]
pub struct ScriptedSource {
    script: SourceScript,
    name: String,
    open: bool,
}

impl ByteSource for ScriptedSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.open {
            return Err(io::Error::from(io::ErrorKind::NotConnected));
        }
        let mut state = self.script.lock();
        match state.steps.pop_front() {
            None => Ok(0),
            Some(Step::Bytes(mut bytes)) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                if n < bytes.len() {
                    state.steps.push_front(Step::Bytes(bytes.split_off(n)));
                }
                Ok(n)
            }
            Some(Step::Fail(kind)) => Err(io::Error::new(kind, "scripted read failure")),
            Some(Step::Close) => {
                self.open = false;
                Ok(0)
            }
        }
    }

    fn probe(&mut self) -> io::Result<()> {
        let mut state = self.script.lock();
        state.probes += 1;
        if state.probe_fails || !self.open {
            Err(io::Error::new(io::ErrorKind::TimedOut, "scripted probe failure"))
        } else {
            Ok(())
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for ScriptedSource {
    fn drop(&mut self) {
        let mut state = self.script.lock();
        state.live_handles = state.live_handles.saturating_sub(1);
    }
}

/// Opens [`ScriptedSource`]s that all follow the same script.
#[derive(Debug, Clone)]
pub struct ScriptedOpener {
    name: String,
    script: SourceScript,
}

impl ScriptedOpener {
    pub fn new(name: impl Into<String>, script: SourceScript) -> Self {
        Self {
            name: name.into(),
            script,
        }
    }
}

impl SourceOpener for ScriptedOpener {
    fn open(&self) -> Result<Box<dyn ByteSource>, RelayError> {
        let mut state = self.script.lock();
        if state.failing_opens > 0 {
            state.failing_opens -= 1;
            return Err(RelayError::DeviceOpen {
                path: self.name.clone(),
                reason: "scripted open failure".to_string(),
            });
        }
        state.opens += 1;
        state.live_handles += 1;
        state.max_live_handles = state.max_live_handles.max(state.live_handles);
        drop(state);

        Ok(Box::new(ScriptedSource {
            script: self.script.clone(),
            name: self.name.clone(),
            open: true,
        }))
    }

    fn device(&self) -> &str {
        &self.name
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
