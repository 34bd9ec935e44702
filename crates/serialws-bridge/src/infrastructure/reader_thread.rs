//! The serial reader's OS thread.
//!
//! Drives [`LineReader::next_line`] in a loop and pushes every line into the
//! hand-off channel.  After startup a device fault is never fatal: the thread
//! logs it, closes the handle, and reopens the device on the configured
//! backoff schedule until it succeeds or the relay is stopped.
//!
//! The thread runs under `tokio::task::spawn_blocking`, so the lifecycle code
//! can `await` its completion like any other task.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serialws_core::{Backoff, Line, RelayMetrics};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::handoff::{HandoffSender, SendOutcome};
use crate::application::line_reader::{ByteSource, LineReader, SourceOpener};

/// Granularity of cancellation checks while waiting to reopen.
const CANCEL_POLL: Duration = Duration::from_millis(50);

/// Minimum spacing of the channel-overflow warning.
const OVERFLOW_WARN_EVERY: Duration = Duration::from_secs(10);

/// Everything the reader thread owns.
pub struct ReaderThread {
    pub reader: LineReader,
    pub opener: Arc<dyn SourceOpener>,
    pub tx: HandoffSender<Line>,
    pub reopen_backoff: Backoff,
    pub cancel: CancellationToken,
    pub metrics: Arc<RelayMetrics>,
}

impl ReaderThread {
    /// Starts the loop on the blocking pool.  The handle resolves once the
    /// thread has stopped and dropped its end of the hand-off channel.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::task::spawn_blocking(move || self.run())
    }

    fn run(mut self) {
        info!(device = %self.reader.device(), "serial reader started");
        let mut overflow = OverflowWarner::default();

        loop {
            match self.reader.next_line() {
                Ok(Some(line)) => {
                    self.reopen_backoff.reset();
                    match self.tx.send(line) {
                        Ok(SendOutcome::Queued) => {}
                        Ok(SendOutcome::Overflowed) => {
                            self.metrics.record_channel_overflow();
                            overflow.record();
                        }
                        Err(closed) => {
                            warn!("{closed}; serial reader exiting");
                            break;
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "serial reader fault, reopening device");
                    self.reader.detach_source();
                    if let Some(source) = self.reopen() {
                        self.reader.attach_source(source);
                        self.metrics.record_device_reopen();
                    }
                    // On cancellation the next call flushes and returns None.
                }
            }
        }

        info!(device = %self.reader.device(), "serial reader stopped");
    }

    /// Retries `open` until it succeeds.  `None` if cancelled first.
    fn reopen(&mut self) -> Option<Box<dyn ByteSource>> {
        loop {
            let delay = self.reopen_backoff.next_delay();
            debug!(device = %self.opener.device(), ?delay, "waiting before reopening device");
            if !sleep_unless_cancelled(delay, &self.cancel) {
                return None;
            }
            match self.opener.open() {
                Ok(source) => {
                    info!(
                        device = %self.opener.device(),
                        attempts = self.reopen_backoff.attempts(),
                        "serial device reopened"
                    );
                    return Some(source);
                }
                Err(e) => warn!(error = %e, "reopen failed"),
            }
        }
    }
}

/// Sleeps for `total` unless `cancel` fires first.  Returns `false` if it did.
fn sleep_unless_cancelled(total: Duration, cancel: &CancellationToken) -> bool {
    let deadline = Instant::now() + total;
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep((deadline - now).min(CANCEL_POLL));
    }
}

/// Logs every overflow at debug and a summary at warn at most every
/// [`OVERFLOW_WARN_EVERY`].
#[derive(Default)]
struct OverflowWarner {
    since_warn: u64,
    last_warn: Option<Instant>,
}

impl OverflowWarner {
    fn record(&mut self) {
        self.since_warn += 1;
        debug!("hand-off channel full, oldest line evicted");
        let due = self
            .last_warn
            .map_or(true, |t| t.elapsed() >= OVERFLOW_WARN_EVERY);
        if due {
            warn!(evicted = self.since_warn, "relay is falling behind the serial reader");
            self.since_warn = 0;
            self.last_warn = Some(Instant::now());
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::handoff::channel;
    use crate::domain::HandoffPolicy;
    use crate::infrastructure::scripted::{ScriptedOpener, SourceScript};
    use serialws_core::{LineFramer, TextEncoding};
    use std::io;

    fn start(script: &SourceScript) -> (
        JoinHandle<()>,
        crate::application::handoff::HandoffReceiver<Line>,
        CancellationToken,
        Arc<RelayMetrics>,
    ) {
        let opener = Arc::new(ScriptedOpener::new("/dev/ttyTEST", script.clone()));
        let cancel = CancellationToken::new();
        let metrics = Arc::new(RelayMetrics::new());
        let reader = LineReader::new(
            opener.open().expect("first open"),
            LineFramer::new(TextEncoding::Utf8, None, true),
            cancel.clone(),
            Arc::clone(&metrics),
        )
        .with_poll_interval(Duration::from_millis(1));
        let (tx, rx) = channel(16, HandoffPolicy::Block);
        let handle = ReaderThread {
            reader,
            opener,
            tx,
            reopen_backoff: Backoff::new(Duration::from_millis(5), 2.0, Duration::from_millis(20)),
            cancel: cancel.clone(),
            metrics: Arc::clone(&metrics),
        }
        .spawn();
        (handle, rx, cancel, metrics)
    }

    #[tokio::test]
    async fn test_device_fault_is_followed_by_reopen() {
        // Arrange: a line, a read failure, then more data on the new handle
        let script = SourceScript::new();
        script.push_line("before");
        script.push_error(io::ErrorKind::BrokenPipe);
        script.push_line("after");
        let (handle, mut rx, cancel, metrics) = start(&script);

        // Act
        let first = rx.recv().await;
        let second = rx.recv().await;
        cancel.cancel();
        handle.await.unwrap();

        // Assert
        assert_eq!(first, Some(Line::from("before")));
        assert_eq!(second, Some(Line::from("after")));
        assert_eq!(metrics.snapshot().device_reopens, 1);
        assert_eq!(script.opens(), 2);
        assert_eq!(script.max_live_handles(), 1, "old handle closed before reopening");
    }

    #[tokio::test]
    async fn test_cancel_flushes_partial_line_and_closes_channel() {
        // Arrange
        let script = SourceScript::new();
        script.push_bytes("unterminated");
        let (handle, mut rx, cancel, _) = start(&script);
        while !script.is_drained() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        // Act
        cancel.cancel();
        handle.await.unwrap();

        // Assert
        assert_eq!(rx.recv().await, Some(Line::from("unterminated")));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_cancel_during_reopen_stops_thread() {
        // Arrange: the device vanishes and never comes back
        let script = SourceScript::new();
        let (handle, mut rx, cancel, metrics) = start(&script);
        script.fail_next_opens(usize::MAX);
        script.push_close();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Act
        cancel.cancel();
        let joined = tokio::time::timeout(Duration::from_secs(2), handle).await;

        // Assert
        assert!(joined.is_ok(), "reader thread must stop promptly");
        assert_eq!(rx.recv().await, None);
        assert_eq!(metrics.snapshot().device_reopens, 0);
    }

    #[test]
    fn test_sleep_unless_cancelled() {
        let cancel = CancellationToken::new();
        assert!(sleep_unless_cancelled(Duration::from_millis(1), &cancel));
        cancel.cancel();
        assert!(!sleep_unless_cancelled(Duration::from_secs(60), &cancel));
    }
}
