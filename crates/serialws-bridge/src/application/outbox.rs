//! Per-connection outbound buffer.
//!
//! The relay never waits on a socket: it pushes each line into every peer's
//! [`Outbox`] and moves on.  The connection's own writer task pops lines and
//! performs the (possibly slow) websocket write.  A peer that cannot keep up
//! only ever loses its own lines, according to the configured
//! [`OverflowPolicy`].

use std::sync::{Mutex, MutexGuard, PoisonError};

use serialws_core::{BoundedQueue, Line, OverflowPolicy, PushOutcome};
use tokio::sync::Notify;

/// Result of [`Outbox::push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueue {
    Queued,
    /// The outbox was full and a line (incoming or oldest) was given up.
    Dropped,
    /// The outbox is closed; nothing was queued.
    Closed,
}

struct OutboxState {
    queue: BoundedQueue<Line>,
    closed: bool,
}

/// Bounded single-consumer line queue with async wake-up.
pub struct Outbox {
    state: Mutex<OutboxState>,
    ready: Notify,
}

impl Outbox {
    pub fn new(depth: usize, policy: OverflowPolicy) -> Self {
        Self {
            state: Mutex::new(OutboxState {
                queue: BoundedQueue::new(depth, policy),
                closed: false,
            }),
            ready: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, OutboxState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues `line` without waiting.
    pub fn push(&self, line: Line) -> Enqueue {
        let mut state = self.lock();
        if state.closed {
            return Enqueue::Closed;
        }
        let outcome = match state.queue.push(line) {
            PushOutcome::Queued => Enqueue::Queued,
            PushOutcome::Rejected(_) | PushOutcome::Evicted(_) => Enqueue::Dropped,
        };
        drop(state);
        self.ready.notify_one();
        outcome
    }

    /// Waits for the next line.  After [`Outbox::close`], the lines already
    /// queued are still returned, then `None`.
    ///
    /// Cancel-safe: a line is only removed in the poll that returns it.
    pub async fn next(&self) -> Option<Line> {
        loop {
            {
                let mut state = self.lock();
                if let Some(line) = state.queue.pop() {
                    return Some(line);
                }
                if state.closed {
                    return None;
                }
            }
            self.ready.notified().await;
        }
    }

    /// Stops accepting lines and wakes the consumer so it can drain and exit.
    pub fn close(&self) {
        self.lock().closed = true;
        self.ready.notify_one();
    }

    /// Discards every queued line, returning how many there were.
    pub fn clear(&self) -> usize {
        self.lock().queue.clear()
    }

    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
