//! Bounded hand-off channel from the blocking reader thread to the async relay.
//!
//! `tokio::sync::mpsc` offers `blocking_send`, but only one overflow
//! behaviour (wait).  The relay also supports evicting the oldest queued line
//! when the consumer falls behind, so this channel is a small
//! `Mutex<VecDeque>` with two wake-up paths:
//!
//! - a `std::sync::Condvar` the **sender** (an OS thread) sleeps on while the
//!   queue is full under [`HandoffPolicy::Block`];
//! - a `tokio::sync::Notify` the **receiver** (a task) awaits while the queue
//!   is empty.
//!
//! Dropping either end closes the channel: a blocked sender wakes up with
//! [`HandoffClosed`], and the receiver drains what is queued and then returns
//! `None`.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::sync::Notify;

use crate::domain::HandoffPolicy;

/// What [`HandoffSender::send`] did with the item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Queued,
    /// Queued after evicting the oldest item (`drop-oldest` policy only).
    Overflowed,
}

/// The receiving side is gone.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("hand-off channel closed: the relay is no longer receiving")]
pub struct HandoffClosed;

struct State<T> {
    queue: VecDeque<T>,
    sender_alive: bool,
    receiver_alive: bool,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    space: Condvar,
    ready: Notify,
    capacity: usize,
    policy: HandoffPolicy,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Creates a channel holding at most `capacity` items (raised to 1 if 0).
pub fn channel<T>(capacity: usize, policy: HandoffPolicy) -> (HandoffSender<T>, HandoffReceiver<T>) {
    let capacity = capacity.max(1);
    let shared = Arc::new(Shared {
        state: Mutex::new(State {
            queue: VecDeque::with_capacity(capacity),
            sender_alive: true,
            receiver_alive: true,
        }),
        space: Condvar::new(),
        ready: Notify::new(),
        capacity,
        policy,
    });
    (
        HandoffSender {
            shared: Arc::clone(&shared),
        },
        HandoffReceiver { shared },
    )
}

// ── Sender ────────────────────────────────────────────────────────────────────

/// Blocking sending half, owned by the reader thread.
pub struct HandoffSender<T> {
    shared: Arc<Shared<T>>,
}

impl<T> HandoffSender<T> {
    /// Queues `item`, applying the channel's policy when it is full.
    ///
    /// Under [`HandoffPolicy::Block`] this parks the calling thread until the
    /// receiver makes room.  Never call it from an async task.
    ///
    /// # Errors
    ///
    /// Returns [`HandoffClosed`] if the receiver has been dropped; `item` is
    /// discarded.
    pub fn send(&self, item: T) -> Result<SendOutcome, HandoffClosed> {
        let mut state = self.shared.lock();
        loop {
            if !state.receiver_alive {
                return Err(HandoffClosed);
            }
            if state.queue.len() < self.shared.capacity {
                state.queue.push_back(item);
                drop(state);
                self.shared.ready.notify_one();
                return Ok(SendOutcome::Queued);
            }
            match self.shared.policy {
                HandoffPolicy::DropOldest => {
                    state.queue.pop_front();
                    state.queue.push_back(item);
                    drop(state);
                    self.shared.ready.notify_one();
                    return Ok(SendOutcome::Overflowed);
                }
                HandoffPolicy::Block => {
                    state = self
                        .shared
                        .space
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
    }
}

impl<T> Drop for HandoffSender<T> {
    fn drop(&mut self) {
        self.shared.lock().sender_alive = false;
        self.shared.ready.notify_one();
    }
}

// ── Receiver ──────────────────────────────────────────────────────────────────

/// Async receiving half, owned by the relay pump.
pub struct HandoffReceiver<T> {
    shared: Arc<Shared<T>>,
}

impl<T> HandoffReceiver<T> {
    /// Waits for the next item.  Returns `None` once the sender is dropped and
    /// everything it sent has been received.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            {
                let mut state = self.shared.lock();
                if let Some(item) = state.queue.pop_front() {
                    drop(state);
                    self.shared.space.notify_one();
                    return Some(item);
                }
                if !state.sender_alive {
                    return None;
                }
            }
            // A notify_one() issued between the unlock above and this await
            // leaves a permit behind, so the wake-up is not lost.
            self.shared.ready.notified().await;
        }
    }

    /// Items currently queued.
    pub fn len(&self) -> usize {
        self.shared.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Drop for HandoffReceiver<T> {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        state.receiver_alive = false;
        state.queue.clear();
        drop(state);
        self.shared.space.notify_all();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
