//! Bounded FIFO with an explicit overflow policy.
//!
//! Used for every place a line can wait: the per-peer outbound buffer and the
//! client link's hold queue.  Memory is bounded by construction; when the
//! queue is full, the [`OverflowPolicy`] decides which line is given up.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which line to give up when a bounded queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicy {
    /// Refuse the incoming item; what is already queued is kept.
    #[default]
    DropNewest,
    /// Evict the oldest queued item to make room for the incoming one.
    DropOldest,
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OverflowPolicy::DropNewest => "drop-newest",
            OverflowPolicy::DropOldest => "drop-oldest",
        })
    }
}

impl FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "drop-newest" | "drop" => Ok(OverflowPolicy::DropNewest),
            "drop-oldest" | "queue" => Ok(OverflowPolicy::DropOldest),
            other => Err(format!(
                "unknown overflow policy '{other}' (expected drop-newest or drop-oldest)"
            )),
        }
    }
}

/// Result of [`BoundedQueue::push`].
#[derive(Debug, PartialEq, Eq)]
pub enum PushOutcome<T> {
    /// The item was queued without losing anything.
    Queued,
    /// The queue was full and the incoming item was refused (`DropNewest`).
    Rejected(T),
    /// The queue was full; the returned oldest item was evicted and the
    /// incoming item queued (`DropOldest`).
    Evicted(T),
}

impl<T> PushOutcome<T> {
    /// `true` when an item (incoming or queued) was lost.
    pub fn dropped(&self) -> bool {
        !matches!(self, PushOutcome::Queued)
    }
}

/// A FIFO that holds at most `capacity` items.
#[derive(Debug)]
pub struct BoundedQueue<T> {
    items: VecDeque<T>,
    capacity: usize,
    policy: OverflowPolicy,
}

impl<T> BoundedQueue<T> {
    /// Creates an empty queue.  A capacity of 0 is raised to 1.
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
            policy,
        }
    }

    /// Appends `item`, applying the overflow policy if the queue is full.
    pub fn push(&mut self, item: T) -> PushOutcome<T> {
        if self.items.len() < self.capacity {
            self.items.push_back(item);
            return PushOutcome::Queued;
        }

        match self.policy {
            OverflowPolicy::DropNewest => PushOutcome::Rejected(item),
            OverflowPolicy::DropOldest => match self.items.pop_front() {
                Some(oldest) => {
                    self.items.push_back(item);
                    PushOutcome::Evicted(oldest)
                }
                // Unreachable with capacity >= 1, but queueing is still correct.
                None => {
                    self.items.push_back(item);
                    PushOutcome::Queued
                }
            },
        }
    }

    /// Removes and returns the oldest item.
    pub fn pop(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    /// Removes every queued item, returning how many there were.
    pub fn clear(&mut self) -> usize {
        let n = self.items.len();
        self.items.clear();
        n
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_within_capacity_queues_in_order() {
        let mut q = BoundedQueue::new(3, OverflowPolicy::DropNewest);
        assert_eq!(q.push(1), PushOutcome::Queued);
        assert_eq!(q.push(2), PushOutcome::Queued);
        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.pop(), Some(2));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn test_drop_newest_rejects_incoming_when_full() {
        // Arrange
        let mut q = BoundedQueue::new(2, OverflowPolicy::DropNewest);
        q.push("a");
        q.push("b");

        // Act
        let outcome = q.push("c");

        // Assert: the queued items are untouched
        assert_eq!(outcome, PushOutcome::Rejected("c"));
        assert!(outcome.dropped());
        assert_eq!(q.pop(), Some("a"));
        assert_eq!(q.pop(), Some("b"));
    }

    #[test]
    fn test_drop_oldest_evicts_head_when_full() {
        // Arrange
        let mut q = BoundedQueue::new(2, OverflowPolicy::DropOldest);
        q.push("a");
        q.push("b");

        // Act
        let outcome = q.push("c");

        // Assert: newest content survives, length stays at capacity
        assert_eq!(outcome, PushOutcome::Evicted("a"));
        assert_eq!(q.len(), 2);
        assert_eq!(q.pop(), Some("b"));
        assert_eq!(q.pop(), Some("c"));
    }

    #[test]
    fn test_queue_never_exceeds_capacity() {
        let mut q = BoundedQueue::new(4, OverflowPolicy::DropOldest);
        for i in 0..1_000 {
            q.push(i);
            assert!(q.len() <= 4);
        }
        assert!(q.is_full());
        let rest: Vec<i32> = std::iter::from_fn(|| q.pop()).collect();
        assert_eq!(rest, vec![996, 997, 998, 999]);
    }

    #[test]
    fn test_zero_capacity_is_raised_to_one() {
        let mut q = BoundedQueue::new(0, OverflowPolicy::DropNewest);
        assert_eq!(q.capacity(), 1);
        assert_eq!(q.push(()), PushOutcome::Queued);
        assert!(q.push(()).dropped());
    }

    #[test]
    fn test_clear_reports_discarded_count() {
        let mut q = BoundedQueue::new(8, OverflowPolicy::DropNewest);
        q.push(1);
        q.push(2);
        assert_eq!(q.clear(), 2);
        assert!(q.is_empty());
    }

    #[test]
    fn test_policy_parses_from_config_names() {
        assert_eq!("drop-newest".parse(), Ok(OverflowPolicy::DropNewest));
        assert_eq!("drop-oldest".parse(), Ok(OverflowPolicy::DropOldest));
        assert_eq!("queue".parse(), Ok(OverflowPolicy::DropOldest));
        assert!("lifo".parse::<OverflowPolicy>().is_err());
        assert_eq!(OverflowPolicy::DropOldest.to_string(), "drop-oldest");
    }
}
