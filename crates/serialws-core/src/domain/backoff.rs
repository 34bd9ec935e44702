//! Exponential backoff between reconnect attempts.
//!
//! The delay starts at `initial`, is multiplied by `multiplier` after every
//! attempt, and never exceeds `max`.  There is no attempt limit: the relay
//! keeps retrying until it is told to stop.

use std::time::Duration;

/// Shortest delay ever handed out.
pub const MIN_DELAY: Duration = Duration::from_millis(1);

/// Exponential backoff state for one reconnecting connection.
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
/// use serialws_core::Backoff;
///
/// let mut backoff = Backoff::new(Duration::from_millis(100), 2.0, Duration::from_millis(350));
/// assert_eq!(backoff.next_delay(), Duration::from_millis(100));
/// assert_eq!(backoff.next_delay(), Duration::from_millis(200));
/// assert_eq!(backoff.next_delay(), Duration::from_millis(350));
/// assert_eq!(backoff.next_delay(), Duration::from_millis(350));
///
/// backoff.reset();
/// assert_eq!(backoff.next_delay(), Duration::from_millis(100));
/// ```
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    multiplier: f64,
    max: Duration,
    next: Duration,
    attempts: u32,
}

impl Backoff {
    /// Creates a backoff.
    ///
    /// `initial` is clamped to `max`, and both are raised to at least
    /// [`MIN_DELAY`].  A multiplier below 1 (or not finite) is treated as 1,
    /// which degrades to a fixed interval.
    pub fn new(initial: Duration, multiplier: f64, max: Duration) -> Self {
        let max = max.max(MIN_DELAY);
        let initial = initial.clamp(MIN_DELAY, max);
        let multiplier = if multiplier.is_finite() && multiplier >= 1.0 {
            multiplier
        } else {
            1.0
        };
        Self {
            initial,
            multiplier,
            max,
            next: initial,
            attempts: 0,
        }
    }

    /// Returns the delay to wait before the next attempt and advances the
    /// schedule.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.attempts = self.attempts.saturating_add(1);

        let grown = Duration::try_from_secs_f64(delay.as_secs_f64() * self.multiplier)
            .unwrap_or(self.max);
        self.next = grown.min(self.max);

        delay
    }

    /// Restarts the schedule after a successful connection.
    pub fn reset(&mut self) {
        self.next = self.initial;
        self.attempts = 0;
    }

    /// Number of delays handed out since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// The delay cap.
    pub fn max_delay(&self) -> Duration {
        self.max
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
