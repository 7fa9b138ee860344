//! Retry pacing for provisioning attempts.

use std::time::Duration;

/// Exponential backoff with a bounded attempt budget.
///
/// Tracks the delay schedule and the remaining attempts together, so the
/// provisioning loop asks one place whether to keep trying and how long to
/// wait before it does.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial: Duration,
    max_delay: Duration,
    current: Duration,
    attempts_made: u32,
    max_attempts: u32,
}

impl ExponentialBackoff {
    /// Creates a backoff starting at `initial`, doubling up to `max_delay`,
    /// allowing `max_attempts` attempts in total.
    pub fn new(initial: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            initial,
            max_delay,
            current: initial,
            attempts_made: 0,
            max_attempts,
        }
    }

    /// Records a failed attempt.
    ///
    /// Returns the delay to sleep before the next attempt, or `None` when the
    /// attempt budget is spent and the failure should escalate.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.attempts_made += 1;
        if self.attempts_made >= self.max_attempts {
            return None;
        }
        let delay = self.current;
        self.current = (self.current * 2).min(self.max_delay);
        Some(delay)
    }

    /// Number of failed attempts recorded so far.
    pub fn attempts_made(&self) -> u32 {
        self.attempts_made
    }

    /// Restores the initial delay and the full attempt budget.
    pub fn reset(&mut self) {
        self.current = self.initial;
        self.attempts_made = 0;
    }
}
