//! Retransmission schedule for outstanding exchanges
//!
//! Exponential backoff starting at 500 ms, doubling each attempt, capped at
//! 30 s, with at most 6 transmissions. Exhaustion means the peer is dead.

use std::time::Duration;

/// Backoff schedule for one outstanding request
#[derive(Debug, Clone)]
pub struct RetransmitTimer {
    attempt: u32,
    base: Duration,
    cap: Duration,
    max_attempts: u32,
}

impl Default for RetransmitTimer {
    fn default() -> Self {
        RetransmitTimer::new()
    }
}

impl RetransmitTimer {
    /// Initial wait before the first retransmission
    pub const BASE_DELAY: Duration = Duration::from_millis(500);

    /// Upper bound on any single wait
    pub const MAX_DELAY: Duration = Duration::from_secs(30);

    /// Total transmissions before declaring the peer dead
    pub const MAX_ATTEMPTS: u32 = 6;

    /// Create a fresh schedule
    pub fn new() -> Self {
        RetransmitTimer {
            attempt: 0,
            base: Self::BASE_DELAY,
            cap: Self::MAX_DELAY,
            max_attempts: Self::MAX_ATTEMPTS,
        }
    }

    /// Transmissions made so far
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    /// Wait before the next transmission, or `None` when exhausted
    ///
    /// Each call accounts for one transmission: the first call yields the
    /// base delay, subsequent calls double it up to the cap.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_attempts {
            return None;
        }

        let exp = self.attempt.min(31);
        let delay = self
            .base
            .checked_mul(1u32 << exp)
            .map(|d| d.min(self.cap))
            .unwrap_or(self.cap);

        self.attempt += 1;
        Some(delay)
    }

    /// Reset for a new exchange
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
