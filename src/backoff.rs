//! Reconnection backoff policy.
//!
//! Delay grows exponentially from a base and is capped at a maximum:
//! `delay(attempt) = min(base * 2^attempt, max)`. The attempt counter resets
//! to zero on every successful open, so a later failure streak starts from
//! the base delay again.

use std::time::Duration;

/// How many reconnect attempts a channel is allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Keep retrying for the lifetime of the channel.
    Unbounded,
    /// Give up after this many attempts; the channel enters a terminal
    /// `Failed` state and callers degrade (e.g. chat falls back to polling).
    Limited(u32),
}

impl RetryPolicy {
    /// Whether another attempt is allowed after `attempts` failures.
    pub fn allows(&self, attempts: u32) -> bool {
        match self {
            RetryPolicy::Unbounded => true,
            RetryPolicy::Limited(max) => attempts < *max,
        }
    }
}

/// Exponential backoff state for one channel.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    attempt: u32,
}

impl Backoff {
    /// Create a backoff starting at `base` and capped at `max`.
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            attempt: 0,
        }
    }

    /// The delay for a given attempt number, without mutating state.
    pub fn delay_for(base: Duration, max: Duration, attempt: u32) -> Duration {
        // Saturate the shift; beyond 2^63 the cap always wins anyway.
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        base.checked_mul(factor.min(u32::MAX as u64) as u32)
            .unwrap_or(max)
            .min(max)
    }

    /// Return the delay for the current attempt and advance the counter.
    pub fn next(&mut self) -> Duration {
        let delay = Self::delay_for(self.base, self.max, self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// Number of attempts consumed since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Reset the attempt counter after a successful open.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    const BASE: Duration = Duration::from_secs(1);
    const MAX: Duration = Duration::from_secs(30);

    #[test]
    fn delays_double_until_capped() {
        let mut backoff = Backoff::new(BASE, MAX);
        assert_eq!(backoff.next(), Duration::from_secs(1));
        assert_eq!(backoff.next(), Duration::from_secs(2));
        assert_eq!(backoff.next(), Duration::from_secs(4));
        assert_eq!(backoff.next(), Duration::from_secs(8));
        assert_eq!(backoff.next(), Duration::from_secs(16));
        assert_eq!(backoff.next(), Duration::from_secs(30));
        assert_eq!(backoff.next(), Duration::from_secs(30));
    }

    #[test]
    fn sequence_is_monotonic_and_never_exceeds_max() {
        let mut backoff = Backoff::new(BASE, MAX);
        let mut previous = Duration::ZERO;
        for _ in 0..64 {
            let delay = backoff.next();
            assert!(delay >= previous);
            assert!(delay <= MAX);
            previous = delay;
        }
    }

    #[test]
    fn reset_starts_over_from_base() {
        let mut backoff = Backoff::new(BASE, MAX);
        for _ in 0..5 {
            backoff.next();
        }
        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert_eq!(backoff.next(), BASE);
    }

    #[test]
    fn huge_attempt_numbers_do_not_overflow() {
        assert_eq!(Backoff::delay_for(BASE, MAX, 63), MAX);
        assert_eq!(Backoff::delay_for(BASE, MAX, u32::MAX), MAX);
    }

    #[test]
    fn retry_policy_limits() {
        assert!(RetryPolicy::Unbounded.allows(1_000_000));
        let capped = RetryPolicy::Limited(5);
        assert!(capped.allows(0));
        assert!(capped.allows(4));
        assert!(!capped.allows(5));
    }

    #[test]
    fn fixed_delay_via_equal_base_and_max() {
        // The chat channel uses a fixed delay: base == max.
        let mut backoff = Backoff::new(Duration::from_secs(3), Duration::from_secs(3));
        assert_eq!(backoff.next(), Duration::from_secs(3));
        assert_eq!(backoff.next(), Duration::from_secs(3));
    }
}
