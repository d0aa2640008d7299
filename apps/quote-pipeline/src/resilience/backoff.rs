//! Retry policy and exponential backoff with jitter.
//!
//! # Example
//!
//! ```rust
//! use quote_pipeline::resilience::{ExponentialBackoff, RetryPolicy};
//! use std::time::Duration;
//!
//! let policy = RetryPolicy {
//!     jitter_factor: 0.0,
//!     ..RetryPolicy::default()
//! };
//! let mut backoff = ExponentialBackoff::new(&policy);
//!
//! assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(100)));
//! assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(200)));
//! ```

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Retry settings shared by the consumer and the aggregation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Bisection rounds one originating batch may spend (default: 8).
    pub bisection_budget: u32,
    /// Retries after the first attempt for transient failures (default: 5).
    pub max_attempts: u32,
    /// Initial backoff duration (default: 100ms).
    pub initial_backoff: Duration,
    /// Maximum backoff duration (default: 30s).
    pub max_backoff: Duration,
    /// Backoff multiplier for exponential growth (default: 2.0).
    pub backoff_multiplier: f64,
    /// Jitter factor for randomization (default: 0.2 = ±20%).
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            bisection_budget: 8,
            max_attempts: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter_factor: 0.2,
        }
    }
}

impl RetryPolicy {
    /// A policy that never sleeps, for tests and one-shot tools.
    #[must_use]
    pub const fn immediate(max_attempts: u32, bisection_budget: u32) -> Self {
        Self {
            bisection_budget,
            max_attempts,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            backoff_multiplier: 1.0,
            jitter_factor: 0.0,
        }
    }
}

/// Delay sequence for one unit of work: `initial * multiplier^n`, capped,
/// with symmetric jitter. Yields `max_attempts` delays and then `None`.
#[derive(Debug)]
pub struct ExponentialBackoff {
    attempt: u32,
    policy: RetryPolicy,
}

impl ExponentialBackoff {
    /// Start a fresh sequence for `policy`.
    #[must_use]
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            attempt: 0,
            policy: policy.clone(),
        }
    }

    /// Delay before the next retry, or `None` once the attempts are spent.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if !self.has_remaining_attempts() {
            return None;
        }
        let delay = jittered(self.base_delay(), self.policy.jitter_factor).min(self.policy.max_backoff);
        self.attempt += 1;
        Some(delay)
    }

    fn base_delay(&self) -> Duration {
        let exponent = i32::try_from(self.attempt).unwrap_or(i32::MAX);
        let factor = self.policy.backoff_multiplier.powi(exponent);
        let max_secs = self.policy.max_backoff.as_secs_f64();
        let secs = (self.policy.initial_backoff.as_secs_f64() * factor).min(max_secs);
        Duration::try_from_secs_f64(secs).unwrap_or(self.policy.max_backoff)
    }

    /// Delays handed out so far.
    #[must_use]
    pub const fn current_attempt(&self) -> u32 {
        self.attempt
    }

    /// Whether another delay is available.
    #[must_use]
    pub const fn has_remaining_attempts(&self) -> bool {
        self.attempt < self.policy.max_attempts
    }

    /// Start over, e.g. after a success.
    pub const fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// Scale `delay` by a uniform factor in `[1 - jitter, 1 + jitter]`, rounded to
/// whole milliseconds.
fn jittered(delay: Duration, jitter: f64) -> Duration {
    let ms = delay.as_millis() as f64;
    if jitter <= 0.0 || ms == 0.0 {
        return Duration::from_millis(ms as u64);
    }
    let factor = rand::rng().random_range((1.0 - jitter).max(0.0)..=1.0 + jitter);
    Duration::from_millis((ms * factor) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.bisection_budget, 8);
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.initial_backoff, Duration::from_millis(100));
        assert_eq!(policy.max_backoff, Duration::from_secs(30));
        assert!((policy.backoff_multiplier - 2.0).abs() < f64::EPSILON);
        assert!((policy.jitter_factor - 0.2).abs() < f64::EPSILON);
    }

    #[test]
    fn test_exponential_backoff_sequence() {
        let policy = RetryPolicy {
            jitter_factor: 0.0,
            ..Default::default()
        };
        let mut backoff = ExponentialBackoff::new(&policy);

        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(100)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(200)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(400)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(800)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(1600)));

        assert!(backoff.next_backoff().is_none());
    }

    #[test]
    fn test_max_backoff_cap() {
        let policy = RetryPolicy {
            max_attempts: 20,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(5),
            backoff_multiplier: 10.0,
            jitter_factor: 0.0,
            ..Default::default()
        };
        let mut backoff = ExponentialBackoff::new(&policy);

        assert_eq!(backoff.next_backoff(), Some(Duration::from_secs(1)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_secs(5)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let policy = RetryPolicy {
            max_attempts: 1,
            initial_backoff: Duration::from_millis(1000),
            jitter_factor: 0.2,
            ..Default::default()
        };
        for _ in 0..50 {
            let mut backoff = ExponentialBackoff::new(&policy);
            let delay = backoff.next_backoff().unwrap();
            assert!(delay >= Duration::from_millis(800));
            assert!(delay <= Duration::from_millis(1200));
        }
    }

    #[test]
    fn test_reset() {
        let mut backoff = ExponentialBackoff::new(&RetryPolicy::immediate(1, 0));
        assert!(backoff.next_backoff().is_some());
        assert!(!backoff.has_remaining_attempts());
        backoff.reset();
        assert_eq!(backoff.current_attempt(), 0);
        assert_eq!(backoff.next_backoff(), Some(Duration::ZERO));
    }
}
