//! Retry and bisection configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::resilience::RetryPolicy;

/// Retry configuration shared by every port call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Bisection rounds allowed per batch.
    #[serde(default = "default_bisection_budget")]
    pub bisection_budget: u32,
    /// Retries of a transient failure before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// First backoff delay in milliseconds.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Backoff ceiling in milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Growth factor between attempts.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Random spread applied to each delay (0.0 to 1.0).
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            bisection_budget: default_bisection_budget(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            multiplier: default_multiplier(),
            jitter_factor: default_jitter_factor(),
        }
    }
}

impl RetryConfig {
    /// Convert to the policy used by the resilience module.
    #[must_use]
    pub const fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            bisection_budget: self.bisection_budget,
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            backoff_multiplier: self.multiplier,
            jitter_factor: self.jitter_factor,
        }
    }
}

const fn default_bisection_budget() -> u32 {
    8
}

const fn default_max_attempts() -> u32 {
    5
}

const fn default_initial_backoff_ms() -> u64 {
    100
}

const fn default_max_backoff_ms() -> u64 {
    30_000
}

const fn default_multiplier() -> f64 {
    2.0
}

const fn default_jitter_factor() -> f64 {
    0.2
}
