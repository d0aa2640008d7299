//! Stream consumer configuration.

use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::quote::QuoteRules;

/// Stream consumer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerConfig {
    /// Largest batch requested per poll.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Pause between polls of a drained partition, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// How far a timestamp may move backwards before a point is rejected.
    #[serde(default = "default_timestamp_tolerance_ms")]
    pub timestamp_tolerance_ms: i64,
    /// Largest accepted price.
    #[serde(default = "default_max_price")]
    pub max_price: Decimal,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            poll_interval_ms: default_poll_interval_ms(),
            timestamp_tolerance_ms: default_timestamp_tolerance_ms(),
            max_price: default_max_price(),
        }
    }
}

impl ConsumerConfig {
    /// Validation rules applied at ingest and consume time.
    #[must_use]
    pub const fn rules(&self) -> QuoteRules {
        QuoteRules {
            max_price: self.max_price,
            timestamp_tolerance_ms: self.timestamp_tolerance_ms,
        }
    }

    /// Poll interval as a `Duration`.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

const fn default_batch_size() -> usize {
    100
}

const fn default_poll_interval_ms() -> u64 {
    500
}

const fn default_timestamp_tolerance_ms() -> i64 {
    5_000
}

fn default_max_price() -> Decimal {
    Decimal::new(1_000_000_000, 0)
}
