//! Aggregation trigger and upstream polling configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Aggregation trigger configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between aggregation runs.
    #[serde(default = "default_cadence_secs")]
    pub cadence_secs: u64,
    /// Run once immediately at startup.
    #[serde(default)]
    pub run_on_start: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cadence_secs: default_cadence_secs(),
            run_on_start: false,
        }
    }
}

impl SchedulerConfig {
    /// Cadence as a `Duration`.
    #[must_use]
    pub const fn cadence(&self) -> Duration {
        Duration::from_secs(self.cadence_secs)
    }
}

/// Upstream exchange-rate polling.
///
/// Polling is off while `pairs` is empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Provider base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Pairs polled, written `FROM/TO` (e.g. `BTC/USD`).
    #[serde(default)]
    pub pairs: Vec<String>,
    /// Seconds between polls of every pair.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// HTTP request timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            pairs: Vec::new(),
            poll_interval_secs: default_poll_interval_secs(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl UpstreamConfig {
    /// Parsed `(from, to)` pairs; entries without a `/` are skipped.
    #[must_use]
    pub fn currency_pairs(&self) -> Vec<(String, String)> {
        self.pairs
            .iter()
            .filter_map(|pair| {
                let (from, to) = pair.split_once('/')?;
                let (from, to) = (from.trim(), to.trim());
                (!from.is_empty() && !to.is_empty())
                    .then(|| (from.to_uppercase(), to.to_uppercase()))
            })
            .collect()
    }
}

const fn default_cadence_secs() -> u64 {
    3600
}

fn default_base_url() -> String {
    "https://www.alphavantage.co".to_string()
}

const fn default_poll_interval_secs() -> u64 {
    60
}

const fn default_request_timeout_ms() -> u64 {
    10_000
}
