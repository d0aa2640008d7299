//! Aggregation engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::application::use_cases::AggregationSettings;
use crate::domain::aggregation::{AsOfMode, WindowSpec};
use crate::domain::quote::PriceField;

/// Aggregation engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// SMA window lengths, in points.
    #[serde(default = "default_windows")]
    pub windows: Vec<usize>,
    /// Price side averaged.
    #[serde(default)]
    pub field: PriceField,
    /// Points older than this before the trigger are ignored.
    #[serde(default = "default_lookback_hours")]
    pub lookback_hours: u64,
    /// Instruments aggregated at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// How `as_of` is chosen.
    #[serde(default)]
    pub as_of_mode: AsOfMode,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            windows: default_windows(),
            field: PriceField::default(),
            lookback_hours: default_lookback_hours(),
            concurrency: default_concurrency(),
            as_of_mode: AsOfMode::default(),
        }
    }
}

impl AggregationConfig {
    /// Build engine settings.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` for an empty window set or a
    /// zero-length window.
    pub fn to_settings(&self, operation_timeout: Duration) -> Result<AggregationSettings, ConfigError> {
        let windows = WindowSpec::new(self.windows.iter().copied())
            .map_err(|e| ConfigError::ValidationError(format!("aggregation.windows: {e}")))?;
        Ok(AggregationSettings {
            windows,
            field: self.field,
            lookback: Duration::from_secs(self.lookback_hours.saturating_mul(3600)),
            concurrency: self.concurrency,
            as_of_mode: self.as_of_mode,
            operation_timeout,
        })
    }
}

fn default_windows() -> Vec<usize> {
    WindowSpec::default().windows().to_vec()
}

const fn default_lookback_hours() -> u64 {
    168
}

const fn default_concurrency() -> usize {
    8
}
