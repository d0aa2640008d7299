//! Output Sink Port (Driven Port)
//!
//! Append-only columnar store for aggregate records, partitioned by
//! instrument, date and hour.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::aggregation::AggregateRecord;
use crate::domain::shared::InstrumentId;
use crate::resilience::TransientError;

/// Finest time partition of the sink layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionGranularity {
    /// `date=YYYY-MM-DD/hour=HH`.
    #[default]
    Hour,
    /// `date=YYYY-MM-DD`.
    Day,
}

/// Output sink error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    /// Storage unavailable or an I/O call failed.
    #[error("Output sink unavailable: {message}")]
    Unavailable {
        /// Error details.
        message: String,
    },

    /// Call exceeded its deadline.
    #[error("Output sink write timed out after {timeout_ms}ms")]
    Timeout {
        /// Deadline in milliseconds.
        timeout_ms: u64,
    },

    /// Record could not be encoded.
    #[error("Failed to encode record: {message}")]
    Encode {
        /// Error details.
        message: String,
    },
}

impl TransientError for SinkError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Timeout { .. })
    }

    fn timed_out(after: Duration) -> Self {
        Self::Timeout {
            timeout_ms: u64::try_from(after.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

impl From<std::io::Error> for SinkError {
    fn from(err: std::io::Error) -> Self {
        Self::Unavailable {
            message: err.to_string(),
        }
    }
}

/// Port for aggregate output.
#[async_trait]
pub trait OutputSinkPort: Send + Sync {
    /// Write `record` into its partition. Writing the same
    /// `(instrument, as_of)` again replaces the previous record atomically.
    async fn write_partition(
        &self,
        instrument_id: &InstrumentId,
        date: NaiveDate,
        hour: u32,
        record: &AggregateRecord,
    ) -> Result<(), SinkError>;
}
