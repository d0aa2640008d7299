//! Point Store Port (Driven Port)
//!
//! Durable per-instrument storage of quote points, keyed by
//! `(instrument_id, timestamp)` with last-write-wins semantics.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::quote::QuotePoint;
use crate::domain::shared::{InstrumentId, Timestamp};
use crate::resilience::TransientError;

/// Order of a range scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanOrder {
    /// Oldest first.
    #[default]
    Ascending,
    /// Newest first.
    Descending,
}

/// Point store error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Store unreachable or throttling.
    #[error("Point store unavailable: {message}")]
    Unavailable {
        /// Error details.
        message: String,
    },

    /// Call exceeded its deadline.
    #[error("Point store call timed out after {timeout_ms}ms")]
    Timeout {
        /// Deadline in milliseconds.
        timeout_ms: u64,
    },

    /// Store refused the request permanently.
    #[error("Point store rejected request: {message}")]
    Rejected {
        /// Error details.
        message: String,
    },
}

impl StoreError {
    /// Create an unavailable error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}

impl TransientError for StoreError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Timeout { .. })
    }

    fn timed_out(after: Duration) -> Self {
        Self::Timeout {
            timeout_ms: u64::try_from(after.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Port for quote point persistence.
#[async_trait]
pub trait PointStorePort: Send + Sync {
    /// Write a point. A point with the same key replaces the stored one.
    async fn append(&self, point: &QuotePoint) -> Result<(), StoreError>;

    /// Points with `from < timestamp <= to`, at most `limit`, in `order`.
    async fn range_scan(
        &self,
        instrument_id: &InstrumentId,
        from: Timestamp,
        to: Timestamp,
        limit: usize,
        order: ScanOrder,
    ) -> Result<Vec<QuotePoint>, StoreError>;

    /// The point stored at exactly `timestamp`.
    async fn get(
        &self,
        instrument_id: &InstrumentId,
        timestamp: Timestamp,
    ) -> Result<Option<QuotePoint>, StoreError>;

    /// Instruments with at least one stored point, sorted.
    async fn instruments(&self) -> Result<Vec<InstrumentId>, StoreError>;

    /// The newest stored point of an instrument.
    async fn latest(&self, instrument_id: &InstrumentId) -> Result<Option<QuotePoint>, StoreError>;
}
