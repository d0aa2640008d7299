//! Stream Transport Port (Driven Port)
//!
//! Partitioned, ordered, at-least-once log of quotes. Each instrument is one
//! partition; positions within a partition are [`BatchCursor`]s.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::ingest::{BatchCursor, IngestBatch};
use crate::domain::quote::{NormalizedQuote, QuotePoint};
use crate::domain::shared::InstrumentId;
use crate::resilience::TransientError;

/// Stream transport error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Transport unreachable.
    #[error("Stream transport unavailable: {message}")]
    Unavailable {
        /// Error details.
        message: String,
    },

    /// Call exceeded its deadline.
    #[error("Stream transport call timed out after {timeout_ms}ms")]
    Timeout {
        /// Deadline in milliseconds.
        timeout_ms: u64,
    },

    /// Cursor outside the partition.
    #[error("Cursor {cursor} is beyond the end of partition {partition} ({end})")]
    CursorOutOfRange {
        /// Partition.
        partition: String,
        /// Requested cursor.
        cursor: BatchCursor,
        /// End of the partition.
        end: BatchCursor,
    },
}

impl TransientError for TransportError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Timeout { .. })
    }

    fn timed_out(after: Duration) -> Self {
        Self::Timeout {
            timeout_ms: u64::try_from(after.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Port for the ingest stream.
#[async_trait]
pub trait StreamTransportPort: Send + Sync {
    /// Partitions known to the transport, sorted.
    async fn partitions(&self) -> Result<Vec<InstrumentId>, TransportError>;

    /// Append a quote to `partition`, stamping its `source_sequence`.
    async fn publish(
        &self,
        partition: &InstrumentId,
        quote: NormalizedQuote,
    ) -> Result<QuotePoint, TransportError>;

    /// Next batch of up to `max` records from the read position, or `None` if
    /// the partition is drained. Advances the read position.
    async fn poll(
        &self,
        partition: &InstrumentId,
        max: usize,
    ) -> Result<Option<IngestBatch>, TransportError>;

    /// Commit: every record before `cursor` is durably processed.
    async fn acknowledge(
        &self,
        partition: &InstrumentId,
        cursor: BatchCursor,
    ) -> Result<(), TransportError>;

    /// Move the read position back to `cursor` so records are delivered again.
    async fn redeliver_from(
        &self,
        partition: &InstrumentId,
        cursor: BatchCursor,
    ) -> Result<(), TransportError>;

    /// Last committed cursor of a partition.
    async fn committed(&self, partition: &InstrumentId) -> Result<BatchCursor, TransportError>;
}
