//! Stream batches and their cursors.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::quote::QuotePoint;
use crate::domain::shared::{InstrumentId, ValidationError};

/// Position in a partition's stream.
///
/// A batch's cursor addresses its first record; `cursor.advance(i)` addresses
/// record `i`. Acknowledging a cursor means every record before it is durable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchCursor(u64);

impl BatchCursor {
    /// Start of a partition.
    pub const ORIGIN: Self = Self(0);

    /// Create a cursor at an absolute position.
    #[must_use]
    pub const fn new(position: u64) -> Self {
        Self(position)
    }

    /// Absolute position.
    #[must_use]
    pub const fn position(&self) -> u64 {
        self.0
    }

    /// Cursor `n` records further along.
    #[must_use]
    pub const fn advance(&self, n: usize) -> Self {
        Self(self.0.saturating_add(n as u64))
    }
}

impl fmt::Display for BatchCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An ordered run of points delivered on one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestBatch {
    partition: InstrumentId,
    cursor: BatchCursor,
    points: Vec<QuotePoint>,
}

impl IngestBatch {
    /// Create a batch starting at `cursor`.
    #[must_use]
    pub const fn new(partition: InstrumentId, cursor: BatchCursor, points: Vec<QuotePoint>) -> Self {
        Self {
            partition,
            cursor,
            points,
        }
    }

    /// Partition the batch was delivered on.
    #[must_use]
    pub const fn partition(&self) -> &InstrumentId {
        &self.partition
    }

    /// Cursor of the first record.
    #[must_use]
    pub const fn cursor(&self) -> BatchCursor {
        self.cursor
    }

    /// Cursor just past the last record.
    #[must_use]
    pub const fn end_cursor(&self) -> BatchCursor {
        self.cursor.advance(self.points.len())
    }

    /// Points in delivery order.
    #[must_use]
    pub fn points(&self) -> &[QuotePoint] {
        &self.points
    }

    /// Number of points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns true if the batch carries no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Sub-batch covering `start..end`, with its cursor moved accordingly.
    #[must_use]
    pub fn slice(&self, start: usize, end: usize) -> Self {
        let end = end.min(self.points.len());
        let start = start.min(end);
        Self {
            partition: self.partition.clone(),
            cursor: self.cursor.advance(start),
            points: self.points[start..end].to_vec(),
        }
    }
}

/// Outcome of applying one batch to the point store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumeResult {
    /// Every point was durably written.
    Applied(usize),
    /// Point `failed_at_index` failed validation; every point before it was written.
    PartialFailure {
        /// Index of the failing point within the batch.
        failed_at_index: usize,
        /// Why it failed.
        error: ValidationError,
    },
}

impl ConsumeResult {
    /// Number of points written.
    #[must_use]
    pub const fn written(&self) -> usize {
        match self {
            Self::Applied(n) => *n,
            Self::PartialFailure {
                failed_at_index, ..
            } => *failed_at_index,
        }
    }
}
