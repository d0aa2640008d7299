//! In-memory output sink.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::application::ports::{OutputSinkPort, SinkError};
use crate::domain::aggregation::AggregateRecord;
use crate::domain::shared::{InstrumentId, Timestamp};

/// A record together with the partition it was written to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    /// Partition date.
    pub date: NaiveDate,
    /// Partition hour.
    pub hour: u32,
    /// The record.
    pub record: AggregateRecord,
}

/// In-memory implementation of `OutputSinkPort`, keyed by `(instrument, as_of)`.
#[derive(Debug, Default)]
pub struct InMemoryOutputSink {
    records: RwLock<BTreeMap<(InstrumentId, Timestamp), StoredRecord>>,
}

impl InMemoryOutputSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct keys written.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Check if nothing was written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The record stored under a key.
    #[must_use]
    pub fn get(&self, instrument_id: &InstrumentId, as_of: Timestamp) -> Option<StoredRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(instrument_id.clone(), as_of))
            .cloned()
    }

    /// Every stored record, ordered by key.
    #[must_use]
    pub fn records(&self) -> Vec<StoredRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl OutputSinkPort for InMemoryOutputSink {
    async fn write_partition(
        &self,
        instrument_id: &InstrumentId,
        date: NaiveDate,
        hour: u32,
        record: &AggregateRecord,
    ) -> Result<(), SinkError> {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                (instrument_id.clone(), record.as_of),
                StoredRecord {
                    date,
                    hour,
                    record: record.clone(),
                },
            );
        Ok(())
    }
}
