//! In-memory stream transport.
//!
//! Each partition is an append-only log with a read position and a committed
//! cursor. Polling advances the read position; `redeliver_from` moves it back.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use crate::application::ports::{StreamTransportPort, TransportError};
use crate::domain::ingest::{BatchCursor, IngestBatch};
use crate::domain::quote::{NormalizedQuote, QuotePoint};
use crate::domain::shared::InstrumentId;

#[derive(Debug, Default)]
struct PartitionLog {
    records: Vec<QuotePoint>,
    read: usize,
    committed: BatchCursor,
}

impl PartitionLog {
    fn end(&self) -> BatchCursor {
        BatchCursor::ORIGIN.advance(self.records.len())
    }

    fn check(&self, partition: &InstrumentId, cursor: BatchCursor) -> Result<usize, TransportError> {
        if cursor > self.end() {
            return Err(TransportError::CursorOutOfRange {
                partition: partition.to_string(),
                cursor,
                end: self.end(),
            });
        }
        Ok(cursor.position() as usize)
    }
}

/// In-memory implementation of `StreamTransportPort`.
#[derive(Debug, Default)]
pub struct InMemoryStreamTransport {
    partitions: RwLock<BTreeMap<InstrumentId, PartitionLog>>,
}

impl InMemoryStreamTransport {
    /// Create an empty transport.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a point as-is, keeping its `source_sequence`.
    pub fn inject(&self, partition: &InstrumentId, point: QuotePoint) {
        self.partitions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(partition.clone())
            .or_default()
            .records
            .push(point);
    }

    /// Number of records ever published on a partition.
    #[must_use]
    pub fn len(&self, partition: &InstrumentId) -> usize {
        self.partitions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(partition)
            .map_or(0, |log| log.records.len())
    }

    /// Records published but not yet committed on a partition.
    #[must_use]
    pub fn lag(&self, partition: &InstrumentId) -> usize {
        self.partitions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(partition)
            .map_or(0, |log| log.records.len() - log.committed.position() as usize)
    }
}

#[async_trait]
impl StreamTransportPort for InMemoryStreamTransport {
    async fn partitions(&self) -> Result<Vec<InstrumentId>, TransportError> {
        let partitions = self.partitions.read().unwrap_or_else(PoisonError::into_inner);
        Ok(partitions.keys().cloned().collect())
    }

    async fn publish(
        &self,
        partition: &InstrumentId,
        quote: NormalizedQuote,
    ) -> Result<QuotePoint, TransportError> {
        let mut partitions = self.partitions.write().unwrap_or_else(PoisonError::into_inner);
        let log = partitions.entry(partition.clone()).or_default();
        let sequence = log
            .records
            .last()
            .map_or(1, |last| last.source_sequence + 1);
        let point = quote.into_point(sequence);
        log.records.push(point.clone());
        Ok(point)
    }

    async fn poll(
        &self,
        partition: &InstrumentId,
        max: usize,
    ) -> Result<Option<IngestBatch>, TransportError> {
        let mut partitions = self.partitions.write().unwrap_or_else(PoisonError::into_inner);
        let Some(log) = partitions.get_mut(partition) else {
            return Ok(None);
        };
        if log.read >= log.records.len() || max == 0 {
            return Ok(None);
        }

        let start = log.read;
        let end = (start + max).min(log.records.len());
        log.read = end;
        Ok(Some(IngestBatch::new(
            partition.clone(),
            BatchCursor::ORIGIN.advance(start),
            log.records[start..end].to_vec(),
        )))
    }

    async fn acknowledge(
        &self,
        partition: &InstrumentId,
        cursor: BatchCursor,
    ) -> Result<(), TransportError> {
        let mut partitions = self.partitions.write().unwrap_or_else(PoisonError::into_inner);
        let log = partitions.entry(partition.clone()).or_default();
        log.check(partition, cursor)?;
        log.committed = log.committed.max(cursor);
        Ok(())
    }

    async fn redeliver_from(
        &self,
        partition: &InstrumentId,
        cursor: BatchCursor,
    ) -> Result<(), TransportError> {
        let mut partitions = self.partitions.write().unwrap_or_else(PoisonError::into_inner);
        let log = partitions.entry(partition.clone()).or_default();
        log.read = log.check(partition, cursor)?;
        Ok(())
    }

    async fn committed(&self, partition: &InstrumentId) -> Result<BatchCursor, TransportError> {
        let partitions = self.partitions.read().unwrap_or_else(PoisonError::into_inner);
        Ok(partitions
            .get(partition)
            .map_or(BatchCursor::ORIGIN, |log| log.committed))
    }
}
