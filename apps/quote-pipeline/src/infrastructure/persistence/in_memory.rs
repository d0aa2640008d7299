//! In-memory point store.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use crate::application::ports::{PointStorePort, ScanOrder, StoreError};
use crate::domain::quote::QuotePoint;
use crate::domain::shared::{InstrumentId, Timestamp};

type Series = BTreeMap<Timestamp, QuotePoint>;

/// In-memory implementation of `PointStorePort`.
///
/// Points are kept per instrument ordered by timestamp. Writing a point at an
/// existing timestamp replaces it.
#[derive(Debug, Default)]
pub struct InMemoryPointStore {
    series: RwLock<HashMap<InstrumentId, Series>>,
}

impl InMemoryPointStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.series
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(BTreeMap::len)
            .sum()
    }

    /// Check if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every point of an instrument, oldest first.
    #[must_use]
    pub fn points(&self, instrument_id: &InstrumentId) -> Vec<QuotePoint> {
        self.series
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(instrument_id)
            .map(|s| s.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl PointStorePort for InMemoryPointStore {
    async fn append(&self, point: &QuotePoint) -> Result<(), StoreError> {
        let mut series = self.series.write().unwrap_or_else(PoisonError::into_inner);
        series
            .entry(point.instrument_id.clone())
            .or_default()
            .insert(point.timestamp, point.clone());
        Ok(())
    }

    async fn range_scan(
        &self,
        instrument_id: &InstrumentId,
        from: Timestamp,
        to: Timestamp,
        limit: usize,
        order: ScanOrder,
    ) -> Result<Vec<QuotePoint>, StoreError> {
        if from >= to {
            return Ok(Vec::new());
        }
        let series = self.series.read().unwrap_or_else(PoisonError::into_inner);
        let Some(points) = series.get(instrument_id) else {
            return Ok(Vec::new());
        };

        let range = points.range(from..=to).filter(|(ts, _)| **ts > from);
        let scanned = match order {
            ScanOrder::Ascending => range.take(limit).map(|(_, p)| p.clone()).collect(),
            ScanOrder::Descending => range.rev().take(limit).map(|(_, p)| p.clone()).collect(),
        };
        Ok(scanned)
    }

    async fn get(
        &self,
        instrument_id: &InstrumentId,
        timestamp: Timestamp,
    ) -> Result<Option<QuotePoint>, StoreError> {
        let series = self.series.read().unwrap_or_else(PoisonError::into_inner);
        Ok(series
            .get(instrument_id)
            .and_then(|points| points.get(&timestamp))
            .cloned())
    }

    async fn instruments(&self) -> Result<Vec<InstrumentId>, StoreError> {
        let series = self.series.read().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<InstrumentId> = series
            .iter()
            .filter(|(_, points)| !points.is_empty())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn latest(&self, instrument_id: &InstrumentId) -> Result<Option<QuotePoint>, StoreError> {
        let series = self.series.read().unwrap_or_else(PoisonError::into_inner);
        Ok(series
            .get(instrument_id)
            .and_then(|points| points.last_key_value())
            .map(|(_, p)| p.clone()))
    }
}
