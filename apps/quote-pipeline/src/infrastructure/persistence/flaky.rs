//! Fault-injecting point store wrapper.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use crate::application::ports::{PointStorePort, ScanOrder, StoreError};
use crate::domain::quote::QuotePoint;
use crate::domain::shared::{InstrumentId, Timestamp};

/// Wraps a store and fails the next N appends or scans as unavailable.
///
/// Appends can also be refused by source sequence: permanently for chosen
/// sequences, or as unavailable for every sequence from a threshold on.
#[derive(Debug)]
pub struct FlakyPointStore<S> {
    inner: S,
    failing_appends: AtomicUsize,
    failing_scans: AtomicUsize,
    outage_from_sequence: AtomicU64,
    rejected_sequences: RwLock<BTreeSet<u64>>,
}

impl<S> FlakyPointStore<S> {
    /// Wrap a store with no faults armed.
    pub const fn new(inner: S) -> Self {
        Self {
            inner,
            failing_appends: AtomicUsize::new(0),
            failing_scans: AtomicUsize::new(0),
            outage_from_sequence: AtomicU64::new(u64::MAX),
            rejected_sequences: RwLock::new(BTreeSet::new()),
        }
    }

    /// Fail the next `n` calls to `append`.
    pub fn fail_next_appends(&self, n: usize) {
        self.failing_appends.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` calls to `range_scan`.
    pub fn fail_next_scans(&self, n: usize) {
        self.failing_scans.store(n, Ordering::SeqCst);
    }

    /// Fail every append of a point with `source_sequence >= sequence` as unavailable.
    pub fn fail_appends_from(&self, sequence: u64) {
        self.outage_from_sequence.store(sequence, Ordering::SeqCst);
    }

    /// Stop the outage armed by `fail_appends_from`.
    pub fn end_outage(&self) {
        self.outage_from_sequence.store(u64::MAX, Ordering::SeqCst);
    }

    /// Permanently reject appends of the point with this source sequence.
    pub fn reject_sequence(&self, sequence: u64) {
        self.rejected_sequences
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(sequence);
    }

    /// The wrapped store.
    pub const fn inner(&self) -> &S {
        &self.inner
    }

    fn trip(counter: &AtomicUsize, operation: &str) -> Result<(), StoreError> {
        let tripped = counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if tripped {
            Err(StoreError::unavailable(format!("injected {operation} failure")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl<S: PointStorePort> PointStorePort for FlakyPointStore<S> {
    async fn append(&self, point: &QuotePoint) -> Result<(), StoreError> {
        Self::trip(&self.failing_appends, "append")?;
        let sequence = point.source_sequence;
        if self
            .rejected_sequences
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&sequence)
        {
            return Err(StoreError::Rejected {
                message: format!("sequence {sequence} refused"),
            });
        }
        if sequence >= self.outage_from_sequence.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable(format!(
                "injected outage at sequence {sequence}"
            )));
        }
        self.inner.append(point).await
    }

    async fn range_scan(
        &self,
        instrument_id: &InstrumentId,
        from: Timestamp,
        to: Timestamp,
        limit: usize,
        order: ScanOrder,
    ) -> Result<Vec<QuotePoint>, StoreError> {
        Self::trip(&self.failing_scans, "range_scan")?;
        self.inner
            .range_scan(instrument_id, from, to, limit, order)
            .await
    }

    async fn get(
        &self,
        instrument_id: &InstrumentId,
        timestamp: Timestamp,
    ) -> Result<Option<QuotePoint>, StoreError> {
        self.inner.get(instrument_id, timestamp).await
    }

    async fn instruments(&self) -> Result<Vec<InstrumentId>, StoreError> {
        self.inner.instruments().await
    }

    async fn latest(&self, instrument_id: &InstrumentId) -> Result<Option<QuotePoint>, StoreError> {
        self.inner.latest(instrument_id).await
    }
}
