//! Consume Stream Use Case
//!
//! Applies quote batches from the stream transport to the point store. A
//! batch that fails validation part way through is bisected until the bad
//! records are isolated and skipped; transient store failures retry the same
//! segment whole and never bisect.
//!
//! # Acknowledgement
//!
//! The transport cursor only moves past records that were durably written,
//! skipped as poison pills, or dropped after the bisection budget ran out.
//! A record the store refuses outright is skipped like one that fails
//! validation. A batch that stalls on transient failures is acknowledged up
//! to its last written record and redelivered from there.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{PointStorePort, StoreError, StreamTransportPort, TransportError};
use crate::domain::ingest::{
    BatchCursor, BisectionState, ConsumeResult, FailureAction, IngestBatch, Segment,
};
use crate::domain::quote::{Predecessor, QuotePoint, QuoteRules};
use crate::domain::shared::{InstrumentId, ValidationError};
use crate::error::{ErrorCode, PipelineError};
use crate::observability::{
    record_batch_dropped, record_bisection_rounds, record_points_applied, record_record_rejected,
};
use crate::resilience::{ExponentialBackoff, RetryError, RetryPolicy, retry_transient, with_timeout};

// ============================================================================
// Batch outcome
// ============================================================================

/// Result of driving one batch through the bisecting retry harness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Records durably written, including the written prefix of a stalled segment.
    pub applied: usize,
    /// Reported failures: skipped records, dropped suffixes and stalls.
    pub terminal_failures: Vec<PipelineError>,
    /// Records dropped unapplied because the bisection budget ran out.
    pub dropped: usize,
    /// Bisection rounds spent.
    pub rounds: u32,
    /// Every record before this cursor is applied, skipped or dropped.
    pub acked_through: BatchCursor,
    /// Processing stopped on a transient failure; the rest must be redelivered.
    pub stalled: bool,
}

impl BatchOutcome {
    fn starting_at(cursor: BatchCursor) -> Self {
        Self {
            applied: 0,
            terminal_failures: Vec::new(),
            dropped: 0,
            rounds: 0,
            acked_through: cursor,
            stalled: false,
        }
    }

    /// Records skipped as poison pills.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.terminal_failures
            .iter()
            .filter(|e| e.code() == ErrorCode::DataValidation)
            .count()
    }

    fn stall(&mut self, partition: &InstrumentId, error: &RetryError<StoreError>) {
        let code = match error {
            RetryError::Permanent(_) => ErrorCode::Internal,
            RetryError::Exhausted { .. } | RetryError::Cancelled { .. } => ErrorCode::Transient,
        };
        self.stalled = true;
        self.terminal_failures.push(
            PipelineError::new(code, error.to_string())
                .with_context("partition", partition)
                .with_context("resume_from", self.acked_through),
        );
    }
}

// ============================================================================
// Bisecting consumer
// ============================================================================

/// Validates and writes batches, bisecting on partial failure.
pub struct BisectingConsumer<S>
where
    S: PointStorePort,
{
    store: Arc<S>,
    rules: QuoteRules,
    policy: RetryPolicy,
    operation_timeout: Duration,
}

impl<S> BisectingConsumer<S>
where
    S: PointStorePort,
{
    /// Create a new consumer.
    pub const fn new(
        store: Arc<S>,
        rules: QuoteRules,
        policy: RetryPolicy,
        operation_timeout: Duration,
    ) -> Self {
        Self {
            store,
            rules,
            policy,
            operation_timeout,
        }
    }

    /// Validate and write every point of `batch` in order.
    ///
    /// Returns `PartialFailure` at the first point that fails validation or
    /// that the store rejects; the points before it are written. Other store
    /// failures are returned as `Err` and nothing is reported as a data failure.
    pub async fn consume(&self, batch: &IngestBatch) -> Result<ConsumeResult, StoreError> {
        let previous = self.stored_predecessor(batch.partition()).await?;
        self.consume_after(batch, previous, &AtomicUsize::new(0)).await
    }

    async fn stored_predecessor(
        &self,
        partition: &InstrumentId,
    ) -> Result<Option<Predecessor>, StoreError> {
        let latest = with_timeout(self.operation_timeout, self.store.latest(partition)).await?;
        Ok(latest.as_ref().map(Predecessor::stored))
    }

    /// `written` is raised to the length of the longest prefix written so far.
    async fn consume_after(
        &self,
        batch: &IngestBatch,
        mut previous: Option<Predecessor>,
        written: &AtomicUsize,
    ) -> Result<ConsumeResult, StoreError> {
        for (index, point) in batch.points().iter().enumerate() {
            let failure = match self.validate(point, batch.partition(), previous).await? {
                Err(error) => Some(error),
                Ok(()) => match with_timeout(self.operation_timeout, self.store.append(point)).await {
                    Ok(()) => None,
                    Err(StoreError::Rejected { message }) => {
                        Some(ValidationError::StoreRejected { message })
                    }
                    Err(err) => return Err(err),
                },
            };
            if let Some(error) = failure {
                return Ok(ConsumeResult::PartialFailure {
                    failed_at_index: index,
                    error,
                });
            }
            written.fetch_max(index + 1, Ordering::Relaxed);
            previous = Some(Predecessor::in_batch(point));
        }
        Ok(ConsumeResult::Applied(batch.len()))
    }

    /// A point that regresses behind the store is still accepted when the
    /// store already holds it unchanged (a redelivered record).
    async fn validate(
        &self,
        point: &QuotePoint,
        partition: &InstrumentId,
        previous: Option<Predecessor>,
    ) -> Result<Result<(), ValidationError>, StoreError> {
        match self.rules.check_point(point, partition, previous) {
            Err(err @ ValidationError::TimestampRegression { .. })
                if previous.is_some_and(|p| p.source_sequence.is_none()) =>
            {
                let stored = with_timeout(
                    self.operation_timeout,
                    self.store.get(&point.instrument_id, point.timestamp),
                )
                .await?;
                Ok(if stored.as_ref() == Some(point) {
                    Ok(())
                } else {
                    Err(err)
                })
            }
            checked => Ok(checked),
        }
    }

    /// Drive `batch` to completion: apply, bisect, skip and drop as needed.
    pub async fn process(&self, batch: &IngestBatch, cancel: &CancellationToken) -> BatchOutcome {
        let partition = batch.partition();
        let mut outcome = BatchOutcome::starting_at(batch.cursor());
        if batch.is_empty() {
            return outcome;
        }

        let baseline = retry_transient(&self.policy, "point_store.latest", cancel, || {
            self.stored_predecessor(partition)
        })
        .await;
        let mut previous = match baseline {
            Ok(previous) => previous,
            Err(err) => {
                outcome.stall(partition, &err);
                return outcome;
            }
        };

        let mut state = BisectionState::new(batch.len(), self.policy.bisection_budget);

        while let Some(segment) = state.next_segment() {
            let slice = batch.slice(segment.start, segment.end);
            let written = AtomicUsize::new(0);
            let result = retry_transient(&self.policy, "point_store.write", cancel, || {
                self.consume_after(&slice, previous, &written)
            })
            .await;

            if let Ok(consumed) = &result {
                outcome.applied += consumed.written();
            }
            match result {
                Ok(ConsumeResult::Applied(_)) => {
                    if let Some(last) = slice.points().last() {
                        previous = Some(Predecessor::in_batch(last));
                    }
                    outcome.acked_through = batch.cursor().advance(segment.end);
                }
                Ok(ConsumeResult::PartialFailure {
                    failed_at_index,
                    error,
                }) => {
                    if let Some(last) = failed_at_index
                        .checked_sub(1)
                        .and_then(|i| slice.points().get(i))
                    {
                        previous = Some(Predecessor::in_batch(last));
                    }
                    outcome.acked_through = batch.cursor().advance(segment.start + failed_at_index);
                    self.on_data_failure(batch, &mut state, &mut outcome, segment, failed_at_index, &error);
                }
                Err(err) => {
                    let written = written.load(Ordering::Relaxed);
                    outcome.applied += written;
                    outcome.acked_through = batch.cursor().advance(segment.start + written);
                    tracing::warn!(
                        partition = %partition,
                        cursor = %outcome.acked_through,
                        error = %err,
                        "Batch stalled, leaving remainder for redelivery"
                    );
                    outcome.stall(partition, &err);
                    break;
                }
            }
        }

        outcome.rounds = state.rounds();
        record_points_applied(partition, outcome.applied);
        if outcome.rounds > 0 {
            record_bisection_rounds(partition, outcome.rounds);
        }
        outcome
    }

    fn on_data_failure(
        &self,
        batch: &IngestBatch,
        state: &mut BisectionState,
        outcome: &mut BatchOutcome,
        segment: Segment,
        failed_at_index: usize,
        error: &ValidationError,
    ) {
        let partition = batch.partition();
        match state.on_data_failure(segment, failed_at_index) {
            FailureAction::SkipRecord { offset } => {
                let cursor = batch.cursor().advance(offset);
                tracing::warn!(
                    partition = %partition,
                    cursor = %cursor,
                    error = %error,
                    "Skipping invalid record"
                );
                record_record_rejected(partition, error);
                outcome.terminal_failures.push(
                    PipelineError::data_validation(error.to_string())
                        .with_context("partition", partition)
                        .with_context("cursor", cursor),
                );
                outcome.acked_through = cursor.advance(1);
            }
            FailureAction::DropRemainder(remainder) => {
                let cursor = batch.cursor().advance(remainder.start);
                tracing::error!(
                    partition = %partition,
                    cursor = %cursor,
                    records = remainder.len(),
                    rounds = state.rounds(),
                    budget = self.policy.bisection_budget,
                    "Bisection budget exhausted, dropping remainder"
                );
                record_batch_dropped(partition, remainder.len());
                outcome.dropped += remainder.len();
                outcome.terminal_failures.push(
                    PipelineError::budget_exhausted(format!(
                        "dropped {} records after {} bisection rounds",
                        remainder.len(),
                        state.rounds()
                    ))
                    .with_context("partition", partition)
                    .with_context("cursor", cursor)
                    .with_context("cause", error),
                );
                outcome.acked_through = batch.cursor().advance(remainder.end);
            }
            FailureAction::Split { head, tail } => {
                tracing::debug!(
                    partition = %partition,
                    head_len = head.len(),
                    tail_len = tail.len(),
                    rounds = state.rounds(),
                    "Bisecting failed segment"
                );
            }
        }
    }
}

// ============================================================================
// Stream workers
// ============================================================================

/// Polling settings for the stream workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerSettings {
    /// Largest batch requested per poll.
    pub batch_size: usize,
    /// Pause when a partition is drained.
    pub poll_interval: Duration,
    /// Deadline for each transport call.
    pub operation_timeout: Duration,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            batch_size: 100,
            poll_interval: Duration::from_millis(500),
            operation_timeout: Duration::from_secs(5),
        }
    }
}

/// Use case for consuming every partition of the ingest stream.
pub struct ConsumeStreamUseCase<T, S>
where
    T: StreamTransportPort,
    S: PointStorePort,
{
    transport: Arc<T>,
    consumer: BisectingConsumer<S>,
    settings: ConsumerSettings,
    policy: RetryPolicy,
}

impl<T, S> ConsumeStreamUseCase<T, S>
where
    T: StreamTransportPort + 'static,
    S: PointStorePort + 'static,
{
    /// Create a new ConsumeStreamUseCase.
    pub fn new(transport: Arc<T>, consumer: BisectingConsumer<S>, settings: ConsumerSettings) -> Self {
        let policy = consumer.policy.clone();
        Self {
            transport,
            consumer,
            settings,
            policy,
        }
    }

    /// Consume until cancelled, one worker task per partition.
    ///
    /// New partitions are picked up every poll interval.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut workers = JoinSet::new();
        let mut known: HashSet<InstrumentId> = HashSet::new();

        loop {
            match self.transport_call(self.transport.partitions()).await {
                Ok(partitions) => {
                    for partition in partitions {
                        if known.insert(partition.clone()) {
                            tracing::info!(partition = %partition, "Starting partition worker");
                            let this = Arc::clone(&self);
                            let cancel = cancel.clone();
                            workers.spawn(async move { this.run_partition(partition, cancel).await });
                        }
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Failed to list partitions"),
            }

            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.settings.poll_interval) => {}
            }
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Partition worker panicked");
            }
        }
        tracing::info!("Stream consumer stopped");
    }

    async fn run_partition(&self, partition: InstrumentId, cancel: CancellationToken) {
        let mut backoff = ExponentialBackoff::new(&self.policy);

        if let Err(e) = self.resume(&partition).await {
            tracing::warn!(partition = %partition, error = %e, "Failed to resume from committed cursor");
        }

        while !cancel.is_cancelled() {
            let delay = match self.step(&partition, &cancel).await {
                Ok(Some(outcome)) if !outcome.stalled => {
                    backoff.reset();
                    continue;
                }
                Ok(None) => self.settings.poll_interval,
                Ok(Some(_)) => next_delay(&mut backoff, &self.policy),
                Err(e) => {
                    tracing::warn!(partition = %partition, error = %e, "Transport call failed");
                    next_delay(&mut backoff, &self.policy)
                }
            };

            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }
        tracing::debug!(partition = %partition, "Partition worker stopped");
    }

    /// Rewind the read position to the committed cursor.
    async fn resume(&self, partition: &InstrumentId) -> Result<BatchCursor, TransportError> {
        let committed = self.transport_call(self.transport.committed(partition)).await?;
        self.transport_call(self.transport.redeliver_from(partition, committed))
            .await?;
        Ok(committed)
    }

    /// Poll, process and acknowledge one batch. `None` when drained.
    async fn step(
        &self,
        partition: &InstrumentId,
        cancel: &CancellationToken,
    ) -> Result<Option<BatchOutcome>, TransportError> {
        let Some(batch) = self
            .transport_call(self.transport.poll(partition, self.settings.batch_size))
            .await?
        else {
            return Ok(None);
        };

        let outcome = self.consumer.process(&batch, cancel).await;

        if outcome.acked_through > batch.cursor() {
            self.transport_call(self.transport.acknowledge(partition, outcome.acked_through))
                .await?;
        }
        if outcome.stalled {
            self.transport_call(self.transport.redeliver_from(partition, outcome.acked_through))
                .await?;
        }

        tracing::info!(
            partition = %partition,
            cursor = %batch.cursor(),
            records = batch.len(),
            applied = outcome.applied,
            skipped = outcome.skipped(),
            dropped = outcome.dropped,
            rounds = outcome.rounds,
            stalled = outcome.stalled,
            "Processed batch"
        );
        Ok(Some(outcome))
    }

    /// Process everything currently available on every partition once.
    ///
    /// A partition stops at its first stalled batch.
    pub async fn drain_once(&self) -> Result<Vec<BatchOutcome>, TransportError> {
        let cancel = CancellationToken::new();
        let mut outcomes = Vec::new();

        for partition in self.transport_call(self.transport.partitions()).await? {
            self.resume(&partition).await?;
            while let Some(outcome) = self.step(&partition, &cancel).await? {
                let stalled = outcome.stalled;
                outcomes.push(outcome);
                if stalled {
                    break;
                }
            }
        }
        Ok(outcomes)
    }

    async fn transport_call<R>(
        &self,
        fut: impl Future<Output = Result<R, TransportError>>,
    ) -> Result<R, TransportError> {
        with_timeout(self.settings.operation_timeout, fut).await
    }
}

fn next_delay(backoff: &mut ExponentialBackoff, policy: &RetryPolicy) -> Duration {
    backoff.next_backoff().unwrap_or_else(|| {
        backoff.reset();
        policy.max_backoff
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::quote::NormalizedQuote;
    use crate::domain::shared::Timestamp;
    use crate::infrastructure::persistence::{FlakyPointStore, InMemoryPointStore};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn quote(secs: i64, bid: Decimal) -> NormalizedQuote {
        NormalizedQuote {
            instrument_id: InstrumentId::new("BTCUSD"),
            timestamp: Timestamp::from_unix_millis(secs * 1000).unwrap(),
            bid_price: bid,
            ask_price: bid + dec!(1),
        }
    }

    /// Batch of `n` points at t = 1..=n seconds; bids listed in `bad` are invalid.
    fn batch(n: usize, bad: &[usize]) -> IngestBatch {
        let points = (0..n)
            .map(|i| {
                let bid = if bad.contains(&i) { dec!(-1) } else { dec!(100) };
                quote(i as i64 + 1, bid).into_point(i as u64 + 1)
            })
            .collect();
        IngestBatch::new(InstrumentId::new("BTCUSD"), BatchCursor::new(0), points)
    }

    fn consumer<S: PointStorePort>(store: Arc<S>, budget: u32) -> BisectingConsumer<S> {
        BisectingConsumer::new(
            store,
            QuoteRules::default(),
            RetryPolicy::immediate(3, budget),
            Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn consume_applies_valid_batch() {
        let store = Arc::new(InMemoryPointStore::new());
        let result = consumer(Arc::clone(&store), 8).consume(&batch(5, &[])).await.unwrap();
        assert_eq!(result, ConsumeResult::Applied(5));
        assert_eq!(store.len(), 5);
    }

    #[tokio::test]
    async fn consume_stops_at_first_invalid_point() {
        let store = Arc::new(InMemoryPointStore::new());
        let result = consumer(Arc::clone(&store), 8).consume(&batch(5, &[2])).await.unwrap();
        assert!(matches!(
            result,
            ConsumeResult::PartialFailure {
                failed_at_index: 2,
                error: ValidationError::PriceOutOfRange { .. }
            }
        ));
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn consume_empty_batch_is_applied_zero() {
        let store = Arc::new(InMemoryPointStore::new());
        let empty = IngestBatch::new(InstrumentId::new("BTCUSD"), BatchCursor::new(0), vec![]);
        let result = consumer(store, 8).consume(&empty).await.unwrap();
        assert_eq!(result, ConsumeResult::Applied(0));
    }

    #[tokio::test]
    async fn consume_surfaces_store_outage() {
        let store = Arc::new(FlakyPointStore::new(InMemoryPointStore::new()));
        store.fail_next_appends(1);
        let err = consumer(Arc::clone(&store), 8).consume(&batch(3, &[])).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn process_skips_poison_pill() {
        let store = Arc::new(InMemoryPointStore::new());
        let outcome = consumer(Arc::clone(&store), 8)
            .process(&batch(10, &[4]), &CancellationToken::new())
            .await;

        assert_eq!(outcome.applied, 9);
        assert_eq!(outcome.terminal_failures.len(), 1);
        assert_eq!(outcome.skipped(), 1);
        assert_eq!(outcome.acked_through, BatchCursor::new(10));
        assert_eq!(
            outcome.terminal_failures[0].context_value("cursor"),
            Some("4")
        );
        assert!(!outcome.stalled);
        assert_eq!(store.len(), 9);
    }

    #[tokio::test]
    async fn process_drops_remainder_when_budget_spent() {
        let store = Arc::new(InMemoryPointStore::new());
        let outcome = consumer(Arc::clone(&store), 1)
            .process(&batch(8, &[0]), &CancellationToken::new())
            .await;

        // One split of [0, 8) into [0, 4) + [4, 8); [0, 4) fails again with no budget left.
        assert_eq!(outcome.rounds, 1);
        assert_eq!(outcome.dropped, 4);
        assert_eq!(outcome.applied, 4);
        assert_eq!(outcome.acked_through, BatchCursor::new(8));
        assert_eq!(
            outcome.terminal_failures[0].code(),
            ErrorCode::RetryBudgetExhausted
        );
    }

    #[tokio::test]
    async fn process_retries_transient_failure_whole() {
        let store = Arc::new(FlakyPointStore::new(InMemoryPointStore::new()));
        store.fail_next_appends(2);
        let outcome = consumer(Arc::clone(&store), 8)
            .process(&batch(6, &[]), &CancellationToken::new())
            .await;

        assert_eq!(outcome.applied, 6);
        assert_eq!(outcome.rounds, 0);
        assert!(outcome.terminal_failures.is_empty());
        assert_eq!(store.inner().len(), 6);
    }

    #[tokio::test]
    async fn process_stalls_when_store_stays_down() {
        let store = Arc::new(FlakyPointStore::new(InMemoryPointStore::new()));
        store.fail_next_appends(100);
        let outcome = consumer(Arc::clone(&store), 8)
            .process(&batch(4, &[]), &CancellationToken::new())
            .await;

        assert!(outcome.stalled);
        assert_eq!(outcome.applied, 0);
        assert_eq!(outcome.rounds, 0);
        assert_eq!(outcome.acked_through, BatchCursor::new(0));
        assert_eq!(outcome.terminal_failures[0].code(), ErrorCode::Transient);
    }

    #[tokio::test]
    async fn consume_reports_store_rejection_as_partial_failure() {
        let store = Arc::new(FlakyPointStore::new(InMemoryPointStore::new()));
        store.reject_sequence(2);
        let result = consumer(Arc::clone(&store), 8).consume(&batch(3, &[])).await.unwrap();
        assert!(matches!(
            result,
            ConsumeResult::PartialFailure {
                failed_at_index: 1,
                error: ValidationError::StoreRejected { .. }
            }
        ));
        assert_eq!(store.inner().len(), 1);
    }

    #[tokio::test]
    async fn process_skips_record_the_store_rejects() {
        let store = Arc::new(FlakyPointStore::new(InMemoryPointStore::new()));
        store.reject_sequence(5);
        let outcome = consumer(Arc::clone(&store), 8)
            .process(&batch(10, &[]), &CancellationToken::new())
            .await;

        assert!(!outcome.stalled);
        assert_eq!(outcome.applied, 9);
        assert_eq!(outcome.skipped(), 1);
        assert_eq!(outcome.acked_through, BatchCursor::new(10));
        assert_eq!(
            outcome.terminal_failures[0].context_value("cursor"),
            Some("4")
        );
        assert_eq!(store.inner().len(), 9);
    }

    #[tokio::test]
    async fn stalled_segment_acknowledges_its_written_prefix() {
        let store = Arc::new(FlakyPointStore::new(InMemoryPointStore::new()));
        store.fail_appends_from(4);
        let outcome = consumer(Arc::clone(&store), 8)
            .process(&batch(6, &[]), &CancellationToken::new())
            .await;

        assert!(outcome.stalled);
        assert_eq!(outcome.applied, 3);
        assert_eq!(outcome.acked_through, BatchCursor::new(3));
        assert_eq!(outcome.terminal_failures[0].code(), ErrorCode::Transient);
        assert_eq!(
            outcome.terminal_failures[0].context_value("resume_from"),
            Some("3")
        );
        assert_eq!(store.inner().len(), 3);
    }

    #[tokio::test]
    async fn redelivered_points_are_accepted() {
        let store = Arc::new(InMemoryPointStore::new());
        let consumer = consumer(Arc::clone(&store), 8);
        let cancel = CancellationToken::new();

        let first = consumer.process(&batch(20, &[]), &cancel).await;
        assert_eq!(first.applied, 20);

        // Same records again: the store is already ahead by 19 seconds.
        let replay = consumer.process(&batch(20, &[]), &cancel).await;
        assert_eq!(replay.applied, 20);
        assert!(replay.terminal_failures.is_empty());
        assert_eq!(store.len(), 20);
    }
}
