//! Aggregate Quotes Use Case
//!
//! One aggregation run: every instrument in the point store is an independent
//! unit of work. Each unit fetches at most `max(windows)` points once,
//! computes every window from that fetch and writes one record to the output
//! sink. A failing instrument is reported and never aborts its siblings.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{OutputSinkPort, PointStorePort, ScanOrder, SinkError, StoreError};
use crate::domain::aggregation::{AggregateRecord, AsOfMode, SumOverflow, WindowSpec};
use crate::domain::quote::PriceField;
use crate::domain::shared::{InstrumentId, Timestamp};
use crate::error::{ErrorCode, PipelineError};
use crate::observability::{
    record_aggregation_failure, record_aggregation_record, record_aggregation_run,
};
use crate::resilience::{RetryError, RetryPolicy, retry_transient, with_timeout};

/// Aggregation settings.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationSettings {
    /// Window lengths in points.
    pub windows: WindowSpec,
    /// Price side averaged.
    pub field: PriceField,
    /// How far back before the trigger points are considered.
    pub lookback: Duration,
    /// Instruments aggregated at once.
    pub concurrency: usize,
    /// How `as_of` is chosen.
    pub as_of_mode: AsOfMode,
    /// Deadline for each store scan and sink write.
    pub operation_timeout: Duration,
}

impl Default for AggregationSettings {
    fn default() -> Self {
        Self {
            windows: WindowSpec::default(),
            field: PriceField::Bid,
            lookback: Duration::from_secs(168 * 3600),
            concurrency: 8,
            as_of_mode: AsOfMode::TriggerTime,
            operation_timeout: Duration::from_secs(5),
        }
    }
}

/// Failure aggregating one instrument.
#[derive(Debug, Error)]
pub enum AggregationError {
    /// Scanning the point store failed.
    #[error("Point store scan failed: {0}")]
    Store(RetryError<StoreError>),

    /// Writing the record failed.
    #[error("Output sink write failed: {0}")]
    Sink(RetryError<SinkError>),

    /// Prices summed out of decimal range.
    #[error(transparent)]
    Overflow(#[from] SumOverflow),

    /// Shutdown requested before the record was written.
    #[error("Aggregation cancelled before write")]
    Cancelled,
}

impl AggregationError {
    /// Classify the error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Store(RetryError::Exhausted { .. }) | Self::Sink(RetryError::Exhausted { .. }) => {
                ErrorCode::RetryBudgetExhausted
            }
            Self::Store(_) | Self::Sink(_) | Self::Cancelled => ErrorCode::Transient,
            Self::Overflow(_) => ErrorCode::Internal,
        }
    }
}

/// Result of one aggregation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationReport {
    /// Trigger the run was computed for.
    pub as_of_trigger: Timestamp,
    /// Records written, sorted by instrument.
    pub records: Vec<AggregateRecord>,
    /// Instruments with no points in the lookback window.
    pub empty_instruments: Vec<InstrumentId>,
    /// Instruments that could not be aggregated.
    pub failures: Vec<PipelineError>,
}

impl AggregationReport {
    fn empty(trigger: Timestamp) -> Self {
        Self {
            as_of_trigger: trigger,
            records: Vec::new(),
            empty_instruments: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Check if every instrument was aggregated.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Record for an instrument, if one was written.
    #[must_use]
    pub fn record(&self, instrument_id: &InstrumentId) -> Option<&AggregateRecord> {
        self.records.iter().find(|r| &r.instrument_id == instrument_id)
    }
}

/// Use case for computing SMA records for every instrument.
pub struct AggregateQuotesUseCase<S, O>
where
    S: PointStorePort,
    O: OutputSinkPort,
{
    store: Arc<S>,
    sink: Arc<O>,
    settings: AggregationSettings,
    policy: RetryPolicy,
}

impl<S, O> AggregateQuotesUseCase<S, O>
where
    S: PointStorePort,
    O: OutputSinkPort,
{
    /// Create a new AggregateQuotesUseCase.
    pub const fn new(
        store: Arc<S>,
        sink: Arc<O>,
        settings: AggregationSettings,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            store,
            sink,
            settings,
            policy,
        }
    }

    /// Aggregate every instrument as of `trigger`.
    ///
    /// Running again with the same trigger over an unchanged store writes
    /// identical records under the same keys.
    pub async fn run(&self, trigger: Timestamp, cancel: &CancellationToken) -> AggregationReport {
        let started = Instant::now();
        let mut report = AggregationReport::empty(trigger);

        let instruments = match retry_transient(&self.policy, "point_store.instruments", cancel, || {
            with_timeout(self.settings.operation_timeout, self.store.instruments())
        })
        .await
        {
            Ok(instruments) => instruments,
            Err(e) => {
                tracing::error!(error = %e, "Failed to list instruments");
                report.failures.push(
                    PipelineError::new(ErrorCode::Transient, e.to_string())
                        .with_context("trigger", trigger),
                );
                return report;
            }
        };

        let mut results: Vec<_> = stream::iter(instruments)
            .map(|instrument_id| async move {
                let result = self.aggregate_instrument(&instrument_id, trigger, cancel).await;
                (instrument_id, result)
            })
            .buffer_unordered(self.settings.concurrency.max(1))
            .collect()
            .await;
        results.sort_by(|a, b| a.0.cmp(&b.0));

        for (instrument_id, result) in results {
            match result {
                Ok(Some(record)) => {
                    record_aggregation_record(&instrument_id);
                    report.records.push(record);
                }
                Ok(None) => report.empty_instruments.push(instrument_id),
                Err(e) => {
                    tracing::warn!(
                        instrument = %instrument_id,
                        code = e.code().reason(),
                        error = %e,
                        "Instrument aggregation failed"
                    );
                    record_aggregation_failure(&instrument_id, e.code());
                    report.failures.push(
                        PipelineError::new(e.code(), e.to_string())
                            .with_context("instrument", &instrument_id)
                            .with_context("trigger", trigger),
                    );
                }
            }
        }

        record_aggregation_run(started.elapsed());
        tracing::info!(
            trigger = %trigger,
            records = report.records.len(),
            empty = report.empty_instruments.len(),
            failures = report.failures.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Aggregation run complete"
        );
        report
    }

    /// Compute and write the record for one instrument.
    ///
    /// Returns `Ok(None)` when the instrument has no points in the lookback window.
    pub async fn aggregate_instrument(
        &self,
        instrument_id: &InstrumentId,
        trigger: Timestamp,
        cancel: &CancellationToken,
    ) -> Result<Option<AggregateRecord>, AggregationError> {
        let from = trigger.saturating_sub(self.settings.lookback);
        let limit = self.settings.windows.max_window();

        let points = retry_transient(&self.policy, "point_store.range_scan", cancel, || {
            with_timeout(
                self.settings.operation_timeout,
                self.store
                    .range_scan(instrument_id, from, trigger, limit, ScanOrder::Descending),
            )
        })
        .await
        .map_err(AggregationError::Store)?;

        let Some(record) = AggregateRecord::from_points(
            instrument_id,
            trigger,
            self.settings.as_of_mode,
            &points,
            &self.settings.windows,
            self.settings.field,
        )?
        else {
            tracing::debug!(instrument = %instrument_id, "No points in lookback window");
            return Ok(None);
        };

        if cancel.is_cancelled() {
            return Err(AggregationError::Cancelled);
        }

        let (date, hour) = (record.as_of.date(), record.as_of.hour());
        retry_transient(&self.policy, "output_sink.write", cancel, || {
            with_timeout(
                self.settings.operation_timeout,
                self.sink.write_partition(instrument_id, date, hour, &record),
            )
        })
        .await
        .map_err(AggregationError::Sink)?;

        Ok(Some(record))
    }
}
