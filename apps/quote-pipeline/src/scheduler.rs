//! Periodic trigger for the aggregation engine.
//!
//! Triggers are truncated to the cadence boundary, so two runs inside one
//! period compute and overwrite the same record keys.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::application::ports::{OutputSinkPort, PointStorePort};
use crate::application::use_cases::{AggregateQuotesUseCase, AggregationReport};
use crate::domain::shared::Timestamp;

/// Runs an aggregation once per cadence period.
pub struct AggregationScheduler<S, O>
where
    S: PointStorePort,
    O: OutputSinkPort,
{
    use_case: Arc<AggregateQuotesUseCase<S, O>>,
    cadence: Duration,
    run_on_start: bool,
}

impl<S, O> AggregationScheduler<S, O>
where
    S: PointStorePort,
    O: OutputSinkPort,
{
    /// Create a scheduler. A zero cadence is treated as one second.
    pub fn new(use_case: Arc<AggregateQuotesUseCase<S, O>>, cadence: Duration) -> Self {
        Self {
            use_case,
            cadence: cadence.max(Duration::from_secs(1)),
            run_on_start: false,
        }
    }

    /// Also run immediately when `run` starts.
    #[must_use]
    pub const fn with_run_on_start(mut self, run_on_start: bool) -> Self {
        self.run_on_start = run_on_start;
        self
    }

    /// Trigger time for a run started at `now`.
    #[must_use]
    pub fn trigger_for(&self, now: Timestamp) -> Timestamp {
        now.truncate_to(self.cadence)
    }

    /// Time left until the next cadence boundary after `now`.
    #[must_use]
    pub fn until_next_boundary(&self, now: Timestamp) -> Duration {
        let cadence_ms = i64::try_from(self.cadence.as_millis()).unwrap_or(i64::MAX);
        let into_period = now.unix_millis().rem_euclid(cadence_ms);
        Duration::from_millis(u64::try_from(cadence_ms - into_period).unwrap_or(0))
    }

    /// Run one aggregation for the period containing `now`.
    pub async fn run_once(&self, now: Timestamp, cancel: &CancellationToken) -> AggregationReport {
        let trigger = self.trigger_for(now);
        self.use_case.run(trigger, cancel).await
    }

    /// Tick on every cadence boundary until cancelled.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            cadence_secs = self.cadence.as_secs(),
            run_on_start = self.run_on_start,
            "Aggregation scheduler started"
        );

        if self.run_on_start {
            self.run_once(Timestamp::now(), &cancel).await;
        }

        loop {
            let delay = self.until_next_boundary(Timestamp::now());
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
            self.run_once(Timestamp::now(), &cancel).await;
        }

        tracing::info!("Aggregation scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::use_cases::AggregationSettings;
    use crate::domain::aggregation::WindowSpec;
    use crate::domain::quote::QuotePoint;
    use crate::domain::shared::InstrumentId;
    use crate::infrastructure::persistence::InMemoryPointStore;
    use crate::infrastructure::sink::InMemoryOutputSink;
    use crate::resilience::RetryPolicy;
    use rust_decimal_macros::dec;

    fn ts(s: &str) -> Timestamp {
        Timestamp::parse(s).unwrap()
    }

    async fn scheduler(
        cadence: Duration,
    ) -> (
        AggregationScheduler<InMemoryPointStore, InMemoryOutputSink>,
        Arc<InMemoryOutputSink>,
    ) {
        let store = Arc::new(InMemoryPointStore::new());
        for (i, minute) in ["00", "10", "20"].iter().enumerate() {
            store
                .append(&QuotePoint {
                    instrument_id: InstrumentId::new("BTCUSD"),
                    timestamp: ts(&format!("2024-05-01T09:{minute}:00Z")),
                    bid_price: dec!(10) * rust_decimal::Decimal::from(i + 1),
                    ask_price: dec!(100),
                    source_sequence: i as u64 + 1,
                })
                .await
                .unwrap();
        }
        let sink = Arc::new(InMemoryOutputSink::new());
        let settings = AggregationSettings {
            windows: WindowSpec::new([2, 5]).unwrap(),
            // Long enough that wall-clock triggers still see the fixture points.
            lookback: Duration::from_secs(100 * 365 * 86_400),
            ..AggregationSettings::default()
        };
        let use_case = Arc::new(AggregateQuotesUseCase::new(
            store,
            Arc::clone(&sink),
            settings,
            RetryPolicy::immediate(1, 8),
        ));
        (AggregationScheduler::new(use_case, cadence), sink)
    }

    #[tokio::test]
    async fn trigger_truncates_to_cadence() {
        let (scheduler, _) = scheduler(Duration::from_secs(3600)).await;
        assert_eq!(
            scheduler.trigger_for(ts("2024-05-01T10:42:17Z")),
            ts("2024-05-01T10:00:00Z")
        );
        assert_eq!(
            scheduler.until_next_boundary(ts("2024-05-01T10:45:00Z")),
            Duration::from_secs(15 * 60)
        );
        assert_eq!(
            scheduler.until_next_boundary(ts("2024-05-01T10:00:00Z")),
            Duration::from_secs(3600)
        );
    }

    #[tokio::test]
    async fn double_trigger_in_one_period_rewrites_same_key() {
        let (scheduler, sink) = scheduler(Duration::from_secs(3600)).await;
        let cancel = CancellationToken::new();

        let first = scheduler.run_once(ts("2024-05-01T10:05:00Z"), &cancel).await;
        let second = scheduler.run_once(ts("2024-05-01T10:55:00Z"), &cancel).await;

        assert!(first.is_success());
        assert_eq!(first.records, second.records);
        assert_eq!(sink.len(), 1);

        let record = &first.records[0];
        assert_eq!(record.as_of, ts("2024-05-01T10:00:00Z"));
        assert_eq!(record.bid_price, dec!(30));
    }

    #[tokio::test]
    async fn run_on_start_then_stops_on_cancel() {
        let (scheduler, sink) = scheduler(Duration::from_secs(3600)).await;
        let scheduler = Arc::new(scheduler.with_run_on_start(true));
        let cancel = CancellationToken::new();

        let handle = tokio::spawn({
            let scheduler = Arc::clone(&scheduler);
            let cancel = cancel.clone();
            async move { scheduler.run(cancel).await }
        });

        tokio::time::timeout(Duration::from_secs(5), async {
            while sink.is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("first run should write a record");

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("scheduler should stop")
            .unwrap();
        assert_eq!(sink.len(), 1);
    }
}
