//! Periodic upstream exchange-rate polling.

use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::json_lines::IngestStats;
use crate::application::ports::StreamTransportPort;
use crate::application::use_cases::{IngestError, IngestQuotesUseCase};
use crate::observability::record_quote_ingested;

/// Fetch every pair once per `interval` until cancelled.
///
/// Failures are logged and counted; a pair that fails is tried again on the
/// next tick.
pub async fn poll_upstream<T>(
    ingest: &IngestQuotesUseCase<T>,
    pairs: &[(String, String)],
    interval: Duration,
    cancel: &CancellationToken,
) -> IngestStats
where
    T: StreamTransportPort,
{
    let mut stats = IngestStats::default();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        for (from, to) in pairs {
            if cancel.is_cancelled() {
                break;
            }
            let outcome = match ingest.fetch_and_publish(from, to).await {
                Ok(point) => {
                    tracing::debug!(
                        instrument = %point.instrument_id,
                        sequence = point.source_sequence,
                        "Published upstream quote"
                    );
                    stats.published += 1;
                    "published"
                }
                Err(IngestError::Validation(e)) => {
                    tracing::warn!(from = %from, to = %to, error = %e, "Rejected upstream quote");
                    stats.rejected += 1;
                    "rejected"
                }
                Err(e) => {
                    tracing::warn!(from = %from, to = %to, error = %e, code = ?e.code(), "Upstream fetch failed");
                    stats.failed += 1;
                    "failed"
                }
            };
            record_quote_ingested(outcome);
        }
    }

    stats
}
