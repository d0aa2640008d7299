//! JSON-lines quote source.
//!
//! Reads one upstream payload per line (for example piped on stdin) and
//! ingests each one. Malformed lines and rejected quotes are counted and
//! logged; they never stop the reader.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;

use crate::application::ports::StreamTransportPort;
use crate::application::use_cases::{IngestError, IngestQuotesUseCase};
use crate::domain::quote::RawQuote;
use crate::observability::record_quote_ingested;

/// Counters for one pass over a source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Quotes published.
    pub published: usize,
    /// Lines that were not JSON objects.
    pub malformed: usize,
    /// Quotes rejected by validation.
    pub rejected: usize,
    /// Quotes that could not be published.
    pub failed: usize,
}

/// Ingest every line of `reader` until EOF or cancellation.
pub async fn ingest_json_lines<R, T>(
    reader: R,
    ingest: &IngestQuotesUseCase<T>,
    cancel: &CancellationToken,
) -> std::io::Result<IngestStats>
where
    R: AsyncBufRead + Unpin,
    T: StreamTransportPort,
{
    let mut lines = reader.lines();
    let mut stats = IngestStats::default();
    let mut line_no = 0usize;

    loop {
        let line = tokio::select! {
            () = cancel.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else { break };
        line_no += 1;

        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let raw: RawQuote = match serde_json::from_str(line) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(line = line_no, error = %e, "Skipping malformed quote line");
                stats.malformed += 1;
                record_quote_ingested("malformed");
                continue;
            }
        };

        let outcome = match ingest.ingest(&raw).await {
            Ok(_) => {
                stats.published += 1;
                "published"
            }
            Err(IngestError::Validation(e)) => {
                tracing::warn!(line = line_no, error = %e, "Rejected quote");
                stats.rejected += 1;
                "rejected"
            }
            Err(e) => {
                tracing::error!(line = line_no, error = %e, "Failed to publish quote");
                stats.failed += 1;
                "failed"
            }
        };
        record_quote_ingested(outcome);
    }

    Ok(stats)
}
