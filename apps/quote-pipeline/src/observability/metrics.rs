//! Prometheus metrics for the quote pipeline.
//!
//! Covers ingestion, batch consumption (applied points, bisection rounds,
//! skipped and dropped records), transient retries and aggregation runs.
//!
//! # Example
//!
//! ```ignore
//! use quote_pipeline::observability::{init_metrics, MetricsConfig};
//!
//! init_metrics(&MetricsConfig::default())?;
//! record_points_applied(&InstrumentId::new("BTCUSD"), 42);
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::domain::shared::{InstrumentId, ValidationError};
use crate::error::ErrorCode;

/// Configuration for the metrics exporter.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Address to bind the metrics HTTP listener.
    pub listen_addr: SocketAddr,
    /// Histogram buckets for run durations (in seconds).
    pub duration_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 9090)),
            // 1ms to 60s
            duration_buckets: vec![
                0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
            ],
        }
    }
}

impl MetricsConfig {
    /// Create a new metrics configuration with custom address.
    #[must_use]
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            listen_addr: addr,
            ..Default::default()
        }
    }
}

/// Initialize the Prometheus metrics exporter.
///
/// This starts an HTTP server that exposes metrics at `/metrics`.
///
/// # Errors
///
/// Returns an error if the exporter fails to start (e.g., port already in use).
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    PrometheusBuilder::new()
        .with_http_listener(config.listen_addr)
        .set_buckets(&config.duration_buckets)
        .map_err(|e| MetricsError::Configuration(e.to_string()))?
        .install()
        .map_err(|e| MetricsError::Installation(e.to_string()))?;

    tracing::info!(
        addr = %config.listen_addr,
        "Prometheus metrics exporter started"
    );

    Ok(())
}

/// Error type for metrics operations.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Failed to configure metrics exporter.
    #[error("metrics configuration error: {0}")]
    Configuration(String),
    /// Failed to install metrics exporter.
    #[error("metrics installation error: {0}")]
    Installation(String),
}

// ============================================================================
// Ingestion Metrics
// ============================================================================

/// Record one upstream payload handled by the ingest path.
///
/// # Arguments
///
/// * `outcome` - `"published"`, `"malformed"`, `"rejected"` or `"failed"`
pub fn record_quote_ingested(outcome: &str) {
    counter!("quotes_ingested_total", "outcome" => outcome.to_string()).increment(1);
}

// ============================================================================
// Consumer Metrics
// ============================================================================

/// Record points written to the point store for one batch.
pub fn record_points_applied(partition: &InstrumentId, count: usize) {
    counter!("points_applied_total", "partition" => partition.to_string())
        .increment(count as u64);
}

/// Record how many bisection rounds a batch needed.
pub fn record_bisection_rounds(partition: &InstrumentId, rounds: u32) {
    histogram!("bisection_rounds", "partition" => partition.to_string())
        .record(f64::from(rounds));
}

/// Record a single invalid record skipped by the consumer.
pub fn record_record_rejected(partition: &InstrumentId, error: &ValidationError) {
    counter!(
        "records_rejected_total",
        "partition" => partition.to_string(),
        "reason" => error.reason()
    )
    .increment(1);
}

/// Record records dropped after the bisection budget ran out.
pub fn record_batch_dropped(partition: &InstrumentId, records: usize) {
    counter!("records_dropped_total", "partition" => partition.to_string())
        .increment(records as u64);
}

/// Record one transient failure that will be retried.
///
/// # Arguments
///
/// * `operation` - Port call being retried (e.g., `"point_store.write"`)
pub fn record_transient_retry(operation: &str) {
    counter!("transient_retries_total", "operation" => operation.to_string()).increment(1);
}

// ============================================================================
// Aggregation Metrics
// ============================================================================

/// Record one aggregate record written.
pub fn record_aggregation_record(instrument_id: &InstrumentId) {
    counter!(
        "aggregation_records_total",
        "instrument" => instrument_id.to_string()
    )
    .increment(1);
}

/// Record an instrument whose aggregation failed.
pub fn record_aggregation_failure(instrument_id: &InstrumentId, code: ErrorCode) {
    counter!(
        "aggregation_failures_total",
        "instrument" => instrument_id.to_string(),
        "code" => code.reason()
    )
    .increment(1);
}

/// Record the wall time of a full aggregation run.
pub fn record_aggregation_run(elapsed: Duration) {
    counter!("aggregation_runs_total").increment(1);
    histogram!("aggregation_run_seconds").record(elapsed.as_secs_f64());
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MetricsConfig::default();
        assert_eq!(config.listen_addr.port(), 9090);
        assert!(config.duration_buckets.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_config_with_addr() {
        let addr: SocketAddr = "127.0.0.1:8080".parse().unwrap();
        let config = MetricsConfig::with_addr(addr);
        assert_eq!(config.listen_addr.port(), 8080);
    }

    // Recording without an installed recorder is a no-op and must not panic.
    #[test]
    fn test_recorders_without_exporter() {
        let btc = InstrumentId::new("BTCUSD");
        record_quote_ingested("published");
        record_points_applied(&btc, 10);
        record_bisection_rounds(&btc, 3);
        record_record_rejected(&btc, &ValidationError::missing("bid_price"));
        record_batch_dropped(&btc, 4);
        record_transient_retry("point_store.write");
        record_aggregation_record(&btc);
        record_aggregation_failure(&btc, ErrorCode::Transient);
        record_aggregation_run(Duration::from_millis(12));
    }
}
