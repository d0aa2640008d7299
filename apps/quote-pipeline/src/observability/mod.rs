//! Observability module for metrics and logging.
//!
//! Prometheus metrics export plus the structured logging subscriber.

mod metrics;
mod logging;

pub use metrics::{
    MetricsConfig, MetricsError, init_metrics, record_aggregation_failure,
    record_aggregation_record, record_aggregation_run, record_batch_dropped,
    record_bisection_rounds, record_points_applied, record_quote_ingested,
    record_record_rejected, record_transient_retry,
};
pub use logging::{LogFormat, TracingConfig, TracingError, init_tracing};
