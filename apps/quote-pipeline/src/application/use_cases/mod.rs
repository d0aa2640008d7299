//! Application Use Cases
//!
//! Use cases orchestrate domain logic to fulfill application requirements.

mod aggregate_quotes;
mod consume_stream;
mod ingest_quotes;

pub use aggregate_quotes::{
    AggregateQuotesUseCase, AggregationError, AggregationReport, AggregationSettings,
};
pub use consume_stream::{BatchOutcome, BisectingConsumer, ConsumeStreamUseCase, ConsumerSettings};
pub use ingest_quotes::{IngestError, IngestQuotesUseCase};
