// Allow unwrap/expect in tests - tests should panic on unexpected errors
// Allow test-specific patterns and pedantic lints in test code
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Quote Pipeline - Rust Core Library
//!
//! Streaming quote ingestion with bisecting partial-batch recovery and
//! periodic multi-window SMA aggregation.
//!
//! # Architecture (Clean Architecture + Hexagonal)
//!
//! ## Layers (inside → outside)
//!
//! - **Domain**: Value objects and pure algorithms
//!   - `shared`: Instrument ids, timestamps, validation errors
//!   - `quote`: Raw payload normalization, quote points, validation rules
//!   - `ingest`: Batches, cursors, the bisection state machine
//!   - `aggregation`: Window sets, SMA computation, aggregate records
//!
//! - **Application**: Use cases and orchestration
//!   - `ports`: `PointStorePort`, `StreamTransportPort`, `OutputSinkPort`,
//!     `UpstreamQuotePort`, `SecretSourcePort`
//!   - `use_cases`: `IngestQuotes`, `ConsumeStream`, `AggregateQuotes`
//!   - `services`: Credential cache
//!
//! - **Infrastructure**: Adapters (implementations)
//!   - `persistence`: In-memory point store
//!   - `transport`: In-memory partitioned stream
//!   - `sink`: Arrow IPC and in-memory output sinks
//!   - `upstream`: HTTP and mock exchange-rate providers
//!   - `source`: JSON-lines reader and upstream poller
//!   - `secrets`: Environment variable secret source
//!
//! # Delivery
//!
//! The consumer writes to the point store before it acknowledges a cursor,
//! so delivery is at least once. Writes are idempotent on
//! `(instrument, timestamp)`, which makes redelivery harmless.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Clean Architecture Layers
// =============================================================================

/// Domain layer - Core business logic with no external dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Cross-cutting Modules
// =============================================================================

/// YAML configuration loading.
pub mod config;

/// Error codes shared across layers.
pub mod error;

/// Metrics and logging.
pub mod observability;

/// Backoff and retry for transient failures.
pub mod resilience;

/// Periodic aggregation trigger.
pub mod scheduler;

// =============================================================================
// Re-exports
// =============================================================================

// Domain re-exports
pub use domain::aggregation::{AggregateRecord, AsOfMode, SmaValue, WindowSpec};
pub use domain::ingest::{BatchCursor, ConsumeResult, IngestBatch};
pub use domain::quote::{NormalizedQuote, PriceField, QuotePoint, QuoteRules, RawQuote};
pub use domain::shared::{InstrumentId, Timestamp, ValidationError};

// Application re-exports
pub use application::ports::{OutputSinkPort, PointStorePort, StreamTransportPort};
pub use application::use_cases::{
    AggregateQuotesUseCase, AggregationReport, BisectingConsumer, ConsumeStreamUseCase,
    IngestQuotesUseCase,
};

// Infrastructure re-exports
pub use infrastructure::persistence::InMemoryPointStore;
pub use infrastructure::sink::{ArrowIpcSink, InMemoryOutputSink};
pub use infrastructure::transport::InMemoryStreamTransport;

pub use error::{ErrorCode, PipelineError};
pub use scheduler::AggregationScheduler;
