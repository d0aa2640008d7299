//! Ingest Context
//!
//! Batches delivered by the stream transport, their cursors, and the
//! bisection bookkeeping used to isolate failing records.

mod batch;
mod bisection;

pub use batch::{BatchCursor, ConsumeResult, IngestBatch};
pub use bisection::{BisectionState, FailureAction, Segment, rounds_to_isolate};
