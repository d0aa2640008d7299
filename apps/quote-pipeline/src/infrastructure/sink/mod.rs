//! Output Sink Adapters

mod arrow_ipc;
mod in_memory;

pub use arrow_ipc::{ArrowIpcSink, record_batch, record_schema};
pub use in_memory::{InMemoryOutputSink, StoredRecord};
