//! Aggregation Context
//!
//! Window sets, nested SMA computation and the records they produce.

mod record;
mod sma;
mod window_spec;

pub use record::{AggregateRecord, AsOfMode};
pub use sma::{SmaValue, SumOverflow, compute_sma};
pub use window_spec::WindowSpec;
