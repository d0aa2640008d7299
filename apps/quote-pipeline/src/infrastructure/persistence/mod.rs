//! Persistence Adapters
//!
//! Point store implementations.

mod flaky;
pub mod in_memory;

pub use flaky::FlakyPointStore;
pub use in_memory::InMemoryPointStore;
