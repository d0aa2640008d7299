//! Stream Transport Adapters

mod in_memory;

pub use in_memory::InMemoryStreamTransport;
