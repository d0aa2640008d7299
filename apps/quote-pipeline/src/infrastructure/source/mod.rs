//! Quote Source Adapters (Driver)

mod json_lines;
mod upstream_poller;

pub use json_lines::{IngestStats, ingest_json_lines};
pub use upstream_poller::poll_upstream;
