//! Upstream Quote Adapters

mod http;
mod mock;

pub use http::{HttpUpstreamConfig, HttpUpstreamQuotes};
pub use mock::MockUpstreamQuotes;
