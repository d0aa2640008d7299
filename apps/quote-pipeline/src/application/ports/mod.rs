//! Application Ports (Driven)
//!
//! Ports define interfaces for the external systems the pipeline depends on:
//! the point store, the stream transport, the output sink, the upstream quote
//! provider and the secret source.

mod output_sink_port;
mod point_store_port;
mod secret_source_port;
mod stream_transport_port;
mod upstream_quote_port;

pub use output_sink_port::{OutputSinkPort, PartitionGranularity, SinkError};
pub use point_store_port::{PointStorePort, ScanOrder, StoreError};
pub use secret_source_port::{Secret, SecretError, SecretSourcePort};
pub use stream_transport_port::{StreamTransportPort, TransportError};
pub use upstream_quote_port::{UpstreamError, UpstreamQuotePort};
