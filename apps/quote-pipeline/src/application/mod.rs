//! Application Layer
//!
//! The application layer orchestrates domain logic through use cases.
//! It defines:
//!
//! - **Ports**: Interfaces for the point store, stream transport, output sink,
//!   upstream quote provider and secret source
//! - **Use Cases**: Ingestion, bisecting stream consumption and aggregation
//! - **Services**: Shared state such as the credential cache

pub mod ports;
pub mod services;
pub mod use_cases;

pub use ports::*;
pub use services::*;
pub use use_cases::*;
