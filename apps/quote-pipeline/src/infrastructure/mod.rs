//! Infrastructure Layer
//!
//! This module contains all adapters (implementations) for the ports defined
//! in the application layer. Following hexagonal architecture:
//!
//! - **Driven Adapters (Outbound)**: Implement ports for external systems
//!   - `persistence/`: Point store adapters
//!   - `transport/`: Stream transport adapters
//!   - `sink/`: Output sink adapters (Arrow IPC)
//!   - `secrets/`: Secret source adapters
//!   - `upstream/`: Upstream quote provider adapters
//!
//! - **Driver Adapters (Inbound)**: Feed the application
//!   - `source/`: JSON-lines quote reader and upstream poller

pub mod persistence;
pub mod secrets;
pub mod sink;
pub mod source;
pub mod transport;
pub mod upstream;
