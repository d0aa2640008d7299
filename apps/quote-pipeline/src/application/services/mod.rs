//! Application Services
//!
//! Long-lived state shared across use cases.

mod credential_cache;

pub use credential_cache::{CredentialCache, CredentialError};
