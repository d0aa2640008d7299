//! Resilience patterns for external service calls.
//!
//! Exponential backoff with jitter, and timeout-bounded retry of transient
//! point store, output sink and transport failures.

mod backoff;
mod retry;

pub use backoff::{ExponentialBackoff, RetryPolicy};
pub use retry::{RetryError, TransientError, retry_transient, with_timeout};
