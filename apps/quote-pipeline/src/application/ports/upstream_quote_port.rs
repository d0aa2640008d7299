//! Upstream Quote Port (Driven Port)
//!
//! Exchange-rate lookups against the upstream quote provider.

use async_trait::async_trait;

use crate::domain::quote::RawQuote;

/// Upstream provider error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpstreamError {
    /// Provider unreachable.
    #[error("Upstream unavailable: {message}")]
    Unavailable {
        /// Error details.
        message: String,
    },

    /// Call quota exceeded.
    #[error("Upstream rate limit exceeded")]
    RateLimited,

    /// API key rejected.
    #[error("Upstream rejected the API key")]
    Unauthorized,

    /// Response body was not a quote.
    #[error("Unexpected upstream response: {message}")]
    UnexpectedResponse {
        /// Error details.
        message: String,
    },
}

/// Port for the upstream quote provider.
#[async_trait]
pub trait UpstreamQuotePort: Send + Sync {
    /// Fetch the current exchange rate from `from` to `to`.
    async fn fetch_exchange_rate(
        &self,
        from: &str,
        to: &str,
        api_key: &str,
    ) -> Result<RawQuote, UpstreamError>;
}
