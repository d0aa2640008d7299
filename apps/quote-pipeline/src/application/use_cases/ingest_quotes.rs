//! Ingest Quotes Use Case
//!
//! Normalizes upstream quotes and publishes them on their instrument's
//! partition of the stream transport.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{
    SecretSourcePort, StreamTransportPort, TransportError, UpstreamError, UpstreamQuotePort,
};
use crate::application::services::{CredentialCache, CredentialError};
use crate::domain::quote::{NormalizedQuote, QuotePoint, QuoteRules, RawQuote, normalize};
use crate::domain::shared::ValidationError;
use crate::error::ErrorCode;
use crate::resilience::{RetryError, RetryPolicy, retry_transient, with_timeout};

/// Ingest error.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The quote failed normalization or validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Publishing failed.
    #[error("Failed to publish quote: {0}")]
    Transport(#[from] RetryError<TransportError>),

    /// The upstream provider failed.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// The API key could not be obtained.
    #[error(transparent)]
    Credentials(#[from] CredentialError),

    /// `fetch_and_publish` was called without an upstream provider.
    #[error("No upstream quote provider configured")]
    UpstreamNotConfigured,
}

impl IngestError {
    /// Classify the error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Validation(_) => ErrorCode::DataValidation,
            Self::Transport(_) | Self::Upstream(_) => ErrorCode::Transient,
            Self::Credentials(_) | Self::UpstreamNotConfigured => ErrorCode::Configuration,
        }
    }
}

struct Upstream {
    provider: Arc<dyn UpstreamQuotePort>,
    credentials: Arc<CredentialCache<dyn SecretSourcePort>>,
}

/// Use case for getting quotes onto the stream.
pub struct IngestQuotesUseCase<T>
where
    T: StreamTransportPort,
{
    transport: Arc<T>,
    rules: QuoteRules,
    policy: RetryPolicy,
    operation_timeout: Duration,
    upstream: Option<Upstream>,
}

impl<T> IngestQuotesUseCase<T>
where
    T: StreamTransportPort,
{
    /// Create a new IngestQuotesUseCase.
    pub const fn new(
        transport: Arc<T>,
        rules: QuoteRules,
        policy: RetryPolicy,
        operation_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            rules,
            policy,
            operation_timeout,
            upstream: None,
        }
    }

    /// Attach an upstream provider and the cache holding its API key.
    #[must_use]
    pub fn with_upstream(
        mut self,
        provider: Arc<dyn UpstreamQuotePort>,
        credentials: Arc<CredentialCache<dyn SecretSourcePort>>,
    ) -> Self {
        self.upstream = Some(Upstream {
            provider,
            credentials,
        });
        self
    }

    /// Normalize and validate a raw quote.
    pub fn normalize(&self, raw: &RawQuote) -> Result<NormalizedQuote, ValidationError> {
        normalize(raw, &self.rules)
    }

    /// Normalize a raw quote and publish it on its instrument's partition.
    pub async fn ingest(&self, raw: &RawQuote) -> Result<QuotePoint, IngestError> {
        let quote = self.normalize(raw)?;
        let partition = quote.instrument_id.clone();

        let point = retry_transient(
            &self.policy,
            "transport.publish",
            &CancellationToken::new(),
            || with_timeout(self.operation_timeout, self.transport.publish(&partition, quote.clone())),
        )
        .await?;

        tracing::debug!(
            instrument = %point.instrument_id,
            timestamp = %point.timestamp,
            sequence = point.source_sequence,
            "Published quote"
        );
        Ok(point)
    }

    /// Fetch the `from`/`to` exchange rate upstream and ingest it.
    ///
    /// A rejected API key is dropped from the cache so the next call refetches it.
    pub async fn fetch_and_publish(&self, from: &str, to: &str) -> Result<QuotePoint, IngestError> {
        let upstream = self.upstream.as_ref().ok_or(IngestError::UpstreamNotConfigured)?;
        let api_key = upstream.credentials.get().await?;

        let raw = match upstream
            .provider
            .fetch_exchange_rate(from, to, api_key.expose())
            .await
        {
            Ok(raw) => raw,
            Err(UpstreamError::Unauthorized) => {
                tracing::warn!(from, to, "Upstream rejected API key, invalidating cache");
                upstream.credentials.invalidate().await;
                return Err(UpstreamError::Unauthorized.into());
            }
            Err(e) => return Err(e.into()),
        };

        self.ingest(&raw).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{Secret, SecretError};
    use crate::domain::shared::{InstrumentId, SecretId};
    use crate::infrastructure::transport::InMemoryStreamTransport;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn use_case(transport: Arc<InMemoryStreamTransport>) -> IngestQuotesUseCase<InMemoryStreamTransport> {
        IngestQuotesUseCase::new(
            transport,
            QuoteRules::default(),
            RetryPolicy::immediate(2, 8),
            Duration::from_secs(1),
        )
    }

    fn raw(bid: &str) -> RawQuote {
        RawQuote::from_pairs([
            ("1. From_Currency Code", json!("BTC")),
            ("3. To_Currency Code", json!("USD")),
            ("5. Exchange Rate", json!("42000.50")),
            ("6. Last Refreshed", json!("2024-05-01 12:00:00")),
            ("7. Time Zone", json!("UTC")),
            ("8. Bid Price", json!(bid)),
            ("9. Ask Price", json!("42001.00")),
        ])
    }

    #[tokio::test]
    async fn ingest_publishes_on_instrument_partition() {
        let transport = Arc::new(InMemoryStreamTransport::new());
        let point = use_case(Arc::clone(&transport)).ingest(&raw("42000.00")).await.unwrap();

        assert_eq!(point.instrument_id, InstrumentId::new("BTCUSD"));
        assert_eq!(point.source_sequence, 1);
        assert_eq!(transport.len(&InstrumentId::new("BTCUSD")), 1);
    }

    #[tokio::test]
    async fn ingest_rejects_crossed_quote() {
        let transport = Arc::new(InMemoryStreamTransport::new());
        let err = use_case(Arc::clone(&transport)).ingest(&raw("42002.00")).await.unwrap_err();

        assert!(matches!(err, IngestError::Validation(ValidationError::CrossedQuote { .. })));
        assert_eq!(err.code(), ErrorCode::DataValidation);
        assert_eq!(transport.len(&InstrumentId::new("BTCUSD")), 0);
    }

    struct StaticKey;

    #[async_trait]
    impl SecretSourcePort for StaticKey {
        async fn fetch(&self, _secret_id: &SecretId) -> Result<Secret, SecretError> {
            Ok(Secret::new("demo-key", None))
        }
    }

    #[derive(Default)]
    struct MockUpstream {
        calls: AtomicUsize,
        reject_key: bool,
    }

    #[async_trait]
    impl UpstreamQuotePort for MockUpstream {
        async fn fetch_exchange_rate(
            &self,
            from: &str,
            to: &str,
            api_key: &str,
        ) -> Result<RawQuote, UpstreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.reject_key || api_key != "demo-key" {
                return Err(UpstreamError::Unauthorized);
            }
            Ok(RawQuote::from_pairs([
                ("from_currency_code", json!(from)),
                ("to_currency_code", json!(to)),
                ("exchange_rate", json!("3100.25")),
                ("last_refreshed", json!("2024-05-01T12:00:00Z")),
            ]))
        }
    }

    fn credentials() -> Arc<CredentialCache<dyn SecretSourcePort>> {
        let source: Arc<dyn SecretSourcePort> = Arc::new(StaticKey);
        Arc::new(CredentialCache::new(source, SecretId::new("upstream"), Duration::from_secs(60)))
    }

    #[tokio::test]
    async fn fetch_and_publish_uses_cached_key() {
        let transport = Arc::new(InMemoryStreamTransport::new());
        let upstream = Arc::new(MockUpstream::default());
        let use_case = use_case(Arc::clone(&transport))
            .with_upstream(Arc::clone(&upstream) as Arc<dyn UpstreamQuotePort>, credentials());

        let point = use_case.fetch_and_publish("eth", "usd").await.unwrap();
        assert_eq!(point.instrument_id, InstrumentId::new("ETHUSD"));
        assert_eq!(point.bid_price, rust_decimal_macros::dec!(3100.25));

        use_case.fetch_and_publish("eth", "usd").await.unwrap();
        assert_eq!(upstream.calls.load(Ordering::SeqCst), 2);
        assert_eq!(transport.len(&InstrumentId::new("ETHUSD")), 2);
    }

    #[tokio::test]
    async fn fetch_and_publish_reports_rejected_key() {
        let transport = Arc::new(InMemoryStreamTransport::new());
        let upstream = Arc::new(MockUpstream {
            reject_key: true,
            ..MockUpstream::default()
        });
        let use_case = use_case(transport).with_upstream(upstream, credentials());

        let err = use_case.fetch_and_publish("eth", "usd").await.unwrap_err();
        assert!(matches!(err, IngestError::Upstream(UpstreamError::Unauthorized)));
    }

    #[tokio::test]
    async fn fetch_without_upstream_is_configuration_error() {
        let transport = Arc::new(InMemoryStreamTransport::new());
        let err = use_case(transport).fetch_and_publish("eth", "usd").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Configuration);
    }
}
