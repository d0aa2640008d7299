//! Mock upstream quote provider for testing and offline runs.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::json;

use crate::application::ports::{UpstreamError, UpstreamQuotePort};
use crate::domain::quote::RawQuote;
use crate::domain::shared::Timestamp;

#[derive(Debug, Clone, Copy)]
struct Rate {
    bid: Decimal,
    ask: Decimal,
    refreshed: Timestamp,
}

/// Serves configured exchange rates in the upstream payload layout.
#[derive(Debug, Default)]
pub struct MockUpstreamQuotes {
    rates: RwLock<HashMap<(String, String), Rate>>,
    api_key: Option<String>,
}

impl MockUpstreamQuotes {
    /// Create a provider that accepts any API key.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Only accept `api_key`.
    #[must_use]
    pub fn requiring_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..Self::default()
        }
    }

    /// Set the rate served for `from`/`to`.
    pub fn set_rate(&self, from: &str, to: &str, bid: Decimal, ask: Decimal, refreshed: Timestamp) {
        self.rates
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                (from.to_uppercase(), to.to_uppercase()),
                Rate {
                    bid,
                    ask,
                    refreshed,
                },
            );
    }
}

#[async_trait]
impl UpstreamQuotePort for MockUpstreamQuotes {
    async fn fetch_exchange_rate(
        &self,
        from: &str,
        to: &str,
        api_key: &str,
    ) -> Result<RawQuote, UpstreamError> {
        if self.api_key.as_deref().is_some_and(|expected| expected != api_key) {
            return Err(UpstreamError::Unauthorized);
        }

        let (from, to) = (from.to_uppercase(), to.to_uppercase());
        let rate = self
            .rates
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(from.clone(), to.clone()))
            .copied()
            .ok_or_else(|| UpstreamError::UnexpectedResponse {
                message: format!("no rate for {from}/{to}"),
            })?;

        let mid = (rate.bid + rate.ask) / Decimal::TWO;
        Ok(RawQuote::from_pairs([
            ("1. From_Currency Code", json!(from)),
            ("3. To_Currency Code", json!(to)),
            ("5. Exchange Rate", json!(mid.to_string())),
            (
                "6. Last Refreshed",
                json!(rate.refreshed.as_datetime().format("%Y-%m-%d %H:%M:%S").to_string()),
            ),
            ("7. Time Zone", json!("UTC")),
            ("8. Bid Price", json!(rate.bid.to_string())),
            ("9. Ask Price", json!(rate.ask.to_string())),
        ]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::quote::{QuoteRules, normalize};
    use crate::domain::shared::InstrumentId;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn payload_normalizes() {
        let upstream = MockUpstreamQuotes::new();
        let refreshed = Timestamp::parse("2024-05-01T12:30:00Z").unwrap();
        upstream.set_rate("btc", "usd", dec!(100), dec!(101), refreshed);

        let raw = upstream.fetch_exchange_rate("BTC", "USD", "any").await.unwrap();
        let quote = normalize(&raw, &QuoteRules::default()).unwrap();

        assert_eq!(quote.instrument_id, InstrumentId::new("BTCUSD"));
        assert_eq!(quote.timestamp, refreshed);
        assert_eq!(quote.bid_price, dec!(100));
        assert_eq!(quote.ask_price, dec!(101));
    }

    #[tokio::test]
    async fn wrong_key_rejected() {
        let upstream = MockUpstreamQuotes::requiring_key("right");
        let err = upstream.fetch_exchange_rate("BTC", "USD", "wrong").await.unwrap_err();
        assert_eq!(err, UpstreamError::Unauthorized);
    }

    #[tokio::test]
    async fn unknown_pair_is_unexpected_response() {
        let upstream = MockUpstreamQuotes::new();
        let err = upstream.fetch_exchange_rate("DOGE", "USD", "k").await.unwrap_err();
        assert!(matches!(err, UpstreamError::UnexpectedResponse { .. }));
    }
}
