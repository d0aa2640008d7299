//! HTTP exchange-rate adapter.
//!
//! Calls `GET {base_url}/query?function=CURRENCY_EXCHANGE_RATE` and returns the
//! inner `"Realtime Currency Exchange Rate"` object untouched; key slugging
//! and decimal parsing happen in the domain normalizer.
//!
//! The provider answers most failures with HTTP 200 and a diagnostic body:
//! `"Error Message"` for bad requests, `"Note"` or `"Information"` for quota
//! and key problems.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{Map, Value};

use crate::application::ports::{UpstreamError, UpstreamQuotePort};
use crate::domain::quote::RawQuote;

const RATE_KEY: &str = "Realtime Currency Exchange Rate";

/// Configuration for [`HttpUpstreamQuotes`].
#[derive(Debug, Clone)]
pub struct HttpUpstreamConfig {
    /// Provider base URL without a trailing slash.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for HttpUpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.alphavantage.co".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Exchange-rate provider reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpUpstreamQuotes {
    client: Client,
    base_url: String,
}

impl HttpUpstreamQuotes {
    /// Create a new adapter.
    pub fn new(config: &HttpUpstreamConfig) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| UpstreamError::Unavailable {
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

fn categorize_status(status: StatusCode, body: String) -> UpstreamError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => UpstreamError::Unauthorized,
        StatusCode::TOO_MANY_REQUESTS => UpstreamError::RateLimited,
        s if s.is_server_error() => UpstreamError::Unavailable {
            message: format!("{s}: {body}"),
        },
        s => UpstreamError::UnexpectedResponse {
            message: format!("{s}: {body}"),
        },
    }
}

fn diagnostic(body: &Map<String, Value>) -> Option<UpstreamError> {
    if let Some(message) = body.get("Error Message").and_then(Value::as_str) {
        return Some(UpstreamError::UnexpectedResponse {
            message: message.to_string(),
        });
    }
    let notice = body
        .get("Note")
        .or_else(|| body.get("Information"))
        .and_then(Value::as_str)?;
    if notice.to_ascii_lowercase().contains("apikey") {
        Some(UpstreamError::Unauthorized)
    } else {
        Some(UpstreamError::RateLimited)
    }
}

/// Extract the rate object from a decoded response body.
fn parse_body(body: Value) -> Result<RawQuote, UpstreamError> {
    let Value::Object(mut body) = body else {
        return Err(UpstreamError::UnexpectedResponse {
            message: "response is not a JSON object".to_string(),
        });
    };
    if let Some(err) = diagnostic(&body) {
        return Err(err);
    }
    match body.remove(RATE_KEY) {
        Some(Value::Object(rate)) => Ok(RawQuote(rate)),
        _ => Err(UpstreamError::UnexpectedResponse {
            message: format!("missing '{RATE_KEY}'"),
        }),
    }
}

#[async_trait]
impl UpstreamQuotePort for HttpUpstreamQuotes {
    async fn fetch_exchange_rate(
        &self,
        from: &str,
        to: &str,
        api_key: &str,
    ) -> Result<RawQuote, UpstreamError> {
        let url = format!("{}/query", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("function", "CURRENCY_EXCHANGE_RATE"),
                ("from_currency", from),
                ("to_currency", to),
                ("apikey", api_key),
            ])
            .send()
            .await
            .map_err(|e| UpstreamError::Unavailable {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(from, to, status = %status, "Upstream request failed");
            return Err(categorize_status(status, body));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| UpstreamError::UnexpectedResponse {
                message: e.to_string(),
            })?;
        parse_body(body)
    }
}
