//! Normalization of upstream exchange-rate payloads.
//!
//! Upstream responses use numbered, human-readable keys such as
//! `"5. Exchange Rate"` or `"8. Bid Price"`. Keys are slugged to
//! `exchange_rate` / `bid_price` before fields are read. Prices are parsed as
//! decimals straight from their textual form; they never pass through `f64`.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{NaiveDateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::point::NormalizedQuote;
use super::rules::QuoteRules;
use crate::domain::shared::{InstrumentId, Timestamp, ValidationError};

/// An upstream quote payload with arbitrary keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawQuote(pub serde_json::Map<String, Value>);

impl RawQuote {
    /// Build from `(key, value)` pairs.
    #[must_use]
    pub fn from_pairs<K: Into<String>>(pairs: impl IntoIterator<Item = (K, Value)>) -> Self {
        Self(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Reduce an upstream key to snake case.
///
/// `"1. From_Currency Code"` becomes `from_currency_code`.
#[must_use]
pub fn slug_key(key: &str) -> String {
    key.rsplit('.')
        .next()
        .unwrap_or(key)
        .trim()
        .replace(' ', "_")
        .to_lowercase()
}

/// Slugged view over a raw payload, values rendered as text.
struct Fields(BTreeMap<String, String>);

impl Fields {
    fn from_raw(raw: &RawQuote) -> Self {
        let fields = raw
            .0
            .iter()
            .filter_map(|(key, value)| {
                let text = match value {
                    Value::String(s) => s.trim().to_string(),
                    Value::Number(n) => n.to_string(),
                    _ => return None,
                };
                Some((slug_key(key), text))
            })
            .collect();
        Self(fields)
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty() && *v != "-")
    }

    fn first(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|k| self.get(k))
    }
}

fn parse_decimal(field: &str, text: &str) -> Result<Decimal, ValidationError> {
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .map_err(|e| ValidationError::malformed(field, e.to_string()))
}

fn parse_timestamp(text: &str, time_zone: Option<&str>) -> Result<Timestamp, ValidationError> {
    if let Ok(ts) = Timestamp::parse(text) {
        return Ok(ts);
    }

    match time_zone.map(str::to_ascii_uppercase).as_deref() {
        None | Some("UTC" | "GMT" | "Z") => {}
        Some(other) => {
            return Err(ValidationError::malformed(
                "time_zone",
                format!("unsupported time zone {other}"),
            ));
        }
    }

    let naive = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
        .map_err(|e| ValidationError::malformed("last_refreshed", e.to_string()))?;
    Ok(Timestamp::new(Utc.from_utc_datetime(&naive)))
}

fn instrument_id(fields: &Fields) -> Result<InstrumentId, ValidationError> {
    if let Some(id) = fields.first(&["instrument_id", "ticker"]) {
        let id: String = id
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_uppercase();
        if !id.is_empty() {
            return Ok(InstrumentId::new(id));
        }
    }

    let from = fields
        .first(&["from_currency_code", "from_symbol"])
        .ok_or_else(|| ValidationError::missing("from_currency_code"))?;
    let to = fields
        .first(&["to_currency_code", "to_symbol"])
        .ok_or_else(|| ValidationError::missing("to_currency_code"))?;
    Ok(InstrumentId::new(format!(
        "{}{}",
        from.to_uppercase(),
        to.to_uppercase()
    )))
}

/// Normalize and validate an upstream payload.
///
/// Bid and ask fall back to the exchange rate when the upstream leaves them
/// blank or `-`.
pub fn normalize(raw: &RawQuote, rules: &QuoteRules) -> Result<NormalizedQuote, ValidationError> {
    let fields = Fields::from_raw(raw);

    let instrument_id = instrument_id(&fields)?;

    let ts_text = fields
        .first(&["last_refreshed", "timestamp"])
        .ok_or_else(|| ValidationError::missing("last_refreshed"))?;
    let timestamp = parse_timestamp(ts_text, fields.get("time_zone"))?;

    let rate = fields
        .get("exchange_rate")
        .map(|t| parse_decimal("exchange_rate", t))
        .transpose()?;

    let bid_price = match fields.get("bid_price") {
        Some(text) => parse_decimal("bid_price", text)?,
        None => rate.ok_or_else(|| ValidationError::missing("bid_price"))?,
    };
    let ask_price = match fields.get("ask_price") {
        Some(text) => parse_decimal("ask_price", text)?,
        None => rate.ok_or_else(|| ValidationError::missing("ask_price"))?,
    };

    rules.check_prices(bid_price, ask_price)?;

    Ok(NormalizedQuote {
        instrument_id,
        timestamp,
        bid_price,
        ask_price,
    })
}
