//! Quote points as stored in the point store.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::shared::{InstrumentId, Timestamp};

/// Which side of the quote a computation reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceField {
    /// Bid price.
    #[default]
    Bid,
    /// Ask price.
    Ask,
}

impl PriceField {
    /// Lowercase name, used in output columns and config.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Bid => "bid",
            Self::Ask => "ask",
        }
    }
}

impl fmt::Display for PriceField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated quote that has not yet been assigned a stream sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedQuote {
    /// Instrument key.
    pub instrument_id: InstrumentId,
    /// Quote time.
    pub timestamp: Timestamp,
    /// Best bid.
    pub bid_price: Decimal,
    /// Best ask.
    pub ask_price: Decimal,
}

impl NormalizedQuote {
    /// Attach the transport-assigned sequence.
    #[must_use]
    pub fn into_point(self, source_sequence: u64) -> QuotePoint {
        QuotePoint {
            instrument_id: self.instrument_id,
            timestamp: self.timestamp,
            bid_price: self.bid_price,
            ask_price: self.ask_price,
            source_sequence,
        }
    }
}

/// A single timestamped quote for one instrument.
///
/// Identity is `(instrument_id, timestamp)`; the store keeps the last write for a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotePoint {
    /// Instrument key.
    pub instrument_id: InstrumentId,
    /// Quote time (sub-second precision).
    pub timestamp: Timestamp,
    /// Best bid.
    pub bid_price: Decimal,
    /// Best ask.
    pub ask_price: Decimal,
    /// Monotonic per-instrument sequence assigned by the transport.
    pub source_sequence: u64,
}

impl QuotePoint {
    /// Price on the requested side.
    #[must_use]
    pub const fn price(&self, field: PriceField) -> Decimal {
        match field {
            PriceField::Bid => self.bid_price,
            PriceField::Ask => self.ask_price,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn point() -> QuotePoint {
        NormalizedQuote {
            instrument_id: InstrumentId::new("BTCUSD"),
            timestamp: Timestamp::parse("2026-01-19T12:00:00Z").unwrap(),
            bid_price: dec!(100.10),
            ask_price: dec!(100.30),
        }
        .into_point(7)
    }

    #[test]
    fn into_point_keeps_fields() {
        let p = point();
        assert_eq!(p.source_sequence, 7);
        assert_eq!(p.instrument_id.as_str(), "BTCUSD");
    }

    #[test]
    fn price_by_field() {
        let p = point();
        assert_eq!(p.price(PriceField::Bid), dec!(100.10));
        assert_eq!(p.price(PriceField::Ask), dec!(100.30));
    }

    #[test]
    fn serde_prices_as_strings() {
        let json = serde_json::to_value(point()).unwrap();
        assert_eq!(json["bid_price"], "100.10");
        assert_eq!(json["source_sequence"], 7);
    }

    #[test]
    fn price_field_serde() {
        let field: PriceField = serde_json::from_str("\"ask\"").unwrap();
        assert_eq!(field, PriceField::Ask);
        assert_eq!(PriceField::default().to_string(), "bid");
    }
}
