//! Validation rules applied to every quote before it is written.

use rust_decimal::Decimal;

use super::point::QuotePoint;
use crate::domain::shared::{InstrumentId, Timestamp, ValidationError};

/// Ordering facts about the point written just before the one being checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Predecessor {
    /// Timestamp of the previous point.
    pub timestamp: Timestamp,
    /// Sequence of the previous point, when it came from the same batch.
    pub source_sequence: Option<u64>,
}

impl Predecessor {
    /// Predecessor taken from the same batch.
    #[must_use]
    pub const fn in_batch(point: &QuotePoint) -> Self {
        Self {
            timestamp: point.timestamp,
            source_sequence: Some(point.source_sequence),
        }
    }

    /// Predecessor loaded from the point store.
    #[must_use]
    pub const fn stored(point: &QuotePoint) -> Self {
        Self {
            timestamp: point.timestamp,
            source_sequence: None,
        }
    }
}

/// Quote validation rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuoteRules {
    /// Largest accepted price.
    pub max_price: Decimal,
    /// How far a timestamp may move backwards before it is rejected.
    pub timestamp_tolerance_ms: i64,
}

impl Default for QuoteRules {
    fn default() -> Self {
        Self {
            max_price: Decimal::new(1_000_000_000, 0),
            timestamp_tolerance_ms: 5_000,
        }
    }
}

impl QuoteRules {
    /// Check a bid/ask pair.
    pub fn check_prices(&self, bid: Decimal, ask: Decimal) -> Result<(), ValidationError> {
        self.check_price("bid_price", bid)?;
        self.check_price("ask_price", ask)?;
        if bid > ask {
            return Err(ValidationError::CrossedQuote { bid, ask });
        }
        Ok(())
    }

    fn check_price(&self, field: &str, value: Decimal) -> Result<(), ValidationError> {
        if value <= Decimal::ZERO || value > self.max_price {
            return Err(ValidationError::PriceOutOfRange {
                field: field.to_string(),
                value,
            });
        }
        Ok(())
    }

    /// Check a point delivered on `partition`, following `previous`.
    pub fn check_point(
        &self,
        point: &QuotePoint,
        partition: &InstrumentId,
        previous: Option<Predecessor>,
    ) -> Result<(), ValidationError> {
        if point.instrument_id.is_blank() {
            return Err(ValidationError::missing("instrument_id"));
        }
        if &point.instrument_id != partition {
            return Err(ValidationError::PartitionMismatch {
                expected: partition.to_string(),
                actual: point.instrument_id.to_string(),
            });
        }

        self.check_prices(point.bid_price, point.ask_price)?;

        let Some(previous) = previous else {
            return Ok(());
        };

        if let Some(prev_seq) = previous.source_sequence {
            if point.source_sequence <= prev_seq {
                return Err(ValidationError::SequenceRegression {
                    previous: prev_seq,
                    current: point.source_sequence,
                });
            }
        }

        let behind_ms = previous.timestamp.unix_millis() - point.timestamp.unix_millis();
        if behind_ms > self.timestamp_tolerance_ms {
            return Err(ValidationError::TimestampRegression {
                behind_ms,
                tolerance_ms: self.timestamp_tolerance_ms,
            });
        }

        Ok(())
    }
}
