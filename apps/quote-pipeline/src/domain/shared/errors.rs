//! Data validation errors.
//!
//! These are data-dependent: retrying the same record can never succeed, so the
//! stream consumer isolates them by bisection instead of retrying with backoff.

use std::fmt;

use rust_decimal::Decimal;

/// A quote failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field is missing or blank.
    MissingField {
        /// Field name.
        field: String,
    },

    /// A field could not be parsed.
    Malformed {
        /// Field name.
        field: String,
        /// Parser message.
        message: String,
    },

    /// A price is non-positive or above the configured ceiling.
    PriceOutOfRange {
        /// Field name (`bid_price` / `ask_price`).
        field: String,
        /// Offending value.
        value: Decimal,
    },

    /// Bid is above ask.
    CrossedQuote {
        /// Bid price.
        bid: Decimal,
        /// Ask price.
        ask: Decimal,
    },

    /// The point belongs to a different partition than the batch.
    PartitionMismatch {
        /// Partition the batch was delivered on.
        expected: String,
        /// Instrument carried by the point.
        actual: String,
    },

    /// `source_sequence` did not increase within the batch.
    SequenceRegression {
        /// Sequence of the previous point.
        previous: u64,
        /// Sequence of this point.
        current: u64,
    },

    /// Timestamp moved backwards by more than the tolerance.
    TimestampRegression {
        /// Milliseconds behind the previous point.
        behind_ms: i64,
        /// Allowed tolerance in milliseconds.
        tolerance_ms: i64,
    },

    /// The point store permanently refused to write this point.
    StoreRejected {
        /// Store message.
        message: String,
    },
}

impl ValidationError {
    /// Convenience constructor for malformed fields.
    #[must_use]
    pub fn malformed(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Malformed {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for missing fields.
    #[must_use]
    pub fn missing(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// Short snake_case label, used as a metric dimension.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::MissingField { .. } => "missing_field",
            Self::Malformed { .. } => "malformed",
            Self::PriceOutOfRange { .. } => "price_out_of_range",
            Self::CrossedQuote { .. } => "crossed_quote",
            Self::PartitionMismatch { .. } => "partition_mismatch",
            Self::SequenceRegression { .. } => "sequence_regression",
            Self::TimestampRegression { .. } => "timestamp_regression",
            Self::StoreRejected { .. } => "store_rejected",
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField { field } => write!(f, "missing field '{field}'"),
            Self::Malformed { field, message } => {
                write!(f, "malformed field '{field}': {message}")
            }
            Self::PriceOutOfRange { field, value } => {
                write!(f, "{field} out of range: {value}")
            }
            Self::CrossedQuote { bid, ask } => {
                write!(f, "crossed quote: bid {bid} > ask {ask}")
            }
            Self::PartitionMismatch { expected, actual } => {
                write!(f, "point for {actual} delivered on partition {expected}")
            }
            Self::SequenceRegression { previous, current } => {
                write!(
                    f,
                    "source_sequence {current} does not follow {previous}"
                )
            }
            Self::TimestampRegression {
                behind_ms,
                tolerance_ms,
            } => {
                write!(
                    f,
                    "timestamp {behind_ms}ms behind previous point (tolerance {tolerance_ms}ms)"
                )
            }
            Self::StoreRejected { message } => write!(f, "point store rejected point: {message}"),
        }
    }
}

impl std::error::Error for ValidationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_field_display() {
        let err = ValidationError::missing("bid_price");
        assert_eq!(err.to_string(), "missing field 'bid_price'");
    }

    #[test]
    fn crossed_quote_display() {
        let err = ValidationError::CrossedQuote {
            bid: Decimal::new(101, 0),
            ask: Decimal::new(100, 0),
        };
        let msg = err.to_string();
        assert!(msg.contains("101"));
        assert!(msg.contains("100"));
    }

    #[test]
    fn timestamp_regression_display() {
        let err = ValidationError::TimestampRegression {
            behind_ms: 7000,
            tolerance_ms: 5000,
        };
        assert!(err.to_string().contains("7000ms"));
    }

    #[test]
    fn store_rejected_reason() {
        let err = ValidationError::StoreRejected {
            message: "duplicate key".into(),
        };
        assert_eq!(err.reason(), "store_rejected");
        assert!(err.to_string().contains("duplicate key"));
    }

    #[test]
    fn is_std_error() {
        let err: Box<dyn std::error::Error> = Box::new(ValidationError::malformed("x", "y"));
        assert!(!err.to_string().is_empty());
    }
}
