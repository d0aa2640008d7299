//! Aggregate records emitted once per instrument per run.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::sma::{SmaValue, SumOverflow, compute_sma};
use super::window_spec::WindowSpec;
use crate::domain::quote::{PriceField, QuotePoint};
use crate::domain::shared::{InstrumentId, Timestamp};

/// How a run picks the `as_of` instant of its records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AsOfMode {
    /// Use the trigger time.
    #[default]
    TriggerTime,
    /// Use the latest point at or before the trigger time (quotes lag).
    LatestPoint,
}

/// SMA results for one instrument at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateRecord {
    /// Instrument key.
    pub instrument_id: InstrumentId,
    /// Instant the record describes.
    pub as_of: Timestamp,
    /// Bid of the latest point at or before `as_of`.
    pub bid_price: Decimal,
    /// Ask of the latest point at or before `as_of`.
    pub ask_price: Decimal,
    /// Side the averages were computed over.
    pub field: PriceField,
    /// One entry per configured window.
    pub sma: BTreeMap<usize, SmaValue>,
}

impl AggregateRecord {
    /// Build a record from points ordered newest first.
    ///
    /// Points after `trigger` are ignored. Returns `Ok(None)` when no point
    /// remains: an instrument without history produces no record.
    pub fn from_points(
        instrument_id: &InstrumentId,
        trigger: Timestamp,
        mode: AsOfMode,
        points_newest_first: &[QuotePoint],
        spec: &WindowSpec,
        field: PriceField,
    ) -> Result<Option<Self>, SumOverflow> {
        let eligible: Vec<&QuotePoint> = points_newest_first
            .iter()
            .filter(|p| p.timestamp <= trigger)
            .collect();

        let Some(latest) = eligible.first() else {
            return Ok(None);
        };

        let as_of = match mode {
            AsOfMode::TriggerTime => trigger,
            AsOfMode::LatestPoint => latest.timestamp,
        };

        let sma = compute_sma(eligible.iter().map(|p| p.price(field)), spec)?;

        Ok(Some(Self {
            instrument_id: instrument_id.clone(),
            as_of,
            bid_price: latest.bid_price,
            ask_price: latest.ask_price,
            field,
            sma,
        }))
    }

    /// SMA for window `w`, `None` if the window is not configured.
    #[must_use]
    pub fn sma(&self, window: usize) -> Option<SmaValue> {
        self.sma.get(&window).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::quote::NormalizedQuote;
    use rust_decimal_macros::dec;

    fn points(n: i64) -> Vec<QuotePoint> {
        (1..=n)
            .rev()
            .map(|t| {
                NormalizedQuote {
                    instrument_id: InstrumentId::new("ETHUSD"),
                    timestamp: Timestamp::from_unix_millis(t * 60_000).unwrap(),
                    bid_price: Decimal::from(t),
                    ask_price: Decimal::from(t) + dec!(0.5),
                }
                .into_point(t as u64)
            })
            .collect()
    }

    fn id() -> InstrumentId {
        InstrumentId::new("ETHUSD")
    }

    #[test]
    fn no_points_no_record() {
        let spec = WindowSpec::default();
        let trigger = Timestamp::from_unix_millis(0).unwrap();
        let record =
            AggregateRecord::from_points(&id(), trigger, AsOfMode::TriggerTime, &[], &spec, PriceField::Bid)
                .unwrap();
        assert!(record.is_none());
    }

    #[test]
    fn insufficient_history_keeps_latest_prices() {
        let spec = WindowSpec::new([10, 30]).unwrap();
        let trigger = Timestamp::from_unix_millis(10 * 60_000).unwrap();
        let record = AggregateRecord::from_points(
            &id(),
            trigger,
            AsOfMode::TriggerTime,
            &points(5),
            &spec,
            PriceField::Bid,
        )
        .unwrap()
        .unwrap();

        assert_eq!(record.sma(10), Some(SmaValue::Undefined));
        assert_eq!(record.sma(30), Some(SmaValue::Undefined));
        assert_eq!(record.bid_price, dec!(5));
        assert_eq!(record.ask_price, dec!(5.5));
        assert_eq!(record.as_of, trigger);
    }

    #[test]
    fn latest_point_mode_uses_point_time() {
        let spec = WindowSpec::new([2]).unwrap();
        let trigger = Timestamp::from_unix_millis(3 * 60_000 + 30_000).unwrap();
        let record = AggregateRecord::from_points(
            &id(),
            trigger,
            AsOfMode::LatestPoint,
            &points(5),
            &spec,
            PriceField::Ask,
        )
        .unwrap()
        .unwrap();

        // Points 4 and 5 are after the trigger.
        assert_eq!(record.as_of, Timestamp::from_unix_millis(3 * 60_000).unwrap());
        assert_eq!(record.sma(2), Some(SmaValue::Defined(dec!(3.0))));
        assert_eq!(record.field, PriceField::Ask);
    }

    #[test]
    fn unconfigured_window_is_none() {
        let spec = WindowSpec::new([2]).unwrap();
        let trigger = Timestamp::from_unix_millis(10 * 60_000).unwrap();
        let record = AggregateRecord::from_points(
            &id(),
            trigger,
            AsOfMode::TriggerTime,
            &points(3),
            &spec,
            PriceField::Bid,
        )
        .unwrap()
        .unwrap();
        assert_eq!(record.sma(7), None);
    }

    #[test]
    fn serializes_undefined_as_null() {
        let spec = WindowSpec::new([2, 10]).unwrap();
        let trigger = Timestamp::from_unix_millis(10 * 60_000).unwrap();
        let record = AggregateRecord::from_points(
            &id(),
            trigger,
            AsOfMode::TriggerTime,
            &points(3),
            &spec,
            PriceField::Bid,
        )
        .unwrap()
        .unwrap();
        let json = serde_json::to_value(&record).unwrap();
        assert!(json["sma"]["10"].is_null());
        assert_eq!(json["sma"]["2"], "2.5");
    }
}
