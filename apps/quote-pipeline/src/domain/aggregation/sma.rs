//! Nested simple moving averages from a single fetch.
//!
//! All windows draw from the same newest-first price list, so one pass with a
//! running decimal sum yields every window: when the count reaches a window
//! length `w`, `sma[w] = sum / w`. Cost is O(max window) per instrument.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::window_spec::WindowSpec;

/// An SMA value, or an explicit marker that the window had too few points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Option<Decimal>", into = "Option<Decimal>")]
pub enum SmaValue {
    /// Mean of exactly `w` prices.
    Defined(Decimal),
    /// Fewer than `w` points were available.
    Undefined,
}

impl SmaValue {
    /// The value, if defined.
    #[must_use]
    pub const fn value(&self) -> Option<Decimal> {
        match self {
            Self::Defined(v) => Some(*v),
            Self::Undefined => None,
        }
    }

    /// Returns true if the window had enough points.
    #[must_use]
    pub const fn is_defined(&self) -> bool {
        matches!(self, Self::Defined(_))
    }
}

impl From<Option<Decimal>> for SmaValue {
    fn from(value: Option<Decimal>) -> Self {
        value.map_or(Self::Undefined, Self::Defined)
    }
}

impl From<SmaValue> for Option<Decimal> {
    fn from(value: SmaValue) -> Self {
        value.value()
    }
}

/// The running sum left decimal range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("decimal overflow summing {count} prices")]
pub struct SumOverflow {
    /// Prices summed before the overflow.
    pub count: usize,
}

/// Compute every window of `spec` over prices ordered newest first.
///
/// Prices beyond `spec.max_window()` are ignored.
pub fn compute_sma<I>(prices_newest_first: I, spec: &WindowSpec) -> Result<BTreeMap<usize, SmaValue>, SumOverflow>
where
    I: IntoIterator<Item = Decimal>,
{
    let windows = spec.windows();
    let mut out: BTreeMap<usize, SmaValue> =
        windows.iter().map(|&w| (w, SmaValue::Undefined)).collect();

    let mut sum = Decimal::ZERO;
    let mut count = 0usize;
    let mut next = 0usize;

    for price in prices_newest_first.into_iter().take(spec.max_window()) {
        sum = sum.checked_add(price).ok_or(SumOverflow { count })?;
        count += 1;

        while next < windows.len() && windows[next] == count {
            let mean = sum
                .checked_div(Decimal::from(count))
                .ok_or(SumOverflow { count })?;
            out.insert(count, SmaValue::Defined(mean));
            next += 1;
        }
    }

    Ok(out)
}
