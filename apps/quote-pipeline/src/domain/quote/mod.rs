//! Quote Context
//!
//! Raw quote normalization, the stored `QuotePoint` and its validation rules.

mod normalize;
mod point;
mod rules;

pub use normalize::{RawQuote, normalize, slug_key};
pub use point::{NormalizedQuote, PriceField, QuotePoint};
pub use rules::{Predecessor, QuoteRules};
