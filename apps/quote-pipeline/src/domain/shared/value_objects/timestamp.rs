//! Timestamp value object for temporal data.

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// A UTC timestamp with sub-second precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create a new Timestamp from a DateTime<Utc>.
    #[must_use]
    pub const fn new(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Get the current timestamp.
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Parse from an ISO 8601 string.
    ///
    /// # Errors
    ///
    /// Returns error if the string is not a valid ISO 8601 timestamp.
    pub fn parse(s: &str) -> Result<Self, chrono::ParseError> {
        let dt = DateTime::parse_from_rfc3339(s)?;
        Ok(Self(dt.with_timezone(&Utc)))
    }

    /// Build a timestamp from Unix milliseconds.
    #[must_use]
    pub fn from_unix_millis(millis: i64) -> Option<Self> {
        DateTime::from_timestamp_millis(millis).map(Self)
    }

    /// Get the inner DateTime<Utc>.
    #[must_use]
    pub const fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    /// Format as ISO 8601 / RFC 3339 string.
    #[must_use]
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339()
    }

    /// Get the Unix timestamp in milliseconds.
    #[must_use]
    pub fn unix_millis(&self) -> i64 {
        self.0.timestamp_millis()
    }

    /// Calendar date (UTC).
    #[must_use]
    pub fn date(&self) -> NaiveDate {
        self.0.date_naive()
    }

    /// Hour of day (UTC), 0-23.
    #[must_use]
    pub fn hour(&self) -> u32 {
        self.0.hour()
    }

    /// Calculate duration since another timestamp.
    #[must_use]
    pub fn duration_since(&self, other: Self) -> chrono::Duration {
        self.0 - other.0
    }

    /// Subtract a std duration, saturating at the minimum representable instant.
    #[must_use]
    pub fn saturating_sub(&self, duration: Duration) -> Self {
        chrono::Duration::from_std(duration)
            .ok()
            .and_then(|d| self.0.checked_sub_signed(d))
            .map_or(Self(DateTime::<Utc>::MIN_UTC), Self)
    }

    /// Truncate down to a multiple of `period` since the Unix epoch.
    ///
    /// A zero period leaves the timestamp unchanged.
    #[must_use]
    pub fn truncate_to(&self, period: Duration) -> Self {
        let period_ms = i64::try_from(period.as_millis()).unwrap_or(i64::MAX);
        if period_ms == 0 {
            return *self;
        }
        let millis = self.unix_millis();
        let truncated = millis - millis.rem_euclid(period_ms);
        Self::from_unix_millis(truncated).unwrap_or(*self)
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::now()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }
}

impl From<Timestamp> for DateTime<Utc> {
    fn from(ts: Timestamp) -> Self {
        ts.0
    }
}
