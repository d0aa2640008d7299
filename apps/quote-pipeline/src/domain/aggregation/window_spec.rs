//! Window set used by the aggregation engine.

use serde::{Deserialize, Serialize};

use crate::domain::shared::ValidationError;

/// Fixed, ascending, de-duplicated set of SMA window lengths (in points).
///
/// Fixed for a deployment; changing it does not recompute earlier records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<usize>", into = "Vec<usize>")]
pub struct WindowSpec(Vec<usize>);

impl WindowSpec {
    /// Build from window lengths in any order.
    ///
    /// # Errors
    ///
    /// Rejects an empty set and zero-length windows.
    pub fn new(windows: impl IntoIterator<Item = usize>) -> Result<Self, ValidationError> {
        let mut windows: Vec<usize> = windows.into_iter().collect();
        if windows.is_empty() {
            return Err(ValidationError::missing("windows"));
        }
        if windows.contains(&0) {
            return Err(ValidationError::malformed(
                "windows",
                "window lengths must be positive",
            ));
        }
        windows.sort_unstable();
        windows.dedup();
        Ok(Self(windows))
    }

    /// Window lengths, ascending.
    #[must_use]
    pub fn windows(&self) -> &[usize] {
        &self.0
    }

    /// Largest window; the number of points an aggregation needs to fetch.
    #[must_use]
    pub fn max_window(&self) -> usize {
        self.0.last().copied().unwrap_or(0)
    }
}

impl Default for WindowSpec {
    fn default() -> Self {
        Self(vec![10, 30, 60, 100])
    }
}

impl TryFrom<Vec<usize>> for WindowSpec {
    type Error = ValidationError;

    fn try_from(value: Vec<usize>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<WindowSpec> for Vec<usize> {
    fn from(spec: WindowSpec) -> Self {
        spec.0
    }
}
