//! Point store and output sink configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::application::ports::PartitionGranularity;

/// Point store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Deadline for each store, transport and sink call, in milliseconds.
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            operation_timeout_ms: default_operation_timeout_ms(),
        }
    }
}

impl StorageConfig {
    /// Operation timeout as a `Duration`.
    #[must_use]
    pub const fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

/// Output sink configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Root directory of the partitioned output.
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,
    /// Partition granularity (`hour` or `day`).
    #[serde(default)]
    pub granularity: PartitionGranularity,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            granularity: PartitionGranularity::default(),
        }
    }
}

const fn default_operation_timeout_ms() -> u64 {
    5_000
}

fn default_root_dir() -> PathBuf {
    PathBuf::from("data/aggregates")
}
