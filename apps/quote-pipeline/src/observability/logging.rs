//! Structured logging setup.
//!
//! `RUST_LOG` wins over the configured level when set, so operators can
//! raise verbosity for one module without touching the config file.
//!
//! # Example
//!
//! ```ignore
//! use quote_pipeline::observability::{init_tracing, TracingConfig, LogFormat};
//!
//! init_tracing(&TracingConfig::new("debug", LogFormat::Pretty))?;
//! ```

use std::str::FromStr;

use tracing_subscriber::EnvFilter;

/// Output format of log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Human-readable multi-line output.
    Pretty,
    /// Single-line human-readable output.
    Compact,
}

impl FromStr for LogFormat {
    type Err = TracingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            "compact" | "text" => Ok(Self::Compact),
            other => Err(TracingError::UnknownFormat(other.to_string())),
        }
    }
}

/// Configuration for the tracing subscriber.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Default filter directive (e.g., `"info"` or `"quote_pipeline=debug"`).
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}

impl TracingConfig {
    /// Create a configuration.
    #[must_use]
    pub fn new(level: impl Into<String>, format: LogFormat) -> Self {
        Self {
            level: level.into(),
            format,
        }
    }

    fn filter(&self) -> Result<EnvFilter, TracingError> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        EnvFilter::try_new(&self.level).map_err(|e| TracingError::InvalidFilter(e.to_string()))
    }
}

/// Error type for tracing operations.
#[derive(Debug, thiserror::Error)]
pub enum TracingError {
    /// The level is not a valid filter directive.
    #[error("invalid log filter: {0}")]
    InvalidFilter(String),
    /// The format name is not recognised.
    #[error("unknown log format '{0}' (expected json, pretty or compact)")]
    UnknownFormat(String),
    /// A global subscriber is already installed.
    #[error("failed to initialize tracing subscriber: {0}")]
    SubscriberError(String),
}

/// Install the global tracing subscriber.
///
/// # Errors
///
/// Returns an error if the filter is invalid or a subscriber is already set.
pub fn init_tracing(config: &TracingConfig) -> Result<(), TracingError> {
    let filter = config.filter()?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let result = match config.format {
        LogFormat::Json => builder.json().flatten_event(true).try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
    };
    result.map_err(|e| TracingError::SubscriberError(e.to_string()))
}

// ============================================================================
// Tests
// ============================================================================
