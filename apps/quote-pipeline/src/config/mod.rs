//! Configuration module for the quote pipeline.
//!
//! Loads a YAML file, interpolates environment variables and validates the
//! result. Every field has a default, so an empty file is a valid config.
//!
//! # Usage
//!
//! ```rust,ignore
//! use quote_pipeline::config::{Config, load_config};
//!
//! // Load from default path (config.yaml)
//! let config = load_config(None)?;
//!
//! // Load from custom path
//! let config = load_config(Some("deploy/config.yaml"))?;
//!
//! println!("windows: {:?}", config.aggregation.windows);
//! ```

mod aggregation;
mod consumer;
mod credentials;
mod observability;
mod retry;
mod scheduler;
mod storage;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use aggregation::AggregationConfig;
pub use consumer::ConsumerConfig;
pub use credentials::CredentialsConfig;
pub use observability::{LoggingConfig, MetricsSettings, ObservabilityConfig};
pub use retry::RetryConfig;
pub use scheduler::{SchedulerConfig, UpstreamConfig};
pub use storage::{OutputConfig, StorageConfig};

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "QUOTE_PIPELINE_CONFIG";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        /// Path to the config file.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[error("Failed to parse config YAML: {0}")]
    ParseError(#[from] serde_yaml_bw::Error),

    /// Configuration validation failed.
    #[error("Config validation failed: {0}")]
    ValidationError(String),

    /// Missing required environment variable.
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Stream consumer configuration.
    #[serde(default)]
    pub consumer: ConsumerConfig,
    /// Retry and bisection configuration.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Aggregation engine configuration.
    #[serde(default)]
    pub aggregation: AggregationConfig,
    /// Point store configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Output sink configuration.
    #[serde(default)]
    pub output: OutputConfig,
    /// Aggregation trigger configuration.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Upstream exchange-rate polling.
    #[serde(default)]
    pub upstream: UpstreamConfig,
    /// Upstream credential configuration.
    #[serde(default)]
    pub credentials: CredentialsConfig,
    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ============================================
// Configuration Loading
// ============================================

/// Load configuration from a YAML file with environment variable interpolation.
///
/// # Arguments
///
/// * `path` - Optional path to the config file. Defaults to "config.yaml".
///
/// # Errors
///
/// Returns a `ConfigError` if the file cannot be read, parsed, or validated.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or("config.yaml");

    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_string(),
        source: e,
    })?;

    load_config_from_string(&contents)
}

/// Load configuration from a YAML string.
///
/// # Errors
///
/// Returns a `ConfigError` if the YAML cannot be parsed or validated.
pub fn load_config_from_string(yaml: &str) -> Result<Config, ConfigError> {
    let interpolated = interpolate_env_vars(yaml);
    let config: Config = serde_yaml_bw::from_str(&interpolated)?;
    validate_config(&config)?;
    Ok(config)
}

/// Interpolate environment variables in a string.
///
/// Supports both `${VAR}` and `${VAR:-default}` syntax.
#[allow(clippy::expect_used)] // Regex is compile-time constant; expect() is safe here
fn interpolate_env_vars(input: &str) -> String {
    use std::sync::OnceLock;

    static ENV_VAR_REGEX: OnceLock<regex::Regex> = OnceLock::new();

    let mut result = input.to_string();

    // Match ${VAR} or ${VAR:-default} patterns
    let re = ENV_VAR_REGEX.get_or_init(|| {
        // This regex pattern is compile-time constant and always valid
        regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("env var regex is valid")
    });

    for cap in re.captures_iter(input) {
        // Group 0 and group 1 are guaranteed by the regex pattern structure
        let Some(full_match) = cap.get(0) else {
            continue;
        };
        let Some(var_match) = cap.get(1) else {
            continue;
        };
        let full_match = full_match.as_str();
        let var_name = var_match.as_str();
        let default_value = cap.get(2).map(|m| m.as_str());

        let value = match std::env::var(var_name) {
            Ok(v) if !v.is_empty() => v,
            _ => default_value.map_or_else(String::new, str::to_string),
        };

        result = result.replace(full_match, &value);
    }

    result
}

/// Validate configuration values.
fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let windows = &config.aggregation.windows;
    if windows.is_empty() {
        return Err(ConfigError::ValidationError(
            "aggregation.windows must not be empty".to_string(),
        ));
    }
    if windows.contains(&0) {
        return Err(ConfigError::ValidationError(
            "aggregation.windows must all be positive".to_string(),
        ));
    }

    if config.aggregation.concurrency == 0 {
        return Err(ConfigError::ValidationError(
            "aggregation.concurrency must be positive".to_string(),
        ));
    }

    if config.aggregation.lookback_hours == 0 {
        return Err(ConfigError::ValidationError(
            "aggregation.lookback_hours must be positive".to_string(),
        ));
    }

    if config.storage.operation_timeout_ms == 0 {
        return Err(ConfigError::ValidationError(
            "storage.operation_timeout_ms must be positive".to_string(),
        ));
    }

    if config.upstream.request_timeout_ms == 0 {
        return Err(ConfigError::ValidationError(
            "upstream.request_timeout_ms must be positive".to_string(),
        ));
    }

    if config.consumer.batch_size == 0 {
        return Err(ConfigError::ValidationError(
            "consumer.batch_size must be positive".to_string(),
        ));
    }

    if config.consumer.timestamp_tolerance_ms < 0 {
        return Err(ConfigError::ValidationError(
            "consumer.timestamp_tolerance_ms must not be negative".to_string(),
        ));
    }

    let retry = &config.retry;
    if !(0.0..=1.0).contains(&retry.jitter_factor) {
        return Err(ConfigError::ValidationError(
            "retry.jitter_factor must be between 0.0 and 1.0".to_string(),
        ));
    }

    if retry.multiplier < 1.0 {
        return Err(ConfigError::ValidationError(
            "retry.multiplier must be at least 1.0".to_string(),
        ));
    }

    if config.scheduler.cadence_secs == 0 {
        return Err(ConfigError::ValidationError(
            "scheduler.cadence_secs must be positive".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::PartitionGranularity;
    use crate::domain::aggregation::AsOfMode;
    use crate::domain::quote::PriceField;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn expect_invalid(yaml: &str, needle: &str) {
        let Err(err) = load_config_from_string(yaml) else {
            panic!("expected validation error for {needle}");
        };
        assert!(
            err.to_string().contains(needle),
            "error '{err}' should mention {needle}"
        );
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.consumer.batch_size, 100);
        assert_eq!(config.retry.bisection_budget, 8);
        assert_eq!(config.aggregation.windows, vec![10, 30, 60, 100]);
        assert_eq!(config.aggregation.lookback_hours, 168);
        assert_eq!(config.aggregation.as_of_mode, AsOfMode::TriggerTime);
        assert_eq!(config.output.granularity, PartitionGranularity::Hour);
        assert_eq!(config.scheduler.cadence_secs, 3600);
        assert!(!config.observability.metrics.enabled);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = match load_config_from_string("{}") {
            Ok(c) => c,
            Err(e) => panic!("should load empty config: {e}"),
        };
        assert_eq!(config.consumer.batch_size, 100);
        assert_eq!(config.retry.to_policy().max_attempts, 5);
    }

    #[test]
    fn test_env_var_with_default_when_missing() {
        let input = "root_dir: ${QUOTE_PIPELINE_TEST_NONEXISTENT_VAR:-/tmp/out}";
        let result = interpolate_env_vars(input);

        assert_eq!(result, "root_dir: /tmp/out");
    }

    #[test]
    #[expect(clippy::literal_string_with_formatting_args)] // ${...} is env var syntax, not format args
    fn test_env_var_with_default_uses_existing() {
        // PATH should always exist
        let input = "path: ${PATH:-default}";
        let result = interpolate_env_vars(input);

        assert_ne!(result, "path: default");
        assert!(result.starts_with("path: "));
    }

    #[test]
    fn test_env_var_without_default_becomes_empty() {
        let input = "secret_env_var: ${QUOTE_PIPELINE_TEST_UNLIKELY_TO_EXIST}";
        let result = interpolate_env_vars(input);

        assert_eq!(result, "secret_env_var: ");
    }

    #[test]
    fn test_validation_empty_windows() {
        expect_invalid("aggregation:\n  windows: []\n", "windows");
    }

    #[test]
    fn test_validation_zero_window() {
        expect_invalid("aggregation:\n  windows: [10, 0]\n", "windows");
    }

    #[test]
    fn test_validation_zero_concurrency() {
        expect_invalid("aggregation:\n  concurrency: 0\n", "concurrency");
    }

    #[test]
    fn test_validation_zero_lookback() {
        expect_invalid("aggregation:\n  lookback_hours: 0\n", "lookback_hours");
    }

    #[test]
    fn test_validation_zero_operation_timeout() {
        expect_invalid("storage:\n  operation_timeout_ms: 0\n", "operation_timeout_ms");
    }

    #[test]
    fn test_validation_zero_request_timeout() {
        expect_invalid("upstream:\n  request_timeout_ms: 0\n", "request_timeout_ms");
    }

    #[test]
    fn test_validation_zero_batch_size() {
        expect_invalid("consumer:\n  batch_size: 0\n", "batch_size");
    }

    #[test]
    fn test_validation_jitter_out_of_range() {
        expect_invalid("retry:\n  jitter_factor: 1.5\n", "jitter_factor");
    }

    #[test]
    fn test_validation_multiplier_below_one() {
        expect_invalid("retry:\n  multiplier: 0.5\n", "multiplier");
    }

    #[test]
    fn test_full_config_parse() {
        let yaml = r#"
consumer:
  batch_size: 250
  poll_interval_ms: 200
  timestamp_tolerance_ms: 1000
  max_price: "500000"

retry:
  bisection_budget: 6
  max_attempts: 3
  initial_backoff_ms: 50
  max_backoff_ms: 2000
  multiplier: 3.0
  jitter_factor: 0.0

aggregation:
  windows: [60, 10, 30]
  field: ask
  lookback_hours: 24
  concurrency: 4
  as_of_mode: latest_point

storage:
  operation_timeout_ms: 1500

output:
  root_dir: "/var/lib/quotes"
  granularity: day

scheduler:
  cadence_secs: 900
  run_on_start: true

upstream:
  pairs: ["btc/usd", "ETH/USD", "bogus"]

credentials:
  secret_env_var: "FX_API_KEY"
  ttl_secs: 60

observability:
  logging:
    level: "debug"
    format: "pretty"
  metrics:
    enabled: true
    listen_addr: "127.0.0.1:9100"
"#;

        let config = match load_config_from_string(yaml) {
            Ok(c) => c,
            Err(e) => panic!("should load full config: {e}"),
        };

        assert_eq!(config.consumer.batch_size, 250);
        assert_eq!(config.consumer.rules().max_price, dec!(500000));
        assert_eq!(config.consumer.poll_interval(), Duration::from_millis(200));

        let policy = config.retry.to_policy();
        assert_eq!(policy.bisection_budget, 6);
        assert_eq!(policy.initial_backoff, Duration::from_millis(50));
        assert!((policy.backoff_multiplier - 3.0).abs() < f64::EPSILON);

        let settings = match config
            .aggregation
            .to_settings(config.storage.operation_timeout())
        {
            Ok(s) => s,
            Err(e) => panic!("settings should build: {e}"),
        };
        assert_eq!(settings.windows.windows(), &[10, 30, 60]);
        assert_eq!(settings.field, PriceField::Ask);
        assert_eq!(settings.lookback, Duration::from_secs(24 * 3600));
        assert_eq!(settings.as_of_mode, AsOfMode::LatestPoint);
        assert_eq!(settings.operation_timeout, Duration::from_millis(1500));

        assert_eq!(config.output.granularity, PartitionGranularity::Day);
        assert_eq!(config.scheduler.cadence(), Duration::from_secs(900));
        assert!(config.scheduler.run_on_start);
        assert_eq!(
            config.upstream.currency_pairs(),
            vec![
                ("BTC".to_string(), "USD".to_string()),
                ("ETH".to_string(), "USD".to_string()),
            ]
        );
        assert_eq!(config.credentials.secret_env_var, "FX_API_KEY");
        assert_eq!(config.observability.logging.level, "debug");
        assert_eq!(config.observability.metrics.listen_addr.port(), 9100);
    }
}
