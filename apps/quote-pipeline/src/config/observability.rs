//! Observability configuration for logging and metrics.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ObservabilityConfig {
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Prometheus exporter configuration.
    #[serde(default)]
    pub metrics: MetricsSettings,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format (`json`, `pretty` or `compact`).
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Prometheus exporter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSettings {
    /// Start the exporter.
    #[serde(default)]
    pub enabled: bool,
    /// Listener address for `/metrics`.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_log_level() -> String {
    "quote_pipeline=info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9090))
}
