//! Upstream credential configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Where the upstream API key comes from and how long it is cached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    /// Environment variable holding the API key.
    #[serde(default = "default_secret_env_var")]
    pub secret_env_var: String,
    /// Seconds a fetched key is reused before it is fetched again.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            secret_env_var: default_secret_env_var(),
            ttl_secs: default_ttl_secs(),
        }
    }
}

impl CredentialsConfig {
    /// Cache lifetime as a `Duration`.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

fn default_secret_env_var() -> String {
    "UPSTREAM_API_KEY".to_string()
}

const fn default_ttl_secs() -> u64 {
    900
}
