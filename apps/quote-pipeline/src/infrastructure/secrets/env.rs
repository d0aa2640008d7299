//! Environment variable secret source.

use async_trait::async_trait;

use crate::application::ports::{Secret, SecretError, SecretSourcePort};
use crate::domain::shared::SecretId;

/// Reads secrets from environment variables named by the secret id.
#[derive(Debug, Clone, Default)]
pub struct EnvSecretSource {
    prefix: String,
}

impl EnvSecretSource {
    /// Look secrets up by their id as the variable name.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepend `prefix` to every variable name.
    #[must_use]
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn var_name(&self, secret_id: &SecretId) -> String {
        format!("{}{}", self.prefix, secret_id.as_str())
    }
}

#[async_trait]
impl SecretSourcePort for EnvSecretSource {
    async fn fetch(&self, secret_id: &SecretId) -> Result<Secret, SecretError> {
        let name = self.var_name(secret_id);
        std::env::var(&name)
            .map(|value| Secret::new(value, None))
            .map_err(|_| SecretError::NotFound { secret_id: name })
    }
}
