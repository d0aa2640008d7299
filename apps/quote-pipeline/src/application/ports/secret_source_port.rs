//! Secret Source Port (Driven Port)

use async_trait::async_trait;

use crate::domain::shared::{SecretId, Timestamp};

/// A secret value with an optional expiry reported by its source.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret {
    value: String,
    expires_at: Option<Timestamp>,
}

impl Secret {
    /// Create a secret.
    #[must_use]
    pub fn new(value: impl Into<String>, expires_at: Option<Timestamp>) -> Self {
        Self {
            value: value.into(),
            expires_at,
        }
    }

    /// The secret value.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.value
    }

    /// When the source says the secret stops being valid.
    #[must_use]
    pub const fn expires_at(&self) -> Option<Timestamp> {
        self.expires_at
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secret")
            .field("value", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Secret source error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SecretError {
    /// No secret under that id.
    #[error("Secret not found: {secret_id}")]
    NotFound {
        /// Requested id.
        secret_id: String,
    },

    /// Source unreachable.
    #[error("Secret source unavailable: {message}")]
    Unavailable {
        /// Error details.
        message: String,
    },
}

/// Port for secret retrieval.
#[async_trait]
pub trait SecretSourcePort: Send + Sync {
    /// Fetch the current value of a secret.
    async fn fetch(&self, secret_id: &SecretId) -> Result<Secret, SecretError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_value() {
        let secret = Secret::new("hunter2", None);
        let debug = format!("{secret:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("REDACTED"));
        assert_eq!(secret.expose(), "hunter2");
    }
}
