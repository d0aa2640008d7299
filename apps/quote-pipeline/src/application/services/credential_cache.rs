//! Credential Cache
//!
//! Process-wide holder of the upstream API key. The secret is fetched on the
//! first `get()` and refetched once it is older than the TTL or past the
//! expiry reported by its source. Concurrent callers wait on one fetch.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::application::ports::{Secret, SecretError, SecretSourcePort};
use crate::domain::shared::{SecretId, Timestamp};

/// Credential retrieval error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    /// The secret source failed.
    #[error(transparent)]
    Source(#[from] SecretError),

    /// The secret exists but is empty.
    #[error("Secret {secret_id} is empty")]
    Empty {
        /// Secret id.
        secret_id: String,
    },
}

#[derive(Debug)]
struct CachedSecret {
    secret: Secret,
    fetched_at: Instant,
}

/// Lazily initialized, TTL-refreshed secret.
pub struct CredentialCache<S>
where
    S: SecretSourcePort + ?Sized,
{
    source: Arc<S>,
    secret_id: SecretId,
    ttl: Duration,
    cached: Mutex<Option<CachedSecret>>,
}

impl<S> CredentialCache<S>
where
    S: SecretSourcePort + ?Sized,
{
    /// Create an empty cache. Nothing is fetched until the first `get()`.
    pub fn new(source: Arc<S>, secret_id: SecretId, ttl: Duration) -> Self {
        Self {
            source,
            secret_id,
            ttl,
            cached: Mutex::new(None),
        }
    }

    /// Current secret, fetching it if missing or stale.
    pub async fn get(&self) -> Result<Secret, CredentialError> {
        let mut cached = self.cached.lock().await;

        if let Some(entry) = cached.as_ref() {
            if self.is_fresh(entry) {
                return Ok(entry.secret.clone());
            }
            tracing::debug!(secret_id = %self.secret_id, "Cached credential is stale, refreshing");
        }

        let secret = self.source.fetch(&self.secret_id).await?;
        if secret.expose().trim().is_empty() {
            return Err(CredentialError::Empty {
                secret_id: self.secret_id.to_string(),
            });
        }

        tracing::info!(secret_id = %self.secret_id, "Fetched credential");
        *cached = Some(CachedSecret {
            secret: secret.clone(),
            fetched_at: Instant::now(),
        });
        Ok(secret)
    }

    /// Forget the cached secret so the next `get()` refetches it.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }

    fn is_fresh(&self, entry: &CachedSecret) -> bool {
        if entry.fetched_at.elapsed() >= self.ttl {
            return false;
        }
        entry
            .secret
            .expires_at()
            .is_none_or(|expires_at| Timestamp::now() < expires_at)
    }
}
