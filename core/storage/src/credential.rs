//! Scoped credentials and the provider seam used by the transfer client.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use oauth2::{AccessToken, Scope};
use std::collections::HashMap;
use tokio::sync::RwLock;

use locallydrive_common::Result;

/// Full read/write access to the object store.
pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";
/// Read-only access to the object store.
pub const DRIVE_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/drive.readonly";

/// Credentials within this window of expiry are treated as expired.
const EXPIRY_MARGIN_MINUTES: i64 = 5;

/// A bearer credential narrowed to one permission scope.
///
/// Time-bounded: callers must not use it past [`Credential::expires_at`].
#[derive(Debug, Clone)]
pub struct Credential {
    scope: Scope,
    access_token: AccessToken,
    expires_at: DateTime<Utc>,
}

impl Credential {
    /// Create a credential from an issued access token.
    pub fn new(scope: Scope, access_token: AccessToken, expires_at: DateTime<Utc>) -> Self {
        Self {
            scope,
            access_token,
            expires_at,
        }
    }

    /// The permission scope this credential grants.
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// When the underlying token expires.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Check if the credential is expired or about to expire.
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now() + Duration::minutes(EXPIRY_MARGIN_MINUTES)
    }

    /// Value for the `Authorization` header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token.secret())
    }
}

/// Source of scoped credentials.
///
/// Implementations resolve a fresh credential per call unless they document
/// otherwise; see [`CachedCredentialProvider`].
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Resolve a credential narrowed to `scope`.
    ///
    /// # Errors
    /// - `Error::Credential` if the secret is unreadable, malformed, or the
    ///   scope is rejected
    async fn resolve_scoped(&self, scope: &str) -> Result<Credential>;
}

/// Credential provider that reuses unexpired credentials per scope.
pub struct CachedCredentialProvider<P> {
    inner: P,
    cache: RwLock<HashMap<String, Credential>>,
}

impl<P: CredentialProvider> CachedCredentialProvider<P> {
    /// Wrap `inner` with a per-scope cache.
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Drop every cached credential.
    pub async fn clear(&self) {
        self.cache.write().await.clear();
    }

    /// Access the wrapped provider.
    pub fn inner(&self) -> &P {
        &self.inner
    }
}

#[async_trait]
impl<P: CredentialProvider> CredentialProvider for CachedCredentialProvider<P> {
    async fn resolve_scoped(&self, scope: &str) -> Result<Credential> {
        {
            let cache = self.cache.read().await;
            if let Some(credential) = cache.get(scope).filter(|c| !c.is_expired()) {
                return Ok(credential.clone());
            }
        }

        let mut cache = self.cache.write().await;

        // Double-check after acquiring write lock
        if let Some(credential) = cache.get(scope).filter(|c| !c.is_expired()) {
            return Ok(credential.clone());
        }

        tracing::debug!(scope, "Resolving credential for cache");
        let credential = self.inner.resolve_scoped(scope).await?;
        cache.insert(scope.to_string(), credential.clone());
        Ok(credential)
    }
}
