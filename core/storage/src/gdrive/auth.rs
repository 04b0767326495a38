//! Service-account authentication for Google Drive.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use oauth2::{AccessToken, Scope, TokenUrl};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use zeroize::Zeroize;

use locallydrive_common::{DriveSettings, Error, Result};

use crate::credential::{Credential, CredentialProvider};

/// Credential kind accepted from key files.
const SERVICE_ACCOUNT_TYPE: &str = "service_account";
/// OAuth2 token endpoint used when the key file names none.
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
/// Grant type for signed JWT assertions (RFC 7523).
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
/// Lifetime of a signed assertion.
const ASSERTION_LIFETIME_SECS: i64 = 3600;
/// Token lifetime assumed when the endpoint does not report one.
const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 3600;

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URL.to_string()
}

/// Parsed service-account key.
///
/// The private key is zeroized on drop and never printed.
#[derive(Deserialize)]
pub struct ServiceAccountCredential {
    #[serde(rename = "type")]
    credential_type: String,
    client_email: String,
    private_key: String,
    #[serde(default)]
    private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    token_uri: String,
}

impl ServiceAccountCredential {
    /// Parse a service-account key from its JSON form.
    ///
    /// # Errors
    /// - `Error::Credential` if the JSON is malformed, is not a service
    ///   account key, or lacks the signing identity
    pub fn from_json(json: &[u8]) -> Result<Self> {
        let credential: Self = serde_json::from_slice(json)
            .map_err(|e| Error::Credential(format!("Malformed service account key: {}", e)))?;

        if credential.credential_type != SERVICE_ACCOUNT_TYPE {
            return Err(Error::Credential(format!(
                "Expected credential type '{}', found '{}'",
                SERVICE_ACCOUNT_TYPE, credential.credential_type
            )));
        }
        if credential.client_email.trim().is_empty() {
            return Err(Error::Credential(
                "Service account key has no client_email".to_string(),
            ));
        }
        if credential.private_key.trim().is_empty() {
            return Err(Error::Credential(
                "Service account key has no private_key".to_string(),
            ));
        }

        Ok(credential)
    }

    /// Service account identity.
    pub fn client_email(&self) -> &str {
        &self.client_email
    }

    /// Token endpoint named by the key.
    pub fn token_uri(&self) -> &str {
        &self.token_uri
    }

    /// Narrow this credential to a single scope. Pure: no I/O.
    pub fn with_scope(self: &Arc<Self>, scope: impl Into<String>) -> ScopedCredential {
        ScopedCredential {
            base: Arc::clone(self),
            scope: Scope::new(scope.into()),
        }
    }
}

impl Drop for ServiceAccountCredential {
    fn drop(&mut self) {
        self.private_key.zeroize();
    }
}

impl fmt::Debug for ServiceAccountCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountCredential")
            .field("client_email", &self.client_email)
            .field("private_key", &"[REDACTED]")
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

/// JWT claims of a token assertion.
#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

/// Token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// A service-account credential narrowed to one scope.
#[derive(Debug, Clone)]
pub struct ScopedCredential {
    base: Arc<ServiceAccountCredential>,
    scope: Scope,
}

impl ScopedCredential {
    /// The granted scope.
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Sign the RS256 assertion exchanged for an access token.
    pub fn assertion(&self, issued_at: DateTime<Utc>) -> Result<String> {
        let key = EncodingKey::from_rsa_pem(self.base.private_key.as_bytes())
            .map_err(|e| Error::Credential(format!("Invalid service account private key: {}", e)))?;

        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.base.private_key_id.clone();

        let claims = AssertionClaims {
            iss: &self.base.client_email,
            scope: self.scope.as_str(),
            aud: &self.base.token_uri,
            iat: issued_at.timestamp(),
            exp: (issued_at + Duration::seconds(ASSERTION_LIFETIME_SECS)).timestamp(),
        };

        jsonwebtoken::encode(&header, &claims, &key)
            .map_err(|e| Error::Credential(format!("Failed to sign token assertion: {}", e)))
    }

    /// Exchange the signed assertion for a bearer credential.
    ///
    /// # Errors
    /// - `Error::Credential` if signing fails, the token endpoint is
    ///   unreachable, or the scope is rejected
    pub async fn authorize(&self, http: &Client) -> Result<Credential> {
        let token_url = TokenUrl::new(self.base.token_uri.clone())
            .map_err(|e| Error::Credential(format!("Invalid token URI: {}", e)))?;

        let issued_at = Utc::now();
        let assertion = self.assertion(issued_at)?;

        let response = http
            .post(token_url.url().clone())
            .form(&[
                ("grant_type", JWT_BEARER_GRANT),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::Credential(format!("Token request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Credential(format!(
                "Scope '{}' rejected: {} - {}",
                self.scope.as_str(),
                status,
                body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::Credential(format!("Failed to parse token response: {}", e)))?;

        let lifetime = token.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
        let expires_at = i64::try_from(lifetime)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|lifetime| issued_at.checked_add_signed(lifetime))
            .ok_or_else(|| {
                Error::Credential(format!(
                    "Token lifetime of {} seconds is out of range",
                    lifetime
                ))
            })?;

        Ok(Credential::new(
            self.scope.clone(),
            AccessToken::new(token.access_token),
            expires_at,
        ))
    }
}

/// Credential provider backed by a service-account key file.
///
/// Every call re-reads the key file and requests a fresh token.
pub struct ServiceAccountCredentialProvider {
    key_path: PathBuf,
    http: Client,
}

impl ServiceAccountCredentialProvider {
    /// Create a provider reading the key at `key_path`.
    ///
    /// # Errors
    /// - `Error::Configuration` if the path is blank
    pub fn new(key_path: impl Into<PathBuf>) -> Result<Self> {
        let key_path = key_path.into();
        if key_path.as_os_str().is_empty() {
            return Err(Error::Configuration(
                "Service account key path cannot be empty".to_string(),
            ));
        }

        let http = Client::builder()
            .build()
            .map_err(|e| Error::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { key_path, http })
    }

    /// Create a provider from validated settings.
    pub fn from_settings(settings: &DriveSettings) -> Result<Self> {
        settings.validate()?;
        Self::new(&settings.credentials_path)
    }

    /// Path of the key file.
    pub fn key_path(&self) -> &Path {
        &self.key_path
    }

    /// Read and parse the key file.
    ///
    /// # Errors
    /// - `Error::Credential` if the file is unreadable or malformed
    pub async fn resolve_credential(&self) -> Result<Arc<ServiceAccountCredential>> {
        let json = tokio::fs::read(&self.key_path).await.map_err(|e| {
            Error::Credential(format!(
                "Unable to read service account key '{}': {}",
                self.key_path.display(),
                e
            ))
        })?;

        ServiceAccountCredential::from_json(&json).map(Arc::new)
    }

    /// Narrow a resolved credential to `scope`.
    pub fn scope_credential(
        &self,
        base: &Arc<ServiceAccountCredential>,
        scope: &str,
    ) -> ScopedCredential {
        base.with_scope(scope)
    }
}

#[async_trait]
impl CredentialProvider for ServiceAccountCredentialProvider {
    async fn resolve_scoped(&self, scope: &str) -> Result<Credential> {
        let base = self.resolve_credential().await?;
        let scoped = self.scope_credential(&base, scope);

        tracing::debug!(
            client_email = base.client_email(),
            scope,
            "Requesting service account token"
        );
        scoped.authorize(&self.http).await
    }
}
