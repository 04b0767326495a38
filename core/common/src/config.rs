//! Process configuration for the Drive access layer.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use url::Url;

use crate::{Error, Result};

/// Environment variable holding the service-account key path.
pub const CREDENTIALS_ENV: &str = "GOOGLE_APPLICATION_CREDENTIALS";
/// Optional application name override.
pub const APPLICATION_NAME_ENV: &str = "LOCALLYDRIVE_APPLICATION_NAME";
/// Optional Drive REST base URL override.
pub const API_BASE_ENV: &str = "LOCALLYDRIVE_API_BASE";
/// Optional Drive upload base URL override.
pub const UPLOAD_BASE_ENV: &str = "LOCALLYDRIVE_UPLOAD_BASE";

/// Default application name sent as the user agent.
pub const DEFAULT_APPLICATION_NAME: &str = "LocallyDrive";
/// Google Drive API base URL.
pub const DEFAULT_API_BASE: &str = "https://www.googleapis.com/drive/v3";
/// Google Drive upload API base URL.
pub const DEFAULT_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

/// Settings for the Drive access layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveSettings {
    /// Path to the service-account JSON key.
    pub credentials_path: PathBuf,
    /// Application name reported to the remote API.
    #[serde(default = "default_application_name")]
    pub application_name: String,
    /// Base URL for metadata and download calls.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Base URL for media uploads.
    #[serde(default = "default_upload_base")]
    pub upload_base: String,
}

fn default_application_name() -> String {
    DEFAULT_APPLICATION_NAME.to_string()
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_upload_base() -> String {
    DEFAULT_UPLOAD_BASE.to_string()
}

impl DriveSettings {
    /// Create settings pointing at the given key file with default endpoints.
    pub fn new(credentials_path: impl Into<PathBuf>) -> Self {
        Self {
            credentials_path: credentials_path.into(),
            application_name: default_application_name(),
            api_base: default_api_base(),
            upload_base: default_upload_base(),
        }
    }

    /// Load and validate settings from the process environment.
    ///
    /// # Errors
    /// - `GOOGLE_APPLICATION_CREDENTIALS` is absent or blank
    /// - An endpoint override is not a valid URL
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load and validate settings from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let credentials_path = non_blank(CREDENTIALS_ENV).unwrap_or_default();
        let mut settings = Self::new(credentials_path.trim());

        if let Some(name) = non_blank(APPLICATION_NAME_ENV) {
            settings.application_name = name;
        }
        if let Some(base) = non_blank(API_BASE_ENV) {
            settings.api_base = base;
        }
        if let Some(base) = non_blank(UPLOAD_BASE_ENV) {
            settings.upload_base = base;
        }

        settings.validate()?;
        tracing::debug!(
            credentials_path = %settings.credentials_path.display(),
            api_base = %settings.api_base,
            "Loaded drive settings"
        );
        Ok(settings)
    }

    /// Check that required settings are present and well-formed.
    pub fn validate(&self) -> Result<()> {
        if self.credentials_path.as_os_str().is_empty() {
            return Err(Error::Configuration(format!(
                "Environment variable '{}' must be configured.",
                CREDENTIALS_ENV
            )));
        }
        if self.application_name.trim().is_empty() {
            return Err(Error::Configuration(
                "Application name cannot be empty".to_string(),
            ));
        }
        self.api_base_url()?;
        self.upload_base_url()?;
        Ok(())
    }

    /// Parsed metadata/download base URL.
    pub fn api_base_url(&self) -> Result<Url> {
        parse_base(&self.api_base)
    }

    /// Parsed upload base URL.
    pub fn upload_base_url(&self) -> Result<Url> {
        parse_base(&self.upload_base)
    }
}

fn parse_base(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim_end_matches('/'))
        .map_err(|e| Error::Configuration(format!("Invalid endpoint '{}': {}", raw, e)))?;
    if url.cannot_be_a_base() {
        return Err(Error::Configuration(format!(
            "Endpoint '{}' cannot be used as a base URL",
            raw
        )));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_missing_credentials_fails_fast() {
        let err = DriveSettings::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(err.to_string().contains(CREDENTIALS_ENV));
    }

    #[test]
    fn test_blank_credentials_fails_fast() {
        let err = DriveSettings::from_lookup(lookup(&[(CREDENTIALS_ENV, "   ")])).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_defaults_applied() {
        let settings =
            DriveSettings::from_lookup(lookup(&[(CREDENTIALS_ENV, "/etc/sa.json")])).unwrap();
        assert_eq!(settings.credentials_path, PathBuf::from("/etc/sa.json"));
        assert_eq!(settings.application_name, DEFAULT_APPLICATION_NAME);
        assert_eq!(settings.api_base, DEFAULT_API_BASE);
        assert_eq!(settings.upload_base, DEFAULT_UPLOAD_BASE);
    }

    #[test]
    fn test_overrides_applied() {
        let settings = DriveSettings::from_lookup(lookup(&[
            (CREDENTIALS_ENV, "/etc/sa.json"),
            (APPLICATION_NAME_ENV, "Reports"),
            (API_BASE_ENV, "http://localhost:9000/drive/v3/"),
        ]))
        .unwrap();
        assert_eq!(settings.application_name, "Reports");
        assert_eq!(
            settings.api_base_url().unwrap().as_str(),
            "http://localhost:9000/drive/v3"
        );
    }

    #[test]
    fn test_invalid_endpoint_rejected() {
        let err = DriveSettings::from_lookup(lookup(&[
            (CREDENTIALS_ENV, "/etc/sa.json"),
            (UPLOAD_BASE_ENV, "not a url"),
        ]))
        .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_settings_deserialize_with_defaults() {
        let settings: DriveSettings =
            serde_json::from_str(r#"{"credentials_path": "/tmp/key.json"}"#).unwrap();
        assert_eq!(settings.api_base, DEFAULT_API_BASE);
        assert!(settings.validate().is_ok());
    }
}
