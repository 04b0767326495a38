//! Transport trait and Drive wire records.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use locallydrive_common::Result;

use crate::credential::Credential;
use crate::progress::ProgressReporter;

/// Drive file record as returned by the API.
///
/// Every field is optional: which ones populate depends on the requested
/// field projection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Size in bytes, encoded as a decimal string (int64 on the wire).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parents: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_view_link: Option<String>,
}

/// One page of a files listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileList {
    #[serde(default)]
    pub files: Vec<RemoteFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

/// Metadata part of a create-object call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFileMetadata {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parents: Option<Vec<String>>,
}

/// Query parameters of a list-objects call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListParams {
    pub page_size: u32,
    pub page_token: Option<String>,
    pub order_by: String,
    pub spaces: String,
    pub fields: String,
    pub q: Option<String>,
}

impl ListParams {
    /// Render as URL query pairs, skipping absent values.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("pageSize", self.page_size.to_string()),
            ("orderBy", self.order_by.clone()),
            ("spaces", self.spaces.clone()),
            ("fields", self.fields.clone()),
        ];
        if let Some(token) = &self.page_token {
            pairs.push(("pageToken", token.clone()));
        }
        if let Some(q) = &self.q {
            pairs.push(("q", q.clone()));
        }
        pairs
    }
}

/// Status of an upload as reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    NotStarted,
    Starting,
    Uploading,
    Completed,
    Failed,
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UploadStatus::NotStarted => "NotStarted",
            UploadStatus::Starting => "Starting",
            UploadStatus::Uploading => "Uploading",
            UploadStatus::Completed => "Completed",
            UploadStatus::Failed => "Failed",
        };
        f.write_str(name)
    }
}

/// Terminal state of a create-object call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    pub status: UploadStatus,
    /// Parsed response body, when the remote side returned one.
    pub response: Option<RemoteFile>,
    /// Underlying cause for non-completed outcomes or unreadable bodies.
    pub error: Option<String>,
}

impl UploadOutcome {
    /// Completed upload with the given response body.
    pub fn completed(response: Option<RemoteFile>) -> Self {
        Self {
            status: UploadStatus::Completed,
            response,
            error: None,
        }
    }

    /// Failed upload with a cause message.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: UploadStatus::Failed,
            response: None,
            error: Some(error.into()),
        }
    }
}

/// Wire-level access to the object store.
///
/// Implementations perform exactly one remote attempt per call. Retry,
/// backoff and rate limiting belong to callers.
#[async_trait]
pub trait DriveTransport: Send + Sync {
    /// Create an object from metadata and media in a single call.
    ///
    /// Transfer failures are expressed as a non-completed [`UploadOutcome`].
    /// Only a rejected credential is an error (`Error::Credential`), the same
    /// as for the other calls.
    async fn create_file(
        &self,
        credential: &Credential,
        metadata: &NewFileMetadata,
        mime_type: &str,
        content: Bytes,
        fields: &str,
    ) -> Result<UploadOutcome>;

    /// Fetch one page of the files listing.
    async fn list_files(&self, credential: &Credential, params: &ListParams) -> Result<FileList>;

    /// Download an object's media, reporting progress as bytes arrive.
    async fn download(
        &self,
        credential: &Credential,
        file_id: &str,
        progress: &ProgressReporter,
    ) -> Result<Vec<u8>>;
}
