//! In-memory transport and credentials for testing.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{Duration, Utc};
use oauth2::{AccessToken, Scope};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};
use uuid::Uuid;

use locallydrive_common::{Error, Result};

use crate::credential::{Credential, CredentialProvider};
use crate::progress::ProgressReporter;
use crate::query::NOT_TRASHED;
use crate::transport::{
    DriveTransport, FileList, ListParams, NewFileMetadata, RemoteFile, UploadOutcome,
};

/// Bytes per simulated download chunk.
const DOWNLOAD_CHUNK: usize = 64 * 1024;

/// In-memory object entry.
#[derive(Debug, Clone)]
struct Entry {
    file: RemoteFile,
    data: Vec<u8>,
    trashed: bool,
}

/// In-memory Drive transport.
///
/// Useful for testing and offline development. Objects are listed in
/// insertion order; `orderBy` is recorded but not applied. Of the filter
/// language only the trashed and parent-containment clauses are honored.
/// Page tokens are decimal offsets.
#[derive(Default)]
pub struct MemoryTransport {
    entries: RwLock<Vec<Entry>>,
    scripted_uploads: Mutex<VecDeque<UploadOutcome>>,
    list_requests: Mutex<Vec<ListParams>>,
    calls: AtomicUsize,
}

impl MemoryTransport {
    /// Create a new empty transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an object and return its id.
    pub fn insert(&self, name: &str, mime_type: &str, parents: &[&str], data: &[u8]) -> String {
        self.insert_entry(name, mime_type, parents, data, false)
    }

    /// Store a trashed object and return its id.
    pub fn insert_trashed(&self, name: &str, mime_type: &str, parents: &[&str]) -> String {
        self.insert_entry(name, mime_type, parents, &[], true)
    }

    fn insert_entry(
        &self,
        name: &str,
        mime_type: &str,
        parents: &[&str],
        data: &[u8],
        trashed: bool,
    ) -> String {
        let id = Uuid::new_v4().simple().to_string();
        let parents = if parents.is_empty() {
            None
        } else {
            Some(parents.iter().map(|p| p.to_string()).collect())
        };
        let file = RemoteFile {
            id: Some(id.clone()),
            name: Some(name.to_string()),
            mime_type: Some(mime_type.to_string()),
            size: Some(data.len().to_string()),
            modified_time: Some(Utc::now()),
            parents,
            web_view_link: Some(format!("https://drive.google.com/file/d/{}/view", id)),
        };

        self.entries.write().unwrap().push(Entry {
            file,
            data: data.to_vec(),
            trashed,
        });
        id
    }

    /// Make the next upload end with `outcome` instead of storing the object.
    pub fn script_upload(&self, outcome: UploadOutcome) {
        self.scripted_uploads.lock().unwrap().push_back(outcome);
    }

    /// Number of transport calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Parameters of every list call, oldest first.
    pub fn list_requests(&self) -> Vec<ListParams> {
        self.list_requests.lock().unwrap().clone()
    }

    /// Stored content of an object.
    pub fn content(&self, id: &str) -> Option<Vec<u8>> {
        self.entries
            .read()
            .unwrap()
            .iter()
            .find(|e| e.file.id.as_deref() == Some(id))
            .map(|e| e.data.clone())
    }

    /// Number of stored objects, trashed included.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Extract the folder id of a `('<id>' in parents)` clause, undoing escapes.
fn parent_in_query(q: &str) -> Option<String> {
    let start = q.find("('")? + 2;
    let mut id = String::new();
    let mut chars = q[start..].chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => id.push(chars.next()?),
            '\'' => {
                return chars
                    .as_str()
                    .starts_with(" in parents)")
                    .then_some(id);
            }
            _ => id.push(c),
        }
    }
    None
}

#[async_trait]
impl DriveTransport for MemoryTransport {
    async fn create_file(
        &self,
        _credential: &Credential,
        metadata: &NewFileMetadata,
        mime_type: &str,
        content: Bytes,
        _fields: &str,
    ) -> Result<UploadOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(outcome) = self.scripted_uploads.lock().unwrap().pop_front() {
            return Ok(outcome);
        }

        let parents: Vec<&str> = metadata
            .parents
            .iter()
            .flatten()
            .map(String::as_str)
            .collect();
        let id = self.insert(&metadata.name, mime_type, &parents, &content);

        let file = self
            .entries
            .read()
            .unwrap()
            .iter()
            .find(|e| e.file.id.as_deref() == Some(id.as_str()))
            .map(|e| e.file.clone());
        Ok(UploadOutcome::completed(file))
    }

    async fn list_files(&self, _credential: &Credential, params: &ListParams) -> Result<FileList> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.list_requests.lock().unwrap().push(params.clone());

        let q = params.q.as_deref().unwrap_or_default();
        let exclude_trashed = q.contains(&format!("({})", NOT_TRASHED));
        let parent = parent_in_query(q);

        let entries = self.entries.read().unwrap();
        let matching: Vec<&Entry> = entries
            .iter()
            .filter(|e| !(exclude_trashed && e.trashed))
            .filter(|e| match &parent {
                Some(parent) => e.file.parents.iter().flatten().any(|p| p == parent),
                None => true,
            })
            .collect();

        let offset = match &params.page_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| Error::transfer("HTTP 400", format!("Invalid page token: {}", token)))?,
            None => 0,
        };
        let end = offset
            .saturating_add(params.page_size as usize)
            .min(matching.len());
        let files = matching
            .get(offset..end)
            .unwrap_or_default()
            .iter()
            .map(|e| e.file.clone())
            .collect();
        let next_page_token = (end < matching.len()).then(|| end.to_string());

        Ok(FileList {
            files,
            next_page_token,
        })
    }

    async fn download(
        &self,
        _credential: &Credential,
        file_id: &str,
        progress: &ProgressReporter,
    ) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let data = self
            .content(file_id)
            .ok_or_else(|| Error::transfer("HTTP 404", format!("File not found: {}", file_id)))?;

        let mut buffer = Vec::with_capacity(data.len());
        for chunk in data.chunks(DOWNLOAD_CHUNK) {
            buffer.extend_from_slice(chunk);
            progress.downloading(buffer.len() as u64);
        }
        Ok(buffer)
    }
}

/// Credential provider issuing a fixed token.
pub struct StaticCredentialProvider {
    token: String,
    failure: Option<String>,
    lifetime: Duration,
    requested: Mutex<Vec<String>>,
}

impl StaticCredentialProvider {
    /// Provider issuing `token` for any scope, valid for one hour.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            failure: None,
            lifetime: Duration::hours(1),
            requested: Mutex::new(Vec::new()),
        }
    }

    /// Provider whose every resolution fails with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::new("")
        }
    }

    /// Set how long issued credentials stay valid.
    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    /// Number of resolutions attempted.
    pub fn resolutions(&self) -> usize {
        self.requested.lock().unwrap().len()
    }

    /// Scopes requested so far, oldest first.
    pub fn requested_scopes(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn resolve_scoped(&self, scope: &str) -> Result<Credential> {
        self.requested.lock().unwrap().push(scope.to_string());

        if let Some(message) = &self.failure {
            return Err(Error::Credential(message.clone()));
        }

        Ok(Credential::new(
            Scope::new(scope.to_string()),
            AccessToken::new(self.token.clone()),
            Utc::now() + self.lifetime,
        ))
    }
}
