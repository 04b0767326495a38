//! File transfer client: upload, list and download against a Drive transport.

use std::collections::HashSet;
use std::future::Future;
use std::io::Cursor;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use locallydrive_common::{DriveSettings, Error, Result};

use crate::credential::{Credential, CredentialProvider, DRIVE_SCOPE};
use crate::gdrive::{DriveHttpTransport, ServiceAccountCredentialProvider};
use crate::mapper::{self, FILE_PROJECTION};
use crate::model::{
    validate_page_size, ListRequest, ListResult, StoredObjectMetadata, UploadRequest,
    UploadResult, DEFAULT_ORDER_BY, FOLDER_ORDER_BY,
};
use crate::progress::{ProgressReporter, ProgressSender};
use crate::query::QueryBuilder;
use crate::transport::{DriveTransport, ListParams, NewFileMetadata, UploadStatus};

/// Space searched by list calls.
const DRIVE_SPACE: &str = "drive";

/// Run `fut` unless `cancel` fires first.
async fn cancellable<T>(
    cancel: &CancellationToken,
    operation: &str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled(format!("{} was cancelled", operation))),
        result = fut => result,
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Client for the remote object store.
///
/// Holds no per-operation state: every call resolves its own credential, so
/// one instance can serve concurrent callers. Each call makes at most one
/// remote attempt.
pub struct DriveClient {
    credentials: Arc<dyn CredentialProvider>,
    transport: Arc<dyn DriveTransport>,
    scope: String,
}

impl DriveClient {
    /// Create a client from a credential provider and a transport.
    pub fn new(
        credentials: Arc<dyn CredentialProvider>,
        transport: Arc<dyn DriveTransport>,
    ) -> Self {
        Self {
            credentials,
            transport,
            scope: DRIVE_SCOPE.to_string(),
        }
    }

    /// Create a client backed by the service-account key and endpoints in `settings`.
    ///
    /// # Errors
    /// - `Error::Configuration` if the settings are invalid
    pub fn from_settings(settings: &DriveSettings) -> Result<Self> {
        let credentials = ServiceAccountCredentialProvider::from_settings(settings)?;
        let transport = DriveHttpTransport::new(settings)?;
        Ok(Self::new(Arc::new(credentials), Arc::new(transport)))
    }

    /// Request credentials for `scope` instead of full Drive access.
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    async fn credential(&self, cancel: &CancellationToken) -> Result<Credential> {
        cancellable(cancel, "Credential resolution", async {
            self.credentials.resolve_scoped(&self.scope).await
        })
        .await
    }

    /// Upload content as a new object.
    ///
    /// # Preconditions
    /// - `request` has content, a non-blank file name and MIME type
    ///
    /// # Postconditions
    /// - On success the object exists remotely and the result id is non-empty
    ///
    /// # Errors
    /// - `Error::Validation` for a bad request, before any remote call
    /// - `Error::Credential` if no credential could be obtained or it was rejected
    /// - `Error::Transfer` if the upload did not complete with a usable body
    /// - `Error::Cancelled` if `cancel` fired first
    pub async fn upload(
        &self,
        request: UploadRequest<'_>,
        progress: Option<ProgressSender>,
        cancel: &CancellationToken,
    ) -> Result<UploadResult> {
        request.validate()?;

        let UploadRequest {
            content,
            file_name,
            mime_type,
            parent_folder_ids,
        } = request;
        let content = content
            .ok_or_else(|| Error::validation("content", "The content stream is required."))?;

        let reporter = ProgressReporter::new(file_name.clone(), progress);
        let credential = self.credential(cancel).await?;

        let result = cancellable(cancel, "Upload", async {
            let data = content
                .read_all(|read| reporter.uploading(read))
                .await
                .map_err(|e| Error::transfer(UploadStatus::Failed.to_string(), e.to_string()))?;
            let sent = data.len() as u64;

            let metadata = NewFileMetadata {
                name: file_name.clone(),
                parents: parent_folder_ids.map(|ids| ids.into_iter().collect()),
            };
            let outcome = self
                .transport
                .create_file(&credential, &metadata, &mime_type, data, FILE_PROJECTION)
                .await?;

            if outcome.status != UploadStatus::Completed {
                return Err(Error::transfer(
                    outcome.status.to_string(),
                    outcome.error.unwrap_or_default(),
                ));
            }

            let file = outcome.response.ok_or_else(|| {
                let cause = outcome
                    .error
                    .unwrap_or_else(|| "no response body".to_string());
                Error::transfer(
                    UploadStatus::Completed.to_string(),
                    format!("Drive did not return file metadata after upload: {}", cause),
                )
            })?;

            mapper::to_upload_result(file, &file_name, &mime_type).map(|uploaded| (uploaded, sent))
        })
        .await;

        match result {
            Ok((uploaded, sent)) => {
                reporter.completed(sent);
                info!(
                    file_id = %uploaded.id,
                    file_name = %uploaded.name,
                    bytes = sent,
                    "Drive upload completed"
                );
                Ok(uploaded)
            }
            Err(e) => {
                reporter.failed(e.to_string());
                Err(e)
            }
        }
    }

    /// List one page of objects.
    ///
    /// Trashed objects are excluded unless `include_trashed` is set; the
    /// exclusion is ANDed with any caller filter.
    ///
    /// # Errors
    /// - `Error::Validation` if the page size is outside [1, 1000]
    /// - `Error::Credential` / `Error::Transfer` / `Error::Cancelled`
    pub async fn list(
        &self,
        request: &ListRequest,
        cancel: &CancellationToken,
    ) -> Result<ListResult> {
        let page_size = validate_page_size(request.page_size)?;

        let mut query = QueryBuilder::new();
        if !request.include_trashed {
            query = query.exclude_trashed();
        }
        if let Some(filter) = non_blank(request.filter.as_deref()) {
            query = query.predicate(filter);
        }
        let order_by = non_blank(request.order_by.as_deref()).unwrap_or(DEFAULT_ORDER_BY);

        self.execute_list(
            page_size,
            request.page_token.as_deref(),
            order_by,
            &query,
            cancel,
        )
        .await
    }

    /// List one page of a folder's children, folders first.
    ///
    /// # Errors
    /// - `Error::Validation` if `folder_id` is blank or the page size is out of range
    pub async fn list_by_folder(
        &self,
        folder_id: &str,
        page_size: i32,
        page_token: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<ListResult> {
        if folder_id.trim().is_empty() {
            return Err(Error::validation("folder_id", "Folder id is required."));
        }
        let page_size = validate_page_size(page_size)?;

        let query = QueryBuilder::new().exclude_trashed().in_parents(folder_id);
        self.execute_list(page_size, page_token, FOLDER_ORDER_BY, &query, cancel)
            .await
    }

    /// Follow page tokens from `request` until the listing is exhausted.
    ///
    /// An empty page that still carries a token is not terminal. A token the
    /// remote side already returned is an error rather than a loop.
    pub async fn list_all(
        &self,
        request: &ListRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<StoredObjectMetadata>> {
        let mut request = request.clone();
        let mut files = Vec::new();
        let mut seen_tokens = HashSet::new();

        loop {
            let page = self.list(&request, cancel).await?;
            files.extend(page.files);

            match page.next_page_token {
                Some(token) => {
                    if !seen_tokens.insert(token.clone()) {
                        return Err(Error::transfer(
                            "Completed",
                            format!("Pagination did not advance: token '{}' repeated", token),
                        ));
                    }
                    request.page_token = Some(token);
                }
                None => break,
            }
        }

        Ok(files)
    }

    async fn execute_list(
        &self,
        page_size: u32,
        page_token: Option<&str>,
        order_by: &str,
        query: &QueryBuilder,
        cancel: &CancellationToken,
    ) -> Result<ListResult> {
        let params = ListParams {
            page_size,
            page_token: non_blank(page_token).map(String::from),
            order_by: order_by.to_string(),
            spaces: DRIVE_SPACE.to_string(),
            fields: mapper::list_projection(),
            q: query.build(),
        };

        let credential = self.credential(cancel).await?;
        let list = cancellable(
            cancel,
            "List",
            self.transport.list_files(&credential, &params),
        )
        .await?;
        let result = mapper::to_list_result(list);

        debug!(
            count = result.files.len(),
            has_more = result.has_more(),
            q = params.q.as_deref().unwrap_or_default(),
            "Listed Drive files"
        );
        Ok(result)
    }

    /// Download an object into memory.
    ///
    /// Progress events go to `progress` when given; the returned buffer is
    /// positioned at offset 0.
    ///
    /// # Errors
    /// - `Error::Validation` if `object_id` is blank, before any remote call
    /// - `Error::Credential` if the transfer never started for lack of a credential
    /// - `Error::Transfer` if the transfer started and broke
    /// - `Error::Cancelled` if `cancel` fired first
    pub async fn download(
        &self,
        object_id: &str,
        progress: Option<ProgressSender>,
        cancel: &CancellationToken,
    ) -> Result<Cursor<Vec<u8>>> {
        if object_id.trim().is_empty() {
            return Err(Error::validation("object_id", "File id is required."));
        }

        let reporter = ProgressReporter::new(object_id, progress);

        let credential = match self.credential(cancel).await {
            Ok(credential) => credential,
            Err(e) => {
                error!(
                    file_id = object_id,
                    error = %e,
                    "Failed to resolve credentials while downloading file"
                );
                reporter.failed(e.to_string());
                return Err(e);
            }
        };

        let result = cancellable(
            cancel,
            "Download",
            self.transport.download(&credential, object_id, &reporter),
        )
        .await;

        match result {
            Ok(data) => {
                reporter.completed(data.len() as u64);
                Ok(Cursor::new(data))
            }
            Err(e) => {
                reporter.failed(e.to_string());
                Err(e)
            }
        }
    }
}
