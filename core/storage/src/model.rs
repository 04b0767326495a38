//! Request and result shapes for the Drive access layer.

use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::io::SeekFrom;
use tokio::io::{AsyncRead, AsyncSeek, AsyncSeekExt};
use tokio_util::io::ReaderStream;

use locallydrive_common::{Error, Result};

/// MIME type Drive uses for folders.
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Smallest page size the remote API accepts.
pub const MIN_PAGE_SIZE: i32 = 1;
/// Largest page size the remote API accepts.
pub const MAX_PAGE_SIZE: i32 = 1000;
/// Page size used when none is given.
pub const DEFAULT_PAGE_SIZE: i32 = 100;

/// Ordering for plain listings: most recently modified first, then by name.
pub const DEFAULT_ORDER_BY: &str = "modifiedTime desc,name";
/// Ordering for folder listings: folders first, then by name.
pub const FOLDER_ORDER_BY: &str = "folder,name";

/// Snapshot of a stored object's metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredObjectMetadata {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub size_bytes: Option<i64>,
    pub modified_at: Option<DateTime<Utc>>,
    pub parent_ids: Option<Vec<String>>,
}

impl StoredObjectMetadata {
    /// Check if this is a folder.
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME_TYPE
    }
}

/// Result of a confirmed upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub size_bytes: Option<i64>,
    pub web_view_link: Option<String>,
}

/// One page of listing results, in remote order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResult {
    pub files: Vec<StoredObjectMetadata>,
    /// Present iff more results exist.
    pub next_page_token: Option<String>,
}

impl ListResult {
    /// Whether another page can be requested.
    pub fn has_more(&self) -> bool {
        self.next_page_token.is_some()
    }
}

/// Parameters of a listing call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListRequest {
    pub page_size: i32,
    pub page_token: Option<String>,
    /// Caller predicate in the remote query language.
    pub filter: Option<String>,
    pub order_by: Option<String>,
    pub include_trashed: bool,
}

impl Default for ListRequest {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

impl ListRequest {
    /// Listing of `page_size` objects, trashed excluded, default order.
    pub fn new(page_size: i32) -> Self {
        Self {
            page_size,
            page_token: None,
            filter: None,
            order_by: None,
            include_trashed: false,
        }
    }

    pub fn with_page_token(mut self, token: impl Into<String>) -> Self {
        self.page_token = Some(token.into());
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }

    pub fn include_trashed(mut self, include: bool) -> Self {
        self.include_trashed = include;
        self
    }
}

/// Check a page size against the remote API's hard limits.
pub fn validate_page_size(page_size: i32) -> Result<u32> {
    if !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&page_size) {
        return Err(Error::validation(
            "page_size",
            format!(
                "Page size must be between {} and {}, got {}.",
                MIN_PAGE_SIZE, MAX_PAGE_SIZE, page_size
            ),
        ));
    }
    Ok(page_size as u32)
}

/// A reader that can be rewound before upload.
pub trait SeekableRead: AsyncRead + AsyncSeek + Send + Unpin {}

impl<T> SeekableRead for T where T: AsyncRead + AsyncSeek + Send + Unpin + ?Sized {}

/// Content to upload.
///
/// Readers are borrowed: the client reads from them but never closes them.
pub enum UploadContent<'a> {
    /// Owned in-memory content.
    Bytes(Bytes),
    /// Seekable reader, rewound to offset 0 before transfer.
    Seekable(&'a mut dyn SeekableRead),
    /// Forward-only reader, consumed once.
    Stream(&'a mut (dyn AsyncRead + Send + Unpin)),
}

/// Read size used when draining upload readers.
pub const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Drain `reader` chunk by chunk, calling `on_progress` with the running total.
async fn drain<R>(reader: R, mut on_progress: impl FnMut(u64)) -> std::io::Result<Bytes>
where
    R: AsyncRead + Unpin,
{
    let mut stream = ReaderStream::with_capacity(reader, UPLOAD_CHUNK_SIZE);
    let mut buf = BytesMut::new();

    while let Some(chunk) = stream.next().await {
        buf.extend_from_slice(&chunk?);
        on_progress(buf.len() as u64);
    }
    Ok(buf.freeze())
}

impl UploadContent<'_> {
    /// Read the full content, rewinding seekable readers first.
    ///
    /// `on_progress` receives the number of bytes read so far after every chunk.
    pub async fn read_all(self, mut on_progress: impl FnMut(u64)) -> std::io::Result<Bytes> {
        match self {
            UploadContent::Bytes(bytes) => {
                on_progress(bytes.len() as u64);
                Ok(bytes)
            }
            UploadContent::Seekable(reader) => {
                reader.seek(SeekFrom::Start(0)).await?;
                drain(reader, on_progress).await
            }
            UploadContent::Stream(reader) => drain(reader, on_progress).await,
        }
    }
}

impl fmt::Debug for UploadContent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadContent::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            UploadContent::Seekable(_) => f.write_str("Seekable(..)"),
            UploadContent::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Upload request: content plus the object's name, type and parents.
#[derive(Debug)]
pub struct UploadRequest<'a> {
    pub content: Option<UploadContent<'a>>,
    pub file_name: String,
    pub mime_type: String,
    pub parent_folder_ids: Option<BTreeSet<String>>,
}

impl<'a> UploadRequest<'a> {
    /// Start a request without content.
    pub fn new(file_name: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            content: None,
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            parent_folder_ids: None,
        }
    }

    /// Request uploading owned bytes.
    pub fn from_bytes(
        data: impl Into<Bytes>,
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        Self::new(file_name, mime_type).with_content(UploadContent::Bytes(data.into()))
    }

    pub fn with_content(mut self, content: UploadContent<'a>) -> Self {
        self.content = Some(content);
        self
    }

    /// Upload from a seekable reader.
    pub fn with_seekable(self, reader: &'a mut dyn SeekableRead) -> Self {
        self.with_content(UploadContent::Seekable(reader))
    }

    /// Upload from a forward-only reader.
    pub fn with_reader(self, reader: &'a mut (dyn AsyncRead + Send + Unpin)) -> Self {
        self.with_content(UploadContent::Stream(reader))
    }

    /// Add a parent folder.
    pub fn with_parent(mut self, folder_id: impl Into<String>) -> Self {
        self.parent_folder_ids
            .get_or_insert_with(BTreeSet::new)
            .insert(folder_id.into());
        self
    }

    /// Check preconditions in order; the first violation wins.
    ///
    /// Readability is guaranteed by the `AsyncRead` bound of every content
    /// variant, so it needs no runtime check.
    pub fn validate(&self) -> Result<()> {
        if self.content.is_none() {
            return Err(Error::validation("content", "The content stream is required."));
        }
        if self.file_name.trim().is_empty() {
            return Err(Error::validation("file_name", "The file name is required."));
        }
        if self.mime_type.trim().is_empty() {
            return Err(Error::validation(
                "mime_type",
                "The file mime type is required.",
            ));
        }
        Ok(())
    }
}
