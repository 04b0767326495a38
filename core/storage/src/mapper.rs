//! Mapping from Drive wire records to result shapes.

use locallydrive_common::{Error, Result};

use crate::model::{ListResult, StoredObjectMetadata, UploadResult};
use crate::transport::{FileList, RemoteFile};

/// Field projection requested on every call.
pub const FILE_PROJECTION: &str = "id,name,mimeType,size,modifiedTime,parents,webViewLink";

/// Projection for list calls: the page token plus the per-file projection.
pub fn list_projection() -> String {
    format!("nextPageToken,files({})", FILE_PROJECTION)
}

/// Parse the int64-as-string size. Unparseable values map to `None`.
fn parse_size(size: Option<&str>) -> Option<i64> {
    size.and_then(|s| s.trim().parse().ok())
}

/// Convert a listed file, defaulting missing strings to empty.
pub fn to_metadata(file: RemoteFile) -> StoredObjectMetadata {
    let size_bytes = parse_size(file.size.as_deref());
    StoredObjectMetadata {
        id: file.id.unwrap_or_default(),
        name: file.name.unwrap_or_default(),
        mime_type: file.mime_type.unwrap_or_default(),
        size_bytes,
        modified_at: file.modified_time,
        parent_ids: file.parents,
    }
}

/// Convert a listing page, preserving remote order.
pub fn to_list_result(list: FileList) -> ListResult {
    ListResult {
        files: list.files.into_iter().map(to_metadata).collect(),
        next_page_token: list.next_page_token.filter(|token| !token.is_empty()),
    }
}

/// Convert the body of a completed upload.
///
/// `name` and `mime_type` fall back to the request's values when the
/// response omits them.
///
/// # Errors
/// - `Error::Transfer` if the response carries no id
pub fn to_upload_result(
    file: RemoteFile,
    requested_name: &str,
    requested_mime_type: &str,
) -> Result<UploadResult> {
    let size_bytes = parse_size(file.size.as_deref());
    let id = file
        .id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| {
            Error::transfer("Completed", "Drive returned file metadata without an id.")
        })?;

    Ok(UploadResult {
        id,
        name: file.name.unwrap_or_else(|| requested_name.to_string()),
        mime_type: file
            .mime_type
            .unwrap_or_else(|| requested_mime_type.to_string()),
        size_bytes,
        web_view_link: file.web_view_link,
    })
}
