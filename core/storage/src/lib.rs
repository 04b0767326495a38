//! Google Drive access layer for LocallyDrive.
//!
//! This crate wraps the Drive v3 API behind a small set of operations:
//! upload, paginated listing (plain or by folder) and download, each
//! authorized with a freshly scoped service-account credential.
//!
//! # Layout
//! - [`credential`]: scoped credentials and the provider seam
//! - [`gdrive`]: service-account key handling and the HTTP transport
//! - [`client`]: the [`DriveClient`] operations
//! - [`query`], [`mapper`], [`progress`]: query composition, result mapping
//!   and transfer progress events
//! - [`memory`]: in-memory transport and credentials for tests

pub mod client;
pub mod credential;
pub mod gdrive;
pub mod mapper;
pub mod memory;
pub mod model;
pub mod progress;
pub mod query;
pub mod transport;

pub use client::DriveClient;
pub use credential::{
    CachedCredentialProvider, Credential, CredentialProvider, DRIVE_READONLY_SCOPE, DRIVE_SCOPE,
};
pub use memory::{MemoryTransport, StaticCredentialProvider};
pub use model::{
    ListRequest, ListResult, StoredObjectMetadata, UploadContent, UploadRequest, UploadResult,
};
pub use progress::{progress_channel, ProgressReceiver, ProgressSender, TransferProgress};
pub use query::{escape_literal, QueryBuilder};
pub use transport::DriveTransport;
