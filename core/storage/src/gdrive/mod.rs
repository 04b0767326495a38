//! Google Drive backend.
//!
//! - Service-account keys exchanged for scoped bearer tokens (JWT bearer grant)
//! - Multipart uploads and streamed downloads over the v3 REST API

pub mod auth;
pub mod client;

pub use auth::{ScopedCredential, ServiceAccountCredential, ServiceAccountCredentialProvider};
pub use client::DriveHttpTransport;

#[cfg(test)]
pub(crate) mod test_server;
