//! Common utilities and types shared across LocallyDrive modules.
//!
//! This module provides the error taxonomy and process configuration used by
//! the storage access layer and its callers.

pub mod config;
pub mod error;

pub use config::DriveSettings;
pub use error::{Error, ErrorKind, Result};
