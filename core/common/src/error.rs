//! Common error types for LocallyDrive.

use thiserror::Error;

/// Top-level error type for LocallyDrive operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Caller input was rejected before any remote call was made.
    #[error("Invalid {field}: {message}")]
    Validation {
        /// Name of the offending field or parameter.
        field: &'static str,
        /// Human-readable reason.
        message: String,
    },

    /// Service credentials could not be read, parsed, or authorized.
    #[error("Credential error: {0}")]
    Credential(String),

    /// A remote call did not reach a successful terminal state.
    #[error("Transfer {status}: {message}")]
    Transfer {
        /// Status reported for the transfer (e.g. "Failed", "HTTP 404").
        status: String,
        /// Underlying cause, if any.
        message: String,
    },

    /// Process configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The caller cancelled the operation.
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse error category for boundary layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The caller supplied unusable input.
    Client,
    /// The service is misconfigured (credentials, settings).
    Misconfigured,
    /// The operation failed at runtime.
    Failure,
}

impl Error {
    /// Build a validation error for `field`.
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    /// Build a transfer error with a reported status and cause.
    pub fn transfer(status: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transfer {
            status: status.into(),
            message: message.into(),
        }
    }

    /// Category used to pick a response class at the boundary.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation { .. } => ErrorKind::Client,
            Error::Credential(_) | Error::Configuration(_) => ErrorKind::Misconfigured,
            Error::Transfer { .. } | Error::Cancelled(_) | Error::Io(_) => ErrorKind::Failure,
        }
    }

    /// The offending field, for validation errors.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Error::Validation { field, .. } => Some(field),
            _ => None,
        }
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
