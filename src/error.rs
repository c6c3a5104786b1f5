//! Error types for the Quiver codec layer.
//!
//! All fallible operations return [`QuiverError`]. The variants separate the
//! failure classes a caller has to react to differently:
//!
//! - [`QuiverError::CorruptIndex`]: the bytes on disk are unreadable. Never retried.
//! - [`QuiverError::Storage`]: the directory collaborator failed (missing file,
//!   closed storage, ...). The storage error kind is preserved.
//! - [`QuiverError::Unsupported`]: an optional capability is not offered by the
//!   backend, callers may degrade gracefully.
//!
//! Write-path contract violations (wrong document frequency, offsets on a field
//! without offsets, ...) are programmer errors and panic instead.
//!
//! # Examples
//!
//! ```
//! use quiver::error::{QuiverError, Result};
//!
//! fn open_segment() -> Result<()> {
//!     Err(QuiverError::corrupt("_0.fnm", "codec header mismatch"))
//! }
//!
//! let err = open_segment().unwrap_err();
//! assert!(err.is_corruption());
//! ```

use std::io;

use thiserror::Error;

use crate::storage::StorageError;

/// The main error type for Quiver operations.
#[derive(Error, Debug)]
pub enum QuiverError {
    /// I/O errors from the underlying byte streams.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Errors raised by the storage collaborator.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// The persisted bytes of a resource cannot be decoded.
    #[error("Corrupt index ({resource}): {message}")]
    CorruptIndex {
        /// File (or logical resource) that failed validation.
        resource: String,
        /// What was wrong with it.
        message: String,
    },

    /// The backend does not offer the requested capability.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// A caller supplied an argument the codec cannot accept.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error for other cases
    #[error("Error: {0}")]
    Other(String),
}

/// Result type alias for operations that may fail with QuiverError.
pub type Result<T> = std::result::Result<T, QuiverError>;

impl QuiverError {
    /// Create a new corrupt-index error for the given resource.
    pub fn corrupt<R: Into<String>, S: Into<String>>(resource: R, msg: S) -> Self {
        QuiverError::CorruptIndex {
            resource: resource.into(),
            message: msg.into(),
        }
    }

    /// Create a new unsupported-operation error.
    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        QuiverError::Unsupported(msg.into())
    }

    /// Create a new invalid argument error.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        QuiverError::InvalidArgument(msg.into())
    }

    /// Create a new generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        QuiverError::Other(msg.into())
    }

    /// Whether this error means the persisted data is unreadable.
    pub fn is_corruption(&self) -> bool {
        matches!(self, QuiverError::CorruptIndex { .. })
    }

    /// Whether this error means an optional capability is missing.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, QuiverError::Unsupported(_))
    }

    /// Whether this error means the requested file does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, QuiverError::Storage(StorageError::FileNotFound(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let error = QuiverError::corrupt("_0.fnm", "bad magic");
        assert_eq!(error.to_string(), "Corrupt index (_0.fnm): bad magic");
        assert!(error.is_corruption());
        assert!(!error.is_unsupported());

        let error = QuiverError::unsupported("ord");
        assert_eq!(error.to_string(), "Unsupported operation: ord");
        assert!(error.is_unsupported());
        assert!(!error.is_corruption());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::UnexpectedEof, "short read");
        let quiver_error = QuiverError::from(io_error);

        match quiver_error {
            QuiverError::Io(_) => {} // Expected
            _ => panic!("Expected IO error variant"),
        }
    }

    #[test]
    fn test_storage_error_keeps_kind() {
        let error = QuiverError::from(StorageError::FileNotFound("_0.si".to_string()));
        assert!(error.is_not_found());
        assert!(!error.is_corruption());
    }
}
