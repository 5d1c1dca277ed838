//! I/O error types for the disk layer.

use std::io;
use std::path::PathBuf;

use riptide_common::types::FileId;
use thiserror::Error;

/// Result type for disk I/O operations.
pub type IoResult<T> = Result<T, IoError>;

/// Errors that can occur during file I/O operations.
#[derive(Debug, Error)]
#[allow(missing_docs)] // Fields are documented by variant docs
pub enum IoError {
    /// Standard I/O error.
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    /// File not found.
    #[error("file not found: {path}")]
    NotFound { path: PathBuf },

    /// Permission denied.
    #[error("permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// File handle is out of range or was closed.
    #[error("file handle {file} is not open")]
    StaleHandle { file: FileId },

    /// Invalid alignment for direct I/O.
    #[error("invalid alignment: expected {expected}, got address {address:#x}")]
    InvalidAlignment { expected: usize, address: usize },

    /// Short write (less data written than expected).
    #[error("short write: expected {expected} bytes, wrote {actual}")]
    ShortWrite { expected: usize, actual: usize },

    /// Submission-ring specific error.
    #[error("ring error: {message}")]
    Ring { message: String },
}

impl IoError {
    /// Creates a new NotFound error.
    pub fn not_found(path: impl Into<PathBuf>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Creates a stale-handle error.
    pub fn stale_handle(file: FileId) -> Self {
        Self::StaleHandle { file }
    }

    /// Creates an alignment error for the given address.
    pub fn misaligned(expected: usize, address: usize) -> Self {
        Self::InvalidAlignment { expected, address }
    }

    /// Converts from `std::io::Error` with path context.
    pub fn from_io_with_path(err: io::Error, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound { path },
            io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            _ => Self::Io { source: err },
        }
    }

    /// Returns true if this is a retryable error.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Io { source } => {
                source.kind() == io::ErrorKind::Interrupted
                    || source.kind() == io::ErrorKind::WouldBlock
            }
            _ => false,
        }
    }
}

impl Clone for IoError {
    fn clone(&self) -> Self {
        match self {
            Self::Io { source } => Self::Io {
                source: io::Error::new(source.kind(), source.to_string()),
            },
            Self::NotFound { path } => Self::NotFound { path: path.clone() },
            Self::PermissionDenied { path } => Self::PermissionDenied { path: path.clone() },
            Self::StaleHandle { file } => Self::StaleHandle { file: *file },
            Self::InvalidAlignment { expected, address } => Self::InvalidAlignment {
                expected: *expected,
                address: *address,
            },
            Self::ShortWrite { expected, actual } => Self::ShortWrite {
                expected: *expected,
                actual: *actual,
            },
            Self::Ring { message } => Self::Ring {
                message: message.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_io_with_path() {
        let err = io::Error::new(io::ErrorKind::NotFound, "missing");
        let err = IoError::from_io_with_path(err, "/tmp/x.db");
        assert!(matches!(err, IoError::NotFound { .. }));

        let err = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let err = IoError::from_io_with_path(err, "/tmp/x.db");
        assert!(matches!(err, IoError::PermissionDenied { .. }));
    }

    #[test]
    fn test_retryable() {
        let err: IoError = io::Error::new(io::ErrorKind::Interrupted, "eintr").into();
        assert!(err.is_retryable());

        assert!(!IoError::stale_handle(FileId::new(0)).is_retryable());
    }

    #[test]
    fn test_clone_preserves_kind() {
        let err: IoError = io::Error::new(io::ErrorKind::UnexpectedEof, "eof").into();
        let cloned = err.clone();
        match cloned {
            IoError::Io { source } => assert_eq!(source.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}
