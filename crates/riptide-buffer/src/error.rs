//! Buffer pool errors.

use std::io;

use riptide_common::types::FileId;
use thiserror::Error;

use crate::disk::IoError;

/// Result type for buffer pool operations.
pub type BufferResult<T> = Result<T, BufferError>;

/// Errors that can occur during buffer pool operations.
#[derive(Debug, Error)]
#[allow(missing_docs)] // Fields are documented by variant docs
pub enum BufferError {
    /// File handle is out of range, closed, or the request exceeds the file.
    #[error("invalid file handle {file}: {reason}")]
    InvalidHandle { file: FileId, reason: &'static str },

    /// All frames are pinned and no eviction candidate exists.
    #[error("no frame available: all pages pinned and replacer empty")]
    ResourceExhausted,

    /// Direct-I/O alignment constraints violated.
    #[error("misaligned buffer: expected {expected}-byte alignment, got address {address:#x}")]
    Alignment { expected: usize, address: usize },

    /// The pool is being torn down while the request is in flight.
    #[error("buffer pool is shutting down")]
    ShuttingDown,

    /// Backend read/write failure or syscall failure.
    #[error("file I/O error: {0}")]
    FileIo(#[from] IoError),

    /// Raw I/O error outside the file layer.
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl BufferError {
    /// Creates an invalid-handle error.
    pub fn invalid_handle(file: FileId, reason: &'static str) -> Self {
        Self::InvalidHandle { file, reason }
    }

    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Returns true if this is a transient error that can be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ResourceExhausted)
    }
}
