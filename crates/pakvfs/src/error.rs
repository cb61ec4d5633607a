//! Error types for archive operations

use thiserror::Error;

/// Result type for archive operations.
pub type Result<T> = std::result::Result<T, VfsError>;

/// Boxed error returned by per-format object decoders.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while opening containers or reading their entries.
///
/// Only [`VfsError::NotFound`] is gated by the `throw_on_error` flag that the
/// accessors take. Every other kind points at a configuration or format
/// defect and is always returned.
#[derive(Debug, Error)]
pub enum VfsError {
    /// Path or id absent from the container.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Path or id resolves to more than one entry.
    #[error("Ambiguous lookup: {key} resolves to {count} entries")]
    Ambiguous {
        /// The key that was looked up
        key: String,
        /// Number of matching entries
        count: usize,
    },

    /// The codec does not implement this operation for its format.
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Decoded value does not satisfy the requested type.
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// Requested type
        expected: String,
        /// Runtime type of the decoded value
        actual: String,
    },

    /// Missing backing filesystem, codec binding or id index.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The per-entry decoder failed while materializing an object.
    #[error("Failed to decode {path}: {source}")]
    DecodeFailure {
        /// Path of the entry being decoded
        path: String,
        /// Error raised by the decoder
        #[source]
        source: BoxError,
    },

    /// Operation attempted on a container that is not open.
    #[error("Archive not opened: {0}")]
    NotOpened(String),

    /// Malformed table of contents or entry data.
    #[error("Codec error: {0}")]
    Codec(String),

    /// I/O error from the backing store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl VfsError {
    /// Whether `throw_on_error = false` may turn this error into an empty result.
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub(crate) fn unsupported(codec: &str, operation: &str) -> Self {
        Self::UnsupportedOperation(format!("{codec} does not support {operation}"))
    }
}

/// Degrade a recoverable error to `Ok(None)` when the caller asked for it.
pub(crate) fn recover<T>(err: VfsError, throw_on_error: bool) -> Result<Option<T>> {
    if !throw_on_error && err.is_recoverable() {
        Ok(None)
    } else {
        Err(err)
    }
}
