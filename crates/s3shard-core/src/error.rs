//! Error types for the shard routing core.
//!
//! Two layers:
//!
//! - [`BackendError`] is what a [`StorageBackend`](crate::backend::StorageBackend)
//!   reports for one partition. It is surfaced verbatim for single-object
//!   operations and recorded per partition during list fan-out.
//! - [`ShardError`] is the crate-level error: configuration problems that must
//!   prevent startup, plus backend errors bubbling out of the facade.
//!
//! # Usage
//!
//! ```
//! use s3shard_core::error::{BackendError, ShardError};
//!
//! let err: ShardError = BackendError::NotFound {
//!     partition: "bucket1".to_owned(),
//!     key: "tenant/a/b".to_owned(),
//! }
//! .into();
//! assert!(err.is_not_found());
//! ```

/// Error reported by a storage backend for one partition.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The object does not exist in the partition.
    #[error("object not found: {partition}/{key}")]
    NotFound {
        /// Partition that was asked.
        partition: String,
        /// Key that was not found.
        key: String,
    },

    /// The backend request failed.
    #[error("backend request on partition {partition} failed: {source}")]
    Request {
        /// Partition the request targeted.
        partition: String,
        /// Underlying cause.
        #[source]
        source: anyhow::Error,
    },

    /// The caller cancelled the request before it completed.
    #[error("request cancelled")]
    Cancelled,

    /// The caller's deadline elapsed before the request completed.
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

impl BackendError {
    /// Build a [`BackendError::Request`] from anything convertible to [`anyhow::Error`].
    pub fn request(partition: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Request {
            partition: partition.into(),
            source: source.into(),
        }
    }

    /// Whether this error means the object does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Crate-level error type.
#[derive(Debug, thiserror::Error)]
pub enum ShardError {
    /// Invalid configuration; fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// A backend call failed.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl ShardError {
    /// Shorthand for [`ShardError::Config`].
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Whether this error wraps a backend "not found".
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Backend(e) if e.is_not_found())
    }
}

/// Convenience result type for shard operations.
pub type ShardResult<T> = Result<T, ShardError>;
