//! Error types for store operations.

use quizsync_model::ModelError;
use std::io;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during local or remote store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A stored value could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A remote document does not describe a valid entity.
    #[error("malformed document: {0}")]
    Model(#[from] ModelError),

    /// The remote store could not be reached.
    #[error("remote store unavailable: {0}")]
    Unavailable(String),

    /// No user is signed in, or the path belongs to another user.
    #[error("not signed in")]
    Unauthenticated,

    /// A batch exceeded the backend's per-commit operation limit.
    #[error("batch of {size} operations exceeds limit of {limit}")]
    BatchTooLarge {
        /// Number of operations in the rejected batch.
        size: usize,
        /// Maximum operations per batch.
        limit: usize,
    },

    /// The stored data is corrupted.
    #[error("store corrupted: {0}")]
    Corrupted(String),
}

impl StoreError {
    /// Creates an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    /// Returns true if the operation may succeed when repeated later.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Io(_))
    }
}
