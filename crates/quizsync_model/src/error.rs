//! Error types for model encoding and decoding.

use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors that can occur while converting entities to and from documents.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The document could not be encoded or decoded as JSON.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The document decoded, but its key does not match its contents.
    #[error("document key mismatch: stored under {key}, contains {found}")]
    KeyMismatch {
        /// Key the document was stored under.
        key: String,
        /// Key derived from the document body.
        found: String,
    },

    /// A required field was empty.
    #[error("missing required field: {0}")]
    MissingField(&'static str),
}
