//! Error types for the sync engine.

use crate::lookup::LookupError;
use quizsync_model::ModelError;
use quizsync_store::StoreError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// No connectivity, DNS failure, or a dropped socket.
    #[error("network error: {0}")]
    Network(String),

    /// Not signed in, or the credential expired.
    #[error("authentication error: {0}")]
    Auth(String),

    /// A remote document is malformed or misses a required field.
    #[error("data error: {0}")]
    Data(String),

    /// Question content was unavailable for rehydration.
    #[error("lookup error: {0}")]
    Lookup(#[from] LookupError),

    /// A batch or rate limit was exceeded.
    #[error("quota exceeded: {0}")]
    Quota(String),

    /// On-device storage failed.
    #[error("local store error: {0}")]
    LocalStore(String),
}

impl SyncError {
    /// Creates an authentication error for a missing user.
    pub fn not_signed_in() -> Self {
        Self::Auth("no user is signed in".into())
    }

    /// Returns true for failures that are part of normal operation
    /// (offline, signed out, throttled, missing content).
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            SyncError::Network(_) | SyncError::Auth(_) | SyncError::Quota(_) | SyncError::Lookup(_)
        )
    }
}

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => SyncError::Network(msg),
            StoreError::Unauthenticated => SyncError::not_signed_in(),
            e @ StoreError::BatchTooLarge { .. } => SyncError::Quota(e.to_string()),
            StoreError::Model(e) => SyncError::Data(e.to_string()),
            StoreError::Serialization(e) => SyncError::Data(e.to_string()),
            StoreError::Corrupted(msg) => SyncError::Data(msg),
            StoreError::Io(e) => SyncError::LocalStore(e.to_string()),
        }
    }
}

impl From<ModelError> for SyncError {
    fn from(err: ModelError) -> Self {
        SyncError::Data(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expected_errors() {
        assert!(SyncError::Network("offline".into()).is_expected());
        assert!(SyncError::not_signed_in().is_expected());
        assert!(SyncError::Lookup(LookupError::Timeout).is_expected());
        assert!(!SyncError::Data("bad".into()).is_expected());
        assert!(!SyncError::LocalStore("disk full".into()).is_expected());
    }

    #[test]
    fn store_errors_map_to_taxonomy() {
        assert!(matches!(
            SyncError::from(StoreError::unavailable("dns")),
            SyncError::Network(_)
        ));
        assert!(matches!(
            SyncError::from(StoreError::Unauthenticated),
            SyncError::Auth(_)
        ));
        assert!(matches!(
            SyncError::from(StoreError::BatchTooLarge { size: 9, limit: 5 }),
            SyncError::Quota(_)
        ));
        assert!(matches!(
            SyncError::from(StoreError::Corrupted("x".into())),
            SyncError::Data(_)
        ));
    }

    #[test]
    fn error_display() {
        let err = SyncError::not_signed_in();
        assert_eq!(err.to_string(), "authentication error: no user is signed in");
    }
}
