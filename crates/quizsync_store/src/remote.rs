//! Remote document store abstraction.

use crate::error::StoreResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Default per-commit operation ceiling of the remote backend.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 500;

/// A per-user sub-collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    /// One document per seen question.
    SeenQuestions,
    /// One document per question with a recorded mistake.
    Mistakes,
    /// The settings and filters documents.
    Preferences,
    /// The sync metadata document.
    Sync,
}

impl Collection {
    /// Collections holding user data, in clear order.
    pub const DATA: [Collection; 3] = [
        Collection::SeenQuestions,
        Collection::Mistakes,
        Collection::Preferences,
    ];

    /// Returns the path segment of this collection.
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::SeenQuestions => "seen_questions",
            Collection::Mistakes => "mistakes",
            Collection::Preferences => "collections",
            Collection::Sync => "sync",
        }
    }
}

/// A collection scoped to one user.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionRef {
    /// Owning user.
    pub user_id: String,
    /// Collection within the user's tree.
    pub collection: Collection,
}

impl CollectionRef {
    /// Creates a reference to `collection` under `user_id`.
    pub fn new(user_id: impl Into<String>, collection: Collection) -> Self {
        Self {
            user_id: user_id.into(),
            collection,
        }
    }

    /// Returns the full path, `users/{uid}/{collection}`.
    pub fn path(&self) -> String {
        format!("users/{}/{}", self.user_id, self.collection.as_str())
    }
}

impl fmt::Display for CollectionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// A document read from the remote store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    /// Document ID within its collection.
    pub id: String,
    /// JSON body.
    pub data: Value,
}

impl StoredDocument {
    /// Reads an RFC 3339 timestamp `field` from the body.
    pub fn timestamp(&self, field: &str) -> Option<DateTime<Utc>> {
        timestamp_field(&self.data, field)
    }
}

/// One mutation inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOp {
    /// Create or overwrite a document.
    Set {
        /// Target collection.
        collection: CollectionRef,
        /// Document ID.
        id: String,
        /// New body.
        data: Value,
    },
    /// Delete a document. Deleting a missing document is a no-op.
    Delete {
        /// Target collection.
        collection: CollectionRef,
        /// Document ID.
        id: String,
    },
}

/// An ordered set of writes applied atomically.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    /// Creates an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a write of `data` to `collection/id`.
    pub fn set(
        &mut self,
        collection: &CollectionRef,
        id: impl Into<String>,
        data: Value,
    ) -> &mut Self {
        self.ops.push(BatchOp::Set {
            collection: collection.clone(),
            id: id.into(),
            data,
        });
        self
    }

    /// Adds a delete of `collection/id`.
    pub fn delete(&mut self, collection: &CollectionRef, id: impl Into<String>) -> &mut Self {
        self.ops.push(BatchOp::Delete {
            collection: collection.clone(),
            id: id.into(),
        });
        self
    }

    /// Appends an operation.
    pub fn push(&mut self, op: BatchOp) -> &mut Self {
        self.ops.push(op);
        self
    }

    /// Returns the number of operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns true if the batch holds no operations.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Returns the operations in order.
    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    /// Consumes the batch, returning its operations.
    pub fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }
}

impl FromIterator<BatchOp> for WriteBatch {
    fn from_iter<I: IntoIterator<Item = BatchOp>>(iter: I) -> Self {
        Self {
            ops: iter.into_iter().collect(),
        }
    }
}

/// Configuration shared by the bundled remote stores.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Maximum operations per committed batch.
    pub max_batch_size: usize,
}

impl RemoteConfig {
    /// Creates a configuration with the given batch ceiling.
    pub fn new(max_batch_size: usize) -> Self {
        Self { max_batch_size }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BATCH_SIZE)
    }
}

/// A per-user document store reached over the network.
///
/// # Invariants
///
/// - Every call on a [`CollectionRef`] fails with
///   [`crate::StoreError::Unauthenticated`] unless its user is signed in
/// - `commit` is all-or-nothing and rejects batches larger than
///   `max_batch_size`
/// - `list` and `query_after` return documents ordered by ID
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Returns the signed-in user, if any.
    fn current_user(&self) -> Option<String>;

    /// Returns the per-commit operation ceiling.
    fn max_batch_size(&self) -> usize;

    /// Reads one document.
    async fn get(
        &self,
        collection: &CollectionRef,
        id: &str,
    ) -> StoreResult<Option<StoredDocument>>;

    /// Creates or overwrites one document.
    async fn set(&self, collection: &CollectionRef, id: &str, data: Value) -> StoreResult<()>;

    /// Lists documents, at most `limit` if given.
    async fn list(
        &self,
        collection: &CollectionRef,
        limit: Option<usize>,
    ) -> StoreResult<Vec<StoredDocument>>;

    /// Lists documents whose timestamp `field` is strictly after `after`.
    ///
    /// Documents without a parseable RFC 3339 value in `field` never match.
    async fn query_after(
        &self,
        collection: &CollectionRef,
        field: &str,
        after: DateTime<Utc>,
    ) -> StoreResult<Vec<StoredDocument>>;

    /// Counts documents in a collection.
    async fn count(&self, collection: &CollectionRef) -> StoreResult<u64>;

    /// Applies a batch atomically.
    async fn commit(&self, batch: WriteBatch) -> StoreResult<()>;
}

/// Reads an RFC 3339 timestamp field from a document body.
pub(crate) fn timestamp_field(data: &Value, field: &str) -> Option<DateTime<Utc>> {
    data.get(field)
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}
