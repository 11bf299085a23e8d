//! In-memory remote document store for testing.

use crate::error::{StoreError, StoreResult};
use crate::remote::{
    timestamp_field, BatchOp, CollectionRef, RemoteConfig, RemoteStore, StoredDocument, WriteBatch,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::debug;

/// Serializable contents of a remote store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteSnapshot {
    /// Signed-in user.
    #[serde(default)]
    pub signed_in: Option<String>,
    /// Documents by collection path, then by document ID.
    #[serde(default)]
    pub collections: BTreeMap<String, BTreeMap<String, Value>>,
}

/// An in-memory remote document store.
///
/// Behaves like the hosted backend for everything the sync engine relies
/// on: per-user access checks, ordered listing, "greater-than" timestamp
/// queries, and atomic batches bounded by [`RemoteConfig::max_batch_size`].
/// Connectivity loss and write failures can be simulated for tests.
///
/// # Example
///
/// ```rust
/// use quizsync_store::{Collection, CollectionRef, MemoryRemoteStore, RemoteStore};
/// use serde_json::json;
///
/// # tokio_test_block_on(async {
/// let remote = MemoryRemoteStore::new();
/// remote.sign_in("user-1");
/// let seen = CollectionRef::new("user-1", Collection::SeenQuestions);
/// remote.set(&seen, "q-1", json!({ "questionId": "q-1" })).await.unwrap();
/// assert_eq!(remote.count(&seen).await.unwrap(), 1);
/// # });
/// # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
/// # }
/// ```
#[derive(Debug)]
pub struct MemoryRemoteStore {
    config: RemoteConfig,
    state: RwLock<RemoteSnapshot>,
    online: AtomicBool,
    writes: AtomicU64,
    commits: AtomicU64,
    failing_after: Mutex<Option<u64>>,
}

impl MemoryRemoteStore {
    /// Creates an empty store with the default batch ceiling.
    pub fn new() -> Self {
        Self::with_config(RemoteConfig::default())
    }

    /// Creates an empty store.
    pub fn with_config(config: RemoteConfig) -> Self {
        Self::from_snapshot(config, RemoteSnapshot::default())
    }

    /// Creates a store holding `snapshot`.
    pub fn from_snapshot(config: RemoteConfig, snapshot: RemoteSnapshot) -> Self {
        Self {
            config,
            state: RwLock::new(snapshot),
            online: AtomicBool::new(true),
            writes: AtomicU64::new(0),
            commits: AtomicU64::new(0),
            failing_after: Mutex::new(None),
        }
    }

    /// Signs `user_id` in, replacing any current user.
    pub fn sign_in(&self, user_id: impl Into<String>) {
        self.state.write().signed_in = Some(user_id.into());
    }

    /// Signs the current user out.
    pub fn sign_out(&self) {
        self.state.write().signed_in = None;
    }

    /// Simulates gaining or losing connectivity.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Lets `n` more writes succeed, then fails every write until
    /// [`Self::clear_failures`] is called.
    pub fn fail_writes_after(&self, n: u64) {
        *self.failing_after.lock() = Some(self.writes.load(Ordering::SeqCst) + n);
    }

    /// Stops failing writes.
    pub fn clear_failures(&self) {
        *self.failing_after.lock() = None;
    }

    /// Returns the number of successful batch commits.
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::SeqCst)
    }

    /// Returns a copy of the store contents.
    pub fn snapshot(&self) -> RemoteSnapshot {
        self.state.read().clone()
    }

    /// Replaces every document and the session with `snapshot`.
    pub(crate) fn replace_snapshot(&self, snapshot: RemoteSnapshot) {
        *self.state.write() = snapshot;
    }

    /// Returns the IDs stored in a collection, ignoring access checks.
    pub fn document_ids(&self, collection: &CollectionRef) -> Vec<String> {
        self.state
            .read()
            .collections
            .get(&collection.path())
            .map(|docs| docs.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn check_access(&self, state: &RemoteSnapshot, collection: &CollectionRef) -> StoreResult<()> {
        if !self.online.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("remote store offline"));
        }
        match &state.signed_in {
            Some(user) if *user == collection.user_id => Ok(()),
            _ => Err(StoreError::Unauthenticated),
        }
    }

    fn check_write(&self) -> StoreResult<()> {
        let attempted = self.writes.fetch_add(1, Ordering::SeqCst);
        match *self.failing_after.lock() {
            Some(limit) if attempted >= limit => {
                Err(StoreError::unavailable("write rejected by backend"))
            }
            _ => Ok(()),
        }
    }

    fn read_docs<F>(
        &self,
        collection: &CollectionRef,
        mut keep: F,
        limit: Option<usize>,
    ) -> StoreResult<Vec<StoredDocument>>
    where
        F: FnMut(&Value) -> bool,
    {
        let state = self.state.read();
        self.check_access(&state, collection)?;
        let Some(docs) = state.collections.get(&collection.path()) else {
            return Ok(Vec::new());
        };
        Ok(docs
            .iter()
            .filter(|(_, data)| keep(data))
            .take(limit.unwrap_or(usize::MAX))
            .map(|(id, data)| StoredDocument {
                id: id.clone(),
                data: data.clone(),
            })
            .collect())
    }

    pub(crate) fn apply_batch(&self, batch: WriteBatch) -> StoreResult<()> {
        if batch.len() > self.config.max_batch_size {
            return Err(StoreError::BatchTooLarge {
                size: batch.len(),
                limit: self.config.max_batch_size,
            });
        }

        let mut state = self.state.write();
        for op in batch.ops() {
            let collection = match op {
                BatchOp::Set { collection, .. } | BatchOp::Delete { collection, .. } => collection,
            };
            self.check_access(&state, collection)?;
        }
        self.check_write()?;

        let size = batch.len();
        for op in batch.into_ops() {
            match op {
                BatchOp::Set {
                    collection,
                    id,
                    data,
                } => {
                    state
                        .collections
                        .entry(collection.path())
                        .or_default()
                        .insert(id, data);
                }
                BatchOp::Delete { collection, id } => {
                    let path = collection.path();
                    if let Some(docs) = state.collections.get_mut(&path) {
                        docs.remove(&id);
                        if docs.is_empty() {
                            state.collections.remove(&path);
                        }
                    }
                }
            }
        }
        self.commits.fetch_add(1, Ordering::SeqCst);
        debug!(operations = size, "committed batch");
        Ok(())
    }

    pub(crate) fn apply_set(
        &self,
        collection: &CollectionRef,
        id: &str,
        data: Value,
    ) -> StoreResult<()> {
        let mut state = self.state.write();
        self.check_access(&state, collection)?;
        self.check_write()?;
        state
            .collections
            .entry(collection.path())
            .or_default()
            .insert(id.to_string(), data);
        Ok(())
    }
}

impl Default for MemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    fn current_user(&self) -> Option<String> {
        self.state.read().signed_in.clone()
    }

    fn max_batch_size(&self) -> usize {
        self.config.max_batch_size
    }

    async fn get(
        &self,
        collection: &CollectionRef,
        id: &str,
    ) -> StoreResult<Option<StoredDocument>> {
        let state = self.state.read();
        self.check_access(&state, collection)?;
        Ok(state
            .collections
            .get(&collection.path())
            .and_then(|docs| docs.get(id))
            .map(|data| StoredDocument {
                id: id.to_string(),
                data: data.clone(),
            }))
    }

    async fn set(&self, collection: &CollectionRef, id: &str, data: Value) -> StoreResult<()> {
        self.apply_set(collection, id, data)
    }

    async fn list(
        &self,
        collection: &CollectionRef,
        limit: Option<usize>,
    ) -> StoreResult<Vec<StoredDocument>> {
        self.read_docs(collection, |_| true, limit)
    }

    async fn query_after(
        &self,
        collection: &CollectionRef,
        field: &str,
        after: DateTime<Utc>,
    ) -> StoreResult<Vec<StoredDocument>> {
        self.read_docs(
            collection,
            |data| timestamp_field(data, field).is_some_and(|ts| ts > after),
            None,
        )
    }

    async fn count(&self, collection: &CollectionRef) -> StoreResult<u64> {
        let state = self.state.read();
        self.check_access(&state, collection)?;
        Ok(state
            .collections
            .get(&collection.path())
            .map_or(0, |docs| docs.len() as u64))
    }

    async fn commit(&self, batch: WriteBatch) -> StoreResult<()> {
        self.apply_batch(batch)
    }
}
