//! Remote document store persisted to a JSON file.

use crate::error::{StoreError, StoreResult};
use crate::file::write_atomic;
use crate::remote::{CollectionRef, RemoteConfig, RemoteStore, StoredDocument, WriteBatch};
use crate::remote_memory::{MemoryRemoteStore, RemoteSnapshot};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// A remote document store whose contents live in one JSON file.
///
/// Lets several processes act as separate devices sharing one "cloud":
/// every successful write rewrites the file, and opening the file again
/// sees the latest contents. Reads are served from memory. A write whose
/// file update fails is rolled back in memory too.
#[derive(Debug)]
pub struct FileRemoteStore {
    path: PathBuf,
    inner: MemoryRemoteStore,
    writer: Mutex<()>,
}

impl FileRemoteStore {
    /// Opens or creates a store at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is not a valid snapshot.
    pub fn open(path: &Path, config: RemoteConfig) -> StoreResult<Self> {
        let snapshot = if path.exists() {
            let raw = fs::read_to_string(path)?;
            serde_json::from_str(&raw)
                .map_err(|e| StoreError::Corrupted(format!("{}: {}", path.display(), e)))?
        } else {
            RemoteSnapshot::default()
        };

        Ok(Self {
            path: path.to_path_buf(),
            inner: MemoryRemoteStore::from_snapshot(config, snapshot),
            writer: Mutex::new(()),
        })
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Signs `user_id` in and persists the session.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn sign_in(&self, user_id: impl Into<String>) -> StoreResult<()> {
        let user_id = user_id.into();
        self.write_through(|inner| {
            inner.sign_in(user_id);
            Ok(())
        })
    }

    /// Signs the current user out and persists the session.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn sign_out(&self) -> StoreResult<()> {
        self.write_through(|inner| {
            inner.sign_out();
            Ok(())
        })
    }

    /// Applies `change` in memory and writes the result to disk, restoring
    /// the previous state if either step fails.
    fn write_through<F>(&self, change: F) -> StoreResult<()>
    where
        F: FnOnce(&MemoryRemoteStore) -> StoreResult<()>,
    {
        let _writer = self.writer.lock();
        let before = self.inner.snapshot();
        change(&self.inner)?;
        let persisted = serde_json::to_vec_pretty(&self.inner.snapshot())
            .map_err(StoreError::from)
            .and_then(|bytes| write_atomic(&self.path, &bytes));
        if let Err(e) = persisted {
            self.inner.replace_snapshot(before);
            return Err(e);
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for FileRemoteStore {
    fn current_user(&self) -> Option<String> {
        self.inner.current_user()
    }

    fn max_batch_size(&self) -> usize {
        self.inner.max_batch_size()
    }

    async fn get(
        &self,
        collection: &CollectionRef,
        id: &str,
    ) -> StoreResult<Option<StoredDocument>> {
        self.inner.get(collection, id).await
    }

    async fn set(&self, collection: &CollectionRef, id: &str, data: Value) -> StoreResult<()> {
        self.write_through(|inner| inner.apply_set(collection, id, data))
    }

    async fn list(
        &self,
        collection: &CollectionRef,
        limit: Option<usize>,
    ) -> StoreResult<Vec<StoredDocument>> {
        self.inner.list(collection, limit).await
    }

    async fn query_after(
        &self,
        collection: &CollectionRef,
        field: &str,
        after: DateTime<Utc>,
    ) -> StoreResult<Vec<StoredDocument>> {
        self.inner.query_after(collection, field, after).await
    }

    async fn count(&self, collection: &CollectionRef) -> StoreResult<u64> {
        self.inner.count(collection).await
    }

    async fn commit(&self, batch: WriteBatch) -> StoreResult<()> {
        self.write_through(|inner| inner.apply_batch(batch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::Collection;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn file_remote_persists_across_opens() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cloud.json");
        let mistakes = CollectionRef::new("u1", Collection::Mistakes);

        {
            let remote = FileRemoteStore::open(&path, RemoteConfig::default()).unwrap();
            remote.sign_in("u1").unwrap();
            let mut batch = WriteBatch::new();
            batch.set(&mistakes, "Q1", json!({ "questionId": "Q1" }));
            remote.commit(batch).await.unwrap();
        }

        let remote = FileRemoteStore::open(&path, RemoteConfig::default()).unwrap();
        assert_eq!(remote.current_user().as_deref(), Some("u1"));
        assert_eq!(remote.count(&mistakes).await.unwrap(), 1);

        remote.sign_out().unwrap();
        let remote = FileRemoteStore::open(&path, RemoteConfig::default()).unwrap();
        assert_eq!(remote.current_user(), None);
    }

    #[tokio::test]
    async fn failed_file_write_rolls_back() {
        let dir = tempdir().unwrap();
        let cloud_dir = dir.path().join("cloud");
        fs::create_dir_all(&cloud_dir).unwrap();
        let remote = FileRemoteStore::open(&cloud_dir.join("cloud.json"), RemoteConfig::default())
            .unwrap();
        remote.sign_in("u1").unwrap();
        let seen = CollectionRef::new("u1", Collection::SeenQuestions);
        remote.set(&seen, "A", json!({})).await.unwrap();

        fs::remove_dir_all(&cloud_dir).unwrap();
        let mut batch = WriteBatch::new();
        batch.set(&seen, "B", json!({}));
        batch.delete(&seen, "A");
        assert!(remote.commit(batch).await.is_err());
        assert!(remote.set(&seen, "C", json!({})).await.is_err());

        let ids: Vec<String> = remote
            .list(&seen, None)
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec!["A"]);
    }

    #[test]
    fn file_remote_rejects_garbage() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cloud.json");
        fs::write(&path, "[1, 2").unwrap();
        assert!(matches!(
            FileRemoteStore::open(&path, RemoteConfig::default()),
            Err(StoreError::Corrupted(_))
        ));
    }
}
