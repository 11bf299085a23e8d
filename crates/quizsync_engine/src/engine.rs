//! The sync engine and helpers shared by its operations.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::lookup::{rehydrate, QuestionLookup, Rehydrated};
use crate::state::{RestoreState, RestoreTracker, SyncStats};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use quizsync_model::{Document, MistakeEntry, SyncMetadata, SyncStamp, METADATA_DOC_ID};
use quizsync_store::{
    BatchOp, Collection, CollectionRef, LocalStore, RemoteStore, StoreResult, StoredDocument,
    WriteBatch,
};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Keeps one device's progress consistent with the shared remote record.
///
/// The engine holds no hidden global state: construct it once with its
/// collaborators and share it by reference.
///
/// # Caller contract
///
/// Calls are not serialized against each other. Do not run overlapping
/// backup, restore, or merge operations for the same user.
pub struct SyncEngine<L, R, Q>
where
    L: LocalStore,
    R: RemoteStore,
    Q: QuestionLookup,
{
    pub(crate) config: SyncConfig,
    pub(crate) local: Arc<L>,
    pub(crate) remote: Arc<R>,
    pub(crate) lookup: Arc<Q>,
    pub(crate) restore: RestoreTracker,
    pub(crate) stats: RwLock<SyncStats>,
}

/// The signed-in user's collections.
#[derive(Debug, Clone)]
pub(crate) struct UserCollections {
    pub(crate) seen: CollectionRef,
    pub(crate) mistakes: CollectionRef,
    pub(crate) preferences: CollectionRef,
    pub(crate) sync: CollectionRef,
}

impl UserCollections {
    pub(crate) fn new(user_id: &str) -> Self {
        Self {
            seen: CollectionRef::new(user_id, Collection::SeenQuestions),
            mistakes: CollectionRef::new(user_id, Collection::Mistakes),
            preferences: CollectionRef::new(user_id, Collection::Preferences),
            sync: CollectionRef::new(user_id, Collection::Sync),
        }
    }
}

/// Maps an on-device storage failure into the engine's taxonomy.
pub(crate) fn local<T>(result: StoreResult<T>) -> SyncResult<T> {
    result.map_err(|e| SyncError::LocalStore(e.to_string()))
}

/// Sorts documents into the order they were written.
///
/// Documents without a stamp come first, then by `(syncedAt, position)`,
/// with the document ID breaking ties.
pub(crate) fn in_write_order(mut docs: Vec<StoredDocument>) -> Vec<StoredDocument> {
    docs.sort_by_cached_key(|doc| (SyncStamp::from_document(&doc.data), doc.id.clone()));
    docs
}

/// Decodes remote mistake documents, dropping malformed ones.
///
/// Returns the entries and the number of dropped documents.
pub(crate) fn decode_mistakes(docs: Vec<StoredDocument>) -> (Vec<MistakeEntry>, usize) {
    let mut entries = Vec::with_capacity(docs.len());
    let mut malformed = 0;
    for doc in docs {
        match MistakeEntry::from_document(&doc.id, doc.data) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                warn!(question_id = %doc.id, error = %e, "skipping malformed mistake document");
                malformed += 1;
            }
        }
    }
    (entries, malformed)
}

impl<L, R, Q> SyncEngine<L, R, Q>
where
    L: LocalStore,
    R: RemoteStore,
    Q: QuestionLookup,
{
    /// Creates an engine over its three collaborators.
    pub fn new(config: SyncConfig, local: Arc<L>, remote: Arc<R>, lookup: Arc<Q>) -> Self {
        info!(device_id = %config.device_id, "sync engine created");
        Self {
            config,
            local,
            remote,
            lookup,
            restore: RestoreTracker::new(),
            stats: RwLock::new(SyncStats::default()),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the local store.
    pub fn local(&self) -> &L {
        &self.local
    }

    /// Returns the remote store.
    pub fn remote(&self) -> &R {
        &self.remote
    }

    /// Returns cumulative statistics.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Returns the current restore state.
    pub fn restore_state(&self) -> RestoreState {
        self.restore.current()
    }

    /// Subscribes to restore state transitions.
    pub fn subscribe_restore(&self) -> watch::Receiver<RestoreState> {
        self.restore.subscribe()
    }

    /// Recounts the remote collections and rewrites the metadata.
    ///
    /// Repairs any drift between cached counts and the collections, such
    /// as an undercount left by an interrupted bulk operation.
    pub async fn reconcile_metadata(&self) -> SyncResult<SyncMetadata> {
        let collections = self.collections()?;
        let now = Utc::now();
        let (seen, mistakes) = tokio::try_join!(
            self.remote.count(&collections.seen),
            self.remote.count(&collections.mistakes),
        )?;
        let previous = self.load_metadata(&collections).await.unwrap_or_else(|e| {
            warn!(error = %e, "replacing unreadable metadata");
            None
        });

        let mut metadata = SyncMetadata::with_counts(now, seen, mistakes);
        if let Some(previous) = previous {
            if previous.seen_questions_count != seen || previous.mistakes_count != mistakes {
                info!(
                    cached_seen = previous.seen_questions_count,
                    cached_mistakes = previous.mistakes_count,
                    seen,
                    mistakes,
                    "metadata counts repaired"
                );
            }
            metadata.last_seen_question_sync = previous.last_seen_question_sync;
            metadata.last_mistake_sync = previous.last_mistake_sync;
            metadata.last_settings_sync = previous.last_settings_sync;
        }
        self.remote
            .set(&collections.sync, METADATA_DOC_ID, metadata.to_document()?)
            .await?;
        Ok(metadata)
    }

    pub(crate) fn collections(&self) -> SyncResult<UserCollections> {
        let user_id = self
            .remote
            .current_user()
            .ok_or_else(SyncError::not_signed_in)?;
        Ok(UserCollections::new(&user_id))
    }

    /// Operations per commit: the configured size capped by the backend.
    pub(crate) fn batch_size(&self) -> usize {
        self.config
            .batch_size
            .min(self.remote.max_batch_size())
            .max(1)
    }

    pub(crate) async fn load_metadata(
        &self,
        collections: &UserCollections,
    ) -> SyncResult<Option<SyncMetadata>> {
        match self.remote.get(&collections.sync, METADATA_DOC_ID).await? {
            Some(doc) => Ok(Some(SyncMetadata::from_document(&doc.id, doc.data)?)),
            None => Ok(None),
        }
    }

    /// Loads the metadata, deriving counts from the collections when it is
    /// missing or unreadable.
    pub(crate) async fn metadata_or_recount(
        &self,
        collections: &UserCollections,
        now: DateTime<Utc>,
    ) -> SyncResult<SyncMetadata> {
        match self.load_metadata(collections).await {
            Ok(Some(metadata)) => return Ok(metadata),
            Ok(None) => debug!("metadata missing, counting collections"),
            Err(SyncError::Data(msg)) => warn!(error = %msg, "metadata unreadable, counting collections"),
            Err(e) => return Err(e),
        }
        let (seen, mistakes) = tokio::try_join!(
            self.remote.count(&collections.seen),
            self.remote.count(&collections.mistakes),
        )?;
        Ok(SyncMetadata::with_counts(now, seen, mistakes))
    }

    /// Commits `ops` in pages of at most [`Self::batch_size`] operations.
    ///
    /// Operations keep their order, so whatever is last lands in the final
    /// page. Returns the number of commits.
    pub(crate) async fn commit_paged(&self, ops: Vec<BatchOp>) -> SyncResult<usize> {
        let size = self.batch_size();
        let mut ops = ops.into_iter().peekable();
        let mut commits = 0;
        while ops.peek().is_some() {
            let batch: WriteBatch = ops.by_ref().take(size).collect();
            debug!(operations = batch.len(), page = commits, "committing page");
            self.remote.commit(batch).await?;
            commits += 1;
        }
        Ok(commits)
    }

    /// Joins entries with question content using the configured bounds.
    pub(crate) async fn rehydrate(&self, entries: Vec<MistakeEntry>) -> Rehydrated {
        let rehydrated = rehydrate(
            self.lookup.as_ref(),
            entries,
            self.config.lookup_concurrency,
            self.config.lookup_timeout,
        )
        .await;
        if !rehydrated.skipped.is_empty() {
            self.stats.write().mistakes_skipped += rehydrated.skipped.len() as u64;
        }
        rehydrated
    }

    pub(crate) fn record_success(&self) {
        self.stats.write().last_sync_time = Some(Utc::now());
    }

    pub(crate) fn record_failure(&self, operation: &'static str, err: &SyncError) {
        if err.is_expected() {
            warn!(operation, error = %err, "sync operation failed");
        } else {
            error!(operation, error = %err, "sync operation failed");
        }
        self.stats.write().last_error = Some(err.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::CatalogLookup;
    use quizsync_model::SeenQuestionEntry;
    use quizsync_store::{KeyValueLocalStore, MemoryKeyValue, MemoryRemoteStore, RemoteConfig};
    use serde_json::json;

    type TestEngine = SyncEngine<KeyValueLocalStore<MemoryKeyValue>, MemoryRemoteStore, CatalogLookup>;

    fn engine(remote: MemoryRemoteStore, batch_size: usize) -> TestEngine {
        SyncEngine::new(
            SyncConfig::new("device-a").with_batch_size(batch_size),
            Arc::new(KeyValueLocalStore::new(MemoryKeyValue::new())),
            Arc::new(remote),
            Arc::new(CatalogLookup::new()),
        )
    }

    #[test]
    fn batch_size_capped_by_remote() {
        let remote = MemoryRemoteStore::with_config(RemoteConfig::new(3));
        assert_eq!(engine(remote, 500).batch_size(), 3);
        assert_eq!(engine(MemoryRemoteStore::new(), 2).batch_size(), 2);
    }

    #[test]
    fn collections_require_sign_in() {
        let engine = engine(MemoryRemoteStore::new(), 10);
        assert!(matches!(engine.collections(), Err(SyncError::Auth(_))));
    }

    #[tokio::test]
    async fn commit_paged_splits_batches() {
        let remote = MemoryRemoteStore::with_config(RemoteConfig::new(2));
        remote.sign_in("u1");
        let engine = engine(remote, 10);
        let collections = engine.collections().unwrap();

        let ops: Vec<BatchOp> = (0..5)
            .map(|i| BatchOp::Set {
                collection: collections.seen.clone(),
                id: format!("Q{i}"),
                data: json!({}),
            })
            .collect();
        assert_eq!(engine.commit_paged(ops).await.unwrap(), 3);
        assert_eq!(engine.remote().commit_count(), 3);
        assert_eq!(engine.commit_paged(Vec::new()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn missing_metadata_is_counted() {
        let remote = MemoryRemoteStore::new();
        remote.sign_in("u1");
        let engine = engine(remote, 10);
        let collections = engine.collections().unwrap();
        engine
            .remote()
            .set(&collections.mistakes, "Q1", json!({}))
            .await
            .unwrap();

        let metadata = engine
            .metadata_or_recount(&collections, Utc::now())
            .await
            .unwrap();
        assert_eq!(metadata.seen_questions_count, 0);
        assert_eq!(metadata.mistakes_count, 1);
    }

    #[tokio::test]
    async fn reconcile_repairs_counts() {
        let remote = MemoryRemoteStore::new();
        remote.sign_in("u1");
        let engine = engine(remote, 10);
        let collections = engine.collections().unwrap();
        engine
            .remote()
            .set(&collections.seen, "A", json!({}))
            .await
            .unwrap();
        let stale = SyncMetadata::with_counts(Utc::now(), 7, 2);
        engine
            .remote()
            .set(&collections.sync, METADATA_DOC_ID, stale.to_document().unwrap())
            .await
            .unwrap();

        let repaired = engine.reconcile_metadata().await.unwrap();
        assert_eq!(repaired.seen_questions_count, 1);
        assert_eq!(repaired.mistakes_count, 0);
        assert_eq!(engine.load_metadata(&collections).await.unwrap(), Some(repaired));
    }

    #[test]
    fn write_order_follows_stamps() {
        let t = Utc::now();
        let doc = |id: &str, data: serde_json::Value| StoredDocument {
            id: id.into(),
            data,
        };
        let stamped = |id: &str, stamp: SyncStamp| {
            doc(id, SeenQuestionEntry::new(id, t).to_stamped_document(stamp).unwrap())
        };
        let docs = vec![
            stamped("A", SyncStamp::new(t + chrono::Duration::seconds(1))),
            stamped("Z", SyncStamp::at_position(t, 1)),
            stamped("B", SyncStamp::at_position(t, 0)),
            doc("M", json!({})),
        ];
        let ids: Vec<String> = in_write_order(docs).into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["M", "B", "Z", "A"]);
    }

    #[test]
    fn decode_drops_malformed() {
        let docs = vec![
            StoredDocument {
                id: "Q1".into(),
                data: json!({
                    "questionId": "Q1",
                    "questionIdType": "ibn",
                    "questionType": "mcq",
                    "userChoice": "B",
                    "timestamp": "2024-01-01T00:00:00Z"
                }),
            },
            StoredDocument {
                id: "Q2".into(),
                data: json!({ "questionId": "Q2" }),
            },
        ];
        let (entries, malformed) = decode_mistakes(docs);
        assert_eq!(entries.len(), 1);
        assert_eq!(malformed, 1);
    }
}
