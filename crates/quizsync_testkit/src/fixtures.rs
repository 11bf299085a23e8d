//! Test fixtures for multi-device sync scenarios.
//!
//! Every [`DeviceFixture`] owns an in-memory local store and an engine
//! pointed at a remote store shared with the other fixtures, so a test can
//! play several devices of one user against each other.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::RwLock;
use quizsync_engine::{
    CatalogEntry, CatalogLookup, LookupError, QuestionLookup, SyncConfig, SyncEngine,
};
use quizsync_model::{
    Mistake, MistakeEntry, QuestionContent, QuestionIdType, SyncMetadata, METADATA_DOC_ID,
};
use quizsync_store::{
    Collection, CollectionRef, KeyValueLocalStore, LocalStore, MemoryKeyValue, MemoryRemoteStore,
    RemoteConfig,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// Engine type used by [`DeviceFixture`].
pub type MemoryEngine<Q> = SyncEngine<KeyValueLocalStore<MemoryKeyValue>, MemoryRemoteStore, Q>;

/// Returns a fixed instant `secs` seconds after the Unix epoch.
pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .unwrap_or_default()
}

/// Deterministic question content for `question_id`.
pub fn content_for(question_id: &str) -> QuestionContent {
    QuestionContent {
        question: format!("Question {question_id}"),
        options: vec!["A".into(), "B".into(), "C".into(), "D".into()],
        correct_answer: "A".into(),
        rationale: Some(format!("Rationale for {question_id}")),
    }
}

/// Joins `entry` with [`content_for`] its question.
pub fn mistake_for(entry: MistakeEntry) -> Mistake {
    let content = content_for(&entry.question_id);
    Mistake::new(entry, content)
}

/// Builds a catalog holding [`content_for`] each listed question.
pub fn catalog_for<'a>(
    questions: impl IntoIterator<Item = (&'a str, QuestionIdType)>,
) -> CatalogLookup {
    let catalog = CatalogLookup::new();
    for (id, id_type) in questions {
        catalog.insert(id, id_type, content_for(id));
    }
    catalog
}

/// Creates a remote store with `user_id` signed in.
pub fn shared_remote(user_id: &str) -> Arc<MemoryRemoteStore> {
    shared_remote_with(user_id, RemoteConfig::default())
}

/// Creates a remote store with `user_id` signed in and a custom config.
pub fn shared_remote_with(user_id: &str, config: RemoteConfig) -> Arc<MemoryRemoteStore> {
    let remote = MemoryRemoteStore::with_config(config);
    remote.sign_in(user_id);
    Arc::new(remote)
}

/// Returns the document IDs in one of `user_id`'s collections.
pub fn remote_ids(remote: &MemoryRemoteStore, user_id: &str, collection: Collection) -> Vec<String> {
    remote.document_ids(&CollectionRef::new(user_id, collection))
}

/// Reads `user_id`'s metadata document, if present and well-formed.
pub fn remote_metadata(remote: &MemoryRemoteStore, user_id: &str) -> Option<SyncMetadata> {
    let path = CollectionRef::new(user_id, Collection::Sync).path();
    remote
        .snapshot()
        .collections
        .get(&path)
        .and_then(|docs| docs.get(METADATA_DOC_ID))
        .and_then(|doc| serde_json::from_value(doc.clone()).ok())
}

/// Panics unless the metadata counts equal the true collection sizes.
pub fn assert_metadata_accurate(remote: &MemoryRemoteStore, user_id: &str) {
    let metadata = remote_metadata(remote, user_id).expect("metadata document missing");
    let seen = remote_ids(remote, user_id, Collection::SeenQuestions).len() as u64;
    let mistakes = remote_ids(remote, user_id, Collection::Mistakes).len() as u64;
    assert_eq!(
        (metadata.seen_questions_count, metadata.mistakes_count),
        (seen, mistakes),
        "metadata counts (left) differ from collection sizes (right)"
    );
}

/// A lookup that resolves every question to [`content_for`] it, except
/// questions told to fail.
#[derive(Debug, Default)]
pub struct FlakyLookup {
    failing: RwLock<HashMap<String, LookupError>>,
    calls: AtomicUsize,
}

impl FlakyLookup {
    /// Creates a lookup that resolves everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes lookups of `question_id` fail with `error`.
    pub fn fail(&self, question_id: impl Into<String>, error: LookupError) -> &Self {
        self.failing.write().insert(question_id.into(), error);
        self
    }

    /// Makes lookups of `question_id` succeed again.
    pub fn heal(&self, question_id: &str) {
        self.failing.write().remove(question_id);
    }

    /// Returns the number of lookups made.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuestionLookup for FlakyLookup {
    async fn resolve(
        &self,
        question_id: &str,
        _id_type: QuestionIdType,
    ) -> Result<QuestionContent, LookupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.failing.read().get(question_id) {
            Some(err) => Err(err.clone()),
            None => Ok(content_for(question_id)),
        }
    }
}

/// One simulated device of a user.
pub struct DeviceFixture<Q: QuestionLookup = FlakyLookup> {
    /// The device's engine.
    pub engine: MemoryEngine<Q>,
    /// The remote store shared with other devices.
    pub remote: Arc<MemoryRemoteStore>,
    /// The device's question lookup.
    pub lookup: Arc<Q>,
}

impl DeviceFixture<FlakyLookup> {
    /// Creates a device with an empty local store and a [`FlakyLookup`].
    pub fn new(device_id: &str, remote: Arc<MemoryRemoteStore>) -> Self {
        Self::with_lookup(device_id, remote, FlakyLookup::new())
    }
}

impl<Q: QuestionLookup> DeviceFixture<Q> {
    /// Creates a device with an empty local store and `lookup`.
    pub fn with_lookup(device_id: &str, remote: Arc<MemoryRemoteStore>, lookup: Q) -> Self {
        Self::with_config(SyncConfig::new(device_id), remote, lookup)
    }

    /// Creates a device with a custom engine configuration.
    pub fn with_config(config: SyncConfig, remote: Arc<MemoryRemoteStore>, lookup: Q) -> Self {
        let lookup = Arc::new(lookup);
        let engine = SyncEngine::new(
            config,
            Arc::new(KeyValueLocalStore::new(MemoryKeyValue::new())),
            remote.clone(),
            lookup.clone(),
        );
        Self {
            engine,
            remote,
            lookup,
        }
    }

    /// Records `ids` as seen locally.
    pub fn with_seen(self, ids: &[&str]) -> Self {
        let ids: Vec<String> = ids.iter().map(|s| s.to_string()).collect();
        self.local()
            .add_seen_questions(&ids)
            .expect("failed to seed seen questions");
        self
    }

    /// Records `entries` as local mistakes with [`content_for`] content.
    pub fn with_mistakes(self, entries: Vec<MistakeEntry>) -> Self {
        let mistakes: Vec<Mistake> = entries.into_iter().map(mistake_for).collect();
        self.local()
            .upsert_mistakes(mistakes)
            .expect("failed to seed mistakes");
        self
    }

    /// Returns the device's local store.
    pub fn local(&self) -> &KeyValueLocalStore<MemoryKeyValue> {
        self.engine.local()
    }

    /// Returns the locally seen question IDs.
    pub fn seen(&self) -> Vec<String> {
        self.local()
            .seen_questions()
            .expect("failed to read seen questions")
    }

    /// Returns the local mistake question IDs, sorted.
    pub fn mistake_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .local()
            .mistakes()
            .expect("failed to read mistakes")
            .iter()
            .map(|m| m.question_id().to_string())
            .collect();
        ids.sort();
        ids
    }
}

/// A temporary directory laid out for the file-backed stores.
pub struct TempPaths {
    dir: TempDir,
}

impl TempPaths {
    /// Creates a fresh directory.
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("failed to create temp directory"),
        }
    }

    /// Path for a device's local key/value file.
    pub fn local_path(&self, device_id: &str) -> PathBuf {
        self.dir.path().join(format!("{device_id}.local.json"))
    }

    /// Path for the shared remote document file.
    pub fn remote_path(&self) -> PathBuf {
        self.dir.path().join("remote.json")
    }

    /// Writes a catalog holding [`content_for`] each question and returns its path.
    pub fn write_catalog(&self, questions: &[(&str, QuestionIdType)]) -> PathBuf {
        let entries: Vec<CatalogEntry> = questions
            .iter()
            .map(|(id, id_type)| CatalogEntry {
                question_id: id.to_string(),
                question_id_type: *id_type,
                content: content_for(id),
            })
            .collect();
        let path = self.dir.path().join("catalog.json");
        let json = serde_json::to_string_pretty(&entries).expect("failed to encode catalog");
        std::fs::write(&path, json).expect("failed to write catalog");
        path
    }
}

impl Default for TempPaths {
    fn default() -> Self {
        Self::new()
    }
}
