//! Incremental push of single entries.
//!
//! Each push writes one document together with updated metadata. The count
//! for a collection grows only when the pushed document did not exist
//! remotely, so pushing the same entry twice leaves the counts unchanged.
//! Seen-question and mistake documents are stamped with the write time,
//! which is what incremental pulls on other devices query.

use crate::engine::{SyncEngine, UserCollections};
use crate::error::SyncResult;
use crate::lookup::QuestionLookup;
use crate::state::SyncOutcome;
use chrono::{DateTime, Utc};
use quizsync_model::{
    Document, MistakeEntry, SeenQuestionEntry, SyncMetadata, SyncStamp, UserFilters,
    UserSettings, FILTERS_DOC_ID, LAST_UPDATED_FIELD, METADATA_DOC_ID, PREFERENCES_DOC_ID, TIMESTAMP_FIELD,
};
use quizsync_store::{BatchOp, CollectionRef, LocalStore, RemoteStore};
use serde_json::Value;
use tracing::{debug, info};

impl<L, R, Q> SyncEngine<L, R, Q>
where
    L: LocalStore,
    R: RemoteStore,
    Q: QuestionLookup,
{
    /// Pushes one seen question.
    ///
    /// Expected failures (offline, signed out) are logged and returned; they
    /// never panic.
    pub async fn sync_seen_question(&self, question_id: &str) -> SyncResult<SyncOutcome> {
        let result = self.push_seen(question_id).await;
        self.record_push("sync_seen_question", &result);
        result
    }

    /// Pushes the latest mistake for a question.
    ///
    /// Returns [`SyncOutcome::ConflictDetected`] without writing if the
    /// remote mistake for the same question is newer.
    pub async fn sync_mistake(&self, entry: &MistakeEntry) -> SyncResult<SyncOutcome> {
        let result = self.push_mistake(entry).await;
        self.record_push("sync_mistake", &result);
        result
    }

    /// Pushes the settings document.
    ///
    /// Returns [`SyncOutcome::ConflictDetected`] without writing if the
    /// remote settings were changed later.
    pub async fn sync_settings(&self, settings: &UserSettings) -> SyncResult<SyncOutcome> {
        let mut settings = settings.clone();
        settings
            .device_id
            .get_or_insert_with(|| self.config.device_id.clone());
        let result = self
            .push_preference(PREFERENCES_DOC_ID, settings.last_updated, settings.to_document())
            .await;
        self.record_push("sync_settings", &result);
        result
    }

    /// Pushes the filters document.
    ///
    /// Returns [`SyncOutcome::ConflictDetected`] without writing if the
    /// remote filters were changed later.
    pub async fn sync_filters(&self, filters: &UserFilters) -> SyncResult<SyncOutcome> {
        let mut filters = filters.clone();
        filters
            .device_id
            .get_or_insert_with(|| self.config.device_id.clone());
        let result = self
            .push_preference(FILTERS_DOC_ID, filters.last_updated, filters.to_document())
            .await;
        self.record_push("sync_filters", &result);
        result
    }

    async fn push_seen(&self, question_id: &str) -> SyncResult<SyncOutcome> {
        let collections = self.collections()?;
        let now = Utc::now();
        let exists = self
            .remote
            .get(&collections.seen, question_id)
            .await?
            .is_some();
        let mut metadata = self.metadata_or_recount(&collections, now).await?;

        let mut ops = Vec::with_capacity(2);
        if exists {
            debug!(question_id, "seen question already pushed");
        } else {
            let entry =
                SeenQuestionEntry::new(question_id, now).with_device(self.config.device_id.as_str());
            ops.push(set_op(
                &collections.seen,
                question_id,
                entry.to_stamped_document(SyncStamp::new(now))?,
            ));
            metadata.seen_questions_count += 1;
        }
        metadata.last_seen_question_sync = Some(now);
        self.commit_with_metadata(&collections, ops, metadata, now)
            .await?;
        Ok(SyncOutcome::Synced)
    }

    async fn push_mistake(&self, entry: &MistakeEntry) -> SyncResult<SyncOutcome> {
        let collections = self.collections()?;
        let now = Utc::now();
        let existing = self
            .remote
            .get(&collections.mistakes, &entry.question_id)
            .await?;
        if let Some(remote_ts) = existing.as_ref().and_then(|d| d.timestamp(TIMESTAMP_FIELD)) {
            if remote_ts > entry.timestamp {
                info!(question_id = %entry.question_id, "remote mistake is newer, not overwriting");
                return Ok(SyncOutcome::ConflictDetected);
            }
        }
        let mut metadata = self.metadata_or_recount(&collections, now).await?;

        let mut entry = entry.clone();
        entry
            .device_id
            .get_or_insert_with(|| self.config.device_id.clone());
        if existing.is_none() {
            metadata.mistakes_count += 1;
        }
        metadata.last_mistake_sync = Some(now);
        let ops = vec![set_op(
            &collections.mistakes,
            &entry.question_id,
            entry.to_stamped_document(SyncStamp::new(now))?,
        )];
        self.commit_with_metadata(&collections, ops, metadata, now)
            .await?;
        Ok(SyncOutcome::Synced)
    }

    async fn push_preference(
        &self,
        doc_id: &str,
        last_updated: DateTime<Utc>,
        body: quizsync_model::ModelResult<Value>,
    ) -> SyncResult<SyncOutcome> {
        let body = body?;
        let collections = self.collections()?;
        let now = Utc::now();
        let existing = self.remote.get(&collections.preferences, doc_id).await?;
        if let Some(remote_ts) = existing.as_ref().and_then(|d| d.timestamp(LAST_UPDATED_FIELD)) {
            if remote_ts > last_updated {
                info!(doc_id, "remote preferences are newer, not overwriting");
                return Ok(SyncOutcome::ConflictDetected);
            }
        }
        let mut metadata = self.metadata_or_recount(&collections, now).await?;
        metadata.last_settings_sync = Some(now);
        let ops = vec![set_op(&collections.preferences, doc_id, body)];
        self.commit_with_metadata(&collections, ops, metadata, now)
            .await?;
        Ok(SyncOutcome::Synced)
    }

    async fn commit_with_metadata(
        &self,
        collections: &UserCollections,
        mut ops: Vec<BatchOp>,
        mut metadata: SyncMetadata,
        now: DateTime<Utc>,
    ) -> SyncResult<()> {
        metadata.last_updated = now;
        ops.push(set_op(
            &collections.sync,
            METADATA_DOC_ID,
            metadata.to_document()?,
        ));
        self.commit_paged(ops).await?;
        Ok(())
    }

    fn record_push(&self, operation: &'static str, result: &SyncResult<SyncOutcome>) {
        match result {
            Ok(SyncOutcome::Synced) => {
                self.stats.write().pushes += 1;
                self.record_success();
            }
            Ok(SyncOutcome::ConflictDetected) => {
                self.stats.write().conflicts_detected += 1;
            }
            Err(e) => {
                self.stats.write().push_failures += 1;
                self.record_failure(operation, e);
            }
        }
    }
}

pub(crate) fn set_op(collection: &CollectionRef, id: &str, data: Value) -> BatchOp {
    BatchOp::Set {
        collection: collection.clone(),
        id: id.to_string(),
        data,
    }
}

#[cfg(test)]
mod tests {
    use crate::config::SyncConfig;
    use crate::error::SyncError;
    use crate::lookup::CatalogLookup;
    use crate::state::SyncOutcome;
    use crate::SyncEngine;
    use chrono::{Duration, TimeZone, Utc};
    use quizsync_model::{
        MistakeEntry, QuestionIdType, SyncStamp, UserFilters, UserSettings, TIMESTAMP_FIELD,
    };
    use quizsync_store::{
        Collection, CollectionRef, KeyValueLocalStore, MemoryKeyValue, MemoryRemoteStore,
        RemoteStore,
    };
    use std::sync::Arc;

    type TestEngine =
        SyncEngine<KeyValueLocalStore<MemoryKeyValue>, MemoryRemoteStore, CatalogLookup>;

    fn signed_in_engine() -> TestEngine {
        let remote = MemoryRemoteStore::new();
        remote.sign_in("u1");
        SyncEngine::new(
            SyncConfig::new("device-a"),
            Arc::new(KeyValueLocalStore::new(MemoryKeyValue::new())),
            Arc::new(remote),
            Arc::new(CatalogLookup::new()),
        )
    }

    async fn counts(engine: &TestEngine) -> (u64, u64) {
        let collections = engine.collections().unwrap();
        let metadata = engine.load_metadata(&collections).await.unwrap().unwrap();
        (metadata.seen_questions_count, metadata.mistakes_count)
    }

    #[tokio::test]
    async fn seen_push_is_idempotent() {
        let engine = signed_in_engine();
        let seen = CollectionRef::new("u1", Collection::SeenQuestions);

        assert_eq!(engine.sync_seen_question("A").await.unwrap(), SyncOutcome::Synced);
        let first = engine.remote().snapshot();
        assert_eq!(engine.sync_seen_question("A").await.unwrap(), SyncOutcome::Synced);

        assert_eq!(counts(&engine).await, (1, 0));
        assert_eq!(engine.remote().document_ids(&seen), vec!["A"]);
        assert_eq!(
            first.collections[&seen.path()],
            engine.remote().snapshot().collections[&seen.path()]
        );
        assert_eq!(engine.stats().pushes, 2);
    }

    #[tokio::test]
    async fn mistake_push_counts_new_questions_only() {
        let engine = signed_in_engine();
        let t0 = Utc.timestamp_opt(1_000, 0).unwrap();

        let first = MistakeEntry::choice("Q1", QuestionIdType::External, "A", t0);
        let retry = MistakeEntry::choice("Q1", QuestionIdType::External, "C", t0 + Duration::seconds(5));
        engine.sync_mistake(&first).await.unwrap();
        engine.sync_mistake(&retry).await.unwrap();

        assert_eq!(counts(&engine).await, (0, 1));
    }

    #[tokio::test]
    async fn mistake_document_carries_write_time() {
        let engine = signed_in_engine();
        let made = Utc.timestamp_opt(1_000, 0).unwrap();
        let before = Utc::now();
        let entry = MistakeEntry::choice("Q1", QuestionIdType::External, "A", made);
        engine.sync_mistake(&entry).await.unwrap();

        let mistakes = CollectionRef::new("u1", Collection::Mistakes);
        let doc = engine.remote().get(&mistakes, "Q1").await.unwrap().unwrap();
        let stamp = SyncStamp::from_document(&doc.data).unwrap();
        assert!(stamp.synced_at >= before);
        assert_eq!(stamp.position, None);
        assert_eq!(doc.timestamp(TIMESTAMP_FIELD), Some(made));
    }

    #[tokio::test]
    async fn older_mistake_is_a_conflict() {
        let engine = signed_in_engine();
        let t0 = Utc.timestamp_opt(1_000, 0).unwrap();

        let newer = MistakeEntry::choice("Q1", QuestionIdType::External, "A", t0);
        let older = MistakeEntry::choice("Q1", QuestionIdType::External, "B", t0 - Duration::seconds(1));
        engine.sync_mistake(&newer).await.unwrap();

        assert_eq!(
            engine.sync_mistake(&older).await.unwrap(),
            SyncOutcome::ConflictDetected
        );
        assert_eq!(engine.stats().conflicts_detected, 1);
    }

    #[tokio::test]
    async fn settings_last_write_wins() {
        let engine = signed_in_engine();
        let now = Utc::now();
        let newer = UserSettings {
            oled_mode: true,
            ..UserSettings::default()
        }
        .touched(now, "device-b");
        let older = UserSettings::default().touched(now - Duration::minutes(1), "device-a");

        assert_eq!(engine.sync_settings(&newer).await.unwrap(), SyncOutcome::Synced);
        assert_eq!(
            engine.sync_settings(&older).await.unwrap(),
            SyncOutcome::ConflictDetected
        );

        let filters = UserFilters::default().touched(now, "device-a");
        assert_eq!(engine.sync_filters(&filters).await.unwrap(), SyncOutcome::Synced);
        assert_eq!(counts(&engine).await, (0, 0));
    }

    #[tokio::test]
    async fn signed_out_push_fails_without_panicking() {
        let engine = signed_in_engine();
        engine.remote().sign_out();

        let err = engine.sync_seen_question("A").await.unwrap_err();
        assert!(matches!(err, SyncError::Auth(_)));
        assert!(err.is_expected());
        let stats = engine.stats();
        assert_eq!(stats.push_failures, 1);
        assert!(stats.last_error.is_some());
    }

    #[tokio::test]
    async fn offline_push_fails_with_network_error() {
        let engine = signed_in_engine();
        engine.remote().set_online(false);

        let err = engine.sync_seen_question("A").await.unwrap_err();
        assert!(matches!(err, SyncError::Network(_)));
    }
}
