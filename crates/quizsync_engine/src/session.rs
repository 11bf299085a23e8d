//! Session start and status reporting.

use crate::engine::{local, SyncEngine, UserCollections};
use crate::error::SyncResult;
use crate::lookup::QuestionLookup;
use crate::report::{ConflictSummary, InitialSyncOutcome, SyncStatus};
use quizsync_store::{LocalStore, RemoteStore};
use tracing::{debug, info};

impl<L, R, Q> SyncEngine<L, R, Q>
where
    L: LocalStore,
    R: RemoteStore,
    Q: QuestionLookup,
{
    /// Decides what to do when a user signs in.
    ///
    /// | local | remote | action |
    /// |---|---|---|
    /// | empty | empty | nothing |
    /// | data | empty | back up |
    /// | empty | data | restore |
    /// | data | data, synced before | pull since cursor |
    /// | data | data, never synced | report a conflict |
    ///
    /// A reported conflict is settled with
    /// [`SyncEngine::resolve_conflict`].
    pub async fn check_initial_sync(&self) -> SyncResult<InitialSyncOutcome> {
        let collections = self.collections()?;
        let local_seen = local(self.local.seen_questions())?.len() as u64;
        let local_mistakes = local(self.local.mistakes())?.len() as u64;
        let (remote_seen, remote_mistakes) = self.remote_counts(&collections).await?;

        let local_has_data = local_seen > 0 || local_mistakes > 0;
        let remote_has_data = remote_seen > 0 || remote_mistakes > 0;
        debug!(local_has_data, remote_has_data, "checking initial sync");

        let outcome = match (local_has_data, remote_has_data) {
            (false, false) => InitialSyncOutcome::NothingToSync,
            (true, false) => {
                info!("no cloud data, backing up local progress");
                InitialSyncOutcome::BackedUp(self.backup_to_cloud().await?)
            }
            (false, true) => {
                info!("no local data, restoring cloud progress");
                InitialSyncOutcome::Restored(self.restore_from_cloud().await?)
            }
            (true, true) => match local(self.local.last_sync())? {
                Some(cursor) => InitialSyncOutcome::Pulled(self.pull_since(Some(cursor)).await?),
                None => {
                    info!("local and cloud progress diverge");
                    self.stats.write().conflicts_detected += 1;
                    InitialSyncOutcome::ConflictDetected(ConflictSummary {
                        local_seen,
                        local_mistakes,
                        remote_seen,
                        remote_mistakes,
                    })
                }
            },
        };
        Ok(outcome)
    }

    /// Reports local counts, the cursor, remote metadata, and restore state.
    ///
    /// Remote failures are reported in the status rather than returned.
    pub async fn status(&self) -> SyncResult<SyncStatus> {
        let user_id = self.remote.current_user();
        let (remote, remote_error) = match user_id.as_deref() {
            Some(user) => match self.load_metadata(&UserCollections::new(user)).await {
                Ok(metadata) => (metadata, None),
                Err(e) => (None, Some(e.to_string())),
            },
            None => (None, None),
        };
        Ok(SyncStatus {
            user_id,
            local_seen: local(self.local.seen_questions())?.len(),
            local_mistakes: local(self.local.mistakes())?.len(),
            last_sync: local(self.local.last_sync())?,
            remote,
            remote_error,
            restore: self.restore.current(),
        })
    }

    /// Remote counts from the metadata, or from the collections when the
    /// metadata is missing.
    async fn remote_counts(&self, collections: &UserCollections) -> SyncResult<(u64, u64)> {
        let metadata = self
            .metadata_or_recount(collections, chrono::Utc::now())
            .await?;
        Ok((metadata.seen_questions_count, metadata.mistakes_count))
    }
}

#[cfg(test)]
mod tests {
    use crate::config::SyncConfig;
    use crate::lookup::CatalogLookup;
    use crate::report::InitialSyncOutcome;
    use crate::state::RestoreState;
    use crate::SyncEngine;
    use quizsync_store::{
        Collection, CollectionRef, KeyValueLocalStore, LocalStore, MemoryKeyValue,
        MemoryRemoteStore, RemoteStore,
    };
    use serde_json::json;
    use std::sync::Arc;

    type TestEngine =
        SyncEngine<KeyValueLocalStore<MemoryKeyValue>, MemoryRemoteStore, CatalogLookup>;

    fn engine() -> TestEngine {
        let remote = MemoryRemoteStore::new();
        remote.sign_in("u1");
        SyncEngine::new(
            SyncConfig::new("device-a"),
            Arc::new(KeyValueLocalStore::new(MemoryKeyValue::new())),
            Arc::new(remote),
            Arc::new(CatalogLookup::new()),
        )
    }

    #[tokio::test]
    async fn empty_on_both_sides() {
        let engine = engine();
        assert_eq!(
            engine.check_initial_sync().await.unwrap(),
            InitialSyncOutcome::NothingToSync
        );
    }

    #[tokio::test]
    async fn remote_without_metadata_still_counts() {
        let engine = engine();
        let seen = CollectionRef::new("u1", Collection::SeenQuestions);
        engine.remote().set(&seen, "B", json!({})).await.unwrap();

        let outcome = engine.check_initial_sync().await.unwrap();
        assert!(matches!(outcome, InitialSyncOutcome::Restored(ref r) if r.seen_questions == 1));
        assert_eq!(engine.local().seen_questions().unwrap(), vec!["B"]);
    }

    #[tokio::test]
    async fn previously_synced_device_pulls() {
        let engine = engine();
        engine
            .local()
            .set_seen_questions(&["A".to_string()])
            .unwrap();
        engine.backup_to_cloud().await.unwrap();

        let outcome = engine.check_initial_sync().await.unwrap();
        assert!(matches!(outcome, InitialSyncOutcome::Pulled(_)));
    }

    #[tokio::test]
    async fn status_offline_reports_error() {
        let engine = engine();
        engine.remote().set_online(false);

        let status = engine.status().await.unwrap();
        assert_eq!(status.user_id.as_deref(), Some("u1"));
        assert!(status.remote.is_none());
        assert!(status.remote_error.is_some());
        assert_eq!(status.restore, RestoreState::Idle);
    }
}
