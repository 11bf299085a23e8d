//! Incremental pull.
//!
//! The four sub-pulls run concurrently and are joined before the cursor
//! moves. Seen-question and mistake failures fail the pull; settings and
//! filters failures are logged and leave the local values untouched.
//!
//! Seen questions and mistakes are selected by their write time
//! (`syncedAt`), not by when they were seen or made, so an old mistake
//! pushed late still reaches every device.

use crate::engine::{decode_mistakes, in_write_order, local, SyncEngine, UserCollections};
use crate::error::SyncResult;
use crate::lookup::QuestionLookup;
use crate::report::PullReport;
use chrono::{DateTime, Utc};
use quizsync_model::{
    Document, UserFilters, UserSettings, FILTERS_DOC_ID, PREFERENCES_DOC_ID, SYNCED_AT_FIELD,
};
use quizsync_store::{CollectionRef, LocalStore, RemoteStore, StoredDocument};
use tracing::{debug, info, warn};

/// What the mistakes sub-pull changed.
struct MistakesPulled {
    added: usize,
    skipped: usize,
}

impl<L, R, Q> SyncEngine<L, R, Q>
where
    L: LocalStore,
    R: RemoteStore,
    Q: QuestionLookup,
{
    /// Pulls changes since the stored cursor.
    ///
    /// A device that never synced pulls everything.
    pub async fn pull_changes(&self) -> SyncResult<PullReport> {
        let cursor = match local(self.local.last_sync()) {
            Ok(cursor) => cursor,
            Err(e) => {
                self.record_failure("pull_changes", &e);
                return Err(e);
            }
        };
        self.pull_since(cursor).await
    }

    /// Pulls every document changed after `cursor`, or everything for `None`.
    ///
    /// On success the local cursor is set to the instant the pull started,
    /// so writes racing with the pull are fetched again next time.
    pub async fn pull_since(&self, cursor: Option<DateTime<Utc>>) -> SyncResult<PullReport> {
        let result = self.pull_inner(cursor).await;
        match &result {
            Ok(report) => {
                self.stats.write().pulls += 1;
                self.record_success();
                info!(
                    seen_added = report.seen_added,
                    mistakes_added = report.mistakes_added,
                    mistakes_skipped = report.mistakes_skipped,
                    "pull complete"
                );
            }
            Err(e) => self.record_failure("pull_since", e),
        }
        result
    }

    async fn pull_inner(&self, cursor: Option<DateTime<Utc>>) -> SyncResult<PullReport> {
        let collections = self.collections()?;
        let started = Utc::now();
        debug!(?cursor, "pulling remote changes");

        let (seen, mistakes, settings, filters) = tokio::join!(
            self.pull_seen(&collections, cursor),
            self.pull_mistakes(&collections, cursor),
            self.pull_settings(&collections, cursor),
            self.pull_filters(&collections, cursor),
        );
        let settings_applied = settings.unwrap_or_else(|e| {
            warn!(error = %e, "settings pull failed");
            false
        });
        let filters_applied = filters.unwrap_or_else(|e| {
            warn!(error = %e, "filters pull failed");
            false
        });
        let seen_added = seen?;
        let mistakes = mistakes?;

        local(self.local.set_last_sync(Some(started)))?;
        Ok(PullReport {
            seen_added,
            mistakes_added: mistakes.added,
            mistakes_skipped: mistakes.skipped,
            settings_applied,
            filters_applied,
            cursor: started,
        })
    }

    async fn changed_since(
        &self,
        collection: &CollectionRef,
        cursor: Option<DateTime<Utc>>,
    ) -> SyncResult<Vec<StoredDocument>> {
        let docs = match cursor {
            Some(after) => {
                self.remote
                    .query_after(collection, SYNCED_AT_FIELD, after)
                    .await?
            }
            None => self.remote.list(collection, None).await?,
        };
        Ok(in_write_order(docs))
    }

    async fn pull_seen(
        &self,
        collections: &UserCollections,
        cursor: Option<DateTime<Utc>>,
    ) -> SyncResult<usize> {
        let docs = self.changed_since(&collections.seen, cursor).await?;
        let ids: Vec<String> = docs.into_iter().map(|d| d.id).collect();
        local(self.local.add_seen_questions(&ids))
    }

    async fn pull_mistakes(
        &self,
        collections: &UserCollections,
        cursor: Option<DateTime<Utc>>,
    ) -> SyncResult<MistakesPulled> {
        let docs = self.changed_since(&collections.mistakes, cursor).await?;
        let (entries, malformed) = decode_mistakes(docs);
        let rehydrated = self.rehydrate(entries).await;
        let skipped = malformed + rehydrated.skipped.len();
        let added = local(self.local.upsert_mistakes(rehydrated.mistakes))?;
        Ok(MistakesPulled { added, skipped })
    }

    async fn pull_settings(
        &self,
        collections: &UserCollections,
        cursor: Option<DateTime<Utc>>,
    ) -> SyncResult<bool> {
        let Some(doc) = self.remote.get(&collections.preferences, PREFERENCES_DOC_ID).await? else {
            return Ok(false);
        };
        let remote = UserSettings::from_document(&doc.id, doc.data)?;
        let current = local(self.local.settings())?;
        if !applies(remote.last_updated, cursor) || !remote.is_newer_than(&current) {
            return Ok(false);
        }
        local(self.local.set_settings(&remote))?;
        Ok(true)
    }

    async fn pull_filters(
        &self,
        collections: &UserCollections,
        cursor: Option<DateTime<Utc>>,
    ) -> SyncResult<bool> {
        let Some(doc) = self.remote.get(&collections.preferences, FILTERS_DOC_ID).await? else {
            return Ok(false);
        };
        let remote = UserFilters::from_document(&doc.id, doc.data)?;
        let current = local(self.local.filters())?;
        if !applies(remote.last_updated, cursor) || !remote.is_newer_than(&current) {
            return Ok(false);
        }
        local(self.local.set_filters(&remote))?;
        Ok(true)
    }
}

/// Returns true if a preference document changed after the cursor.
fn applies(last_updated: DateTime<Utc>, cursor: Option<DateTime<Utc>>) -> bool {
    cursor.is_none_or(|c| last_updated > c)
}
