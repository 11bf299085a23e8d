//! Full backup and restore.
//!
//! These operations overwrite one side with the other and propagate every
//! error to the caller, which is expected to block on them and report
//! failure.

use crate::engine::{decode_mistakes, in_write_order, local, SyncEngine, UserCollections};
use crate::error::SyncResult;
use crate::lookup::QuestionLookup;
use crate::push::set_op;
use crate::report::{BackupReport, RestoreReport};
use crate::state::RestoreGuard;
use chrono::Utc;
use quizsync_model::{
    Document, MistakeEntry, SeenQuestionEntry, SyncMetadata, SyncStamp, UserFilters,
    UserSettings, FILTERS_DOC_ID, METADATA_DOC_ID, PREFERENCES_DOC_ID,
};
use quizsync_store::{LocalStore, RemoteStore};
use std::collections::HashSet;
use tracing::info;

/// Remote progress read before anything local is touched.
struct RemoteProgress {
    seen: Vec<String>,
    settings: Option<UserSettings>,
    filters: Option<UserFilters>,
}

impl<L, R, Q> SyncEngine<L, R, Q>
where
    L: LocalStore,
    R: RemoteStore,
    Q: QuestionLookup,
{
    /// Replaces all remote progress with the local progress.
    ///
    /// Clears the remote collections, then writes every seen question,
    /// mistake, settings, filters, and exact metadata. Writes are committed
    /// in pages with the metadata in the last page.
    pub async fn backup_to_cloud(&self) -> SyncResult<BackupReport> {
        let result = self.backup_inner().await;
        match &result {
            Ok(report) => {
                self.record_success();
                info!(
                    seen_questions = report.seen_questions,
                    mistakes = report.mistakes,
                    "backup complete"
                );
            }
            Err(e) => self.record_failure("backup_to_cloud", e),
        }
        result
    }

    /// Replaces all local progress with the remote progress.
    pub async fn restore_from_cloud(&self) -> SyncResult<RestoreReport> {
        let guard = self.restore.begin("Restoring progress");
        let result = self.restore_inner(&guard, false).await;
        self.finish_restore("restore_from_cloud", guard, &result, None);
        result
    }

    /// Restores everything except mistakes.
    ///
    /// Local mistakes are cleared and the restore state stays
    /// `Restoring` until [`Self::restore_mistakes_only`] completes.
    pub async fn restore_without_mistakes(&self) -> SyncResult<RestoreReport> {
        let guard = self.restore.begin("Restoring progress");
        let result = self.restore_inner(&guard, true).await;
        self.finish_restore(
            "restore_without_mistakes",
            guard,
            &result,
            Some("Waiting to restore mistakes"),
        );
        result
    }

    /// Restores mistakes after [`Self::restore_without_mistakes`].
    ///
    /// Mistakes recorded locally in the meantime are kept unless the remote
    /// copy is at least as new. On failure the restore state becomes
    /// [`RestoreState::Failed`](crate::RestoreState::Failed) so the missing
    /// mistakes stay visible.
    pub async fn restore_mistakes_only(&self) -> SyncResult<RestoreReport> {
        let guard = self.restore.begin("Restoring mistakes");
        let result = self.restore_mistakes_inner().await;
        self.finish_restore("restore_mistakes_only", guard, &result, None);
        result
    }

    async fn backup_inner(&self) -> SyncResult<BackupReport> {
        let collections = self.collections()?;
        let started = Utc::now();

        let seen = dedup(local(self.local.seen_questions())?);
        let mut mistake_ids = HashSet::new();
        let mistakes: Vec<MistakeEntry> = local(self.local.mistakes())?
            .into_iter()
            .map(|m| m.entry)
            .filter(|e| mistake_ids.insert(e.question_id.clone()))
            .collect();
        let settings = local(self.local.settings())?;
        let filters = local(self.local.filters())?;

        self.clear_all().await?;
        let mut ops = Vec::with_capacity(seen.len() + mistakes.len() + 3);
        for (position, id) in seen.iter().enumerate() {
            let entry = SeenQuestionEntry::new(id.as_str(), started)
                .with_device(self.config.device_id.as_str());
            ops.push(set_op(
                &collections.seen,
                id,
                entry.to_stamped_document(SyncStamp::at_position(started, position))?,
            ));
        }
        for (position, entry) in mistakes.iter().enumerate() {
            ops.push(set_op(
                &collections.mistakes,
                &entry.question_id,
                entry.to_stamped_document(SyncStamp::at_position(started, position))?,
            ));
        }
        ops.push(set_op(
            &collections.preferences,
            PREFERENCES_DOC_ID,
            settings.to_document()?,
        ));
        ops.push(set_op(
            &collections.preferences,
            FILTERS_DOC_ID,
            filters.to_document()?,
        ));
        let mut metadata =
            SyncMetadata::with_counts(started, seen.len() as u64, mistakes.len() as u64);
        metadata.last_seen_question_sync = Some(started);
        metadata.last_mistake_sync = Some(started);
        metadata.last_settings_sync = Some(started);
        ops.push(set_op(
            &collections.sync,
            METADATA_DOC_ID,
            metadata.to_document()?,
        ));

        let commits = self.commit_paged(ops).await?;
        local(self.local.set_last_sync(Some(started)))?;
        Ok(BackupReport {
            seen_questions: seen.len(),
            mistakes: mistakes.len(),
            commits,
        })
    }

    async fn restore_mistakes_inner(&self) -> SyncResult<RestoreReport> {
        let collections = self.collections()?;
        let docs = in_write_order(self.remote.list(&collections.mistakes, None).await?);
        let (entries, malformed) = decode_mistakes(docs);
        let rehydrated = self.rehydrate(entries).await;
        let skipped = malformed + rehydrated.skipped.len();
        let restored = local(self.local.upsert_mistakes(rehydrated.mistakes))?;
        Ok(RestoreReport {
            mistakes_restored: restored,
            mistakes_skipped: skipped,
            ..RestoreReport::default()
        })
    }

    async fn restore_inner(
        &self,
        guard: &RestoreGuard<'_>,
        defer_mistakes: bool,
    ) -> SyncResult<RestoreReport> {
        let collections = self.collections()?;
        let started = Utc::now();

        let progress = self.read_remote_progress(&collections).await?;
        let mistakes = if defer_mistakes {
            None
        } else {
            guard.progress("Restoring mistakes");
            let docs = in_write_order(self.remote.list(&collections.mistakes, None).await?);
            let (entries, malformed) = decode_mistakes(docs);
            let rehydrated = self.rehydrate(entries).await;
            Some((rehydrated.mistakes, malformed + rehydrated.skipped.len()))
        };

        local(self.local.clear())?;
        local(self.local.set_seen_questions(&progress.seen))?;
        if let Some(settings) = &progress.settings {
            local(self.local.set_settings(settings))?;
        }
        if let Some(filters) = &progress.filters {
            local(self.local.set_filters(filters))?;
        }
        let mut report = RestoreReport {
            seen_questions: progress.seen.len(),
            settings_restored: progress.settings.is_some(),
            filters_restored: progress.filters.is_some(),
            ..RestoreReport::default()
        };
        match mistakes {
            Some((mistakes, skipped)) => {
                local(self.local.set_mistakes(&mistakes))?;
                report.mistakes_restored = mistakes.len();
                report.mistakes_skipped = skipped;
            }
            None => report.mistakes_deferred = true,
        }
        local(self.local.set_last_sync(Some(started)))?;
        Ok(report)
    }

    async fn read_remote_progress(
        &self,
        collections: &UserCollections,
    ) -> SyncResult<RemoteProgress> {
        let (seen, settings, filters) = tokio::try_join!(
            self.remote.list(&collections.seen, None),
            self.remote.get(&collections.preferences, PREFERENCES_DOC_ID),
            self.remote.get(&collections.preferences, FILTERS_DOC_ID),
        )?;
        let settings = settings
            .map(|doc| UserSettings::from_document(&doc.id, doc.data))
            .transpose()?;
        let filters = filters
            .map(|doc| UserFilters::from_document(&doc.id, doc.data))
            .transpose()?;
        Ok(RemoteProgress {
            seen: in_write_order(seen).into_iter().map(|d| d.id).collect(),
            settings,
            filters,
        })
    }

    /// Logs the result and settles the restore state: idle, handed off to
    /// `next`, or failed.
    fn finish_restore(
        &self,
        operation: &'static str,
        guard: RestoreGuard<'_>,
        result: &SyncResult<RestoreReport>,
        next: Option<&str>,
    ) {
        match result {
            Ok(report) => {
                if let Some(next) = next {
                    guard.hand_off(next);
                }
                self.record_success();
                info!(
                    seen_questions = report.seen_questions,
                    mistakes_restored = report.mistakes_restored,
                    mistakes_skipped = report.mistakes_skipped,
                    mistakes_deferred = report.mistakes_deferred,
                    "{operation} complete"
                );
            }
            Err(e) => {
                guard.fail(format!("Restore failed: {e}"));
                self.record_failure(operation, e);
            }
        }
    }
}

/// Removes repeated IDs, keeping first occurrences in order.
fn dedup(ids: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}
