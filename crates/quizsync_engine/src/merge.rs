//! Conflict resolution between two independent histories.
//!
//! [`plan_merge`] computes set differences by natural ID in both
//! directions. [`SyncEngine::merge`] applies a plan: unique remote items are
//! added locally and unique local items are pushed. Running a merge again
//! after it completes finds nothing to do.

use crate::engine::{decode_mistakes, in_write_order, local, SyncEngine};
use crate::error::{SyncError, SyncResult};
use crate::lookup::QuestionLookup;
use crate::push::set_op;
use crate::report::{BackupReport, MergeReport, RestoreReport};
use chrono::Utc;
use quizsync_model::{
    Document, MistakeEntry, SeenQuestionEntry, SyncMetadata, SyncStamp, UserFilters,
    UserSettings, FILTERS_DOC_ID, METADATA_DOC_ID, PREFERENCES_DOC_ID,
};
use quizsync_store::{LocalStore, RemoteStore};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use tracing::{info, warn};

/// How to resolve divergent local and remote histories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConflictStrategy {
    /// Local wins; the remote record is overwritten.
    KeepLocal,
    /// Remote wins; the local record is overwritten.
    UseCloud,
    /// Union of both histories.
    Merge,
}

impl fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConflictStrategy::KeepLocal => "keep-local",
            ConflictStrategy::UseCloud => "use-cloud",
            ConflictStrategy::Merge => "merge",
        })
    }
}

impl FromStr for ConflictStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "keep-local" => Ok(ConflictStrategy::KeepLocal),
            "use-cloud" => Ok(ConflictStrategy::UseCloud),
            "merge" => Ok(ConflictStrategy::Merge),
            other => Err(format!(
                "unknown strategy '{other}' (expected keep-local, use-cloud, or merge)"
            )),
        }
    }
}

/// What a conflict resolution did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The local record was backed up over the remote one.
    KeptLocal(BackupReport),
    /// The remote record was restored over the local one.
    UsedCloud(RestoreReport),
    /// The two records were merged.
    Merged(MergeReport),
}

/// Set differences between a local and a remote history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergePlan {
    /// Seen questions only the local side has.
    pub unique_local_seen: Vec<String>,
    /// Seen questions only the remote side has.
    pub unique_cloud_seen: Vec<String>,
    /// Mistakes only the local side has.
    pub unique_local_mistakes: Vec<MistakeEntry>,
    /// Mistakes only the remote side has.
    pub unique_cloud_mistakes: Vec<MistakeEntry>,
    /// Remote mistakes with legacy IDs, left out of the plan.
    pub legacy_skipped: Vec<String>,
}

impl MergePlan {
    /// Returns true if both sides already hold the same items.
    pub fn is_empty(&self) -> bool {
        self.unique_local_seen.is_empty()
            && self.unique_cloud_seen.is_empty()
            && self.unique_local_mistakes.is_empty()
            && self.unique_cloud_mistakes.is_empty()
    }
}

/// Computes `local - remote` and `remote - local` for seen questions and
/// mistakes, by question ID.
///
/// Remote mistakes with legacy IDs are reported in `legacy_skipped` and
/// never pulled, but they still count as present remotely so a local copy
/// is not pushed over them. Output keeps input order.
pub fn plan_merge(
    local_seen: &[String],
    remote_seen: &[String],
    local_mistakes: &[MistakeEntry],
    remote_mistakes: &[MistakeEntry],
) -> MergePlan {
    let local_seen_set: HashSet<&str> = local_seen.iter().map(String::as_str).collect();
    let remote_seen_set: HashSet<&str> = remote_seen.iter().map(String::as_str).collect();
    let local_mistake_ids: HashSet<&str> =
        local_mistakes.iter().map(|m| m.question_id.as_str()).collect();
    let remote_mistake_ids: HashSet<&str> =
        remote_mistakes.iter().map(|m| m.question_id.as_str()).collect();

    let mut plan = MergePlan::default();
    let mut queued = HashSet::new();
    for id in local_seen {
        if !remote_seen_set.contains(id.as_str()) && queued.insert(id.as_str()) {
            plan.unique_local_seen.push(id.clone());
        }
    }
    for id in remote_seen {
        if !local_seen_set.contains(id.as_str()) && queued.insert(id.as_str()) {
            plan.unique_cloud_seen.push(id.clone());
        }
    }

    let mut queued = HashSet::new();
    for entry in local_mistakes {
        let id = entry.question_id.as_str();
        if !remote_mistake_ids.contains(id) && queued.insert(id) {
            plan.unique_local_mistakes.push(entry.clone());
        }
    }
    for entry in remote_mistakes {
        let id = entry.question_id.as_str();
        if local_mistake_ids.contains(id) || !queued.insert(id) {
            continue;
        }
        if entry.has_legacy_id() {
            plan.legacy_skipped.push(entry.question_id.clone());
        } else {
            plan.unique_cloud_mistakes.push(entry.clone());
        }
    }
    plan
}

impl<L, R, Q> SyncEngine<L, R, Q>
where
    L: LocalStore,
    R: RemoteStore,
    Q: QuestionLookup,
{
    /// Resolves a detected conflict with `strategy`.
    pub async fn resolve_conflict(&self, strategy: ConflictStrategy) -> SyncResult<Resolution> {
        info!(%strategy, "resolving conflict");
        Ok(match strategy {
            ConflictStrategy::KeepLocal => Resolution::KeptLocal(self.keep_local().await?),
            ConflictStrategy::UseCloud => Resolution::UsedCloud(self.use_cloud().await?),
            ConflictStrategy::Merge => Resolution::Merged(self.merge().await?),
        })
    }

    /// Local wins: the remote record is overwritten by a full backup.
    pub async fn keep_local(&self) -> SyncResult<BackupReport> {
        self.backup_to_cloud().await
    }

    /// Cloud wins: the local record is overwritten by a full restore.
    pub async fn use_cloud(&self) -> SyncResult<RestoreReport> {
        self.restore_from_cloud().await
    }

    /// Computes the merge plan for the current local and remote state
    /// without changing anything.
    pub async fn merge_plan(&self) -> SyncResult<MergePlan> {
        let collections = self.collections()?;
        let (seen_docs, mistake_docs) = tokio::try_join!(
            self.remote.list(&collections.seen, None),
            self.remote.list(&collections.mistakes, None),
        )?;
        let remote_seen: Vec<String> = in_write_order(seen_docs)
            .into_iter()
            .map(|d| d.id)
            .collect();
        let (remote_mistakes, _) = decode_mistakes(in_write_order(mistake_docs));
        let local_seen = local(self.local.seen_questions())?;
        let local_mistakes: Vec<MistakeEntry> = local(self.local.mistakes())?
            .into_iter()
            .map(|m| m.entry)
            .collect();
        Ok(plan_merge(
            &local_seen,
            &remote_seen,
            &local_mistakes,
            &remote_mistakes,
        ))
    }

    /// Unions the local and remote histories.
    ///
    /// Remote-only items are added locally, with mistakes rehydrated; a
    /// mistake that cannot be rehydrated is skipped with a warning.
    /// Local-only items are pushed in batches with exact metadata in the
    /// last batch. Settings and filters take the remote document when one
    /// exists and push the local one otherwise.
    pub async fn merge(&self) -> SyncResult<MergeReport> {
        let result = self.merge_inner().await;
        match &result {
            Ok(report) => {
                self.record_success();
                info!(
                    seen_added_locally = report.seen_added_locally,
                    seen_pushed = report.seen_pushed,
                    mistakes_added_locally = report.mistakes_added_locally,
                    mistakes_pushed = report.mistakes_pushed,
                    mistakes_skipped = report.mistakes_skipped,
                    "merge complete"
                );
            }
            Err(e) => self.record_failure("merge", e),
        }
        result
    }

    async fn merge_inner(&self) -> SyncResult<MergeReport> {
        let collections = self.collections()?;
        let started = Utc::now();

        let (seen_docs, mistake_docs, settings_doc, filters_doc) = tokio::try_join!(
            self.remote.list(&collections.seen, None),
            self.remote.list(&collections.mistakes, None),
            self.remote.get(&collections.preferences, PREFERENCES_DOC_ID),
            self.remote.get(&collections.preferences, FILTERS_DOC_ID),
        )?;
        let remote_settings = settings_doc
            .map(|doc| UserSettings::from_document(&doc.id, doc.data))
            .transpose()?;
        let remote_filters = filters_doc
            .map(|doc| UserFilters::from_document(&doc.id, doc.data))
            .transpose()?;
        let seen_docs = in_write_order(seen_docs);
        let mistake_docs = in_write_order(mistake_docs);
        let remote_seen_count = seen_docs.len();
        let remote_mistake_count = mistake_docs.len();
        let remote_mistake_ids: HashSet<String> =
            mistake_docs.iter().map(|d| d.id.clone()).collect();
        let remote_seen: Vec<String> = seen_docs.into_iter().map(|d| d.id).collect();
        let (remote_mistakes, malformed) = decode_mistakes(mistake_docs);

        let local_seen = local(self.local.seen_questions())?;
        let local_mistakes: Vec<MistakeEntry> = local(self.local.mistakes())?
            .into_iter()
            .map(|m| m.entry)
            .collect();
        let plan = plan_merge(&local_seen, &remote_seen, &local_mistakes, &remote_mistakes);
        for id in &plan.legacy_skipped {
            warn!(question_id = %id, "skipping remote mistake with legacy question id");
        }

        let rehydrated = self.rehydrate(plan.unique_cloud_mistakes.clone()).await;
        let mistakes_skipped = malformed + plan.legacy_skipped.len() + rehydrated.skipped.len();

        let mut ops = Vec::with_capacity(
            plan.unique_local_seen.len() + plan.unique_local_mistakes.len() + 3,
        );
        for (position, id) in plan.unique_local_seen.iter().enumerate() {
            let entry = SeenQuestionEntry::new(id.as_str(), started)
                .with_device(self.config.device_id.as_str());
            ops.push(set_op(
                &collections.seen,
                id,
                entry.to_stamped_document(SyncStamp::at_position(started, position))?,
            ));
        }
        for (position, entry) in plan.unique_local_mistakes.iter().enumerate() {
            let mut entry = entry.clone();
            entry
                .device_id
                .get_or_insert_with(|| self.config.device_id.clone());
            ops.push(set_op(
                &collections.mistakes,
                &entry.question_id,
                entry.to_stamped_document(SyncStamp::at_position(started, position))?,
            ));
        }
        if remote_settings.is_none() {
            let settings = local(self.local.settings())?;
            ops.push(set_op(
                &collections.preferences,
                PREFERENCES_DOC_ID,
                settings.to_document()?,
            ));
        }
        if remote_filters.is_none() {
            let filters = local(self.local.filters())?;
            ops.push(set_op(
                &collections.preferences,
                FILTERS_DOC_ID,
                filters.to_document()?,
            ));
        }
        let previous = self
            .load_metadata(&collections)
            .await
            .unwrap_or_else(|e: SyncError| {
                warn!(error = %e, "replacing unreadable metadata");
                None
            });
        // A local mistake may replace a malformed remote document with the same ID.
        let new_mistake_docs = plan
            .unique_local_mistakes
            .iter()
            .filter(|m| !remote_mistake_ids.contains(&m.question_id))
            .count();
        let mut metadata = SyncMetadata::with_counts(
            started,
            (remote_seen_count + plan.unique_local_seen.len()) as u64,
            (remote_mistake_count + new_mistake_docs) as u64,
        );
        if let Some(previous) = previous {
            metadata.last_settings_sync = previous.last_settings_sync;
        }
        if !plan.unique_local_seen.is_empty() {
            metadata.last_seen_question_sync = Some(started);
        }
        if !plan.unique_local_mistakes.is_empty() {
            metadata.last_mistake_sync = Some(started);
        }
        ops.push(set_op(
            &collections.sync,
            METADATA_DOC_ID,
            metadata.to_document()?,
        ));
        self.commit_paged(ops).await?;

        let seen_added_locally = local(self.local.add_seen_questions(&plan.unique_cloud_seen))?;
        let mistakes_added_locally = local(self.local.upsert_mistakes(rehydrated.mistakes))?;
        if let Some(settings) = &remote_settings {
            local(self.local.set_settings(settings))?;
        }
        if let Some(filters) = &remote_filters {
            local(self.local.set_filters(filters))?;
        }
        local(self.local.set_last_sync(Some(started)))?;

        Ok(MergeReport {
            seen_added_locally,
            seen_pushed: plan.unique_local_seen.len(),
            mistakes_added_locally,
            mistakes_pushed: plan.unique_local_mistakes.len(),
            mistakes_skipped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use quizsync_model::QuestionIdType;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn entry(id: &str) -> MistakeEntry {
        MistakeEntry::choice(
            id,
            QuestionIdType::External,
            "A",
            Utc.timestamp_opt(10, 0).unwrap(),
        )
    }

    #[test]
    fn plan_is_two_way_set_difference() {
        let plan = plan_merge(
            &ids(&["A", "B"]),
            &ids(&["B", "C"]),
            &[entry("Q1")],
            &[entry("Q2")],
        );
        assert_eq!(plan.unique_local_seen, ids(&["A"]));
        assert_eq!(plan.unique_cloud_seen, ids(&["C"]));
        assert_eq!(plan.unique_local_mistakes, vec![entry("Q1")]);
        assert_eq!(plan.unique_cloud_mistakes, vec![entry("Q2")]);
        assert!(!plan.is_empty());
    }

    #[test]
    fn identical_sides_plan_nothing() {
        let plan = plan_merge(
            &ids(&["A", "B"]),
            &ids(&["B", "A"]),
            &[entry("Q1")],
            &[entry("Q1")],
        );
        assert!(plan.is_empty());
    }

    #[test]
    fn duplicates_are_planned_once() {
        let plan = plan_merge(&ids(&["A", "A"]), &[], &[entry("Q1"), entry("Q1")], &[]);
        assert_eq!(plan.unique_local_seen, ids(&["A"]));
        assert_eq!(plan.unique_local_mistakes.len(), 1);
    }

    #[test]
    fn legacy_remote_ids_are_skipped_not_pushed_over() {
        let legacy = "98765432109876543210";
        let plan = plan_merge(&[], &[], &[], &[entry(legacy)]);
        assert!(plan.unique_cloud_mistakes.is_empty());
        assert_eq!(plan.legacy_skipped, ids(&[legacy]));
        assert!(plan.is_empty());

        let plan = plan_merge(&[], &[], &[entry(legacy)], &[entry(legacy)]);
        assert!(plan.unique_local_mistakes.is_empty());
    }

    #[test]
    fn strategy_parsing() {
        for strategy in [
            ConflictStrategy::KeepLocal,
            ConflictStrategy::UseCloud,
            ConflictStrategy::Merge,
        ] {
            assert_eq!(strategy.to_string().parse::<ConflictStrategy>(), Ok(strategy));
        }
        assert!("both".parse::<ConflictStrategy>().is_err());
    }
}
