//! Results returned by the engine's bulk operations.

use crate::state::RestoreState;
use chrono::{DateTime, Utc};
use quizsync_model::SyncMetadata;

/// Result of an incremental pull.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullReport {
    /// Seen questions newly added to the local store.
    pub seen_added: usize,
    /// Mistakes added or replaced locally.
    pub mistakes_added: usize,
    /// Remote mistakes that were malformed or could not be rehydrated.
    pub mistakes_skipped: usize,
    /// Whether remote settings replaced the local ones.
    pub settings_applied: bool,
    /// Whether remote filters replaced the local ones.
    pub filters_applied: bool,
    /// The new local cursor.
    pub cursor: DateTime<Utc>,
}

/// Result of a full backup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupReport {
    /// Seen-question documents written.
    pub seen_questions: usize,
    /// Mistake documents written.
    pub mistakes: usize,
    /// Batches committed after the clear.
    pub commits: usize,
}

/// Result of a full or partial restore.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RestoreReport {
    /// Seen questions written locally.
    pub seen_questions: usize,
    /// Mistakes written locally.
    pub mistakes_restored: usize,
    /// Remote mistakes that were malformed or could not be rehydrated.
    pub mistakes_skipped: usize,
    /// Whether mistakes were left for a later call.
    pub mistakes_deferred: bool,
    /// Whether settings were found remotely.
    pub settings_restored: bool,
    /// Whether filters were found remotely.
    pub filters_restored: bool,
}

/// Result of a merge.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MergeReport {
    /// Remote seen questions added locally.
    pub seen_added_locally: usize,
    /// Local seen questions pushed to the remote store.
    pub seen_pushed: usize,
    /// Remote mistakes added locally.
    pub mistakes_added_locally: usize,
    /// Local mistakes pushed to the remote store.
    pub mistakes_pushed: usize,
    /// Remote mistakes that were legacy, malformed, or could not be rehydrated.
    pub mistakes_skipped: usize,
}

impl MergeReport {
    /// Returns true if neither side gained anything.
    pub fn is_noop(&self) -> bool {
        self.seen_added_locally == 0
            && self.seen_pushed == 0
            && self.mistakes_added_locally == 0
            && self.mistakes_pushed == 0
    }
}

/// Result of clearing every remote data collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClearReport {
    /// Seen-question documents deleted.
    pub seen_questions: usize,
    /// Mistake documents deleted.
    pub mistakes: usize,
    /// Settings and filters documents deleted.
    pub preferences: usize,
}

impl ClearReport {
    /// Returns the total number of deleted documents.
    pub fn total(&self) -> usize {
        self.seen_questions + self.mistakes + self.preferences
    }
}

/// Sizes of the two histories when both devices have data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConflictSummary {
    /// Seen questions stored locally.
    pub local_seen: u64,
    /// Mistakes stored locally.
    pub local_mistakes: u64,
    /// Seen questions stored remotely.
    pub remote_seen: u64,
    /// Mistakes stored remotely.
    pub remote_mistakes: u64,
}

/// What [`crate::SyncEngine::check_initial_sync`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitialSyncOutcome {
    /// Neither side has progress.
    NothingToSync,
    /// Only local progress existed; it was backed up.
    BackedUp(BackupReport),
    /// Only remote progress existed; it was restored.
    Restored(RestoreReport),
    /// Both sides had progress and this device synced before; changes were pulled.
    Pulled(PullReport),
    /// Both sides had independent progress; the caller must pick a strategy.
    ConflictDetected(ConflictSummary),
}

/// Snapshot of local and remote sync state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStatus {
    /// Signed-in user, if any.
    pub user_id: Option<String>,
    /// Seen questions stored locally.
    pub local_seen: usize,
    /// Mistakes stored locally.
    pub local_mistakes: usize,
    /// Local pull cursor.
    pub last_sync: Option<DateTime<Utc>>,
    /// Remote metadata, when signed in and reachable.
    pub remote: Option<SyncMetadata>,
    /// Why the remote metadata could not be read.
    pub remote_error: Option<String>,
    /// Current restore state.
    pub restore: RestoreState,
}
