//! Restore state, outcomes, and engine statistics.

use chrono::{DateTime, Utc};
use tokio::sync::watch;

/// Whether a full restore is running.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RestoreState {
    /// No restore is in progress.
    #[default]
    Idle,
    /// A restore is running or waiting for its second phase.
    Restoring {
        /// Progress message for display.
        message: String,
    },
    /// The last restore phase failed; local data may be incomplete.
    Failed {
        /// What failed, for display.
        message: String,
    },
}

impl RestoreState {
    /// Returns true while a restore is in progress.
    pub fn is_restoring(&self) -> bool {
        matches!(self, RestoreState::Restoring { .. })
    }

    /// Returns true if the last restore phase failed.
    pub fn is_failed(&self) -> bool {
        matches!(self, RestoreState::Failed { .. })
    }
}

/// Publishes [`RestoreState`] transitions to subscribers.
#[derive(Debug)]
pub struct RestoreTracker {
    tx: watch::Sender<RestoreState>,
}

impl RestoreTracker {
    /// Creates a tracker in the idle state.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(RestoreState::Idle);
        Self { tx }
    }

    /// Returns the current state.
    pub fn current(&self) -> RestoreState {
        self.tx.borrow().clone()
    }

    /// Returns a receiver that observes every transition.
    pub fn subscribe(&self) -> watch::Receiver<RestoreState> {
        self.tx.subscribe()
    }

    /// Enters the restoring state.
    ///
    /// The returned guard goes back to idle when dropped unless it is
    /// handed off to a later phase or marked failed.
    pub fn begin(&self, message: impl Into<String>) -> RestoreGuard<'_> {
        self.set(RestoreState::Restoring {
            message: message.into(),
        });
        RestoreGuard {
            tracker: self,
            armed: true,
        }
    }

    fn set(&self, state: RestoreState) {
        self.tx.send_replace(state);
    }
}

impl Default for RestoreTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps the tracker in the restoring state for the lifetime of one phase.
#[derive(Debug)]
pub struct RestoreGuard<'a> {
    tracker: &'a RestoreTracker,
    armed: bool,
}

impl RestoreGuard<'_> {
    /// Updates the progress message.
    pub fn progress(&self, message: impl Into<String>) {
        self.tracker.set(RestoreState::Restoring {
            message: message.into(),
        });
    }

    /// Leaves the tracker restoring with `message` after the guard is gone.
    pub fn hand_off(mut self, message: impl Into<String>) {
        self.progress(message);
        self.armed = false;
    }

    /// Leaves the tracker in [`RestoreState::Failed`] until the next restore.
    pub fn fail(mut self, message: impl Into<String>) {
        self.tracker.set(RestoreState::Failed {
            message: message.into(),
        });
        self.armed = false;
    }
}

impl Drop for RestoreGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.tracker.set(RestoreState::Idle);
        }
    }
}

/// Outcome of an incremental push that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The remote store now holds the pushed value.
    Synced,
    /// The remote store holds a newer value; nothing was written.
    ConflictDetected,
}

/// Cumulative engine statistics.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Incremental pushes that reached the remote store.
    pub pushes: u64,
    /// Incremental pushes that failed.
    pub push_failures: u64,
    /// Incremental pulls that completed.
    pub pulls: u64,
    /// Conflicts detected on push or at session start.
    pub conflicts_detected: u64,
    /// Mistakes dropped during rehydration.
    pub mistakes_skipped: u64,
    /// Last successful sync of any kind.
    pub last_sync_time: Option<DateTime<Utc>>,
    /// Last error message.
    pub last_error: Option<String>,
}
