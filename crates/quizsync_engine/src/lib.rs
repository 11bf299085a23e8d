//! # Quizsync Engine
//!
//! Synchronization and conflict resolution for offline quiz progress.
//!
//! This crate provides:
//! - Incremental push of seen questions, mistakes, settings, and filters
//! - Incremental pull since a stored cursor
//! - Full backup and restore, including a two-phase restore that defers
//!   mistake rehydration
//! - Paged clearing of remote collections
//! - Conflict detection at sign-in and three resolution strategies
//! - Mistake rehydration through a [`QuestionLookup`]
//!
//! ## Architecture
//!
//! The engine talks to three collaborators through traits: a
//! [`quizsync_store::LocalStore`] for on-device state, a
//! [`quizsync_store::RemoteStore`] for the shared per-user record, and a
//! [`QuestionLookup`] for question content.
//!
//! ## Key Invariants
//!
//! - After every successful operation the metadata counts equal the true
//!   document counts of the seen-question and mistake collections
//! - Pushing the same entry twice never changes a count twice
//! - A merge that has completed finds nothing to do when run again
//! - One failed question lookup drops one mistake, never a batch
//! - Full restore reads the remote record before touching local state

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod clear;
mod config;
mod engine;
mod error;
mod full;
mod lookup;
mod merge;
mod pull;
mod push;
mod report;
mod session;
mod state;

pub use config::SyncConfig;
pub use engine::SyncEngine;
pub use error::{SyncError, SyncResult};
pub use lookup::{
    rehydrate, CatalogEntry, CatalogLookup, LookupError, QuestionLookup, Rehydrated, SkipReason,
    SkippedMistake,
};
pub use merge::{plan_merge, ConflictStrategy, MergePlan, Resolution};
pub use report::{
    BackupReport, ClearReport, ConflictSummary, InitialSyncOutcome, MergeReport, PullReport,
    RestoreReport, SyncStatus,
};
pub use state::{RestoreGuard, RestoreState, RestoreTracker, SyncOutcome, SyncStats};
