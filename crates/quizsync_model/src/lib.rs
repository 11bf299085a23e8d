//! # quizsync Model
//!
//! Entry model and JSON document codecs for quizsync.
//!
//! This crate provides:
//! - `SeenQuestionEntry` and `MistakeEntry` for per-question progress
//! - `UserSettings` and `UserFilters` for single-document preferences
//! - `SyncMetadata`, the cached aggregate describing a user's remote data
//! - `QuestionContent` and `Mistake` for rehydrated, displayable mistakes
//! - The `Document` trait giving every entity a stable document key
//!
//! This is a pure model crate with no I/O operations. All timestamps are
//! serialized as RFC 3339 strings so they compare identically on every
//! platform that reads the remote documents.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod document;
mod entry;
mod error;
mod metadata;
mod question;
mod settings;

pub use document::{
    Document, SyncStamp, FILTERS_DOC_ID, LAST_UPDATED_FIELD, METADATA_DOC_ID, POSITION_FIELD,
    PREFERENCES_DOC_ID, SYNCED_AT_FIELD, TIMESTAMP_FIELD,
};
pub use entry::{MistakeEntry, QuestionIdType, QuestionType, SeenQuestionEntry, MAX_SAFE_QUESTION_ID};
pub use error::{ModelError, ModelResult};
pub use metadata::{SyncMetadata, SYNC_METADATA_VERSION};
pub use question::{Mistake, QuestionContent};
pub use settings::{UserFilters, UserSettings};
