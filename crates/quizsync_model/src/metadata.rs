//! Per-user sync metadata.

use crate::document::{Document, METADATA_DOC_ID};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Schema version written into every metadata document.
pub const SYNC_METADATA_VERSION: u32 = 1;

/// Cached aggregate describing a user's remote data.
///
/// # Invariants
///
/// After every successful engine operation, `seen_questions_count` equals
/// the number of documents in the seen-questions collection and
/// `mistakes_count` equals the number of documents in the mistakes
/// collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMetadata {
    /// When this document was last written.
    pub last_updated: DateTime<Utc>,
    /// Number of seen-question documents.
    #[serde(default)]
    pub seen_questions_count: u64,
    /// Number of mistake documents.
    #[serde(default)]
    pub mistakes_count: u64,
    /// Schema version.
    #[serde(default)]
    pub version: u32,
    /// Last incremental push of a seen question.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen_question_sync: Option<DateTime<Utc>>,
    /// Last incremental push of a mistake.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_mistake_sync: Option<DateTime<Utc>>,
    /// Last incremental push of settings or filters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_settings_sync: Option<DateTime<Utc>>,
}

impl SyncMetadata {
    /// Creates metadata with exact counts.
    pub fn with_counts(now: DateTime<Utc>, seen_questions_count: u64, mistakes_count: u64) -> Self {
        Self {
            last_updated: now,
            seen_questions_count,
            mistakes_count,
            version: SYNC_METADATA_VERSION,
            last_seen_question_sync: None,
            last_mistake_sync: None,
            last_settings_sync: None,
        }
    }

    /// Creates metadata describing empty collections.
    pub fn zeroed(now: DateTime<Utc>) -> Self {
        Self::with_counts(now, 0, 0)
    }

    /// Returns true if any progress is recorded remotely.
    pub fn has_data(&self) -> bool {
        self.seen_questions_count > 0 || self.mistakes_count > 0
    }
}

impl Document for SyncMetadata {
    fn document_id(&self) -> String {
        METADATA_DOC_ID.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn zeroed_has_no_data() {
        let now = Utc.timestamp_opt(5, 0).unwrap();
        let meta = SyncMetadata::zeroed(now);
        assert!(!meta.has_data());
        assert_eq!(meta.version, SYNC_METADATA_VERSION);

        assert!(SyncMetadata::with_counts(now, 0, 1).has_data());
        assert!(SyncMetadata::with_counts(now, 3, 0).has_data());
    }

    #[test]
    fn optional_sync_stamps_are_omitted() {
        let now = Utc.timestamp_opt(5, 0).unwrap();
        let doc = SyncMetadata::with_counts(now, 2, 1).to_document().unwrap();

        assert_eq!(doc["seenQuestionsCount"], 2);
        assert_eq!(doc["mistakesCount"], 1);
        assert!(doc.get("lastMistakeSync").is_none());
    }
}
