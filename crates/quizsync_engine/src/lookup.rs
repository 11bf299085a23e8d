//! Question lookup seam and mistake rehydration.
//!
//! Remote mistakes carry only a question ID and the user's answer. Before
//! they can be shown they are joined with question content from a
//! [`QuestionLookup`]. Lookups are the slowest and least reliable step of
//! every pull, restore, and merge, so each one is bounded by a timeout and a
//! failure drops only that mistake.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::RwLock;
use quizsync_model::{Mistake, MistakeEntry, QuestionContent, QuestionIdType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Reasons a question could not be resolved.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// No question has this ID.
    #[error("question {0} not found")]
    NotFound(String),

    /// The content source could not be reached.
    #[error("network error: {0}")]
    Network(String),

    /// The lookup did not finish in time.
    #[error("lookup timed out")]
    Timeout,
}

/// Resolves question IDs to displayable content.
#[async_trait]
pub trait QuestionLookup: Send + Sync {
    /// Resolves one question.
    async fn resolve(
        &self,
        question_id: &str,
        id_type: QuestionIdType,
    ) -> Result<QuestionContent, LookupError>;
}

/// Why a mistake was left out of a rehydrated batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The question ID is a corrupt numeric ID from an old client.
    LegacyId,
    /// The lookup failed.
    Lookup(LookupError),
}

/// A mistake that could not be rehydrated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedMistake {
    /// Question ID of the dropped mistake.
    pub question_id: String,
    /// Why it was dropped.
    pub reason: SkipReason,
}

/// Result of rehydrating a batch of mistakes.
#[derive(Debug, Clone, Default)]
pub struct Rehydrated {
    /// Mistakes joined with their content, in input order.
    pub mistakes: Vec<Mistake>,
    /// Mistakes that were dropped.
    pub skipped: Vec<SkippedMistake>,
}

/// Joins each entry with its question content.
///
/// Up to `concurrency` lookups run at once, each bounded by `timeout`.
/// Entries with legacy IDs are skipped without a lookup. A failed lookup
/// drops only its own entry; the rest of the batch proceeds.
pub async fn rehydrate<Q>(
    lookup: &Q,
    entries: Vec<MistakeEntry>,
    concurrency: usize,
    timeout: Duration,
) -> Rehydrated
where
    Q: QuestionLookup + ?Sized,
{
    let results: Vec<Result<Mistake, SkippedMistake>> = stream::iter(entries)
        .map(|entry| async move {
            if entry.has_legacy_id() {
                warn!(question_id = %entry.question_id, "skipping mistake with legacy question id");
                return Err(SkippedMistake {
                    question_id: entry.question_id,
                    reason: SkipReason::LegacyId,
                });
            }
            let resolved = tokio::time::timeout(
                timeout,
                lookup.resolve(&entry.question_id, entry.question_id_type),
            )
            .await
            .unwrap_or(Err(LookupError::Timeout));
            match resolved {
                Ok(content) => Ok(Mistake::new(entry, content)),
                Err(e) => {
                    warn!(question_id = %entry.question_id, error = %e, "dropping mistake that could not be rehydrated");
                    Err(SkippedMistake {
                        question_id: entry.question_id,
                        reason: SkipReason::Lookup(e),
                    })
                }
            }
        })
        .buffered(concurrency.max(1))
        .collect()
        .await;

    let mut out = Rehydrated::default();
    for result in results {
        match result {
            Ok(mistake) => out.mistakes.push(mistake),
            Err(skipped) => out.skipped.push(skipped),
        }
    }
    out
}

/// One question in a catalog file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    /// Question ID.
    pub question_id: String,
    /// Namespace of the ID.
    pub question_id_type: QuestionIdType,
    /// Question content.
    #[serde(flatten)]
    pub content: QuestionContent,
}

/// A [`QuestionLookup`] over an in-memory question catalog.
///
/// # Example
///
/// ```rust
/// use quizsync_engine::CatalogLookup;
/// use quizsync_model::{QuestionContent, QuestionIdType};
///
/// let catalog = CatalogLookup::new();
/// catalog.insert("Q1", QuestionIdType::External, QuestionContent {
///     question: "2 + 2 = ?".into(),
///     options: vec!["3".into(), "4".into()],
///     correct_answer: "B".into(),
///     rationale: None,
/// });
/// assert_eq!(catalog.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct CatalogLookup {
    questions: RwLock<HashMap<(QuestionIdType, String), QuestionContent>>,
}

impl CatalogLookup {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a catalog from entries.
    pub fn from_entries(entries: impl IntoIterator<Item = CatalogEntry>) -> Self {
        let catalog = Self::new();
        for entry in entries {
            catalog.insert(entry.question_id, entry.question_id_type, entry.content);
        }
        catalog
    }

    /// Loads a catalog from a JSON array of [`CatalogEntry`].
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_json_file(path: &Path) -> std::io::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let entries: Vec<CatalogEntry> = serde_json::from_str(&raw)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        Ok(Self::from_entries(entries))
    }

    /// Adds or replaces a question.
    pub fn insert(
        &self,
        question_id: impl Into<String>,
        id_type: QuestionIdType,
        content: QuestionContent,
    ) {
        self.questions
            .write()
            .insert((id_type, question_id.into()), content);
    }

    /// Returns the number of questions.
    pub fn len(&self) -> usize {
        self.questions.read().len()
    }

    /// Returns true if the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.questions.read().is_empty()
    }
}

#[async_trait]
impl QuestionLookup for CatalogLookup {
    async fn resolve(
        &self,
        question_id: &str,
        id_type: QuestionIdType,
    ) -> Result<QuestionContent, LookupError> {
        self.questions
            .read()
            .get(&(id_type, question_id.to_string()))
            .cloned()
            .ok_or_else(|| LookupError::NotFound(question_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn content(text: &str) -> QuestionContent {
        QuestionContent {
            question: text.into(),
            options: vec![],
            correct_answer: "7".into(),
            rationale: None,
        }
    }

    fn entry(id: &str) -> MistakeEntry {
        MistakeEntry::input(
            id,
            QuestionIdType::Ibn,
            "5",
            Utc.timestamp_opt(100, 0).unwrap(),
        )
    }

    struct SlowLookup;

    #[async_trait]
    impl QuestionLookup for SlowLookup {
        async fn resolve(
            &self,
            _question_id: &str,
            _id_type: QuestionIdType,
        ) -> Result<QuestionContent, LookupError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Err(LookupError::Network("unreachable".into()))
        }
    }

    #[tokio::test]
    async fn rehydrate_skips_failures_and_keeps_order() {
        let catalog = CatalogLookup::new();
        catalog.insert("Q1", QuestionIdType::Ibn, content("one"));
        catalog.insert("Q3", QuestionIdType::Ibn, content("three"));

        let result = rehydrate(
            &catalog,
            vec![entry("Q1"), entry("Q2"), entry("Q3")],
            2,
            Duration::from_secs(1),
        )
        .await;

        let ids: Vec<_> = result.mistakes.iter().map(|m| m.question_id()).collect();
        assert_eq!(ids, vec!["Q1", "Q3"]);
        assert_eq!(result.skipped.len(), 1);
        assert_eq!(
            result.skipped[0].reason,
            SkipReason::Lookup(LookupError::NotFound("Q2".into()))
        );
    }

    #[tokio::test]
    async fn rehydrate_skips_legacy_ids_without_lookup() {
        let catalog = CatalogLookup::new();
        catalog.insert("123456789012345678901", QuestionIdType::Ibn, content("x"));

        let result = rehydrate(
            &catalog,
            vec![entry("123456789012345678901")],
            1,
            Duration::from_secs(1),
        )
        .await;

        assert!(result.mistakes.is_empty());
        assert_eq!(result.skipped[0].reason, SkipReason::LegacyId);
    }

    #[tokio::test(start_paused = true)]
    async fn rehydrate_times_out_slow_lookups() {
        let result = rehydrate(
            &SlowLookup,
            vec![entry("Q1")],
            1,
            Duration::from_millis(50),
        )
        .await;

        assert_eq!(
            result.skipped[0].reason,
            SkipReason::Lookup(LookupError::Timeout)
        );
    }

    #[test]
    fn catalog_entry_json_shape() {
        let json = r#"[{
            "questionId": "Q9",
            "questionIdType": "external",
            "question": "Pick one",
            "options": ["a", "b"],
            "correctAnswer": "A"
        }]"#;
        let entries: Vec<CatalogEntry> = serde_json::from_str(json).unwrap();
        let catalog = CatalogLookup::from_entries(entries);
        assert_eq!(catalog.len(), 1);
        assert!(!catalog.is_empty());
    }
}
