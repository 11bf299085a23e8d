//! Question content and displayable mistakes.

use crate::entry::{MistakeEntry, QuestionIdType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Displayable content of one question, as returned by a question lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionContent {
    /// Question text.
    pub question: String,
    /// Answer options, in display order. Empty for student-produced responses.
    #[serde(default)]
    pub options: Vec<String>,
    /// Correct answer (option label or accepted response).
    pub correct_answer: String,
    /// Explanation of the correct answer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

/// A mistake joined with the content needed to display it.
///
/// This is the locally persisted form. Only the `entry` part is ever
/// written to the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mistake {
    /// The bare mistake record.
    #[serde(flatten)]
    pub entry: MistakeEntry,
    /// Resolved question content.
    pub content: QuestionContent,
}

impl Mistake {
    /// Joins a mistake record with its question content.
    pub fn new(entry: MistakeEntry, content: QuestionContent) -> Self {
        Self { entry, content }
    }

    /// Returns the question ID.
    pub fn question_id(&self) -> &str {
        &self.entry.question_id
    }

    /// Returns the question ID namespace.
    pub fn question_id_type(&self) -> QuestionIdType {
        self.entry.question_id_type
    }

    /// Returns when the mistake was made.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.entry.timestamp
    }

    /// Returns the answer the user gave, whichever form it took.
    pub fn user_answer(&self) -> Option<&str> {
        self.entry
            .user_choice
            .as_deref()
            .or(self.entry.user_input.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn content() -> QuestionContent {
        QuestionContent {
            question: "2 + 2 = ?".into(),
            options: vec!["3".into(), "4".into()],
            correct_answer: "B".into(),
            rationale: None,
        }
    }

    #[test]
    fn mistake_flattens_entry_fields() {
        let ts = Utc.timestamp_opt(60, 0).unwrap();
        let mistake = Mistake::new(
            MistakeEntry::choice("Q1", QuestionIdType::External, "A", ts),
            content(),
        );

        let json = serde_json::to_value(&mistake).unwrap();
        assert_eq!(json["questionId"], "Q1");
        assert_eq!(json["userChoice"], "A");
        assert_eq!(json["content"]["correctAnswer"], "B");

        let back: Mistake = serde_json::from_value(json).unwrap();
        assert_eq!(back, mistake);
        assert_eq!(back.user_answer(), Some("A"));
        assert_eq!(back.question_id(), "Q1");
    }
}
