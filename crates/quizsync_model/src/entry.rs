//! Per-question progress entries.

use crate::document::Document;
use crate::error::{ModelError, ModelResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Largest question ID that is still a valid numeric ID (2^53 - 1).
///
/// Numeric IDs above this were produced by lossy float conversion on old
/// clients and no longer identify any question.
pub const MAX_SAFE_QUESTION_ID: f64 = 9_007_199_254_740_991.0;

/// Namespace a question ID belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionIdType {
    /// ID assigned by the external question bank.
    External,
    /// Item bank number.
    Ibn,
}

/// Answer format of a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionType {
    /// Multiple choice.
    Mcq,
    /// Student-produced response.
    Spr,
}

/// A question the user has been shown.
///
/// Seeing a question twice writes the same document again, so the entry is
/// idempotent with respect to counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeenQuestionEntry {
    /// Question ID; also the document key.
    pub question_id: String,
    /// Device that recorded the entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    /// When the entry was recorded. Queried by incremental pulls.
    pub timestamp: DateTime<Utc>,
}

impl SeenQuestionEntry {
    /// Creates an entry stamped with `timestamp`.
    pub fn new(question_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            question_id: question_id.into(),
            device_id: None,
            timestamp,
        }
    }

    /// Sets the recording device.
    pub fn with_device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }
}

impl Document for SeenQuestionEntry {
    fn document_id(&self) -> String {
        self.question_id.clone()
    }

    fn validate(&self) -> ModelResult<()> {
        if self.question_id.is_empty() {
            return Err(ModelError::MissingField("questionId"));
        }
        Ok(())
    }
}

/// The latest recorded mistake for one question.
///
/// Only the newest mistake per question is kept remotely; the document key
/// is the question ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MistakeEntry {
    /// Question ID; also the document key.
    pub question_id: String,
    /// Namespace of `question_id`.
    pub question_id_type: QuestionIdType,
    /// Answer format.
    pub question_type: QuestionType,
    /// Selected option for multiple-choice questions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_choice: Option<String>,
    /// Typed answer for student-produced responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_input: Option<String>,
    /// When the mistake was made.
    pub timestamp: DateTime<Utc>,
    /// Device that recorded the mistake.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

impl MistakeEntry {
    /// Creates a multiple-choice mistake.
    pub fn choice(
        question_id: impl Into<String>,
        question_id_type: QuestionIdType,
        user_choice: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            question_id: question_id.into(),
            question_id_type,
            question_type: QuestionType::Mcq,
            user_choice: Some(user_choice.into()),
            user_input: None,
            timestamp,
            device_id: None,
        }
    }

    /// Creates a student-produced-response mistake.
    pub fn input(
        question_id: impl Into<String>,
        question_id_type: QuestionIdType,
        user_input: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            question_id: question_id.into(),
            question_id_type,
            question_type: QuestionType::Spr,
            user_choice: None,
            user_input: Some(user_input.into()),
            timestamp,
            device_id: None,
        }
    }

    /// Sets the recording device.
    pub fn with_device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    /// Returns true if the question ID is a numeric ID too large to be real.
    ///
    /// Such records come from old clients that stored IDs as floats and
    /// cannot be resolved to any question.
    pub fn has_legacy_id(&self) -> bool {
        let id = self.question_id.trim();
        if id.is_empty() || !id.starts_with(|c: char| c.is_ascii_digit()) {
            return false;
        }
        match id.parse::<f64>() {
            Ok(value) => value.is_infinite() || value > MAX_SAFE_QUESTION_ID,
            Err(_) => false,
        }
    }
}

impl Document for MistakeEntry {
    fn document_id(&self) -> String {
        self.question_id.clone()
    }

    fn validate(&self) -> ModelResult<()> {
        if self.question_id.is_empty() {
            return Err(ModelError::MissingField("questionId"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn seen_entry_document_shape() {
        let entry = SeenQuestionEntry::new("q-1", at(1_700_000_000)).with_device("phone");
        let doc = entry.to_document().unwrap();

        assert_eq!(doc["questionId"], "q-1");
        assert_eq!(doc["deviceId"], "phone");
        assert_eq!(doc["timestamp"], "2023-11-14T22:13:20Z");
        assert_eq!(entry.document_id(), "q-1");
    }

    #[test]
    fn seen_entry_without_device_omits_field() {
        let doc = SeenQuestionEntry::new("q-1", at(0)).to_document().unwrap();
        assert!(doc.get("deviceId").is_none());
    }

    #[test]
    fn mistake_entry_document_shape() {
        let entry = MistakeEntry::choice("Q1", QuestionIdType::Ibn, "B", at(10));
        let doc = entry.to_document().unwrap();

        assert_eq!(doc["questionIdType"], "ibn");
        assert_eq!(doc["questionType"], "mcq");
        assert_eq!(doc["userChoice"], "B");
        assert!(doc.get("userInput").is_none());

        let decoded = MistakeEntry::from_document("Q1", doc).unwrap();
        assert_eq!(decoded, entry);
    }

    #[test]
    fn from_document_rejects_mismatched_key() {
        let doc = json!({
            "questionId": "Q1",
            "questionIdType": "external",
            "questionType": "spr",
            "userInput": "42",
            "timestamp": "2024-01-01T00:00:00Z"
        });
        let err = MistakeEntry::from_document("Q2", doc).unwrap_err();
        assert!(matches!(err, ModelError::KeyMismatch { .. }));
    }

    #[test]
    fn from_document_rejects_missing_fields() {
        let doc = json!({ "questionId": "Q1" });
        assert!(matches!(
            MistakeEntry::from_document("Q1", doc),
            Err(ModelError::Json(_))
        ));

        let doc = json!({ "questionId": "", "timestamp": "2024-01-01T00:00:00Z" });
        assert!(matches!(
            SeenQuestionEntry::from_document("", doc),
            Err(ModelError::MissingField("questionId"))
        ));
    }

    #[test]
    fn legacy_id_detection() {
        let make = |id: &str| MistakeEntry::input(id, QuestionIdType::External, "1", at(0));

        assert!(make("123456789012345678901").has_legacy_id());
        assert!(make("1.2345678901234568e+21").has_legacy_id());
        assert!(!make("9007199254740991").has_legacy_id());
        assert!(!make("4213").has_legacy_id());
        assert!(!make("a1b2c3d4").has_legacy_id());
        assert!(!make("inf").has_legacy_id());
    }
}
