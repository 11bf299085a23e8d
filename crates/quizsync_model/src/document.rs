//! Document keys and JSON conversion.

use crate::error::{ModelError, ModelResult};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Document ID of the per-user sync metadata document.
pub const METADATA_DOC_ID: &str = "metadata";

/// Document ID of the user settings document.
pub const PREFERENCES_DOC_ID: &str = "user_preferences";

/// Document ID of the category filters document.
pub const FILTERS_DOC_ID: &str = "filters";

/// Event time of a seen question or mistake. Compared by push conflict checks.
pub const TIMESTAMP_FIELD: &str = "timestamp";

/// Write time of a seen-question or mistake document. Queried by
/// incremental pulls.
pub const SYNCED_AT_FIELD: &str = "syncedAt";

/// Position of a document within the bulk write that produced it.
pub const POSITION_FIELD: &str = "position";

/// Field compared by incremental pulls of settings and filters.
pub const LAST_UPDATED_FIELD: &str = "lastUpdated";

/// An entity stored as one JSON document in the remote store.
///
/// # Invariants
///
/// - `document_id` is stable: the same entity always maps to the same key,
///   so writes are overwrite-by-key and never create duplicates
/// - `from_document(id, to_document(e))` reproduces `e` for a valid `e`
pub trait Document: Serialize + DeserializeOwned {
    /// Returns the key this entity is stored under.
    fn document_id(&self) -> String;

    /// Checks required fields.
    fn validate(&self) -> ModelResult<()> {
        Ok(())
    }

    /// Encodes this entity as a JSON document body.
    fn to_document(&self) -> ModelResult<Value> {
        self.validate()?;
        Ok(serde_json::to_value(self)?)
    }

    /// Encodes this entity with `stamp` added to the document body.
    fn to_stamped_document(&self, stamp: SyncStamp) -> ModelResult<Value> {
        let mut doc = self.to_document()?;
        if let (Value::Object(fields), Value::Object(extra)) =
            (&mut doc, serde_json::to_value(stamp)?)
        {
            fields.extend(extra);
        }
        Ok(doc)
    }

    /// Decodes a document body stored under `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is malformed, a required field is empty,
    /// or the body describes a different entity than `id`.
    fn from_document(id: &str, value: Value) -> ModelResult<Self> {
        let entity: Self = serde_json::from_value(value)?;
        entity.validate()?;
        let found = entity.document_id();
        if found != id {
            return Err(ModelError::KeyMismatch {
                key: id.to_string(),
                found,
            });
        }
        Ok(entity)
    }
}

/// Write-time bookkeeping carried by seen-question and mistake documents.
///
/// Orders as `(synced_at, position)`: documents from one bulk write share
/// `synced_at` and keep their original order through `position`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStamp {
    /// When the document was written to the remote store.
    pub synced_at: DateTime<Utc>,
    /// Index within a bulk write; absent for single pushes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<u64>,
}

impl SyncStamp {
    /// Stamp for a single push.
    pub fn new(synced_at: DateTime<Utc>) -> Self {
        Self {
            synced_at,
            position: None,
        }
    }

    /// Stamp for the document at `position` of a bulk write.
    pub fn at_position(synced_at: DateTime<Utc>, position: usize) -> Self {
        Self {
            synced_at,
            position: Some(position as u64),
        }
    }

    /// Reads the stamp from a document body, if it carries one.
    pub fn from_document(doc: &Value) -> Option<Self> {
        let synced_at = doc
            .get(SYNCED_AT_FIELD)
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())?
            .with_timezone(&Utc);
        let position = doc.get(POSITION_FIELD).and_then(Value::as_u64);
        Some(Self {
            synced_at,
            position,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{MistakeEntry, QuestionIdType};
    use chrono::TimeZone;

    #[test]
    fn stamped_document_keeps_entity_fields() {
        let at = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let entry = MistakeEntry::choice("Q1", QuestionIdType::Ibn, "B", at);
        let doc = entry
            .to_stamped_document(SyncStamp::at_position(at, 3))
            .unwrap();

        assert_eq!(doc[SYNCED_AT_FIELD], "2023-11-14T22:13:20Z");
        assert_eq!(doc[POSITION_FIELD], 3);
        assert_eq!(SyncStamp::from_document(&doc), Some(SyncStamp::at_position(at, 3)));
        assert_eq!(MistakeEntry::from_document("Q1", doc).unwrap(), entry);
    }

    #[test]
    fn stamps_order_by_time_then_position() {
        let t = Utc.timestamp_opt(100, 0).unwrap();
        let later = Utc.timestamp_opt(101, 0).unwrap();
        let mut stamps = vec![
            SyncStamp::new(later),
            SyncStamp::at_position(t, 1),
            SyncStamp::at_position(t, 0),
        ];
        stamps.sort();
        assert_eq!(
            stamps,
            vec![
                SyncStamp::at_position(t, 0),
                SyncStamp::at_position(t, 1),
                SyncStamp::new(later),
            ]
        );
        assert_eq!(SyncStamp::from_document(&serde_json::json!({})), None);
    }
}
