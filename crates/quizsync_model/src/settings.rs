//! Single-document user preferences.

use crate::document::{Document, FILTERS_DOC_ID, PREFERENCES_DOC_ID};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

fn default_true() -> bool {
    true
}

/// Display and caching preferences.
///
/// Stored as one document; conflicts are resolved for the whole document
/// by `last_updated`, never field by field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSettings {
    /// Pure-black dark theme.
    #[serde(default)]
    pub oled_mode: bool,
    /// Hide questions that are still in the active pool.
    #[serde(default)]
    pub exclude_active_questions: bool,
    /// Keep question content cached on device.
    #[serde(default = "default_true")]
    pub caching_enabled: bool,
    /// When these settings were last changed.
    pub last_updated: DateTime<Utc>,
    /// Device that made the last change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

impl UserSettings {
    /// Returns a copy stamped as changed at `now` by `device_id`.
    pub fn touched(mut self, now: DateTime<Utc>, device_id: impl Into<String>) -> Self {
        self.last_updated = now;
        self.device_id = Some(device_id.into());
        self
    }

    /// Returns true if these settings were changed after `other`.
    pub fn is_newer_than(&self, other: &Self) -> bool {
        self.last_updated > other.last_updated
    }
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            oled_mode: false,
            exclude_active_questions: false,
            caching_enabled: true,
            last_updated: DateTime::<Utc>::default(),
            device_id: None,
        }
    }
}

impl Document for UserSettings {
    fn document_id(&self) -> String {
        PREFERENCES_DOC_ID.to_string()
    }
}

/// Active category and difficulty filters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserFilters {
    /// Selected category filters.
    #[serde(default)]
    pub active_filters: BTreeSet<String>,
    /// Selected difficulty filters.
    #[serde(default)]
    pub active_difficulty_filters: BTreeSet<String>,
    /// When the filters were last changed.
    pub last_updated: DateTime<Utc>,
    /// Device that made the last change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

impl UserFilters {
    /// Returns a copy stamped as changed at `now` by `device_id`.
    pub fn touched(mut self, now: DateTime<Utc>, device_id: impl Into<String>) -> Self {
        self.last_updated = now;
        self.device_id = Some(device_id.into());
        self
    }

    /// Returns true if these filters were changed after `other`.
    pub fn is_newer_than(&self, other: &Self) -> bool {
        self.last_updated > other.last_updated
    }

    /// Returns true if no filter is selected.
    pub fn is_empty(&self) -> bool {
        self.active_filters.is_empty() && self.active_difficulty_filters.is_empty()
    }
}

impl Document for UserFilters {
    fn document_id(&self) -> String {
        FILTERS_DOC_ID.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn settings_defaults_when_fields_missing() {
        let doc = json!({ "lastUpdated": "2024-05-01T12:00:00Z" });
        let settings = UserSettings::from_document(PREFERENCES_DOC_ID, doc).unwrap();

        assert!(!settings.oled_mode);
        assert!(!settings.exclude_active_questions);
        assert!(settings.caching_enabled);
    }

    #[test]
    fn settings_document_uses_fixed_key() {
        let settings = UserSettings::default();
        assert_eq!(settings.document_id(), "user_preferences");

        let doc = settings.to_document().unwrap();
        assert_eq!(doc["cachingEnabled"], true);
        assert_eq!(doc["lastUpdated"], "1970-01-01T00:00:00Z");
    }

    #[test]
    fn touched_settings_are_newer() {
        let old = UserSettings::default();
        let now = Utc.timestamp_opt(1_000, 0).unwrap();
        let new = old.clone().touched(now, "tablet");

        assert!(new.is_newer_than(&old));
        assert!(!old.is_newer_than(&new));
        assert_eq!(new.device_id.as_deref(), Some("tablet"));
    }

    #[test]
    fn filters_serialize_as_sorted_arrays() {
        let mut filters = UserFilters::default();
        filters.active_filters.insert("Geometry".into());
        filters.active_filters.insert("Algebra".into());
        filters.active_difficulty_filters.insert("H".into());

        let doc = filters.to_document().unwrap();
        assert_eq!(doc["activeFilters"], json!(["Algebra", "Geometry"]));
        assert_eq!(doc["activeDifficultyFilters"], json!(["H"]));
        assert_eq!(filters.document_id(), "filters");
        assert!(!filters.is_empty());
    }
}
