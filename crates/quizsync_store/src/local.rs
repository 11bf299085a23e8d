//! Typed on-device state over a key/value backend.

use crate::backend::KeyValueBackend;
use crate::error::{StoreError, StoreResult};
use chrono::{DateTime, SecondsFormat, Utc};
use quizsync_model::{Mistake, UserFilters, UserSettings};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashSet;

/// Keys used by [`KeyValueLocalStore`].
pub mod keys {
    /// Ordered list of seen question IDs.
    pub const SEEN_QUESTIONS: &str = "seen_questions";
    /// List of displayable mistakes.
    pub const MISTAKES: &str = "mistakes";
    /// Caching preference, mirrored outside the settings document.
    pub const CACHING_ENABLED: &str = "caching_enabled";
    /// Settings document.
    pub const USER_SETTINGS: &str = "user_settings";
    /// Filters document.
    pub const USER_FILTERS: &str = "user_filters";
    /// Instant of the last successful pull. Absent means never synced.
    pub const LAST_SYNC_TIMESTAMP: &str = "last_sync_timestamp";

    /// Every key owned by the local store.
    pub const ALL: [&str; 6] = [
        SEEN_QUESTIONS,
        MISTAKES,
        CACHING_ENABLED,
        USER_SETTINGS,
        USER_FILTERS,
        LAST_SYNC_TIMESTAMP,
    ];
}

/// Per-device progress, preferences, and sync cursor.
///
/// Local storage is assumed to have a single writer (one app process), so
/// read-modify-write helpers do not lock across calls.
pub trait LocalStore: Send + Sync {
    /// Returns seen question IDs in the order they were first seen.
    fn seen_questions(&self) -> StoreResult<Vec<String>>;

    /// Replaces the seen question IDs.
    fn set_seen_questions(&self, ids: &[String]) -> StoreResult<()>;

    /// Returns the stored mistakes, at most one per question.
    fn mistakes(&self) -> StoreResult<Vec<Mistake>>;

    /// Replaces the stored mistakes.
    fn set_mistakes(&self, mistakes: &[Mistake]) -> StoreResult<()>;

    /// Returns the current settings, or defaults if none were saved.
    fn settings(&self) -> StoreResult<UserSettings>;

    /// Saves the settings.
    fn set_settings(&self, settings: &UserSettings) -> StoreResult<()>;

    /// Returns the current filters, or defaults if none were saved.
    fn filters(&self) -> StoreResult<UserFilters>;

    /// Saves the filters.
    fn set_filters(&self, filters: &UserFilters) -> StoreResult<()>;

    /// Returns the instant of the last successful pull.
    fn last_sync(&self) -> StoreResult<Option<DateTime<Utc>>>;

    /// Sets or clears the pull cursor.
    fn set_last_sync(&self, at: Option<DateTime<Utc>>) -> StoreResult<()>;

    /// Removes all progress, preferences, and the cursor.
    fn clear(&self) -> StoreResult<()>;

    /// Appends IDs not already seen, keeping first-seen order.
    ///
    /// Returns the number of IDs added.
    fn add_seen_questions(&self, ids: &[String]) -> StoreResult<usize> {
        let mut seen = self.seen_questions()?;
        let mut known: HashSet<String> = seen.iter().cloned().collect();
        let mut added = 0;
        for id in ids {
            if known.insert(id.clone()) {
                seen.push(id.clone());
                added += 1;
            }
        }
        if added > 0 {
            self.set_seen_questions(&seen)?;
        }
        Ok(added)
    }

    /// Inserts mistakes keyed by question ID.
    ///
    /// An incoming mistake replaces a stored one for the same question only
    /// if it is not older. Returns the number of mistakes inserted or replaced.
    fn upsert_mistakes(&self, incoming: Vec<Mistake>) -> StoreResult<usize> {
        let mut mistakes = self.mistakes()?;
        let mut changed = 0;
        for mistake in incoming {
            match mistakes
                .iter_mut()
                .find(|m| m.question_id() == mistake.question_id())
            {
                Some(existing) => {
                    if mistake.timestamp() >= existing.timestamp() && *existing != mistake {
                        *existing = mistake;
                        changed += 1;
                    }
                }
                None => {
                    mistakes.push(mistake);
                    changed += 1;
                }
            }
        }
        if changed > 0 {
            self.set_mistakes(&mistakes)?;
        }
        Ok(changed)
    }

    /// Returns true if any seen question or mistake is stored.
    fn has_progress(&self) -> StoreResult<bool> {
        Ok(!self.seen_questions()?.is_empty() || !self.mistakes()?.is_empty())
    }
}

/// A [`LocalStore`] that keeps each value as JSON under a fixed key.
///
/// # Example
///
/// ```rust
/// use quizsync_store::{KeyValueLocalStore, LocalStore, MemoryKeyValue};
///
/// let local = KeyValueLocalStore::new(MemoryKeyValue::new());
/// assert!(local.settings().unwrap().caching_enabled);
/// assert_eq!(local.last_sync().unwrap(), None);
/// ```
#[derive(Debug)]
pub struct KeyValueLocalStore<B: KeyValueBackend> {
    backend: B,
}

impl<B: KeyValueBackend> KeyValueLocalStore<B> {
    /// Creates a local store over `backend`.
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Returns the underlying backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        match self.backend.get(key)? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| StoreError::Corrupted(format!("{key}: {e}"))),
            None => Ok(None),
        }
    }

    fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> StoreResult<()> {
        self.backend.set(key, serde_json::to_string(value)?)
    }
}

impl<B: KeyValueBackend> LocalStore for KeyValueLocalStore<B> {
    fn seen_questions(&self) -> StoreResult<Vec<String>> {
        Ok(self.read(keys::SEEN_QUESTIONS)?.unwrap_or_default())
    }

    fn set_seen_questions(&self, ids: &[String]) -> StoreResult<()> {
        self.write(keys::SEEN_QUESTIONS, ids)
    }

    fn mistakes(&self) -> StoreResult<Vec<Mistake>> {
        Ok(self.read(keys::MISTAKES)?.unwrap_or_default())
    }

    fn set_mistakes(&self, mistakes: &[Mistake]) -> StoreResult<()> {
        self.write(keys::MISTAKES, mistakes)
    }

    fn settings(&self) -> StoreResult<UserSettings> {
        let mut settings: UserSettings = self.read(keys::USER_SETTINGS)?.unwrap_or_default();
        if let Some(caching) = self.read::<bool>(keys::CACHING_ENABLED)? {
            settings.caching_enabled = caching;
        }
        Ok(settings)
    }

    fn set_settings(&self, settings: &UserSettings) -> StoreResult<()> {
        self.write(keys::USER_SETTINGS, settings)?;
        self.write(keys::CACHING_ENABLED, &settings.caching_enabled)
    }

    fn filters(&self) -> StoreResult<UserFilters> {
        Ok(self.read(keys::USER_FILTERS)?.unwrap_or_default())
    }

    fn set_filters(&self, filters: &UserFilters) -> StoreResult<()> {
        self.write(keys::USER_FILTERS, filters)
    }

    fn last_sync(&self) -> StoreResult<Option<DateTime<Utc>>> {
        let Some(raw) = self.backend.get(keys::LAST_SYNC_TIMESTAMP)? else {
            return Ok(None);
        };
        DateTime::parse_from_rfc3339(&raw)
            .map(|at| Some(at.with_timezone(&Utc)))
            .map_err(|e| StoreError::Corrupted(format!("{}: {e}", keys::LAST_SYNC_TIMESTAMP)))
    }

    fn set_last_sync(&self, at: Option<DateTime<Utc>>) -> StoreResult<()> {
        match at {
            Some(at) => self.backend.set(
                keys::LAST_SYNC_TIMESTAMP,
                at.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            ),
            None => self.backend.remove(keys::LAST_SYNC_TIMESTAMP),
        }
    }

    fn clear(&self) -> StoreResult<()> {
        for key in keys::ALL {
            self.backend.remove(key)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryKeyValue;
    use chrono::TimeZone;
    use quizsync_model::{MistakeEntry, QuestionContent, QuestionIdType};

    fn store() -> KeyValueLocalStore<MemoryKeyValue> {
        KeyValueLocalStore::new(MemoryKeyValue::new())
    }

    fn mistake(id: &str, choice: &str, secs: i64) -> Mistake {
        Mistake::new(
            MistakeEntry::choice(
                id,
                QuestionIdType::External,
                choice,
                Utc.timestamp_opt(secs, 0).unwrap(),
            ),
            QuestionContent {
                question: format!("question {id}"),
                options: vec![],
                correct_answer: "A".into(),
                rationale: None,
            },
        )
    }

    #[test]
    fn add_seen_questions_is_idempotent() {
        let local = store();
        let ids = vec!["a".to_string(), "b".to_string(), "a".to_string()];

        assert_eq!(local.add_seen_questions(&ids).unwrap(), 2);
        assert_eq!(local.add_seen_questions(&ids).unwrap(), 0);
        assert_eq!(local.seen_questions().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn upsert_keeps_newest_mistake_per_question() {
        let local = store();
        local
            .upsert_mistakes(vec![mistake("Q1", "A", 10), mistake("Q2", "B", 10)])
            .unwrap();

        // older record does not replace
        assert_eq!(local.upsert_mistakes(vec![mistake("Q1", "C", 5)]).unwrap(), 0);
        // newer one does
        assert_eq!(local.upsert_mistakes(vec![mistake("Q1", "D", 20)]).unwrap(), 1);
        // identical one is a no-op
        assert_eq!(local.upsert_mistakes(vec![mistake("Q1", "D", 20)]).unwrap(), 0);

        let stored = local.mistakes().unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].user_answer(), Some("D"));
    }

    #[test]
    fn caching_enabled_mirrors_settings() {
        let local = store();
        let settings = UserSettings {
            caching_enabled: false,
            ..UserSettings::default()
        };
        local.set_settings(&settings).unwrap();

        assert_eq!(
            local.backend().get(keys::CACHING_ENABLED).unwrap().as_deref(),
            Some("false")
        );
        assert_eq!(local.settings().unwrap(), settings);
    }

    #[test]
    fn cursor_roundtrip_and_clear() {
        let local = store();
        let at = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        local.set_last_sync(Some(at)).unwrap();
        local.add_seen_questions(&["a".to_string()]).unwrap();
        assert_eq!(local.last_sync().unwrap(), Some(at));
        assert!(local.has_progress().unwrap());

        local.clear().unwrap();
        assert_eq!(local.last_sync().unwrap(), None);
        assert!(!local.has_progress().unwrap());
        assert!(local.backend().is_empty());
    }

    #[test]
    fn cursor_stored_as_bare_rfc3339() {
        let local = store();
        let at = Utc.timestamp_opt(1_700_000_000, 250_000_000).unwrap();
        local.set_last_sync(Some(at)).unwrap();
        assert_eq!(
            local.backend().get(keys::LAST_SYNC_TIMESTAMP).unwrap().as_deref(),
            Some("2023-11-14T22:13:20.250Z")
        );

        let local = KeyValueLocalStore::new(MemoryKeyValue::with_entries([(
            keys::LAST_SYNC_TIMESTAMP,
            "2024-03-01T10:00:00+02:00",
        )]));
        assert_eq!(
            local.last_sync().unwrap(),
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap())
        );

        let local = KeyValueLocalStore::new(MemoryKeyValue::with_entries([(
            keys::LAST_SYNC_TIMESTAMP,
            "yesterday",
        )]));
        assert!(matches!(local.last_sync(), Err(StoreError::Corrupted(_))));
    }

    #[test]
    fn corrupted_value_reported() {
        let local = KeyValueLocalStore::new(MemoryKeyValue::with_entries([(
            keys::SEEN_QUESTIONS,
            "{not a list",
        )]));
        assert!(matches!(
            local.seen_questions(),
            Err(StoreError::Corrupted(_))
        ));
    }
}
