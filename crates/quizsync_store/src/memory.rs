//! In-memory key/value backend for testing.

use crate::backend::KeyValueBackend;
use crate::error::StoreResult;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// An in-memory key/value backend.
///
/// This backend stores all data in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral devices that don't need persistence
///
/// # Example
///
/// ```rust
/// use quizsync_store::{KeyValueBackend, MemoryKeyValue};
///
/// let backend = MemoryKeyValue::new();
/// backend.set("caching_enabled", "true".into()).unwrap();
/// assert_eq!(backend.get("caching_enabled").unwrap().as_deref(), Some("true"));
/// ```
#[derive(Debug, Default)]
pub struct MemoryKeyValue {
    data: RwLock<BTreeMap<String, String>>,
}

impl MemoryKeyValue {
    /// Creates a new empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend with pre-existing entries.
    #[must_use]
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            data: RwLock::new(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    /// Returns the number of stored keys.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

impl KeyValueBackend for MemoryKeyValue {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.data.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> StoreResult<()> {
        self.data.write().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        self.data.write().remove(key);
        Ok(())
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        Ok(self.data.read().keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_new_is_empty() {
        let backend = MemoryKeyValue::new();
        assert!(backend.is_empty());
        assert_eq!(backend.get("missing").unwrap(), None);
    }

    #[test]
    fn memory_set_overwrites() {
        let backend = MemoryKeyValue::new();
        backend.set("k", "one".into()).unwrap();
        backend.set("k", "two".into()).unwrap();

        assert_eq!(backend.get("k").unwrap().as_deref(), Some("two"));
        assert_eq!(backend.len(), 1);
    }

    #[test]
    fn memory_remove_missing_is_noop() {
        let backend = MemoryKeyValue::with_entries([("a", "1")]);
        backend.remove("b").unwrap();
        backend.remove("a").unwrap();
        assert!(backend.is_empty());
    }

    #[test]
    fn memory_keys_sorted() {
        let backend = MemoryKeyValue::with_entries([("b", "2"), ("a", "1")]);
        assert_eq!(backend.keys().unwrap(), vec!["a".to_string(), "b".to_string()]);
    }
}
