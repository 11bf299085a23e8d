//! File-based key/value backend for persistent storage.

use crate::backend::KeyValueBackend;
use crate::error::{StoreError, StoreResult};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// A file-based key/value backend.
///
/// All entries are kept in memory and written back as a single JSON object
/// on every mutation. Data survives process restarts. A mutation becomes
/// visible in memory only after it reached the disk.
///
/// # Durability
///
/// Each write goes to a sibling temporary file which is synced and then
/// renamed over the original, so a crash leaves either the old or the new
/// contents, never a torn file.
///
/// # Example
///
/// ```no_run
/// use quizsync_store::{FileKeyValue, KeyValueBackend};
/// use std::path::Path;
///
/// let backend = FileKeyValue::open(Path::new("device.json")).unwrap();
/// backend.set("caching_enabled", "false".into()).unwrap();
/// ```
#[derive(Debug)]
pub struct FileKeyValue {
    path: PathBuf,
    data: RwLock<BTreeMap<String, String>>,
}

impl FileKeyValue {
    /// Opens or creates a backend at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or does not
    /// contain a JSON object of strings.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let data = if path.exists() {
            let raw = fs::read_to_string(path)?;
            if raw.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&raw).map_err(|e| {
                    StoreError::Corrupted(format!("{}: {}", path.display(), e))
                })?
            }
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            data: RwLock::new(data),
        })
    }

    /// Opens or creates a backend, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created or the file cannot be read.
    pub fn open_with_create_dirs(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, data: &BTreeMap<String, String>) -> StoreResult<()> {
        write_atomic(&self.path, &serde_json::to_vec_pretty(data)?)
    }
}

/// Writes `bytes` to `path` through a synced temporary file and a rename.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> StoreResult<()> {
    let tmp = path.with_extension("tmp");
    {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

impl KeyValueBackend for FileKeyValue {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.data.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> StoreResult<()> {
        let mut data = self.data.write();
        let mut next = data.clone();
        next.insert(key.to_string(), value);
        self.persist(&next)?;
        *data = next;
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        let mut data = self.data.write();
        if !data.contains_key(key) {
            return Ok(());
        }
        let mut next = data.clone();
        next.remove(key);
        self.persist(&next)?;
        *data = next;
        Ok(())
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        Ok(self.data.read().keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_open_missing_is_empty() {
        let dir = tempdir().unwrap();
        let backend = FileKeyValue::open(&dir.path().join("kv.json")).unwrap();
        assert!(backend.keys().unwrap().is_empty());
    }

    #[test]
    fn file_persistence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kv.json");

        {
            let backend = FileKeyValue::open(&path).unwrap();
            backend.set("seen_questions", "[\"a\"]".into()).unwrap();
            backend.set("caching_enabled", "false".into()).unwrap();
            backend.remove("caching_enabled").unwrap();
        }

        {
            let backend = FileKeyValue::open(&path).unwrap();
            assert_eq!(
                backend.get("seen_questions").unwrap().as_deref(),
                Some("[\"a\"]")
            );
            assert_eq!(backend.get("caching_enabled").unwrap(), None);
        }
    }

    #[test]
    fn file_create_with_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("device").join("kv.json");

        let backend = FileKeyValue::open_with_create_dirs(&path).unwrap();
        backend.set("k", "v".into()).unwrap();
        assert!(path.exists());
        assert_eq!(backend.path(), path);
    }

    #[test]
    fn failed_write_leaves_memory_unchanged() {
        let dir = tempdir().unwrap();
        let device_dir = dir.path().join("device");
        let backend = FileKeyValue::open_with_create_dirs(&device_dir.join("kv.json")).unwrap();
        backend.set("a", "1".into()).unwrap();

        fs::remove_dir_all(&device_dir).unwrap();
        assert!(backend.set("b", "2".into()).is_err());
        assert!(backend.remove("a").is_err());

        assert_eq!(backend.get("a").unwrap().as_deref(), Some("1"));
        assert_eq!(backend.get("b").unwrap(), None);
    }

    #[test]
    fn file_corrupted_contents_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kv.json");
        fs::write(&path, "not json").unwrap();

        let result = FileKeyValue::open(&path);
        assert!(matches!(result, Err(StoreError::Corrupted(_))));
    }
}
