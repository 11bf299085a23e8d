//! Configuration for the sync engine.

use quizsync_store::DEFAULT_MAX_BATCH_SIZE;
use std::time::Duration;
use uuid::Uuid;

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Device ID stamped on every pushed document.
    pub device_id: String,
    /// Maximum operations per remote batch commit.
    ///
    /// Clamped to the remote store's own ceiling at use.
    pub batch_size: usize,
    /// Maximum concurrent question lookups during rehydration.
    pub lookup_concurrency: usize,
    /// Time allowed for one question lookup.
    pub lookup_timeout: Duration,
}

impl SyncConfig {
    /// Creates a new sync configuration.
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            batch_size: DEFAULT_MAX_BATCH_SIZE,
            lookup_concurrency: 8,
            lookup_timeout: Duration::from_secs(10),
        }
    }

    /// Creates a configuration with a freshly generated device ID.
    pub fn with_random_device() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }

    /// Sets the batch size.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Sets the lookup concurrency.
    pub fn with_lookup_concurrency(mut self, concurrency: usize) -> Self {
        self.lookup_concurrency = concurrency.max(1);
        self
    }

    /// Sets the lookup timeout.
    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::with_random_device()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_config_builder() {
        let config = SyncConfig::new("phone")
            .with_batch_size(100)
            .with_lookup_concurrency(2)
            .with_lookup_timeout(Duration::from_secs(3));

        assert_eq!(config.device_id, "phone");
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.lookup_concurrency, 2);
        assert_eq!(config.lookup_timeout, Duration::from_secs(3));
    }

    #[test]
    fn zero_sizes_are_clamped() {
        let config = SyncConfig::new("d").with_batch_size(0).with_lookup_concurrency(0);
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.lookup_concurrency, 1);
    }

    #[test]
    fn default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.batch_size, 500);
        assert!(Uuid::parse_str(&config.device_id).is_ok());
        assert_ne!(config.device_id, SyncConfig::default().device_id);
    }
}
