//! Key/value backend trait definition.

use crate::error::StoreResult;

/// A low-level on-device key/value store.
///
/// Backends are **opaque string stores**. They know nothing about seen
/// questions, mistakes, or settings; [`crate::KeyValueLocalStore`] owns all
/// interpretation of the stored values.
///
/// # Invariants
///
/// - `get` returns exactly the value last passed to `set` for that key
/// - `remove` of a missing key is a no-op
/// - Backends must be `Send + Sync`; a single writer is assumed
pub trait KeyValueBackend: Send + Sync {
    /// Reads the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be read.
    fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be made durable.
    fn set(&self, key: &str, value: String) -> StoreResult<()>;

    /// Removes `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be written.
    fn remove(&self, key: &str) -> StoreResult<()>;

    /// Lists all keys in ascending order.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be read.
    fn keys(&self) -> StoreResult<Vec<String>>;
}
