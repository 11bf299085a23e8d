//! # quizsync Store
//!
//! Local key/value and remote document store adapters for quizsync.
//!
//! This crate provides the two storage seams the sync engine talks to:
//!
//! - [`LocalStore`] - typed on-device state (seen IDs, mistakes, settings,
//!   filters, sync cursor) layered over an opaque [`KeyValueBackend`]
//! - [`RemoteStore`] - a per-user document store with point reads and
//!   writes, "greater-than" timestamp queries, and bounded atomic batches
//!
//! ## Design Principles
//!
//! - Key/value backends store strings and know nothing about the model
//! - Remote documents are JSON bodies keyed by a stable document ID
//! - A batch is the unit of atomicity; it never exceeds
//!   [`RemoteStore::max_batch_size`] operations
//! - Every store is `Send + Sync` and shared by reference
//!
//! ## Available Implementations
//!
//! - [`MemoryKeyValue`] / [`FileKeyValue`] - key/value backends
//! - [`KeyValueLocalStore`] - the [`LocalStore`] over any backend
//! - [`MemoryRemoteStore`] - in-process document store for tests
//! - [`FileRemoteStore`] - document store persisted to a JSON file
//!
//! ## Example
//!
//! ```rust
//! use quizsync_store::{KeyValueLocalStore, LocalStore, MemoryKeyValue};
//!
//! let local = KeyValueLocalStore::new(MemoryKeyValue::new());
//! local.add_seen_questions(&["q-1".to_string()]).unwrap();
//! assert_eq!(local.seen_questions().unwrap(), vec!["q-1".to_string()]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod backend;
mod error;
mod file;
mod local;
mod memory;
mod remote;
mod remote_file;
mod remote_memory;

pub use backend::KeyValueBackend;
pub use error::{StoreError, StoreResult};
pub use file::FileKeyValue;
pub use local::{keys, KeyValueLocalStore, LocalStore};
pub use memory::MemoryKeyValue;
pub use remote::{
    BatchOp, Collection, CollectionRef, RemoteConfig, RemoteStore, StoredDocument, WriteBatch,
    DEFAULT_MAX_BATCH_SIZE,
};
pub use remote_file::FileRemoteStore;
pub use remote_memory::{MemoryRemoteStore, RemoteSnapshot};
