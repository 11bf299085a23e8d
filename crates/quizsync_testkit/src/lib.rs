//! # Quizsync Testkit
//!
//! Test utilities for quizsync.
//!
//! This crate provides:
//! - Device fixtures sharing one in-memory remote store
//! - Deterministic question catalogs and a lookup that fails on demand
//! - Temporary directories for the file-backed stores
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust
//! use quizsync_testkit::prelude::*;
//!
//! let remote = shared_remote("user-1");
//! let phone = DeviceFixture::new("phone", remote.clone()).with_seen(&["A", "B"]);
//! assert_eq!(phone.seen(), vec!["A", "B"]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
