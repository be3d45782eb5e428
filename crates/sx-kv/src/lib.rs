// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Versioned, Compare-And-Swap key/value storage (spec.md §4.6).

/// Error taxonomy for storage and retry operations.
pub mod error;
/// CAS read-modify-write retry loop.
pub mod retry;
/// The `VersionedStore` trait and an in-memory reference implementation.
pub mod store;

pub use error::KvError;
pub use retry::{create_with_retry, update_with_retry, RetryConfig};
pub use store::{InMemoryVersionedStore, VersionToken, VersionedStore};
