// SPDX-License-Identifier: MIT OR Apache-2.0
//! Errors raised by [`crate::store::VersionedStore`] implementations and
//! the retry helpers built on top of them.

use thiserror::Error;

/// Errors surfaced by versioned storage operations.
#[derive(Debug, Error)]
pub enum KvError {
    /// `update_with_retry` exhausted its attempt budget without a
    /// successful CAS write (spec.md §4.6).
    #[error("exhausted {attempts} attempts updating {key:?} due to CAS conflicts")]
    TooManyRetries {
        /// The key being updated.
        key: String,
        /// Number of attempts made.
        attempts: u32,
    },

    /// The key did not exist when an update or read was attempted.
    #[error("key not found: {0:?}")]
    NotFound(String),

    /// The stored bytes were not valid JSON, or not the expected shape.
    #[error("invalid JSON for {key:?}: {source}")]
    InvalidJson {
        /// The key whose value failed to parse.
        key: String,
        /// The underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// A backend-specific I/O failure (filesystem, network, etc).
    #[error("storage backend error: {0}")]
    Backend(String),
}
