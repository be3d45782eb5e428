// SPDX-License-Identifier: MIT OR Apache-2.0
//! Bundle resolution errors (spec.md §7 `BundleError`).
//!
//! Every variant here is non-retryable: a bundle that cannot be found,
//! parsed, or materialised fails the same way on every retry, so callers
//! surface it directly as a `SimReturn` failure with `retryable=false`.

use thiserror::Error;

/// Errors raised while resolving or materialising a bundle reference.
#[derive(Debug, Error)]
pub enum BundleError {
    /// The reference string was empty.
    #[error("bundle reference cannot be empty")]
    EmptyRef,

    /// The resolved source path does not exist.
    #[error("bundle not found: {bundle_ref:?} (resolved to {resolved_path})")]
    NotFound {
        /// The original reference string.
        bundle_ref: String,
        /// The path it resolved to.
        resolved_path: String,
    },

    /// The resolved path exists but is not a directory.
    #[error("bundle path is not a directory: {0}")]
    NotADirectory(String),

    /// Materialisation (copy into the cache) failed.
    #[error("failed to cache bundle {digest}: {message}")]
    CacheFailed {
        /// The digest that failed to materialise.
        digest: String,
        /// Underlying failure detail.
        message: String,
    },

    /// A filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
