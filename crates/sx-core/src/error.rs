// SPDX-License-Identifier: MIT OR Apache-2.0
//! Construction-time errors for the value types in this crate.
//!
//! These are distinct from the cross-process error taxonomy in spec.md §7
//! (`ProtocolError`, `BundleError`, ...), which live closer to the
//! component that raises them (`sx-protocol`, `sx-bundle`, `sx-host`).
//! `sx-core` only needs to reject malformed *values*.

use thiserror::Error;

/// Errors raised while constructing or validating a core value type.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A parameter value was not a JSON scalar (string, number, bool, null).
    #[error("parameter {name:?} is not a JSON scalar: {value}")]
    NonScalarParam {
        /// The offending parameter name.
        name: String,
        /// The offending value, rendered for diagnostics.
        value: String,
    },

    /// A [`TableArtifact`](crate::TableArtifact) was constructed with both
    /// (or neither) of `inline` and `ref_`.
    #[error("table artifact must carry exactly one of inline bytes or a cas:// reference")]
    ArtifactPayloadMismatch,

    /// An inline artifact's checksum did not match its bytes.
    #[error("inline artifact checksum mismatch: expected {expected}, computed {computed}")]
    ChecksumMismatch {
        /// Checksum recorded on the artifact.
        expected: String,
        /// Checksum recomputed from the inline bytes.
        computed: String,
    },

    /// An inline artifact's `size` did not match `inline.len()`.
    #[error("inline artifact size mismatch: declared {declared}, actual {actual}")]
    SizeMismatch {
        /// Size recorded on the artifact.
        declared: usize,
        /// Actual length of the inline bytes.
        actual: usize,
    },

    /// A `SimReturn` was constructed violating `(error == nil) XOR (error_details != nil)`.
    #[error("a SimReturn must carry error_details if and only if it carries an error")]
    ErrorDetailsMismatch,

    /// A `ref_` field did not have the `cas://` prefix.
    #[error("artifact ref {0:?} is missing the cas:// prefix")]
    InvalidCasRef(String),

    /// A bundle reference string could not be classified.
    #[error("empty bundle reference")]
    EmptyBundleRef,
}
