// SPDX-License-Identifier: MIT OR Apache-2.0
//! Errors raised by the path-schema DSL and the provenance store.

use thiserror::Error;

/// Errors raised parsing, validating, or rendering a path-schema template.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    /// Braces in the template were not balanced.
    #[error("unbalanced braces in template: {0:?}")]
    UnbalancedBraces(String),

    /// An `{...}` expression did not match any recognised construct.
    #[error("unrecognised template expression: {0:?}")]
    InvalidExpression(String),

    /// A variable name used uppercase characters.
    #[error("variable names must be lowercase: {0:?}")]
    UppercaseVariable(String),

    /// `render` was called with a variable the template references but the
    /// caller did not supply.
    #[error("template references unknown variable {0:?}")]
    UnknownVariable(String),
}

/// Errors raised by provenance store reads and writes.
#[derive(Debug, Error)]
pub enum ProvenanceError {
    /// The path schema rejected a template or a variable binding.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Filesystem I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A `result.json` / `metadata.json` file existed but was not valid
    /// JSON for the expected shape.
    #[error("malformed provenance record at {path}: {source}")]
    Malformed {
        /// The path of the offending file.
        path: String,
        /// The underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// An artifact's stored checksum did not match its content.
    #[error(transparent)]
    Core(#[from] sx_core::error::CoreError),

    /// An Arrow IPC payload could not be decoded.
    #[error("invalid Arrow IPC payload: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
}
