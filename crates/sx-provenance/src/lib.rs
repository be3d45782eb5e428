// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Content-addressed, schema-keyed persistent store for simulation and
//! aggregation results (spec.md §4.2, §6.4).

/// Arrow IPC stream encode/decode helpers for `artifact_<name>.arrow`.
pub mod arrow_support;
/// Schema and store error taxonomy.
pub mod error;
/// The path-schema DSL and the two predefined schemas.
pub mod schema;
/// The filesystem-backed `ProvenanceStore`.
pub mod store;

pub use error::{ProvenanceError, SchemaError};
pub use schema::PathSchema;
pub use store::ProvenanceStore;
