// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Bundle reference resolution and local materialisation (spec.md §4.2).

/// blake2b-256 content digest of a bundle directory tree.
pub mod digest;
/// Bundle resolution error taxonomy.
pub mod error;
/// Per-digest exclusive materialisation lock.
pub mod lock;
/// The `BundleRepository` trait and its file-backed implementation.
pub mod repository;

pub use error::BundleError;
pub use repository::{BundleRepository, FileBundleRepository};
