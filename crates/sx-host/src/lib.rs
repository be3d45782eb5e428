// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Warm/cold execution environments and the Warm Process Pool they share
//! (spec.md §4.6–§4.8).

/// The embedded Subprocess Runner script and per-bundle venv management.
pub mod asset;
/// Environment-variable-driven host configuration.
pub mod config;
/// Warm and cold execution environments.
pub mod environment;
/// The host-side error taxonomy.
pub mod error;
/// The Warm Process Pool.
pub mod pool;

pub use config::{ExecutorKind, HostConfig};
pub use environment::{ColdExecutionEnvironment, WarmExecutionEnvironment};
pub use error::HostError;
pub use pool::{PoolConfig, WarmProcess, WarmProcessPool};
