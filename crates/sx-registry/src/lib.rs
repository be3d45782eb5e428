// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Job lifecycle registry: a CAS-backed state machine over
//! [`sx_kv::VersionedStore`], with output-driven completion validation and
//! resumable-task reconstruction (spec.md §4.4).

/// Registry-specific error taxonomy.
pub mod error;
/// `JobRegistry`, the CAS-guarded orchestrator tying the other modules
/// together.
pub mod registry;
/// `JobState`, `JobStatus`, `OutputSpec` and expected-output generation.
pub mod state;
/// The legal job-status transition table.
pub mod transition;
/// Output-driven completion validation and task reconstruction.
pub mod validate;

pub use error::RegistryError;
pub use registry::{JobRegistry, StatusUpdate};
pub use state::{build_expected_outputs, JobState, JobStatus, OutputSpec};
pub use transition::is_legal_transition;
pub use validate::{reconstruct_task_from_spec, validate_outputs, OutputProbe, ValidationResult, ValidationStatus};
