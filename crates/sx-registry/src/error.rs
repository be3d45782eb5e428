// SPDX-License-Identifier: MIT OR Apache-2.0
//! Job registry errors (spec.md §4.4, §7).

use crate::state::JobStatus;
use thiserror::Error;

/// Errors raised by [`crate::registry::JobRegistry`] operations.
///
/// Per spec.md §7, these are programming errors surfaced directly to the
/// submission service rather than retried — CAS conflicts are recovered
/// internally by [`sx_kv::update_with_retry`] and never reach this type.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// `register_job` was called for a `job_id` that already exists.
    #[error("job {0:?} is already registered")]
    JobExists(String),

    /// No job exists with the given id.
    #[error("job {0:?} not found")]
    NotFound(String),

    /// The requested transition is not reachable from the current status.
    #[error("cannot transition job {job_id:?} from {from:?} to {to:?}")]
    InvalidTransition {
        /// The job being transitioned.
        job_id: String,
        /// The status it was in.
        from: JobStatus,
        /// The status that was requested.
        to: JobStatus,
    },

    /// The job is already in a terminal status and the requested target
    /// differs from the current one.
    #[error("job {job_id:?} is already terminal at {status:?}")]
    TerminalState {
        /// The job being transitioned.
        job_id: String,
        /// The terminal status it is already in.
        status: JobStatus,
    },

    /// `get_resumable_tasks` was called on a job that is not
    /// `partial_success`.
    #[error("job {job_id:?} is {status:?}, not partial_success; nothing to resume")]
    NotResumable {
        /// The job being inspected.
        job_id: String,
        /// Its current status.
        status: JobStatus,
    },

    /// The underlying versioned store failed.
    #[error(transparent)]
    Kv(#[from] sx_kv::KvError),
}
