// SPDX-License-Identifier: MIT OR Apache-2.0
//! The job status state machine (spec.md §4.4): an explicit transition
//! table plus the idempotent-no-op / terminal-state rules around it.

use crate::state::JobStatus;

/// `true` iff `from -> to` is a legal transition per spec.md §4.4:
/// ```text
/// pending    -> submitting | cancelled
/// submitting -> scheduled | failed
/// scheduled  -> running | failed | cancelled
/// running    -> validating | succeeded | failed | cancelled
/// validating -> succeeded | partial_success | failed
/// ```
/// A self-loop (`from == to`) is always legal (idempotent no-op), even
/// from a terminal state; a transition *away* from a terminal state to a
/// different status is always illegal. This matches testable property 4
/// in spec.md §8: terminal states have no outgoing edges to another state.
pub fn is_legal_transition(from: JobStatus, to: JobStatus) -> bool {
    if from == to {
        return true;
    }
    if from.is_terminal() {
        return false;
    }
    use JobStatus::*;
    matches!(
        (from, to),
        (Pending, Submitting)
            | (Pending, Cancelled)
            | (Submitting, Scheduled)
            | (Submitting, Failed)
            | (Scheduled, Running)
            | (Scheduled, Failed)
            | (Scheduled, Cancelled)
            | (Running, Validating)
            | (Running, Succeeded)
            | (Running, Failed)
            | (Running, Cancelled)
            | (Validating, Succeeded)
            | (Validating, PartialSuccess)
            | (Validating, Failed)
    )
}
