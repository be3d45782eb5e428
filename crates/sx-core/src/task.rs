// SPDX-License-Identifier: MIT OR Apache-2.0
//! `SimTask`, `TableArtifact`, `SimReturn`, and `ErrorInfo` — the atomic
//! unit of work and its result (spec.md §3).

use crate::bundle::BundleRef;
use crate::error::CoreError;
use crate::hash::{blake2b_256_hex, blake2b_256_hex_concat};
use crate::params::UniqueParameterSet;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The atomic unit of work dispatched to a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SimTask {
    /// Which bundle to execute against.
    pub bundle_ref: BundleRef,
    /// `module.path/scenario` or `module.path:symbol`.
    pub entrypoint: String,
    /// The (immutable) parameter set for this replicate.
    pub params: UniqueParameterSet,
    /// Random seed distinguishing this replicate.
    pub seed: i64,
    /// Names of outputs the caller intends to read; `None` means "all".
    pub outputs: Option<Vec<String>>,
}

impl SimTask {
    /// Construct a task.
    pub fn new(
        bundle_ref: BundleRef,
        entrypoint: impl Into<String>,
        params: UniqueParameterSet,
        seed: i64,
        outputs: Option<Vec<String>>,
    ) -> Self {
        Self {
            bundle_ref,
            entrypoint: entrypoint.into(),
            params,
            seed,
            outputs,
        }
    }

    /// `blake2b(bundle_ref ‖ entrypoint ‖ param_id ‖ seed)`.
    ///
    /// Two tasks that differ only in which `outputs` the caller wants share
    /// the same `sim_root` — it identifies the *computation*, not the view
    /// of its results.
    pub fn sim_root(&self) -> String {
        blake2b_256_hex_concat(&[
            self.bundle_ref.as_str().as_bytes(),
            self.entrypoint.as_bytes(),
            self.params.param_id().as_bytes(),
            self.seed.to_le_bytes().as_slice(),
        ])
    }

    /// `blake2b(sim_root ‖ sorted(output_names))`.
    pub fn task_id(&self) -> String {
        let mut names: Vec<&str> = self
            .outputs
            .as_deref()
            .unwrap_or(&[])
            .iter()
            .map(String::as_str)
            .collect();
        names.sort_unstable();
        let sim_root = self.sim_root();
        let joined = names.join(",");
        blake2b_256_hex_concat(&[sim_root.as_bytes(), joined.as_bytes()])
    }
}

/// A single output table: either inlined or indirected through the
/// provenance store's CAS.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TableArtifact {
    /// Byte length of the (decoded) artifact content.
    pub size: usize,
    /// blake2b-256 hex digest of the artifact content.
    pub checksum: String,
    /// Inline bytes, present for payloads `<= inline_max`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline: Option<Vec<u8>>,
    /// A `cas://<checksum>` reference, present for large payloads.
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    pub ref_: Option<String>,
}

impl TableArtifact {
    /// Build an inline artifact, computing `checksum` and `size` from the
    /// given bytes.
    pub fn inline(bytes: Vec<u8>) -> Self {
        let checksum = blake2b_256_hex(&bytes);
        let size = bytes.len();
        Self {
            size,
            checksum,
            inline: Some(bytes),
            ref_: None,
        }
    }

    /// Build a CAS-indirected artifact. `checksum` and `size` describe the
    /// content the reference points at.
    pub fn cas_ref(checksum: String, size: usize) -> Result<Self, CoreError> {
        Ok(Self {
            size,
            ref_: Some(format!("cas://{checksum}")),
            checksum,
            inline: None,
        })
    }

    /// `true` for inline artifacts.
    pub fn is_inline(&self) -> bool {
        self.inline.is_some()
    }

    /// Validate the invariants from spec.md §3: exactly one of
    /// `inline`/`ref_` is set, and for inline artifacts `checksum` and
    /// `size` match the bytes.
    pub fn validate(&self) -> Result<(), CoreError> {
        match (&self.inline, &self.ref_) {
            (Some(_), Some(_)) | (None, None) => {
                return Err(CoreError::ArtifactPayloadMismatch);
            }
            (Some(bytes), None) => {
                if bytes.len() != self.size {
                    return Err(CoreError::SizeMismatch {
                        declared: self.size,
                        actual: bytes.len(),
                    });
                }
                let computed = blake2b_256_hex(bytes);
                if computed != self.checksum {
                    return Err(CoreError::ChecksumMismatch {
                        expected: self.checksum.clone(),
                        computed,
                    });
                }
            }
            (None, Some(r)) => {
                if !r.starts_with("cas://") {
                    return Err(CoreError::InvalidCasRef(r.clone()));
                }
            }
        }
        Ok(())
    }
}

/// `{error_type, message, retryable}` — see spec.md §7 and §9 for the
/// policy framing: `retryable` is an explicit signal set by the raising
/// code, never inferred from an exception type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ErrorInfo {
    /// The raising exception/error class name (e.g. `"ValueError"`).
    pub error_type: String,
    /// Human-readable message.
    pub message: String,
    /// Whether the submission service should retry this task.
    pub retryable: bool,
}

/// The result of one task: either a success (non-empty `outputs`, no
/// error) or a failure (`error` set, `error_details` non-empty).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SimReturn {
    /// Identifies the task this is a result for.
    pub task_id: String,
    /// Output artifacts, empty on failure.
    pub outputs: BTreeMap<String, TableArtifact>,
    /// Set on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    /// A table artifact carrying a stack trace or similar diagnostic;
    /// required whenever `error` is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_details: Option<TableArtifact>,
}

impl SimReturn {
    /// Build a successful result.
    pub fn success(task_id: String, outputs: BTreeMap<String, TableArtifact>) -> Self {
        Self {
            task_id,
            outputs,
            error: None,
            error_details: None,
        }
    }

    /// Build a failure result.
    pub fn failure(task_id: String, error: ErrorInfo, error_details: TableArtifact) -> Self {
        Self {
            task_id,
            outputs: BTreeMap::new(),
            error: Some(error),
            error_details: Some(error_details),
        }
    }

    /// `true` if this return represents a failure.
    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }

    /// Validate the `(error == nil) XOR (error != nil ∧ error_details != nil)`
    /// invariant from spec.md §3.
    pub fn validate(&self) -> Result<(), CoreError> {
        match (&self.error, &self.error_details) {
            (None, None) => Ok(()),
            (Some(_), Some(_)) => Ok(()),
            _ => Err(CoreError::ErrorDetailsMismatch),
        }
    }
}
