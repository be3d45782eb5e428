// SPDX-License-Identifier: MIT OR Apache-2.0
//! `JobState`, `JobStatus`, and `OutputSpec` — the job registry's data
//! model (spec.md §3).

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Finite set of job lifecycle states (spec.md §3, §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Registered but not yet handed to the submission service.
    Pending,
    /// Being submitted to the submission fabric.
    Submitting,
    /// Scheduled with the submission fabric, not yet running.
    Scheduled,
    /// Tasks are actively executing.
    Running,
    /// All tasks completed; outputs are being probed for presence.
    Validating,
    /// Terminal: every expected output is present.
    Succeeded,
    /// Terminal: some but not all expected outputs are present.
    PartialSuccess,
    /// Terminal: the job failed outright (e.g. zero outputs, or an
    /// unrecoverable submission error).
    Failed,
    /// Terminal: the job was cancelled before completion.
    Cancelled,
}

impl JobStatus {
    /// `true` for the four states with no outgoing transitions
    /// (spec.md §4.4, testable property 4).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::PartialSuccess | Self::Failed | Self::Cancelled
        )
    }
}

/// The manifest of one expected output artifact (spec.md §4.4): enumerated
/// once per `(param_id, seed)` pair when a job is registered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OutputSpec {
    /// Stable identifier of the parameter set this output belongs to.
    pub param_id: String,
    /// Replicate seed.
    pub seed: i64,
    /// Logical output kind (`"sim"`, matches the provenance layout).
    pub output_type: String,
    /// Bundle digest this output was computed under.
    pub bundle_digest: String,
    /// How many replicates this parameter set requires in total.
    pub replicate_count: u32,
    /// Provenance-store-relative path where this output should land.
    pub provenance_path: String,
    /// The raw parameter values, needed to reconstruct a `SimTask` on
    /// resume.
    pub param_values: BTreeMap<String, Value>,
}

/// The registry record for one submitted job (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobState {
    /// Unique job identifier.
    pub job_id: String,
    /// Current lifecycle state.
    pub status: JobStatus,
    /// When the job was registered.
    pub created_at: DateTime<Utc>,
    /// When the job record was last updated.
    pub updated_at: DateTime<Utc>,

    /// Kubernetes resource name backing this job, if scheduled there.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k8s_name: Option<String>,
    /// Kubernetes namespace backing this job, if scheduled there.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k8s_namespace: Option<String>,
    /// Kubernetes resource UID backing this job, if scheduled there.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k8s_uid: Option<String>,

    /// Total number of tasks this job is expected to run.
    pub tasks_total: u64,
    /// Number of tasks the submission service has reported complete.
    pub tasks_completed: u64,
    /// Number of tasks whose outputs have been verified in the provenance
    /// store.
    pub tasks_verified: u64,

    /// Human-readable error message, set on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Machine-readable error code, set on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// Where final results (e.g. a Parquet view) were written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results_path: Option<String>,

    /// The manifest of outputs this job is expected to produce.
    pub expected_outputs: Vec<OutputSpec>,
    /// Provenance paths confirmed present by the last `validate_outputs`.
    pub verified_outputs: Vec<String>,
    /// Provenance paths confirmed absent by the last `validate_outputs`.
    pub missing_outputs: Vec<String>,

    /// When the current validation pass started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_started_at: Option<DateTime<Utc>>,
    /// When the current validation pass completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_completed_at: Option<DateTime<Utc>>,
    /// Number of validation passes attempted.
    pub validation_attempts: u32,

    /// Free-form metadata, merged (never replaced) on update.
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl JobState {
    /// Construct the initial `pending` record for a newly registered job.
    pub fn new_pending(job_id: impl Into<String>, expected_outputs: Vec<OutputSpec>, now: DateTime<Utc>) -> Self {
        let tasks_total = expected_outputs.len() as u64;
        Self {
            job_id: job_id.into(),
            status: JobStatus::Pending,
            created_at: now,
            updated_at: now,
            k8s_name: None,
            k8s_namespace: None,
            k8s_uid: None,
            tasks_total,
            tasks_completed: 0,
            tasks_verified: 0,
            error_message: None,
            error_code: None,
            results_path: None,
            expected_outputs,
            verified_outputs: Vec::new(),
            missing_outputs: Vec::new(),
            validation_started_at: None,
            validation_completed_at: None,
            validation_attempts: 0,
            metadata: BTreeMap::new(),
        }
    }
}

/// Generate one [`OutputSpec`] per `(param_id, seed)` pair for a job's
/// parameter sets (spec.md §4.4 "expected-output manifest generation").
///
/// `parameter_sets` is `(param_id, param_values, replicate_count)`.
/// `provenance_path_for` computes the schema-driven path for a given
/// `(param_id, seed)`; callers typically close over a `PathSchema` and a
/// bundle digest (see `sx-provenance`).
pub fn build_expected_outputs(
    parameter_sets: &[(String, BTreeMap<String, Value>, u32)],
    bundle_digest: &str,
    mut provenance_path_for: impl FnMut(&str, i64) -> String,
) -> Vec<OutputSpec> {
    let mut outputs = Vec::new();
    for (param_id, param_values, replicate_count) in parameter_sets {
        for seed in 0..*replicate_count {
            let seed = seed as i64;
            outputs.push(OutputSpec {
                param_id: param_id.clone(),
                seed,
                output_type: "sim".to_string(),
                bundle_digest: bundle_digest.to_string(),
                replicate_count: *replicate_count,
                provenance_path: provenance_path_for(param_id, seed),
                param_values: param_values.clone(),
            });
        }
    }
    outputs
}
