// SPDX-License-Identifier: MIT OR Apache-2.0
//! `JobRegistry` — the CAS-backed job lifecycle store (spec.md §4.4).

use crate::error::RegistryError;
use crate::state::{JobState, JobStatus, OutputSpec};
use crate::transition::is_legal_transition;
use crate::validate::{validate_outputs, OutputProbe, ValidationResult, ValidationStatus};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use sx_kv::{update_with_retry, RetryConfig, VersionedStore};
use tracing::{info, warn};

const JOB_KEY_PREFIX: &str = "jobs/";

fn job_key(job_id: &str) -> String {
    format!("{JOB_KEY_PREFIX}{job_id}/state.json")
}

/// The job lifecycle registry: one CAS-guarded JSON blob per job
/// (spec.md §4.4, §6.5).
pub struct JobRegistry<'a> {
    store: &'a dyn VersionedStore,
    retry: RetryConfig,
}

impl<'a> JobRegistry<'a> {
    /// Bind a registry to a versioned store with the default retry
    /// policy.
    pub fn new(store: &'a dyn VersionedStore) -> Self {
        Self {
            store,
            retry: RetryConfig::default(),
        }
    }

    /// Bind a registry with an explicit retry policy.
    pub fn with_retry(store: &'a dyn VersionedStore, retry: RetryConfig) -> Self {
        Self { store, retry }
    }

    /// Register a new job in the `pending` state.
    ///
    /// Fails with [`RegistryError::JobExists`] if a job with this id is
    /// already registered (spec.md §4.4: `create_if_absent` semantics).
    pub async fn register_job(
        &self,
        job_id: impl Into<String>,
        expected_outputs: Vec<OutputSpec>,
        now: DateTime<Utc>,
    ) -> Result<JobState, RegistryError> {
        let job_id = job_id.into();
        let state = JobState::new_pending(job_id.clone(), expected_outputs, now);
        let encoded = serde_json::to_vec(&state).map_err(|e| RegistryError::Kv(sx_kv::KvError::InvalidJson {
            key: job_key(&job_id),
            source: e,
        }))?;
        let created = self.store.create_if_absent(&job_key(&job_id), encoded).await?;
        if !created {
            return Err(RegistryError::JobExists(job_id));
        }
        info!(target: "sx.registry", job_id = %job_id, tasks_total = state.tasks_total, "job registered");
        Ok(state)
    }

    /// Fetch a job's current state.
    pub async fn get(&self, job_id: &str) -> Result<JobState, RegistryError> {
        let Some((bytes, _version)) = self.store.get(&job_key(job_id)).await? else {
            return Err(RegistryError::NotFound(job_id.to_string()));
        };
        serde_json::from_slice(&bytes).map_err(|e| {
            RegistryError::Kv(sx_kv::KvError::InvalidJson {
                key: job_key(job_id),
                source: e,
            })
        })
    }

    /// Transition a job to `new_status`, validating the transition and
    /// merging (not replacing) `metadata`.
    ///
    /// A self-transition (`new_status == current status`) is always a
    /// no-op, even from a terminal state. Any other attempt to leave a
    /// terminal state is a [`RegistryError::TerminalState`]; any other
    /// transition not in the table (spec.md §4.4) is a
    /// [`RegistryError::InvalidTransition`].
    pub async fn update_status(
        &self,
        job_id: &str,
        new_status: JobStatus,
        fields: StatusUpdate,
    ) -> Result<JobState, RegistryError> {
        let key = job_key(job_id);
        // `update_with_retry` only carries the closure's error through
        // `Display`, so the precise `RegistryError` is stashed here and
        // recovered after the call rather than reconstructed from a
        // stringified message.
        let rejected: std::sync::Mutex<Option<RegistryError>> = std::sync::Mutex::new(None);

        let result = update_with_retry(self.store, &key, &self.retry, |mut state: JobState| {
            if !is_legal_transition(state.status, new_status) {
                let err = if state.status.is_terminal() {
                    RegistryError::TerminalState {
                        job_id: state.job_id.clone(),
                        status: state.status,
                    }
                } else {
                    RegistryError::InvalidTransition {
                        job_id: state.job_id.clone(),
                        from: state.status,
                        to: new_status,
                    }
                };
                let message = err.to_string();
                *rejected.lock().expect("rejected-error lock poisoned") = Some(err);
                return Err(message);
            }
            state.status = new_status;
            state.updated_at = fields.now;
            if let Some(msg) = &fields.error_message {
                state.error_message = Some(msg.clone());
            }
            if let Some(code) = &fields.error_code {
                state.error_code = Some(code.clone());
            }
            if let Some(path) = &fields.results_path {
                state.results_path = Some(path.clone());
            }
            for (k, v) in &fields.metadata {
                state.metadata.insert(k.clone(), v.clone());
            }
            Ok(state)
        })
        .await;

        match result {
            Ok(state) => {
                info!(target: "sx.registry", job_id, status = ?new_status, "job status updated");
                Ok(state)
            }
            Err(sx_kv::KvError::NotFound(_)) => Err(RegistryError::NotFound(job_id.to_string())),
            Err(sx_kv::KvError::Backend(message)) => {
                if let Some(err) = rejected.lock().expect("rejected-error lock poisoned").take() {
                    warn!(target: "sx.registry", job_id, %err, "status update rejected");
                    Err(err)
                } else {
                    Err(RegistryError::Kv(sx_kv::KvError::Backend(message)))
                }
            }
            Err(e) => Err(RegistryError::Kv(e)),
        }
    }

    /// Bump progress counters. Unlike [`Self::update_status`], this
    /// bypasses the transition rule entirely (spec.md §4.4: progress
    /// updates are allowed in any state) but is still CAS-safe.
    pub async fn update_progress(
        &self,
        job_id: &str,
        tasks_completed: Option<u64>,
        tasks_total: Option<u64>,
        now: DateTime<Utc>,
    ) -> Result<JobState, RegistryError> {
        let key = job_key(job_id);
        let state = update_with_retry(self.store, &key, &self.retry, move |mut state: JobState| {
            if let Some(completed) = tasks_completed {
                state.tasks_completed = completed;
            }
            if let Some(total) = tasks_total {
                state.tasks_total = total;
            }
            state.updated_at = now;
            Ok::<_, std::convert::Infallible>(state)
        })
        .await
        .map_err(|e| match e {
            sx_kv::KvError::NotFound(_) => RegistryError::NotFound(job_id.to_string()),
            other => RegistryError::Kv(other),
        })?;
        Ok(state)
    }

    /// Increment `tasks_completed` by one. A convenience wrapper used by
    /// the concurrent-progress testable property (spec.md §8, property 5).
    pub async fn increment_completed(&self, job_id: &str, now: DateTime<Utc>) -> Result<JobState, RegistryError> {
        let key = job_key(job_id);
        update_with_retry(self.store, &key, &self.retry, move |mut state: JobState| {
            state.tasks_completed += 1;
            state.updated_at = now;
            Ok::<_, std::convert::Infallible>(state)
        })
        .await
        .map_err(|e| match e {
            sx_kv::KvError::NotFound(_) => RegistryError::NotFound(job_id.to_string()),
            other => RegistryError::Kv(other),
        })
    }

    /// Probe the provenance store for every `expected_outputs` path and
    /// classify the job's completion (spec.md §4.4).
    pub async fn validate_outputs(&self, job_id: &str, probe: &dyn OutputProbe, now: DateTime<Utc>) -> Result<ValidationResult, RegistryError> {
        let key = job_key(job_id);
        let state = self.get(job_id).await?;
        let result = validate_outputs(&state.expected_outputs, probe);

        update_with_retry(self.store, &key, &self.retry, {
            let result = result.clone();
            move |mut state: JobState| {
                state.verified_outputs = result.verified.clone();
                state.missing_outputs = result.missing.clone();
                state.tasks_verified = result.verified_count() as u64;
                state.validation_completed_at = Some(now);
                state.validation_attempts += 1;
                if state.validation_started_at.is_none() {
                    state.validation_started_at = Some(now);
                }
                state.updated_at = now;
                Ok::<_, std::convert::Infallible>(state)
            }
        })
        .await
        .map_err(|e| match e {
            sx_kv::KvError::NotFound(_) => RegistryError::NotFound(job_id.to_string()),
            other => RegistryError::Kv(other),
        })?;

        Ok(result)
    }

    /// Transition a job to its final status based on a [`ValidationResult`]
    /// (spec.md §4.4): `Complete -> succeeded`, `Partial` with at least one
    /// verified output `-> partial_success`, `Partial` with none verified
    /// `-> failed`.
    pub async fn finalize_with_validation(
        &self,
        job_id: &str,
        result: &ValidationResult,
        now: DateTime<Utc>,
    ) -> Result<JobState, RegistryError> {
        let target = match result.status {
            ValidationStatus::Complete => JobStatus::Succeeded,
            ValidationStatus::Partial if result.verified_count() > 0 => JobStatus::PartialSuccess,
            ValidationStatus::Partial => JobStatus::Failed,
        };
        self.update_status(job_id, target, StatusUpdate::now(now)).await
    }

    /// From a `partial_success` job, reconstruct the `SimTask`s
    /// corresponding to `missing_outputs` (spec.md §4.4, testable property
    /// 9). `bundle_ref`/`entrypoint` are the job-level values recorded at
    /// submission time (see [`crate::validate::reconstruct_task_from_spec`]).
    pub async fn get_resumable_tasks(
        &self,
        job_id: &str,
        bundle_ref: sx_core::BundleRef,
        entrypoint: &str,
    ) -> Result<Vec<sx_core::SimTask>, RegistryError> {
        let state = self.get(job_id).await?;
        if state.status != JobStatus::PartialSuccess {
            return Err(RegistryError::NotResumable {
                job_id: job_id.to_string(),
                status: state.status,
            });
        }
        let missing: std::collections::BTreeSet<&str> = state.missing_outputs.iter().map(String::as_str).collect();
        let mut tasks = Vec::new();
        for spec in &state.expected_outputs {
            if missing.contains(spec.provenance_path.as_str()) {
                let task = crate::validate::reconstruct_task_from_spec(spec, bundle_ref.clone(), entrypoint)
                    .map_err(|e| RegistryError::Kv(sx_kv::KvError::Backend(e.to_string())))?;
                tasks.push(task);
            }
        }
        Ok(tasks)
    }

    /// List every job id under the registry's key prefix.
    pub async fn list_jobs(&self) -> Result<Vec<String>, RegistryError> {
        let keys = self.store.list_keys(JOB_KEY_PREFIX).await?;
        Ok(keys
            .into_iter()
            .filter_map(|k| {
                k.strip_prefix(JOB_KEY_PREFIX)
                    .and_then(|rest| rest.strip_suffix("/state.json"))
                    .map(str::to_string)
            })
            .collect())
    }

    /// List jobs whose status is not terminal (supplemented from the
    /// original implementation's `get_active_jobs`).
    pub async fn get_active_jobs(&self) -> Result<Vec<JobState>, RegistryError> {
        let mut active = Vec::new();
        for job_id in self.list_jobs().await? {
            let state = self.get(&job_id).await?;
            if !state.status.is_terminal() {
                active.push(state);
            }
        }
        active.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(active)
    }

    /// List the `limit` most recently created jobs, regardless of status
    /// (`get_recent_jobs` in the original implementation).
    pub async fn get_recent_jobs(&self, limit: usize) -> Result<Vec<JobState>, RegistryError> {
        let mut all = Vec::new();
        for job_id in self.list_jobs().await? {
            all.push(self.get(&job_id).await?);
        }
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all.truncate(limit);
        Ok(all)
    }
}

/// Optional fields carried by an [`JobRegistry::update_status`] call.
#[derive(Debug, Clone, Default)]
pub struct StatusUpdate {
    /// Timestamp to record as `updated_at`.
    pub now: DateTime<Utc>,
    /// Human-readable error message, set on failure transitions.
    pub error_message: Option<String>,
    /// Machine-readable error code, set on failure transitions.
    pub error_code: Option<String>,
    /// Where final results were written, set on success transitions.
    pub results_path: Option<String>,
    /// Metadata entries to merge in.
    pub metadata: BTreeMap<String, Value>,
}

impl StatusUpdate {
    /// A bare status update carrying only the timestamp.
    pub fn now(now: DateTime<Utc>) -> Self {
        Self {
            now,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::OutputProbe;
    use std::collections::BTreeSet;
    use std::sync::Mutex;
    use sx_kv::InMemoryVersionedStore;

    struct AlwaysPresent;
    impl OutputProbe for AlwaysPresent {
        fn is_present(&self, _path: &str) -> bool {
            true
        }
    }

    struct SelectivePresent(BTreeSet<String>);
    impl OutputProbe for SelectivePresent {
        fn is_present(&self, path: &str) -> bool {
            self.0.contains(path)
        }
    }

    fn spec(param_id: &str, seed: i64, path: &str) -> OutputSpec {
        OutputSpec {
            param_id: param_id.to_string(),
            seed,
            output_type: "sim".to_string(),
            bundle_digest: "deadbeef".to_string(),
            replicate_count: 2,
            provenance_path: path.to_string(),
            param_values: BTreeMap::from([("x".to_string(), serde_json::json!(1))]),
        }
    }

    #[tokio::test]
    async fn register_then_get_round_trips() {
        let store = InMemoryVersionedStore::new();
        let registry = JobRegistry::new(&store);
        let now = Utc::now();
        registry.register_job("job1", vec![spec("p1", 0, "a")], now).await.unwrap();
        let state = registry.get("job1").await.unwrap();
        assert_eq!(state.status, JobStatus::Pending);
        assert_eq!(state.tasks_total, 1);
    }

    #[tokio::test]
    async fn registering_twice_fails() {
        let store = InMemoryVersionedStore::new();
        let registry = JobRegistry::new(&store);
        let now = Utc::now();
        registry.register_job("job1", vec![], now).await.unwrap();
        let err = registry.register_job("job1", vec![], now).await.unwrap_err();
        assert!(matches!(err, RegistryError::JobExists(_)));
    }

    #[tokio::test]
    async fn full_happy_path_transition_sequence() {
        let store = InMemoryVersionedStore::new();
        let registry = JobRegistry::new(&store);
        let now = Utc::now();
        registry.register_job("job1", vec![], now).await.unwrap();

        for status in [JobStatus::Submitting, JobStatus::Scheduled, JobStatus::Running, JobStatus::Validating, JobStatus::Succeeded] {
            registry.update_status("job1", status, StatusUpdate::now(now)).await.unwrap();
        }
        assert_eq!(registry.get("job1").await.unwrap().status, JobStatus::Succeeded);
    }

    #[tokio::test]
    async fn illegal_transition_is_rejected() {
        let store = InMemoryVersionedStore::new();
        let registry = JobRegistry::new(&store);
        let now = Utc::now();
        registry.register_job("job1", vec![], now).await.unwrap();
        let err = registry.update_status("job1", JobStatus::Succeeded, StatusUpdate::now(now)).await.unwrap_err();
        assert!(matches!(err, RegistryError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn transition_away_from_terminal_is_rejected() {
        let store = InMemoryVersionedStore::new();
        let registry = JobRegistry::new(&store);
        let now = Utc::now();
        registry.register_job("job1", vec![], now).await.unwrap();
        registry.update_status("job1", JobStatus::Cancelled, StatusUpdate::now(now)).await.unwrap();
        let err = registry.update_status("job1", JobStatus::Pending, StatusUpdate::now(now)).await.unwrap_err();
        assert!(matches!(err, RegistryError::TerminalState { .. }));
    }

    #[tokio::test]
    async fn self_transition_from_terminal_is_a_no_op() {
        let store = InMemoryVersionedStore::new();
        let registry = JobRegistry::new(&store);
        let now = Utc::now();
        registry.register_job("job1", vec![], now).await.unwrap();
        registry.update_status("job1", JobStatus::Cancelled, StatusUpdate::now(now)).await.unwrap();
        registry.update_status("job1", JobStatus::Cancelled, StatusUpdate::now(now)).await.unwrap();
    }

    #[tokio::test]
    async fn ten_concurrent_progress_increments_all_land() {
        let store = std::sync::Arc::new(InMemoryVersionedStore::new());
        let registry_store: &dyn VersionedStore = store.as_ref();
        let registry = JobRegistry::new(registry_store);
        let now = Utc::now();
        registry.register_job("job1", vec![], now).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let registry = JobRegistry::new(store.as_ref());
                registry.increment_completed("job1", Utc::now()).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(registry.get("job1").await.unwrap().tasks_completed, 10);
    }

    #[tokio::test]
    async fn validate_outputs_then_finalize_partial_success() {
        let store = InMemoryVersionedStore::new();
        let registry = JobRegistry::new(&store);
        let now = Utc::now();
        let specs = vec![
            spec("p1", 0, "a"),
            spec("p1", 1, "b"),
            spec("p2", 0, "c"),
        ];
        registry.register_job("job1", specs, now).await.unwrap();
        for status in [JobStatus::Submitting, JobStatus::Scheduled, JobStatus::Running, JobStatus::Validating] {
            registry.update_status("job1", status, StatusUpdate::now(now)).await.unwrap();
        }

        let probe = SelectivePresent(BTreeSet::from(["a".to_string(), "b".to_string()]));
        let result = registry.validate_outputs("job1", &probe, now).await.unwrap();
        assert_eq!(result.verified_count(), 2);
        assert_eq!(result.missing_count(), 1);

        registry.finalize_with_validation("job1", &result, now).await.unwrap();
        let state = registry.get("job1").await.unwrap();
        assert_eq!(state.status, JobStatus::PartialSuccess);
        assert_eq!(state.missing_outputs, vec!["c".to_string()]);
    }

    #[tokio::test]
    async fn get_resumable_tasks_matches_missing_specs() {
        let store = InMemoryVersionedStore::new();
        let registry = JobRegistry::new(&store);
        let now = Utc::now();
        let specs = vec![spec("p1", 0, "a"), spec("p1", 1, "b"), spec("p2", 0, "c")];
        registry.register_job("job1", specs, now).await.unwrap();
        for status in [JobStatus::Submitting, JobStatus::Scheduled, JobStatus::Running, JobStatus::Validating] {
            registry.update_status("job1", status, StatusUpdate::now(now)).await.unwrap();
        }
        let probe = SelectivePresent(BTreeSet::from(["a".to_string()]));
        let result = registry.validate_outputs("job1", &probe, now).await.unwrap();
        registry.finalize_with_validation("job1", &result, now).await.unwrap();

        let bundle_ref = sx_core::BundleRef::new("file:///bundles/hello").unwrap();
        let tasks = registry.get_resumable_tasks("job1", bundle_ref, "models.noop/main").await.unwrap();
        assert_eq!(tasks.len(), 2);
        let seeds: BTreeSet<i64> = tasks.iter().map(|t| t.seed).collect();
        assert_eq!(seeds, BTreeSet::from([1, 0]));
    }

    #[tokio::test]
    async fn finalize_empty_verification_is_failed() {
        let store = InMemoryVersionedStore::new();
        let registry = JobRegistry::new(&store);
        let now = Utc::now();
        registry.register_job("job1", vec![spec("p1", 0, "a")], now).await.unwrap();
        for status in [JobStatus::Submitting, JobStatus::Scheduled, JobStatus::Running, JobStatus::Validating] {
            registry.update_status("job1", status, StatusUpdate::now(now)).await.unwrap();
        }
        let probe = SelectivePresent(BTreeSet::new());
        let result = registry.validate_outputs("job1", &probe, now).await.unwrap();
        registry.finalize_with_validation("job1", &result, now).await.unwrap();
        assert_eq!(registry.get("job1").await.unwrap().status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn list_and_get_active_jobs() {
        let store = InMemoryVersionedStore::new();
        let registry = JobRegistry::new(&store);
        let now = Utc::now();
        registry.register_job("job1", vec![], now).await.unwrap();
        registry.register_job("job2", vec![], now).await.unwrap();
        registry.update_status("job2", JobStatus::Cancelled, StatusUpdate::now(now)).await.unwrap();

        let mut jobs = registry.list_jobs().await.unwrap();
        jobs.sort();
        assert_eq!(jobs, vec!["job1".to_string(), "job2".to_string()]);

        let active = registry.get_active_jobs().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].job_id, "job1");
    }

    #[test]
    fn always_present_probe_is_trivially_complete() {
        let specs = vec![spec("p1", 0, "a")];
        let result = crate::validate::validate_outputs(&specs, &AlwaysPresent);
        assert_eq!(result.status, crate::validate::ValidationStatus::Complete);
    }
}
