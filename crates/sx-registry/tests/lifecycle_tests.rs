// SPDX-License-Identifier: MIT OR Apache-2.0
//! End-to-end job lifecycle tests against the public `sx-registry` API.

use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use sx_core::BundleRef;
use sx_kv::InMemoryVersionedStore;
use sx_registry::{JobRegistry, JobStatus, OutputProbe, OutputSpec, RegistryError, StatusUpdate};

struct SetProbe(BTreeSet<String>);

impl OutputProbe for SetProbe {
    fn is_present(&self, provenance_path: &str) -> bool {
        self.0.contains(provenance_path)
    }
}

fn output(param_id: &str, seed: i64, path: &str) -> OutputSpec {
    OutputSpec {
        param_id: param_id.to_string(),
        seed,
        output_type: "sim".to_string(),
        bundle_digest: "a".repeat(64),
        replicate_count: 1,
        provenance_path: path.to_string(),
        param_values: BTreeMap::from([("x".to_string(), serde_json::json!(seed))]),
    }
}

#[tokio::test]
async fn full_run_succeeds_when_every_output_lands() {
    let store = InMemoryVersionedStore::new();
    let registry = JobRegistry::new(&store);
    let now = Utc::now();

    let outputs = vec![output("p1", 0, "sims/p1/0"), output("p1", 1, "sims/p1/1")];
    registry.register_job("job-ok", outputs, now).await.unwrap();

    for status in [
        JobStatus::Submitting,
        JobStatus::Scheduled,
        JobStatus::Running,
    ] {
        registry
            .update_status("job-ok", status, StatusUpdate::now(now))
            .await
            .unwrap();
    }
    registry.update_progress("job-ok", Some(2), None, now).await.unwrap();
    registry
        .update_status("job-ok", JobStatus::Validating, StatusUpdate::now(now))
        .await
        .unwrap();

    let probe = SetProbe(BTreeSet::from(["sims/p1/0".to_string(), "sims/p1/1".to_string()]));
    let result = registry.validate_outputs("job-ok", &probe, now).await.unwrap();
    let state = registry
        .finalize_with_validation("job-ok", &result, now)
        .await
        .unwrap();

    assert_eq!(state.status, JobStatus::Succeeded);
    assert_eq!(state.tasks_completed, 2);
    assert!(state.missing_outputs.is_empty());
}

#[tokio::test]
async fn partial_run_can_be_resumed_for_the_missing_outputs_only() {
    let store = InMemoryVersionedStore::new();
    let registry = JobRegistry::new(&store);
    let now = Utc::now();

    let outputs = vec![
        output("p1", 0, "sims/p1/0"),
        output("p1", 1, "sims/p1/1"),
        output("p2", 0, "sims/p2/0"),
    ];
    registry.register_job("job-partial", outputs, now).await.unwrap();

    for status in [
        JobStatus::Submitting,
        JobStatus::Scheduled,
        JobStatus::Running,
        JobStatus::Validating,
    ] {
        registry
            .update_status("job-partial", status, StatusUpdate::now(now))
            .await
            .unwrap();
    }

    let probe = SetProbe(BTreeSet::from(["sims/p1/0".to_string()]));
    let result = registry.validate_outputs("job-partial", &probe, now).await.unwrap();
    let state = registry
        .finalize_with_validation("job-partial", &result, now)
        .await
        .unwrap();
    assert_eq!(state.status, JobStatus::PartialSuccess);

    let bundle_ref = BundleRef::new("file:///bundles/demo").unwrap();
    let resumable = registry
        .get_resumable_tasks("job-partial", bundle_ref, "models.noop/main")
        .await
        .unwrap();
    assert_eq!(resumable.len(), 2);
}

#[tokio::test]
async fn zero_verified_outputs_finalizes_as_failed() {
    let store = InMemoryVersionedStore::new();
    let registry = JobRegistry::new(&store);
    let now = Utc::now();

    registry
        .register_job("job-dead", vec![output("p1", 0, "sims/p1/0")], now)
        .await
        .unwrap();
    for status in [
        JobStatus::Submitting,
        JobStatus::Scheduled,
        JobStatus::Running,
        JobStatus::Validating,
    ] {
        registry
            .update_status("job-dead", status, StatusUpdate::now(now))
            .await
            .unwrap();
    }

    let probe = SetProbe(BTreeSet::new());
    let result = registry.validate_outputs("job-dead", &probe, now).await.unwrap();
    let state = registry
        .finalize_with_validation("job-dead", &result, now)
        .await
        .unwrap();
    assert_eq!(state.status, JobStatus::Failed);
}

#[tokio::test]
async fn cancellation_is_terminal_and_irreversible() {
    let store = InMemoryVersionedStore::new();
    let registry = JobRegistry::new(&store);
    let now = Utc::now();

    registry.register_job("job-cancel", vec![], now).await.unwrap();
    registry
        .update_status("job-cancel", JobStatus::Cancelled, StatusUpdate::now(now))
        .await
        .unwrap();

    let err = registry
        .update_status("job-cancel", JobStatus::Running, StatusUpdate::now(now))
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::TerminalState { .. }));

    // the self-transition is still a permitted no-op.
    registry
        .update_status("job-cancel", JobStatus::Cancelled, StatusUpdate::now(now))
        .await
        .unwrap();
}

#[tokio::test]
async fn resuming_a_non_partial_job_is_rejected() {
    let store = InMemoryVersionedStore::new();
    let registry = JobRegistry::new(&store);
    let now = Utc::now();
    registry.register_job("job-pending", vec![], now).await.unwrap();

    let bundle_ref = BundleRef::new("file:///bundles/demo").unwrap();
    let err = registry
        .get_resumable_tasks("job-pending", bundle_ref, "models.noop/main")
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::NotResumable { .. }));
}

#[tokio::test]
async fn concurrent_progress_updates_do_not_lose_increments() {
    let store = std::sync::Arc::new(InMemoryVersionedStore::new());
    let now = Utc::now();
    {
        let registry = JobRegistry::new(store.as_ref());
        registry.register_job("job-race", vec![], now).await.unwrap();
    }

    let mut handles = Vec::new();
    for _ in 0..20 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let registry = JobRegistry::new(store.as_ref());
            registry.increment_completed("job-race", Utc::now()).await.unwrap();
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    let registry = JobRegistry::new(store.as_ref());
    assert_eq!(registry.get("job-race").await.unwrap().tasks_completed, 20);
}

#[tokio::test]
async fn get_active_and_recent_jobs_reflect_store_contents() {
    let store = InMemoryVersionedStore::new();
    let registry = JobRegistry::new(&store);
    let now = Utc::now();

    registry.register_job("job-a", vec![], now).await.unwrap();
    registry.register_job("job-b", vec![], now).await.unwrap();
    registry.register_job("job-c", vec![], now).await.unwrap();
    registry
        .update_status("job-b", JobStatus::Submitting, StatusUpdate::now(now))
        .await
        .unwrap();
    registry
        .update_status("job-c", JobStatus::Submitting, StatusUpdate::now(now))
        .await
        .unwrap();
    registry
        .update_status("job-c", JobStatus::Failed, StatusUpdate::now(now))
        .await
        .unwrap();

    let active = registry.get_active_jobs().await.unwrap();
    let mut active_ids: Vec<&str> = active.iter().map(|s| s.job_id.as_str()).collect();
    active_ids.sort_unstable();
    assert_eq!(active_ids, vec!["job-a", "job-b"]);

    let recent = registry.get_recent_jobs(2).await.unwrap();
    assert_eq!(recent.len(), 2);
}
