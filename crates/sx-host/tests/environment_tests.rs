// SPDX-License-Identifier: MIT OR Apache-2.0
//! End-to-end tests for [`WarmExecutionEnvironment`] against a real
//! subprocess, skipped if no `python3` is on `PATH`.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use sx_bundle::FileBundleRepository;
use sx_core::{BundleRef, SimTask, UniqueParameterSet};
use sx_host::environment::WarmExecutionEnvironment;
use sx_host::pool::PoolConfig;
use sx_provenance::{PathSchema, ProvenanceStore};

fn python3_available() -> bool {
    std::process::Command::new("python3")
        .arg("--version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .is_ok()
}

fn write_wire(dir: &Path, body: &str) {
    std::fs::write(dir.join("wire.py"), body).unwrap();
}

fn env(bundles_root: &Path, cache_dir: &Path, prov_dir: &Path, venvs_dir: &Path) -> WarmExecutionEnvironment<FileBundleRepository> {
    let repository = FileBundleRepository::new(bundles_root, cache_dir).unwrap();
    let provenance = ProvenanceStore::new(prov_dir, PathSchema::token_v1(), 1024 * 1024).unwrap();
    let pool_config = PoolConfig {
        max_processes: 2,
        venvs_dir: venvs_dir.to_path_buf(),
        force_fresh_venv: false,
        call_timeout: Duration::from_secs(60),
        shutdown_grace: Duration::from_secs(2),
    };
    WarmExecutionEnvironment::new(repository, provenance, pool_config, 1024 * 1024)
}

fn task(bundle_ref: &str, seed: i64) -> SimTask {
    let params = UniqueParameterSet::new(BTreeMap::from([("x".to_string(), serde_json::json!(1))])).unwrap();
    SimTask::new(BundleRef::new(bundle_ref).unwrap(), "demo", params, seed, Some(vec!["result".to_string()]))
}

#[tokio::test]
async fn successful_execution_is_cached_on_the_second_run() {
    if !python3_available() {
        eprintln!("SKIP: python3 not found");
        return;
    }

    let bundles_root = tempfile::tempdir().unwrap();
    let bundle_dir = bundles_root.path().join("demo_bundle");
    std::fs::create_dir_all(&bundle_dir).unwrap();
    write_wire(
        &bundle_dir,
        "def wire(entrypoint, params, seed):\n    return {\"result\": b\"ok\"}\n",
    );

    let cache_dir = tempfile::tempdir().unwrap();
    let prov_dir = tempfile::tempdir().unwrap();
    let venvs_dir = tempfile::tempdir().unwrap();

    let environment = env(bundles_root.path(), cache_dir.path(), prov_dir.path(), venvs_dir.path());
    let t = task("demo_bundle", 1);

    let first = environment.run(&t).await;
    assert!(!first.is_failure(), "expected success, got {:?}", first.error);
    assert_eq!(first.outputs["result"].inline.as_deref(), Some(b"ok".as_slice()));

    environment.shutdown().await;

    // A fresh environment pointed at the same provenance root should hit
    // the cache without spawning a subprocess.
    let cached_env = env(bundles_root.path(), cache_dir.path(), prov_dir.path(), venvs_dir.path());
    let second = cached_env.run(&t).await;
    assert_eq!(second.task_id, first.task_id);
    assert_eq!(second.outputs["result"].inline, first.outputs["result"].inline);
}

#[tokio::test]
async fn wire_exceptions_become_classified_failures() {
    if !python3_available() {
        eprintln!("SKIP: python3 not found");
        return;
    }

    let bundles_root = tempfile::tempdir().unwrap();
    let bundle_dir = bundles_root.path().join("broken_bundle");
    std::fs::create_dir_all(&bundle_dir).unwrap();
    write_wire(
        &bundle_dir,
        "def wire(entrypoint, params, seed):\n    raise ValueError('boom')\n",
    );

    let cache_dir = tempfile::tempdir().unwrap();
    let prov_dir = tempfile::tempdir().unwrap();
    let venvs_dir = tempfile::tempdir().unwrap();

    let environment = env(bundles_root.path(), cache_dir.path(), prov_dir.path(), venvs_dir.path());
    let t = task("broken_bundle", 1);

    let result = environment.run(&t).await;
    assert!(result.is_failure());
    let error = result.error.unwrap();
    assert_eq!(error.error_type, "ValueError");
    assert!(error.message.contains("boom"));
    assert!(!error.retryable);

    environment.shutdown().await;
}
