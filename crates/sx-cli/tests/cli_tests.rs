// SPDX-License-Identifier: MIT OR Apache-2.0
//! Integration tests for the `sx` CLI binary. The `run`/`aggregate`
//! subcommands spawn a real Python subprocess via `sx-host`, so they are
//! skipped when `python3` is not on `PATH`.

use assert_cmd::Command;
use predicates::str::contains;
use std::path::Path;

fn sx() -> Command {
    #[allow(deprecated)]
    Command::cargo_bin("sx").expect("binary `sx` should be built")
}

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

// ── Help & version ──────────────────────────────────────────────────

#[test]
fn help_flag_prints_usage() {
    sx().arg("--help")
        .assert()
        .success()
        .stdout(contains("Simulation execution engine developer CLI"))
        .stdout(contains("run"))
        .stdout(contains("aggregate"))
        .stdout(contains("pool-stats"));
}

#[test]
fn version_flag_prints_version() {
    sx().arg("--version")
        .assert()
        .success()
        .stdout(contains(env!("CARGO_PKG_VERSION")));
}

// ── schema ──────────────────────────────────────────────────────────

#[test]
fn schema_sim_task_prints_json_schema() {
    let output = sx().args(["schema", "sim-task"]).output().unwrap();
    assert!(output.status.success());
    let v: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(v.get("properties").is_some() || v.get("$defs").is_some());
}

#[test]
fn schema_job_state_prints_json_schema() {
    let output = sx().args(["schema", "job-state"]).output().unwrap();
    assert!(output.status.success());
    let _: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
}

// ── run ─────────────────────────────────────────────────────────────

#[test]
fn run_rejects_malformed_param_flag() {
    sx().args(["run", "--entrypoint", "demo", "--param", "noequals"])
        .assert()
        .failure();
}

#[test]
fn run_against_a_real_bundle_writes_a_sim_return() {
    if !python3_available() {
        eprintln!("SKIP: python3 not found");
        return;
    }

    let bundle_root = tempfile::tempdir().unwrap();
    write_wire(
        bundle_root.path(),
        "def wire(entrypoint, params, seed):\n    return {\"result\": b\"ok\"}\n",
    );

    let cache_dir = tempfile::tempdir().unwrap();
    let prov_dir = tempfile::tempdir().unwrap();
    let venvs_dir = tempfile::tempdir().unwrap();
    let out_path = bundle_root.path().join("sim_return.json");

    sx().current_dir(bundle_root.path())
        .env("BUNDLES_DIR", bundle_root.path())
        .env("BUNDLES_CACHE_DIR", cache_dir.path())
        .env("PROV_ROOT", prov_dir.path())
        .env("VENVS_DIR", venvs_dir.path())
        .args([
            "run",
            "--bundle",
            "local://dev",
            "--entrypoint",
            "demo",
            "--param",
            "x=1",
            "--seed",
            "1",
            "--output",
            "result",
            "--out",
        ])
        .arg(&out_path)
        .assert()
        .success();

    let body = std::fs::read_to_string(&out_path).unwrap();
    let ret: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert!(ret.get("error").is_none());
    assert!(ret["outputs"]["result"].is_object());
}

// ── pool-stats ──────────────────────────────────────────────────────

#[test]
fn pool_stats_reports_use_count_matching_calls() {
    if !python3_available() {
        eprintln!("SKIP: python3 not found");
        return;
    }

    let bundle_root = tempfile::tempdir().unwrap();
    write_wire(
        bundle_root.path(),
        "def wire(entrypoint, params, seed):\n    return {\"result\": b\"ok\"}\n",
    );

    let cache_dir = tempfile::tempdir().unwrap();
    let prov_dir = tempfile::tempdir().unwrap();
    let venvs_dir = tempfile::tempdir().unwrap();

    let output = sx()
        .current_dir(bundle_root.path())
        .env("BUNDLES_DIR", bundle_root.path())
        .env("BUNDLES_CACHE_DIR", cache_dir.path())
        .env("PROV_ROOT", prov_dir.path())
        .env("VENVS_DIR", venvs_dir.path())
        .args(["pool-stats", "--bundle", "local://dev", "--entrypoint", "demo", "--calls", "3"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let stats: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(stats[0]["use_count"], serde_json::json!(3));
}
