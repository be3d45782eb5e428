// SPDX-License-Identifier: MIT OR Apache-2.0
//! Library-level command implementations, independent of `clap`, so they
//! can be exercised without spawning the binary.

use anyhow::{bail, Context, Result};
use schemars::schema_for;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use sx_bundle::FileBundleRepository;
use sx_core::{AggregationReturn, AggregationTask, BundleRef, SimReturn, SimTask, UniqueParameterSet};
use sx_host::{ColdExecutionEnvironment, ExecutorKind, HostConfig, PoolConfig, WarmExecutionEnvironment, WarmProcessPool};
use sx_provenance::{PathSchema, ProvenanceStore};
use sx_registry::JobState;

/// Parse a single `name=value` flag into a parameter entry.
///
/// `value` is parsed as JSON first (so `--param seed=3` and
/// `--param flag=true` produce numbers/booleans), falling back to a
/// plain JSON string when it does not parse as JSON on its own.
pub fn parse_param(raw: &str) -> Result<(String, serde_json::Value)> {
    let (name, value) = raw
        .split_once('=')
        .with_context(|| format!("param '{raw}' is not in name=value form"))?;
    if name.is_empty() {
        bail!("param '{raw}' has an empty name");
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((name.to_string(), value))
}

/// Build a [`UniqueParameterSet`] from repeated `name=value` flags.
pub fn build_params(raw: &[String]) -> Result<UniqueParameterSet> {
    let mut map = BTreeMap::new();
    for entry in raw {
        let (name, value) = parse_param(entry)?;
        map.insert(name, value);
    }
    UniqueParameterSet::new(map).context("build parameter set")
}

fn repository(config: &HostConfig) -> Result<FileBundleRepository> {
    FileBundleRepository::new(&config.bundles_dir, &config.bundles_cache_dir)
        .with_context(|| format!("open bundle repository under '{}'", config.bundles_dir.display()))
}

fn provenance(config: &HostConfig) -> Result<ProvenanceStore> {
    ProvenanceStore::new(&config.prov_root, PathSchema::token_v1(), config.inline_artifact_max_bytes)
        .with_context(|| format!("open provenance store under '{}'", config.prov_root.display()))
}

fn pool_config(config: &HostConfig, max_processes: usize) -> PoolConfig {
    PoolConfig {
        max_processes,
        venvs_dir: config.venvs_dir.clone(),
        force_fresh_venv: config.force_fresh_venv,
        call_timeout: config.call_timeout,
        shutdown_grace: config.shutdown_grace,
    }
}

/// Execute a single simulation task against the warm or cold environment
/// selected by `config.executor_type`, and return its `SimReturn` as
/// pretty-printed JSON.
pub async fn run_task(config: &HostConfig, task: &SimTask) -> Result<String> {
    let ret = match config.executor_type {
        ExecutorKind::Warm => {
            let environment = WarmExecutionEnvironment::new(
                repository(config)?,
                provenance(config)?,
                pool_config(config, config.max_warm_processes),
                config.inline_artifact_max_bytes,
            );
            let ret = environment.run(task).await;
            environment.shutdown().await;
            ret
        }
        ExecutorKind::Cold => {
            let environment = ColdExecutionEnvironment::new(
                repository(config)?,
                provenance(config)?,
                config.venvs_dir.clone(),
                config.call_timeout,
                config.inline_artifact_max_bytes,
            );
            environment.run(task).await
        }
    };
    serde_json::to_string_pretty(&ret).context("serialize sim return")
}

/// Build a [`SimTask`] from CLI-shaped inputs.
pub fn build_task(
    bundle_ref: &str,
    entrypoint: &str,
    params: &[String],
    seed: i64,
    outputs: &[String],
) -> Result<SimTask> {
    let bundle_ref = BundleRef::new(bundle_ref).context("parse bundle ref")?;
    let params = build_params(params)?;
    let outputs = if outputs.is_empty() { None } else { Some(outputs.to_vec()) };
    Ok(SimTask::new(bundle_ref, entrypoint, params, seed, outputs))
}

/// Load a `SimReturn` previously written by `sx run --out <file>`.
pub fn load_sim_return(path: &Path) -> Result<SimReturn> {
    let content = std::fs::read_to_string(path).with_context(|| format!("read sim return '{}'", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parse sim return from '{}'", path.display()))
}

/// Aggregate a batch of previously-computed `SimReturn`s against a
/// bundle's target entrypoint.
pub async fn run_aggregation(
    config: &HostConfig,
    bundle_ref: &str,
    target_entrypoint: &str,
    sim_returns: Vec<SimReturn>,
    target_data: Option<serde_json::Value>,
) -> Result<String> {
    let bundle_ref = BundleRef::new(bundle_ref).context("parse bundle ref")?;
    let task = AggregationTask::new(bundle_ref, target_entrypoint, sim_returns, target_data);

    let ret = match config.executor_type {
        ExecutorKind::Warm => {
            let environment = WarmExecutionEnvironment::new(
                repository(config)?,
                provenance(config)?,
                pool_config(config, config.max_warm_processes),
                config.inline_artifact_max_bytes,
            );
            let ret = environment.run_aggregation(&task).await;
            environment.shutdown().await;
            ret
        }
        ExecutorKind::Cold => {
            let environment = ColdExecutionEnvironment::new(
                repository(config)?,
                provenance(config)?,
                config.venvs_dir.clone(),
                config.call_timeout,
                config.inline_artifact_max_bytes,
            );
            environment.run_aggregation(&task).await
        }
    };
    serde_json::to_string_pretty(&ret).context("serialize aggregation return")
}

/// Per-bundle snapshot of the Warm Process Pool after `pool_stats` drives
/// it through a batch of calls.
#[derive(Debug, serde::Serialize)]
pub struct PoolStatsEntry {
    /// Bundle content digest, as a hex string.
    pub bundle_digest: String,
    /// Number of RPC calls served by the process so far.
    pub use_count: u64,
}

/// Drive a [`WarmProcessPool`] through `calls` repeated `execute`
/// invocations against one bundle, then report how many calls the
/// resulting warm process served. Demonstrates process reuse without
/// going through the full provenance-caching `WarmExecutionEnvironment`.
pub async fn pool_stats(config: &HostConfig, task: &SimTask, calls: usize) -> Result<Vec<PoolStatsEntry>> {
    let repo = repository(config)?;
    let (digest, bundle_path) = sx_bundle::BundleRepository::ensure_local(&repo, &task.bundle_ref)
        .await
        .context("resolve bundle")?;

    let pool = WarmProcessPool::new(pool_config(config, config.max_warm_processes));
    for seed in 0..calls.max(1) as i64 {
        let params = serde_json::json!({
            "entrypoint": task.entrypoint,
            "params": serde_json::to_value(&task.params)?,
            "seed": task.seed + seed,
            "bundle_digest": digest.as_str(),
        });
        pool.call(&digest, &bundle_path, "execute", params).await.context("execute call")?;
    }

    let process = pool.get_process(&digest, &bundle_path).await.context("resolve warm process")?;
    let entry = PoolStatsEntry {
        bundle_digest: digest.as_str().to_string(),
        use_count: process.use_count(),
    };
    pool.shutdown_all().await;
    Ok(vec![entry])
}

/// Wait out the shutdown grace period so a caller can observe a clean
/// pool teardown in scripted tests. Not used by the CLI itself.
#[allow(dead_code)]
pub async fn settle(duration: Duration) {
    tokio::time::sleep(duration).await;
}

/// Schema types that can be printed by the `schema` subcommand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    /// JSON schema for [`SimTask`].
    SimTask,
    /// JSON schema for [`SimReturn`].
    SimReturn,
    /// JSON schema for [`AggregationTask`].
    AggregationTask,
    /// JSON schema for [`AggregationReturn`].
    AggregationReturn,
    /// JSON schema for [`JobState`].
    JobState,
}

/// Return the JSON schema string for the given kind.
pub fn schema_json(kind: SchemaKind) -> Result<String> {
    let value = match kind {
        SchemaKind::SimTask => serde_json::to_value(schema_for!(SimTask))?,
        SchemaKind::SimReturn => serde_json::to_value(schema_for!(SimReturn))?,
        SchemaKind::AggregationTask => serde_json::to_value(schema_for!(AggregationTask))?,
        SchemaKind::AggregationReturn => serde_json::to_value(schema_for!(AggregationReturn))?,
        SchemaKind::JobState => serde_json::to_value(schema_for!(JobState))?,
    };
    serde_json::to_string_pretty(&value).context("serialize schema")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_param_reads_json_scalars() {
        assert_eq!(parse_param("seed=3").unwrap().1, serde_json::json!(3));
        assert_eq!(parse_param("flag=true").unwrap().1, serde_json::json!(true));
        assert_eq!(parse_param("name=alice").unwrap().1, serde_json::json!("alice"));
    }

    #[test]
    fn parse_param_rejects_missing_equals() {
        assert!(parse_param("noequals").is_err());
    }

    #[test]
    fn parse_param_rejects_empty_name() {
        assert!(parse_param("=value").is_err());
    }

    #[test]
    fn build_params_collects_multiple_entries() {
        let params = build_params(&["a=1".to_string(), "b=\"two\"".to_string()]).unwrap();
        assert_eq!(params.params().get("a"), Some(&serde_json::json!(1)));
        assert_eq!(params.params().get("b"), Some(&serde_json::json!("two")));
    }

    #[test]
    fn build_task_defaults_outputs_to_none_when_empty() {
        let task = build_task("local://dev", "demo", &[], 7, &[]).unwrap();
        assert!(task.outputs.is_none());
        assert_eq!(task.seed, 7);
    }

    #[test]
    fn build_task_keeps_explicit_outputs() {
        let task = build_task("local://dev", "demo", &[], 0, &["result".to_string()]).unwrap();
        assert_eq!(task.outputs, Some(vec!["result".to_string()]));
    }

    #[test]
    fn load_sim_return_roundtrips() {
        let ret = SimReturn::success("abc".to_string(), BTreeMap::new());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ret.json");
        std::fs::write(&path, serde_json::to_string_pretty(&ret).unwrap()).unwrap();
        let loaded = load_sim_return(&path).unwrap();
        assert_eq!(loaded.task_id, "abc");
    }

    #[test]
    fn load_sim_return_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_sim_return(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn schema_sim_task_is_valid_json() {
        let s = schema_json(SchemaKind::SimTask).unwrap();
        let v: serde_json::Value = serde_json::from_str(&s).unwrap();
        assert!(v.get("properties").is_some() || v.get("$defs").is_some());
    }

    #[test]
    fn schema_job_state_is_valid_json() {
        let s = schema_json(SchemaKind::JobState).unwrap();
        let _: serde_json::Value = serde_json::from_str(&s).unwrap();
    }

    #[test]
    fn schema_aggregation_return_is_valid_json() {
        let s = schema_json(SchemaKind::AggregationReturn).unwrap();
        let _: serde_json::Value = serde_json::from_str(&s).unwrap();
    }
}
