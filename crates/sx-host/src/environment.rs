// SPDX-License-Identifier: MIT OR Apache-2.0
//! Warm and cold execution environments (spec.md §4.8): each composes a
//! bundle repository, a provenance store, and a process pool into the
//! `run`/`run_aggregation` contract, and never propagates an error to the
//! caller — every failure is folded into a well-formed `SimReturn` or
//! `AggregationReturn`.

use crate::error::HostError;
use crate::pool::{PoolConfig, WarmProcessPool};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use std::collections::BTreeMap;
use std::time::Duration;
use sx_bundle::BundleRepository;
use sx_core::{AggregationReturn, AggregationTask, ErrorInfo, SimReturn, SimTask, TableArtifact};
use sx_provenance::ProvenanceStore;
use tracing::{info, warn};

/// Decode an `execute`/`aggregate` RPC result into either a success payload
/// or the `(error_type, message, raw_details)` triple the wire format
/// carries on failure.
enum WireOutcome<T> {
    Success(T),
    Failure { error_type: String, message: String, details: Vec<u8> },
}

fn decode_error_payload(error_b64: &str) -> Result<(String, String, Vec<u8>), HostError> {
    let raw = BASE64.decode(error_b64).map_err(|e| HostError::Serialisation(e.to_string()))?;
    let payload: serde_json::Value =
        serde_json::from_slice(&raw).map_err(|e| HostError::Serialisation(e.to_string()))?;
    let error_type = payload.get("type").and_then(|v| v.as_str()).unwrap_or("Error").to_string();
    let message = payload.get("error").and_then(|v| v.as_str()).unwrap_or("").to_string();
    Ok((error_type, message, raw))
}

fn decode_execute_outcome(value: serde_json::Value) -> Result<WireOutcome<BTreeMap<String, TableArtifact>>, HostError> {
    let obj = value
        .as_object()
        .ok_or_else(|| HostError::Serialisation("execute result was not a JSON object".to_string()))?;

    if let Some(error_b64) = obj.get("error").and_then(|v| v.as_str()) {
        let (error_type, message, details) = decode_error_payload(error_b64)?;
        return Ok(WireOutcome::Failure { error_type, message, details });
    }

    let mut outputs = BTreeMap::new();
    for (name, v) in obj {
        let b64 = v
            .as_str()
            .ok_or_else(|| HostError::Serialisation(format!("output {name:?} was not a base64 string")))?;
        let bytes = BASE64.decode(b64).map_err(|e| HostError::Serialisation(e.to_string()))?;
        outputs.insert(name.clone(), TableArtifact::inline(bytes));
    }
    Ok(WireOutcome::Success(outputs))
}

struct AggSuccess {
    loss: f64,
    diagnostics: BTreeMap<String, serde_json::Value>,
    outputs: BTreeMap<String, serde_json::Value>,
}

fn decode_aggregate_outcome(value: serde_json::Value) -> Result<WireOutcome<AggSuccess>, HostError> {
    let obj = value
        .as_object()
        .ok_or_else(|| HostError::Serialisation("aggregate result was not a JSON object".to_string()))?;

    if let Some(error_b64) = obj.get("error").and_then(|v| v.as_str()) {
        let (error_type, message, details) = decode_error_payload(error_b64)?;
        return Ok(WireOutcome::Failure { error_type, message, details });
    }

    let loss = obj
        .get("loss")
        .and_then(|v| v.as_f64())
        .ok_or_else(|| HostError::Serialisation("aggregate result missing numeric loss".to_string()))?;
    let diagnostics = obj
        .get("diagnostics")
        .and_then(|v| v.as_object())
        .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default();
    let outputs = obj
        .get("outputs")
        .and_then(|v| v.as_object())
        .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default();
    Ok(WireOutcome::Success(AggSuccess { loss, diagnostics, outputs }))
}

/// Re-encode a previously-computed `SimReturn`'s inline artifacts as the
/// base64 strings the subprocess runner's `aggregate` method expects.
///
/// Aggregation only operates on sim returns whose outputs are still
/// inline; one demoted to a `cas://` reference (because it exceeded
/// `inline_artifact_max_bytes` on an earlier read) cannot be re-hydrated
/// through this path.
fn encode_sim_return_for_wire(ret: &SimReturn) -> Result<serde_json::Value, HostError> {
    let mut outputs = serde_json::Map::new();
    for (name, artifact) in &ret.outputs {
        let Some(bytes) = &artifact.inline else {
            return Err(HostError::Serialisation(format!(
                "cannot aggregate CAS-indirected output {name:?} of task {}",
                ret.task_id
            )));
        };
        outputs.insert(name.clone(), serde_json::json!({"inline": BASE64.encode(bytes)}));
    }
    Ok(serde_json::json!({"outputs": outputs}))
}

/// Given an error classified from the wire, construct the `(ErrorInfo,
/// TableArtifact)` pair a failed `SimReturn`/`AggregationReturn` carries.
fn error_parts(error_type: String, message: String, details: Vec<u8>) -> (ErrorInfo, TableArtifact) {
    (
        ErrorInfo { error_type, message, retryable: false },
        TableArtifact::inline(details),
    )
}

/// Demote any output over `inline_max` bytes to a `cas://` reference
/// before handing a result back to the caller — the bytes themselves were
/// already persisted to the provenance store by the time this runs.
fn demote_large_outputs(outputs: BTreeMap<String, TableArtifact>, inline_max: usize) -> BTreeMap<String, TableArtifact> {
    outputs
        .into_iter()
        .map(|(name, artifact)| {
            if artifact.size > inline_max {
                let demoted = TableArtifact::cas_ref(artifact.checksum.clone(), artifact.size)
                    .unwrap_or(artifact);
                (name, demoted)
            } else {
                (name, artifact)
            }
        })
        .collect()
}

/// The warm flavour (spec.md §4.8): Bundle Repository + Provenance Store +
/// Warm Process Pool, composed so that repeated tasks against the same
/// bundle reuse a live subprocess.
pub struct WarmExecutionEnvironment<R: BundleRepository> {
    repository: R,
    provenance: ProvenanceStore,
    pool: WarmProcessPool,
    inline_max: usize,
}

impl<R: BundleRepository> WarmExecutionEnvironment<R> {
    /// Compose the three pieces into one environment.
    pub fn new(repository: R, provenance: ProvenanceStore, pool_config: PoolConfig, inline_max: usize) -> Self {
        Self { repository, provenance, pool: WarmProcessPool::new(pool_config), inline_max }
    }

    /// Run one task: consult the cache, materialise the bundle, dispatch
    /// through the pool, persist, and return. Never returns an `Err` —
    /// every failure mode becomes a `SimReturn` with `error` set.
    pub async fn run(&self, task: &SimTask) -> SimReturn {
        let task_id = task.task_id();

        let (digest, bundle_path) = match self.repository.ensure_local(&task.bundle_ref).await {
            Ok(pair) => pair,
            Err(e) => return failed_sim_return(task_id, HostError::from(e)),
        };

        match self.provenance.get_sim(&digest, task) {
            Ok(Some(cached)) => {
                info!(target: "sx.host.env", task_id = %task_id, "provenance cache hit");
                return cached;
            }
            Ok(None) => {}
            Err(e) => warn!(target: "sx.host.env", task_id = %task_id, error = %e, "provenance read failed, recomputing"),
        }

        let params = serde_json::json!({
            "entrypoint": task.entrypoint,
            "params": task.params.params(),
            "seed": task.seed,
            "bundle_digest": digest.as_str(),
        });

        let raw = match self.pool.call(&digest, &bundle_path, "execute", params).await {
            Ok(raw) => raw,
            Err(e) => return failed_sim_return(task_id, e),
        };

        let full_return = match decode_execute_outcome(raw) {
            Ok(WireOutcome::Success(outputs)) => SimReturn::success(task_id.clone(), outputs),
            Ok(WireOutcome::Failure { error_type, message, details }) => {
                let (error, details) = error_parts(error_type, message, details);
                SimReturn::failure(task_id.clone(), error, details)
            }
            Err(e) => return failed_sim_return(task_id, e),
        };

        if let Err(e) = self.provenance.put_sim(&digest, task, task.bundle_ref.as_str(), &task.entrypoint, &full_return) {
            warn!(target: "sx.host.env", task_id = %task_id, error = %e, "failed to persist provenance record");
        }

        if full_return.is_failure() {
            return full_return;
        }
        SimReturn::success(full_return.task_id, demote_large_outputs(full_return.outputs, self.inline_max))
    }

    /// Run one aggregation, with the same cache-then-dispatch-then-persist
    /// shape as [`Self::run`].
    pub async fn run_aggregation(&self, task: &AggregationTask) -> AggregationReturn {
        let aggregation_id = task.aggregation_id();

        let (digest, bundle_path) = match self.repository.ensure_local(&task.bundle_ref).await {
            Ok(pair) => pair,
            Err(e) => return failed_aggregation_return(aggregation_id, task.n_replicates(), HostError::from(e)),
        };

        if let Ok(Some(cached)) = self.provenance.get_agg(&digest, task) {
            return cached;
        }

        let mut sim_returns = Vec::with_capacity(task.sim_returns.len());
        for ret in &task.sim_returns {
            match encode_sim_return_for_wire(ret) {
                Ok(encoded) => sim_returns.push(encoded),
                Err(e) => return failed_aggregation_return(aggregation_id, task.n_replicates(), e),
            }
        }

        let params = serde_json::json!({
            "target_entrypoint": task.target_entrypoint,
            "sim_returns": sim_returns,
            "target_data": task.target_data,
            "bundle_digest": digest.as_str(),
        });

        let raw = match self.pool.call(&digest, &bundle_path, "aggregate", params).await {
            Ok(raw) => raw,
            Err(e) => return failed_aggregation_return(aggregation_id, task.n_replicates(), e),
        };

        let result = match decode_aggregate_outcome(raw) {
            Ok(WireOutcome::Success(success)) => AggregationReturn {
                aggregation_id: aggregation_id.clone(),
                loss: success.loss,
                diagnostics: success.diagnostics,
                outputs: success.outputs,
                n_replicates: task.n_replicates(),
            },
            Ok(WireOutcome::Failure { message, .. }) => {
                return failed_aggregation_return(
                    aggregation_id,
                    task.n_replicates(),
                    HostError::User { error_type: "AggregationError".to_string(), message },
                )
            }
            Err(e) => return failed_aggregation_return(aggregation_id, task.n_replicates(), e),
        };

        if let Err(e) = self.provenance.put_agg(&digest, task, task.bundle_ref.as_str(), &result) {
            warn!(target: "sx.host.env", aggregation_id = %aggregation_id, error = %e, "failed to persist aggregation record");
        }

        result
    }

    /// Gracefully shut down every warm process this environment holds.
    pub async fn shutdown(&self) {
        self.pool.shutdown_all().await;
    }
}

fn failed_sim_return(task_id: String, err: HostError) -> SimReturn {
    let (error_type, message, retryable) = err.classify();
    SimReturn::failure(
        task_id,
        ErrorInfo { error_type, message: message.clone(), retryable },
        TableArtifact::inline(message.into_bytes()),
    )
}

fn failed_aggregation_return(aggregation_id: String, n_replicates: usize, err: HostError) -> AggregationReturn {
    let (error_type, message, _) = err.classify();
    AggregationReturn {
        aggregation_id,
        loss: f64::NAN,
        diagnostics: BTreeMap::from([
            ("error_type".to_string(), serde_json::Value::String(error_type)),
            ("error".to_string(), serde_json::Value::String(message)),
        ]),
        outputs: BTreeMap::new(),
        n_replicates,
    }
}

/// The cold flavour (spec.md §4.8): a fresh subprocess per task, no pool
/// reuse, otherwise identical external contract to the warm flavour — used
/// to distinguish "this bundle/task is broken" from "this warm process
/// accumulated bad state".
pub struct ColdExecutionEnvironment<R: BundleRepository + Clone> {
    repository: R,
    provenance: ProvenanceStore,
    venvs_dir: std::path::PathBuf,
    call_timeout: Duration,
    inline_max: usize,
}

impl<R: BundleRepository + Clone> ColdExecutionEnvironment<R> {
    /// Compose a cold environment. `venvs_dir` and `call_timeout` mirror
    /// the warm pool's configuration but back a one-shot pool created
    /// fresh for every call.
    pub fn new(repository: R, provenance: ProvenanceStore, venvs_dir: std::path::PathBuf, call_timeout: Duration, inline_max: usize) -> Self {
        Self { repository, provenance, venvs_dir, call_timeout, inline_max }
    }

    fn fresh_pool(&self) -> WarmProcessPool {
        WarmProcessPool::new(PoolConfig {
            max_processes: 1,
            venvs_dir: self.venvs_dir.clone(),
            force_fresh_venv: false,
            call_timeout: self.call_timeout,
            shutdown_grace: Duration::from_secs(5),
        })
    }

    /// Run one task in a dedicated, single-use subprocess.
    pub async fn run(&self, task: &SimTask) -> SimReturn {
        let warm = WarmExecutionEnvironment {
            repository: self.repository.clone(),
            provenance: self.provenance.clone(),
            pool: self.fresh_pool(),
            inline_max: self.inline_max,
        };
        let result = warm.run(task).await;
        warm.shutdown().await;
        result
    }

    /// Run one aggregation in a dedicated, single-use subprocess.
    pub async fn run_aggregation(&self, task: &AggregationTask) -> AggregationReturn {
        let warm = WarmExecutionEnvironment {
            repository: self.repository.clone(),
            provenance: self.provenance.clone(),
            pool: self.fresh_pool(),
            inline_max: self.inline_max,
        };
        let result = warm.run_aggregation(task).await;
        warm.shutdown().await;
        result
    }
}
