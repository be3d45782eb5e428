// SPDX-License-Identifier: MIT OR Apache-2.0
//! Filesystem-backed provenance store (spec.md §4.2): one directory per
//! simulation or aggregation result, keyed by the active [`PathSchema`].

use crate::error::ProvenanceError;
use crate::schema::PathSchema;
use serde::de::Error as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use sx_core::{AggregationReturn, AggregationTask, BundleDigest, ErrorInfo, SimReturn, SimTask, TableArtifact};
use tracing::debug;

const ERROR_DETAILS_NAME: &str = "error_details";

#[derive(Debug, Serialize, Deserialize)]
struct StoredArtifactRef {
    checksum: String,
    size: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredSimResult {
    task_id: String,
    outputs: BTreeMap<String, StoredArtifactRef>,
    error: Option<ErrorInfo>,
    error_details: Option<StoredArtifactRef>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SimMetadata {
    bundle_ref: String,
    entrypoint: String,
    param_values: BTreeMap<String, Value>,
    seed: i64,
    task_id: String,
}

/// Per-`param_id` tracking of which seeds have been computed, written
/// alongside (one directory up from) each seed's own `metadata.json`.
/// Supplemented from the original `SimulationCache`'s metadata tracking
/// (`modelops/services/cache.py`); consumed by the Parquet-view indexer
/// (spec.md §6.4) to know how many replicates exist without listing a
/// param_id's seed subtrees.
#[derive(Debug, Serialize, Deserialize)]
struct ParamMetadata {
    param_id: String,
    param_values: BTreeMap<String, Value>,
    sim_root: String,
    #[serde(default)]
    seeds_computed: Vec<i64>,
    first_seen: chrono::DateTime<chrono::Utc>,
    last_updated: chrono::DateTime<chrono::Utc>,
    total_seeds: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredAggResult {
    aggregation_id: String,
    loss: f64,
    diagnostics: BTreeMap<String, Value>,
    outputs: BTreeMap<String, Value>,
    n_replicates: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct AggMetadata {
    bundle_ref: String,
    target_entrypoint: String,
    task_ids: Vec<String>,
    aggregation_id: String,
}

/// A schema-keyed, filesystem-backed provenance store.
#[derive(Clone)]
pub struct ProvenanceStore {
    root: PathBuf,
    schema: PathSchema,
    /// Artifacts at or under this size (bytes) are rehydrated inline on
    /// read; larger ones are left as `cas://` references.
    inline_max: usize,
}

impl ProvenanceStore {
    /// Open a store rooted at `root` using `schema` to derive paths.
    /// Creates `root` if it does not already exist.
    pub fn new(root: impl Into<PathBuf>, schema: PathSchema, inline_max: usize) -> std::io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root, schema, inline_max })
    }

    fn sim_dir(&self, bundle_digest: &BundleDigest, task: &SimTask) -> Result<PathBuf, ProvenanceError> {
        let vars = HashMap::from([
            ("bundle".to_string(), bundle_digest.as_str().to_string()),
            ("param_id".to_string(), task.params.param_id().to_string()),
            ("seed".to_string(), task.seed.to_string()),
        ]);
        Ok(self.root.join(self.schema.sim_template.render(&vars)?))
    }

    fn agg_dir(&self, bundle_digest: &BundleDigest, task: &AggregationTask) -> Result<PathBuf, ProvenanceError> {
        let vars = HashMap::from([
            ("bundle".to_string(), bundle_digest.as_str().to_string()),
            ("target".to_string(), task.target_entrypoint.replace(':', "__")),
            ("agg_id".to_string(), task.aggregation_id()),
        ]);
        Ok(self.root.join(self.schema.agg_template.render(&vars)?))
    }

    /// Tolerant JSON read: `None` on a missing file or malformed content,
    /// never an error (spec.md §4.2).
    pub fn try_read_json(path: &Path) -> Option<Value> {
        let bytes = std::fs::read(path).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    /// Atomically replace `dst` with `src` (same-filesystem rename).
    pub fn atomic_rename(src: &Path, dst: &Path) -> std::io::Result<()> {
        std::fs::rename(src, dst)
    }

    /// Look up a cached simulation result. `None` on a cache miss
    /// (neither JSON file present, or the directory was never committed).
    pub fn get_sim(&self, bundle_digest: &BundleDigest, task: &SimTask) -> Result<Option<SimReturn>, ProvenanceError> {
        let dir = self.sim_dir(bundle_digest, task)?;
        let Some(metadata) = Self::try_read_json(&dir.join("metadata.json")) else {
            return Ok(None);
        };
        let Some(result) = Self::try_read_json(&dir.join("result.json")) else {
            return Ok(None);
        };
        let _: SimMetadata = serde_json::from_value(metadata).map_err(|source| ProvenanceError::Malformed {
            path: dir.join("metadata.json").display().to_string(),
            source,
        })?;
        let stored: StoredSimResult = serde_json::from_value(result).map_err(|source| ProvenanceError::Malformed {
            path: dir.join("result.json").display().to_string(),
            source,
        })?;

        let mut outputs = BTreeMap::new();
        for (name, stored_ref) in &stored.outputs {
            outputs.insert(name.clone(), self.rehydrate(&dir, name, stored_ref)?);
        }
        let error_details = stored
            .error_details
            .as_ref()
            .map(|r| self.rehydrate(&dir, ERROR_DETAILS_NAME, r))
            .transpose()?;

        debug!(target: "sx.provenance", task_id = %stored.task_id, "provenance cache hit");

        Ok(Some(if let Some(error) = stored.error {
            let error_details = error_details.ok_or_else(|| ProvenanceError::Malformed {
                path: dir.join("result.json").display().to_string(),
                source: serde::de::Error::custom("error set without error_details"),
            })?;
            SimReturn::failure(stored.task_id, error, error_details)
        } else {
            SimReturn::success(stored.task_id, outputs)
        }))
    }

    fn rehydrate(&self, dir: &Path, name: &str, stored_ref: &StoredArtifactRef) -> Result<TableArtifact, ProvenanceError> {
        let artifact_path = dir.join(format!("artifact_{name}.arrow"));
        if stored_ref.size <= self.inline_max {
            if let Ok(bytes) = std::fs::read(&artifact_path) {
                return Ok(TableArtifact::inline(bytes));
            }
        }
        Ok(TableArtifact::cas_ref(stored_ref.checksum.clone(), stored_ref.size)?)
    }

    /// Persist a simulation result: artifacts, then `result.json`, then
    /// `metadata.json` — the ordering that defines "committed" (spec.md
    /// §4.2): a reader that sees both JSON files trusts the artifacts are
    /// already in place.
    pub fn put_sim(
        &self,
        bundle_digest: &BundleDigest,
        task: &SimTask,
        bundle_ref: &str,
        entrypoint: &str,
        ret: &SimReturn,
    ) -> Result<(), ProvenanceError> {
        let dir = self.sim_dir(bundle_digest, task)?;
        std::fs::create_dir_all(&dir)?;

        let mut stored_outputs = BTreeMap::new();
        for (name, artifact) in &ret.outputs {
            self.write_artifact(&dir, name, artifact)?;
            stored_outputs.insert(
                name.clone(),
                StoredArtifactRef {
                    checksum: artifact.checksum.clone(),
                    size: artifact.size,
                },
            );
        }
        let error_details = ret
            .error_details
            .as_ref()
            .map(|artifact| -> Result<StoredArtifactRef, ProvenanceError> {
                self.write_artifact(&dir, ERROR_DETAILS_NAME, artifact)?;
                Ok(StoredArtifactRef {
                    checksum: artifact.checksum.clone(),
                    size: artifact.size,
                })
            })
            .transpose()?;

        let stored = StoredSimResult {
            task_id: task.task_id(),
            outputs: stored_outputs,
            error: ret.error.clone(),
            error_details,
        };
        write_json(&dir.join("result.json"), &stored)?;

        let metadata = SimMetadata {
            bundle_ref: bundle_ref.to_string(),
            entrypoint: entrypoint.to_string(),
            param_values: task.params.params().clone(),
            seed: task.seed,
            task_id: task.task_id(),
        };
        write_json(&dir.join("metadata.json"), &metadata)?;

        if let Some(param_dir) = dir.parent() {
            self.update_param_metadata(param_dir, task)?;
        }

        Ok(())
    }

    /// Merge `task.seed` into the param-level `seeds_computed` tracking
    /// file, one directory up from the seed-specific `metadata.json`.
    fn update_param_metadata(&self, param_dir: &Path, task: &SimTask) -> Result<(), ProvenanceError> {
        let path = param_dir.join("metadata.json");
        let now = chrono::Utc::now();
        let mut metadata = match Self::try_read_json(&path).and_then(|v| serde_json::from_value::<ParamMetadata>(v).ok()) {
            Some(existing) => existing,
            None => ParamMetadata {
                param_id: task.params.param_id().to_string(),
                param_values: task.params.params().clone(),
                sim_root: task.sim_root(),
                seeds_computed: Vec::new(),
                first_seen: now,
                last_updated: now,
                total_seeds: 0,
            },
        };
        if !metadata.seeds_computed.contains(&task.seed) {
            metadata.seeds_computed.push(task.seed);
            metadata.seeds_computed.sort_unstable();
        }
        metadata.total_seeds = metadata.seeds_computed.len();
        metadata.last_updated = now;
        write_json(&path, &metadata)
    }

    fn write_artifact(&self, dir: &Path, name: &str, artifact: &TableArtifact) -> Result<(), ProvenanceError> {
        if let Some(bytes) = &artifact.inline {
            std::fs::write(dir.join(format!("artifact_{name}.arrow")), bytes)?;
        }
        Ok(())
    }

    /// Look up a cached aggregation result.
    pub fn get_agg(&self, bundle_digest: &BundleDigest, task: &AggregationTask) -> Result<Option<AggregationReturn>, ProvenanceError> {
        let dir = self.agg_dir(bundle_digest, task)?;
        let Some(_metadata) = Self::try_read_json(&dir.join("metadata.json")) else {
            return Ok(None);
        };
        let Some(result) = Self::try_read_json(&dir.join("result.json")) else {
            return Ok(None);
        };
        let stored: StoredAggResult = serde_json::from_value(result).map_err(|source| ProvenanceError::Malformed {
            path: dir.join("result.json").display().to_string(),
            source,
        })?;
        Ok(Some(AggregationReturn {
            aggregation_id: stored.aggregation_id,
            loss: stored.loss,
            diagnostics: stored.diagnostics,
            outputs: stored.outputs,
            n_replicates: stored.n_replicates,
        }))
    }

    /// Persist an aggregation result: `result.json` then `metadata.json`.
    pub fn put_agg(
        &self,
        bundle_digest: &BundleDigest,
        task: &AggregationTask,
        bundle_ref: &str,
        ret: &AggregationReturn,
    ) -> Result<(), ProvenanceError> {
        let dir = self.agg_dir(bundle_digest, task)?;
        std::fs::create_dir_all(&dir)?;

        let stored = StoredAggResult {
            aggregation_id: ret.aggregation_id.clone(),
            loss: ret.loss,
            diagnostics: ret.diagnostics.clone(),
            outputs: ret.outputs.clone(),
            n_replicates: ret.n_replicates,
        };
        write_json(&dir.join("result.json"), &stored)?;

        let metadata = AggMetadata {
            bundle_ref: bundle_ref.to_string(),
            target_entrypoint: task.target_entrypoint.clone(),
            task_ids: task.sim_returns.iter().map(|r| r.task_id.clone()).collect(),
            aggregation_id: task.aggregation_id(),
        };
        write_json(&dir.join("metadata.json"), &metadata)?;

        Ok(())
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ProvenanceError> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|source| ProvenanceError::Malformed {
        path: path.display().to_string(),
        source,
    })?;
    std::fs::write(path, bytes)?;
    Ok(())
}
