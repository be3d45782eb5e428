// SPDX-License-Identifier: MIT OR Apache-2.0
//! Environment-variable-driven host configuration (spec.md §6.6).

use std::path::PathBuf;
use std::time::Duration;

/// Which execution environment flavour a host should run (spec.md §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorKind {
    /// Reuse subprocesses across tasks via the Warm Process Pool.
    Warm,
    /// Spawn a fresh subprocess per task; used to diagnose whether a
    /// failure is specific to a warm subprocess's accumulated state.
    Cold,
}

/// Host-wide configuration, resolved once from the process environment.
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Where bundles are resolved from when a ref is relative
    /// (`BUNDLE_SOURCE`). Defaults to the current directory.
    pub bundle_source: PathBuf,
    /// Root directory bundles are materialised under (`BUNDLES_DIR`).
    pub bundles_dir: PathBuf,
    /// Cache directory for materialised bundle copies
    /// (`BUNDLES_CACHE_DIR`).
    pub bundles_cache_dir: PathBuf,
    /// Warm or cold execution (`EXECUTOR_TYPE`, default `warm`).
    pub executor_type: ExecutorKind,
    /// Root directory venvs are created under, one per bundle digest
    /// (`VENVS_DIR`).
    pub venvs_dir: PathBuf,
    /// Maximum number of warm subprocesses kept alive at once
    /// (`MAX_WARM_PROCESSES`, default 4).
    pub max_warm_processes: usize,
    /// Artifacts at or under this size are rehydrated inline rather than
    /// left as `cas://` references (`INLINE_ARTIFACT_MAX_BYTES`, default
    /// 1 MiB).
    pub inline_artifact_max_bytes: usize,
    /// Force venv recreation even if the deps-fingerprint sentinel matches
    /// (`FORCE_FRESH_VENV`, default `false`).
    pub force_fresh_venv: bool,
    /// Root directory for the provenance store (`PROV_ROOT`).
    pub prov_root: PathBuf,
    /// Token used for `pip`/`uv` installs of private git dependencies
    /// (`GITHUB_TOKEN`), if set.
    pub github_token: Option<String>,
    /// How long to wait for a single `execute`/`aggregate` RPC call before
    /// treating the process as poisoned. Not independently configurable
    /// from the environment in spec.md §6.6; fixed here at a generous
    /// default since most simulations run in seconds, not minutes.
    pub call_timeout: Duration,
    /// How long to wait for a graceful `shutdown` before killing an
    /// evicted warm process (spec.md §4.7).
    pub shutdown_grace: Duration,
}

impl HostConfig {
    /// Resolve configuration from the process environment, applying the
    /// defaults spec.md §6.6 specifies for anything unset.
    pub fn from_env() -> Self {
        Self {
            bundle_source: env_path("BUNDLE_SOURCE", "."),
            bundles_dir: env_path("BUNDLES_DIR", "bundles"),
            bundles_cache_dir: env_path("BUNDLES_CACHE_DIR", ".bundles_cache"),
            executor_type: env_executor_type(),
            venvs_dir: env_path("VENVS_DIR", ".venvs"),
            max_warm_processes: env_usize("MAX_WARM_PROCESSES", 4),
            inline_artifact_max_bytes: env_usize("INLINE_ARTIFACT_MAX_BYTES", 1024 * 1024),
            force_fresh_venv: env_bool("FORCE_FRESH_VENV", false),
            prov_root: env_path("PROV_ROOT", ".provenance"),
            github_token: std::env::var("GITHUB_TOKEN").ok().filter(|s| !s.is_empty()),
            call_timeout: Duration::from_secs(300),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

fn env_path(key: &str, default: &str) -> PathBuf {
    std::env::var(key).map(PathBuf::from).unwrap_or_else(|_| PathBuf::from(default))
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

fn env_executor_type() -> ExecutorKind {
    match std::env::var("EXECUTOR_TYPE").ok().as_deref() {
        Some("cold") => ExecutorKind::Cold,
        _ => ExecutorKind::Warm,
    }
}
