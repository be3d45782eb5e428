// SPDX-License-Identifier: MIT OR Apache-2.0
//! The Warm Process Pool (spec.md §4.7): at most `max_processes` Python
//! subprocesses kept alive across tasks, keyed by bundle digest, evicted
//! least-recently-used when a new bundle needs a slot.

use crate::asset::{ensure_venv, materialise_runner_script, venv_path, venv_python};
use crate::error::HostError;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use sx_core::BundleDigest;
use sx_protocol::RpcClient;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// One live subprocess runner, bound to a single bundle digest.
pub struct WarmProcess {
    digest: BundleDigest,
    child: Mutex<Child>,
    rpc: RpcClient,
    /// Serialises `execute`/`aggregate` calls: the subprocess reads and
    /// writes one frame at a time on its stdio, so two concurrent callers
    /// must not interleave requests (spec.md §5).
    call_lock: Mutex<()>,
    use_count: AtomicU64,
}

impl WarmProcess {
    /// How many tasks this process has served since it was spawned.
    pub fn use_count(&self) -> u64 {
        self.use_count.load(Ordering::SeqCst)
    }

    /// The bundle digest this process was spawned for.
    pub fn digest(&self) -> &BundleDigest {
        &self.digest
    }

    async fn is_alive(&self) -> bool {
        matches!(self.child.lock().await.try_wait(), Ok(None))
    }

    async fn kill(&self) {
        let mut child = self.child.lock().await;
        let _ = child.kill().await;
        let _ = child.wait().await;
    }

    async fn call(&self, method: &str, params: serde_json::Value, timeout: Duration) -> Result<serde_json::Value, HostError> {
        let _guard = self.call_lock.lock().await;
        self.use_count.fetch_add(1, Ordering::SeqCst);
        self.rpc.call(method, params, timeout).await.map_err(HostError::from)
    }
}

/// Configuration the pool needs to spawn and supervise processes. A subset
/// of [`crate::config::HostConfig`] — the pool has no opinion on bundle
/// resolution or provenance, only on process lifecycle.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of processes kept alive simultaneously.
    pub max_processes: usize,
    /// Root directory venvs and the embedded runner script live under.
    pub venvs_dir: std::path::PathBuf,
    /// Recreate a bundle's venv even if it already exists.
    pub force_fresh_venv: bool,
    /// Deadline for a single `execute`/`aggregate` call.
    pub call_timeout: Duration,
    /// Grace period after a `shutdown` notify before an evicted process is
    /// killed outright.
    pub shutdown_grace: Duration,
}

/// An LRU-by-bundle-digest pool of warm subprocesses.
pub struct WarmProcessPool {
    entries: Mutex<Vec<Arc<WarmProcess>>>,
    config: PoolConfig,
}

impl WarmProcessPool {
    /// Construct an empty pool.
    pub fn new(config: PoolConfig) -> Self {
        Self { entries: Mutex::new(Vec::new()), config }
    }

    /// Number of processes currently held (for diagnostics / tests).
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// `true` if the pool holds no processes.
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Get a process bound to `digest`, spawning one against `bundle_path`
    /// if none exists, reusing a live one if it does, and evicting the
    /// least-recently-used entry first if the pool is already full.
    ///
    /// Held across the whole operation: the pool's own mutex, which keeps
    /// "find or spawn" atomic at the cost of serialising pool mutations
    /// across bundle digests. Once returned, the `Arc<WarmProcess>` is used
    /// without holding this lock, so concurrent tasks against the *same*
    /// already-warm process never contend on it.
    pub async fn get_process(&self, digest: &BundleDigest, bundle_path: &Path) -> Result<Arc<WarmProcess>, HostError> {
        let mut entries = self.entries.lock().await;

        if let Some(pos) = entries.iter().position(|p| p.digest() == digest) {
            if entries[pos].is_alive().await {
                let proc = entries.remove(pos);
                entries.push(proc.clone());
                debug!(target: "sx.host.pool", digest = %digest, use_count = proc.use_count(), "reusing warm process");
                return Ok(proc);
            }
            info!(target: "sx.host.pool", digest = %digest, "warm process found dead, removing");
            entries.remove(pos);
        }

        if entries.len() >= self.config.max_processes {
            let victim = entries.remove(0);
            drop(entries);
            info!(target: "sx.host.pool", digest = %victim.digest(), "evicting LRU process for new bundle");
            self.graceful_shutdown(&victim).await;
            entries = self.entries.lock().await;
        }

        let proc = Arc::new(self.spawn_process(digest, bundle_path).await?);
        entries.push(proc.clone());
        Ok(proc)
    }

    /// Run `method` against `digest`'s warm process, poisoning (killing and
    /// evicting) it on any failure the error taxonomy marks as fatal
    /// (spec.md §7).
    pub async fn call(
        &self,
        digest: &BundleDigest,
        bundle_path: &Path,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, HostError> {
        let proc = self.get_process(digest, bundle_path).await?;
        match proc.call(method, params, self.config.call_timeout).await {
            Ok(result) => Ok(result),
            Err(err) => {
                if err.poisons_process() {
                    warn!(target: "sx.host.pool", digest = %digest, %err, "poisoning process");
                    self.remove_and_kill(&proc).await;
                }
                Err(err)
            }
        }
    }

    /// Gracefully shut down every process in the pool (parent process
    /// exit, or a cold-restart request).
    pub async fn shutdown_all(&self) {
        let procs: Vec<Arc<WarmProcess>> = self.entries.lock().await.drain(..).collect();
        for proc in procs {
            self.graceful_shutdown(&proc).await;
        }
    }

    async fn remove_and_kill(&self, proc: &Arc<WarmProcess>) {
        let mut entries = self.entries.lock().await;
        entries.retain(|p| !Arc::ptr_eq(p, proc));
        drop(entries);
        proc.kill().await;
    }

    async fn graceful_shutdown(&self, proc: &Arc<WarmProcess>) {
        let _ = proc.rpc.notify("shutdown", serde_json::json!({})).await;
        let deadline = tokio::time::Instant::now() + self.config.shutdown_grace;
        loop {
            if !proc.is_alive().await {
                return;
            }
            if tokio::time::Instant::now() >= deadline {
                warn!(target: "sx.host.pool", digest = %proc.digest(), "process did not exit after grace period, killing");
                proc.kill().await;
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    async fn spawn_process(&self, digest: &BundleDigest, bundle_path: &Path) -> Result<WarmProcess, HostError> {
        let venv = venv_path(&self.config.venvs_dir, digest);
        ensure_venv(&venv, self.config.force_fresh_venv).await?;
        let script = materialise_runner_script(&self.config.venvs_dir).map_err(HostError::Spawn)?;
        let python = venv_python(&venv);

        let mut child = Command::new(&python)
            .arg(&script)
            .arg("--bundle-path")
            .arg(bundle_path)
            .arg("--venv-path")
            .arg(&venv)
            .arg("--bundle-digest")
            .arg(digest.as_str())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(HostError::Spawn)?;

        let stdin = child.stdin.take().ok_or_else(|| HostError::Spawn(std::io::Error::other("runner stdin unavailable")))?;
        let stdout = child.stdout.take().ok_or_else(|| HostError::Spawn(std::io::Error::other("runner stdout unavailable")))?;
        if let Some(stderr) = child.stderr.take() {
            spawn_stderr_drain(stderr, digest.clone());
        }

        let rpc = RpcClient::new(stdout, stdin);
        let proc = WarmProcess {
            digest: digest.clone(),
            child: Mutex::new(child),
            rpc,
            call_lock: Mutex::new(()),
            use_count: AtomicU64::new(0),
        };

        proc.call("ready", serde_json::json!({}), self.config.call_timeout)
            .await
            .map_err(|err| HostError::DependencyInstall { digest: digest.as_str().to_string(), message: err.to_string() })?;

        Ok(proc)
    }
}

fn spawn_stderr_drain(stderr: tokio::process::ChildStderr, digest: BundleDigest) {
    tokio::spawn(async move {
        let mut reader = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = reader.next_line().await {
            if !line.is_empty() {
                debug!(target: "sx.host.runner_stderr", digest = %digest, "{line}");
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(tmp: &Path) -> PoolConfig {
        PoolConfig {
            max_processes: 2,
            venvs_dir: tmp.to_path_buf(),
            force_fresh_venv: false,
            call_timeout: Duration::from_secs(5),
            shutdown_grace: Duration::from_millis(200),
        }
    }

    #[tokio::test]
    async fn new_pool_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let pool = WarmProcessPool::new(config(dir.path()));
        assert!(pool.is_empty().await);
    }
}
