// SPDX-License-Identifier: MIT OR Apache-2.0
//! The Subprocess Runner script, embedded at compile time, and the venv
//! each bundle digest gets its own copy of (spec.md §4.6).

use crate::error::HostError;
use std::path::{Path, PathBuf};
use sx_core::BundleDigest;
use tracing::debug;

/// The Subprocess Runner's standalone script, embedded so the host binary
/// carries its own worker with no separate install step.
pub const RUNNER_SCRIPT: &str = include_str!("../assets/subprocess_runner.py");

const RUNNER_SCRIPT_NAME: &str = "subprocess_runner.py";

/// Write [`RUNNER_SCRIPT`] to a stable location under `venvs_dir`, skipping
/// the write if the file already holds identical content (keeps mtimes
/// stable across repeated host startups).
pub fn materialise_runner_script(venvs_dir: &Path) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(venvs_dir)?;
    let path = venvs_dir.join(RUNNER_SCRIPT_NAME);
    let up_to_date = std::fs::read_to_string(&path).map(|existing| existing == RUNNER_SCRIPT).unwrap_or(false);
    if !up_to_date {
        std::fs::write(&path, RUNNER_SCRIPT)?;
    }
    Ok(path)
}

/// Where a bundle's venv lives: one per bundle digest, keyed by the short
/// 12-character form used throughout the provenance path schema.
pub fn venv_path(venvs_dir: &Path, digest: &BundleDigest) -> PathBuf {
    venvs_dir.join(digest.short12())
}

/// Create the venv at `path` if it does not already exist, or
/// unconditionally if `force_fresh` is set (`FORCE_FRESH_VENV`). The
/// Subprocess Runner script handles dependency installation into it; this
/// only guarantees the interpreter itself exists.
pub async fn ensure_venv(path: &Path, force_fresh: bool) -> Result<(), HostError> {
    if force_fresh && path.exists() {
        tokio::fs::remove_dir_all(path).await.map_err(HostError::Spawn)?;
    }
    if path.join("pyvenv.cfg").exists() {
        return Ok(());
    }
    debug!(target: "sx.host", path = %path.display(), "creating venv");
    let status = tokio::process::Command::new("python3")
        .arg("-m")
        .arg("venv")
        .arg(path)
        .status()
        .await
        .map_err(HostError::Spawn)?;
    if !status.success() {
        return Err(HostError::Spawn(std::io::Error::other(format!(
            "python3 -m venv exited with {status}"
        ))));
    }
    Ok(())
}

/// The venv's `python` interpreter binary, Unix layout (`bin/python3`).
pub fn venv_python(venv_path: &Path) -> PathBuf {
    venv_path.join("bin").join("python3")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn materialising_twice_does_not_rewrite_unchanged_content() {
        let dir = tempfile::tempdir().unwrap();
        let first = materialise_runner_script(dir.path()).unwrap();
        let before = std::fs::metadata(&first).unwrap().modified().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(10));
        let second = materialise_runner_script(dir.path()).unwrap();
        let after = std::fs::metadata(&second).unwrap().modified().unwrap();
        assert_eq!(first, second);
        assert_eq!(before, after);
    }

    #[test]
    fn venv_path_is_keyed_by_short_digest() {
        let digest = BundleDigest::from_hex("a".repeat(64));
        let path = venv_path(Path::new("/venvs"), &digest);
        assert_eq!(path, PathBuf::from("/venvs/aaaaaaaaaaaa"));
    }
}
