// SPDX-License-Identifier: MIT OR Apache-2.0
//! A per-digest exclusive lock file serialising concurrent bundle
//! materialisations (spec.md §4.2, §5).
//!
//! This is a cooperative advisory lock, not an OS-level `flock`: a
//! waiter polls for the lock file's disappearance. That is sufficient
//! here because the only contenders are other workers in this same
//! process tree racing to materialise the same bundle digest, and the
//! lock is held only for the duration of a directory copy.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// A held materialisation lock; removes its lock file on drop.
pub struct MaterialiseLock {
    path: PathBuf,
}

impl MaterialiseLock {
    /// Acquire the lock for `digest` under `cache_dir`, creating the lock
    /// file exclusively and polling with backoff if another materialiser
    /// currently holds it.
    pub async fn acquire(cache_dir: &Path, digest: &str) -> std::io::Result<Self> {
        let path = cache_dir.join(format!(".{digest}.lock"));
        loop {
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(_) => return Ok(Self { path }),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    tokio::time::sleep(Duration::from_millis(25)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Drop for MaterialiseLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
