// SPDX-License-Identifier: MIT OR Apache-2.0
//! `BundleRepository`: resolve a [`BundleRef`] to a locally materialised
//! directory and digest (spec.md §4.2).

use crate::digest::compute_digest;
use crate::error::BundleError;
use crate::lock::MaterialiseLock;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use sx_core::{BundleDigest, BundleRef};
use tracing::info;

/// Resolves a bundle reference to a local directory and content digest.
///
/// `ensure_local` is idempotent: resolving the same reference twice
/// returns the same digest without re-materialising anything the second
/// time.
#[async_trait]
pub trait BundleRepository: Send + Sync {
    /// Resolve `bundle_ref`, materialising it locally if needed.
    async fn ensure_local(&self, bundle_ref: &BundleRef) -> Result<(BundleDigest, PathBuf), BundleError>;
}

/// A bundle repository backed by the local filesystem: bundles already
/// live under `bundles_dir`, or are referenced by absolute/relative path,
/// and materialised copies are cached under `cache_dir`.
#[derive(Debug, Clone)]
pub struct FileBundleRepository {
    bundles_dir: PathBuf,
    cache_dir: PathBuf,
}

impl FileBundleRepository {
    /// Construct a repository rooted at `bundles_dir`, caching
    /// materialised copies under `cache_dir`. Creates `cache_dir` if it
    /// does not exist.
    pub fn new(bundles_dir: impl Into<PathBuf>, cache_dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let cache_dir = cache_dir.into();
        std::fs::create_dir_all(&cache_dir)?;
        Ok(Self {
            bundles_dir: bundles_dir.into(),
            cache_dir,
        })
    }

    fn resolve_source_path(&self, raw: &str) -> PathBuf {
        if let Some(rest) = raw.strip_prefix("file://") {
            if rest.starts_with('/') {
                PathBuf::from(rest)
            } else {
                self.bundles_dir.join(rest)
            }
        } else if let Some(rest) = raw.strip_prefix("local://") {
            self.bundles_dir.join(rest)
        } else if raw.starts_with('/') {
            PathBuf::from(raw)
        } else {
            self.bundles_dir.join(raw)
        }
    }
}

#[async_trait]
impl BundleRepository for FileBundleRepository {
    async fn ensure_local(&self, bundle_ref: &BundleRef) -> Result<(BundleDigest, PathBuf), BundleError> {
        let raw = bundle_ref.as_str();
        if raw.is_empty() {
            return Err(BundleError::EmptyRef);
        }

        if bundle_ref.is_dev_sentinel() {
            let source_path = std::env::current_dir()?;
            return Ok((BundleDigest::dev_sentinel(), source_path));
        }

        let source_path = self.resolve_source_path(raw);
        if !source_path.exists() {
            return Err(BundleError::NotFound {
                bundle_ref: raw.to_string(),
                resolved_path: source_path.display().to_string(),
            });
        }
        if !source_path.is_dir() {
            return Err(BundleError::NotADirectory(source_path.display().to_string()));
        }

        let digest_hex = compute_digest(&source_path)?;
        let cache_path = self.cache_dir.join(&digest_hex);

        if cache_path.exists() {
            info!(target: "sx.bundle", digest = %&digest_hex[..12], "bundle already cached");
            return Ok((BundleDigest::from_hex(digest_hex), cache_path));
        }

        let _lock = MaterialiseLock::acquire(&self.cache_dir, &digest_hex).await?;

        // Re-check after acquiring the lock: another materialiser may
        // have finished the copy while we were waiting.
        if cache_path.exists() {
            return Ok((BundleDigest::from_hex(digest_hex), cache_path));
        }

        materialise(&source_path, &self.cache_dir, &cache_path, &digest_hex)?;
        Ok((BundleDigest::from_hex(digest_hex), cache_path))
    }
}

fn materialise(source: &Path, cache_dir: &Path, cache_path: &Path, digest: &str) -> Result<(), BundleError> {
    let temp_dir = cache_dir.join(format!(".tmp_{}_{}", &digest[..8], std::process::id()));
    if temp_dir.exists() {
        std::fs::remove_dir_all(&temp_dir)?;
    }
    let temp_bundle = temp_dir.join("bundle");

    let result = copy_tree(source, &temp_bundle).and_then(|()| std::fs::rename(&temp_bundle, cache_path));

    match result {
        Ok(()) => {
            let _ = std::fs::remove_dir_all(&temp_dir);
            Ok(())
        }
        Err(e) => {
            let _ = std::fs::remove_dir_all(&temp_dir);
            let _ = std::fs::remove_dir_all(cache_path);
            Err(BundleError::CacheFailed {
                digest: digest.to_string(),
                message: e.to_string(),
            })
        }
    }
}

fn copy_tree(from: &Path, to: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(to)?;
    for entry in std::fs::read_dir(from)? {
        let entry = entry?;
        let dest = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &dest)?;
        } else {
            std::fs::copy(entry.path(), &dest)?;
        }
    }
    Ok(())
}
