// SPDX-License-Identifier: MIT OR Apache-2.0
//! Content digest of a bundle directory (spec.md §4.2): blake2b-256 over
//! every regular file's relative path, size, mtime, and content, in
//! deterministic (sorted-by-path) order.

use crate::error::BundleError;
use std::path::{Path, PathBuf};
use sx_core::hash::blake2b_256_hex_concat;

/// Walk `root` and return every regular file beneath it, sorted by path
/// relative to `root` for deterministic hashing order.
fn sorted_files(root: &Path) -> Result<Vec<PathBuf>, BundleError> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                stack.push(path);
            } else if file_type.is_file() {
                files.push(path);
            }
        }
    }
    files.sort_by(|a, b| {
        a.strip_prefix(root)
            .unwrap_or(a)
            .cmp(b.strip_prefix(root).unwrap_or(b))
    });
    Ok(files)
}

/// Compute the blake2b-256 content digest of a bundle directory.
///
/// Hashes `relpath ‖ size ‖ mtime-seconds ‖ content` for every regular
/// file, in sorted-path order, so the same logical tree always produces
/// the same digest regardless of traversal order.
pub fn compute_digest(root: &Path) -> Result<String, BundleError> {
    let files = sorted_files(root)?;

    let mut parts: Vec<Vec<u8>> = Vec::with_capacity(files.len() * 4);
    for path in &files {
        let rel = path.strip_prefix(root).unwrap_or(path);
        let metadata = std::fs::metadata(path)?;
        let mtime_secs = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);

        parts.push(rel.to_string_lossy().into_owned().into_bytes());
        parts.push(metadata.len().to_string().into_bytes());
        parts.push(mtime_secs.to_string().into_bytes());
        parts.push(std::fs::read(path)?);
    }

    let refs: Vec<&[u8]> = parts.iter().map(Vec::as_slice).collect();
    Ok(blake2b_256_hex_concat(&refs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn digest_is_stable_across_recomputation() {
        let dir = tempfile::tempdir().unwrap();
        let mut f = std::fs::File::create(dir.path().join("wire.py")).unwrap();
        writeln!(f, "def wire(): pass").unwrap();
        drop(f);

        let a = compute_digest(dir.path()).unwrap();
        let b = compute_digest(dir.path()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn digest_changes_with_content() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("wire.py"), "v1").unwrap();
        let a = compute_digest(dir.path()).unwrap();

        std::fs::write(dir.path().join("wire.py"), "v2").unwrap();
        let b = compute_digest(dir.path()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn digest_is_insensitive_to_directory_traversal_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        std::fs::write(dir.path().join("sub/b.txt"), "b").unwrap();

        let files = sorted_files(dir.path()).unwrap();
        let mut rels: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_path_buf())
            .collect();
        let sorted_copy = {
            rels.sort();
            rels.clone()
        };
        assert_eq!(rels, sorted_copy);
    }
}
