// SPDX-License-Identifier: MIT OR Apache-2.0
//! `BundleRef` and `BundleDigest` — the identifiers a Bundle Repository
//! resolves between (spec.md §3, §4.1).

use crate::error::CoreError;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An opaque string naming a bundle: content-addressed (`sha256:<64 hex>`),
/// a local path (`file://…`, `local://…`, absolute path), or a registry
/// reference. Resolution (performed by a Bundle Repository, not by this
/// type) yields a [`BundleDigest`] plus a local directory.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct BundleRef(String);

impl BundleRef {
    /// Wrap a raw reference string.
    pub fn new(raw: impl Into<String>) -> Result<Self, CoreError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(CoreError::EmptyBundleRef);
        }
        Ok(Self(raw))
    }

    /// The raw reference string, as given to `ensure_local`.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `true` if this ref is already a content-addressed `sha256:<hex>` form.
    pub fn is_content_addressed(&self) -> bool {
        self.0.starts_with("sha256:")
    }

    /// `true` if this ref is the local-development sentinel.
    pub fn is_dev_sentinel(&self) -> bool {
        self.0 == "local://dev"
    }
}

impl fmt::Display for BundleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for BundleRef {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A 64-hex-character blake2b-256 digest identifying a bundle's content,
/// as returned by `BundleRepository::ensure_local`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct BundleDigest(String);

impl BundleDigest {
    /// The fixed sentinel digest used for `local://dev` bundles: `dev` padded
    /// with zeroes to 64 characters, matching the original implementation's
    /// `"dev" + "0" * 60`.
    pub fn dev_sentinel() -> Self {
        let mut s = String::from("dev");
        s.push_str(&"0".repeat(61));
        Self(s)
    }

    /// Wrap an already-computed hex digest verbatim (no length validation —
    /// callers that need strictness should check `as_str().len() == 64`).
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// The digest as a lowercase hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters, used throughout the provenance path schema
    /// (`bundle12` in the original implementation) as a shorter, still
    /// effectively-unique path component.
    pub fn short12(&self) -> String {
        crate::hash::truncate_hex(&self.0, 12)
    }
}

impl fmt::Display for BundleDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_ref() {
        assert!(BundleRef::new("").is_err());
    }

    #[test]
    fn dev_sentinel_is_64_chars() {
        assert_eq!(BundleDigest::dev_sentinel().as_str().len(), 64);
    }

    #[test]
    fn short12_truncates() {
        let d = BundleDigest::from_hex("a".repeat(64));
        assert_eq!(d.short12(), "a".repeat(12));
    }

    #[test]
    fn classifies_content_addressed() {
        let r = BundleRef::new("sha256:deadbeef").unwrap();
        assert!(r.is_content_addressed());
        assert!(!r.is_dev_sentinel());
    }
}
