// SPDX-License-Identifier: MIT OR Apache-2.0
//! The versioned-storage contract (spec.md §4.6): a cloud-agnostic
//! Compare-And-Swap interface that the job registry and provenance store
//! are built on, plus an in-memory reference implementation for tests and
//! local development.

use crate::error::KvError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Opaque version identifier for CAS operations.
///
/// The concrete representation is backend-specific (an ETag, a
/// metageneration number, a monotonic counter); callers only ever compare
/// tokens for equality via `put`, never inspect their contents.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionToken(pub u64);

impl std::fmt::Display for VersionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Cloud-agnostic versioned storage with CAS semantics.
///
/// Implementations work in raw bytes to stay agnostic of what is stored;
/// JSON encoding/decoding happens at the call site (`update_with_retry`,
/// or the job registry / provenance store directly).
#[async_trait]
pub trait VersionedStore: Send + Sync {
    /// Fetch the current value and its version token, if the key exists.
    async fn get(&self, key: &str) -> Result<Option<(Vec<u8>, VersionToken)>, KvError>;

    /// Write `value` if `version` still matches the stored version.
    ///
    /// Returns `Ok(false)` on a version mismatch or a missing key — both
    /// are expected outcomes in concurrent scenarios and signal "retry",
    /// not failure.
    async fn put(&self, key: &str, value: Vec<u8>, version: &VersionToken) -> Result<bool, KvError>;

    /// Create `key` with `value` only if it does not already exist.
    ///
    /// This is atomic with respect to concurrent callers: at most one
    /// `create_if_absent` for a given key returns `true`.
    async fn create_if_absent(&self, key: &str, value: Vec<u8>) -> Result<bool, KvError>;

    /// List every key with the given prefix.
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, KvError>;

    /// Delete a key. Returns `true` if it existed.
    async fn delete(&self, key: &str) -> Result<bool, KvError>;
}

#[derive(Default)]
struct Entry {
    value: Vec<u8>,
    version: u64,
}

/// Thread-safe in-memory [`VersionedStore`], mirroring cloud-backend CAS
/// semantics for tests and local single-process development.
#[derive(Default)]
pub struct InMemoryVersionedStore {
    data: Mutex<BTreeMap<String, Entry>>,
    version_counter: Mutex<u64>,
}

impl InMemoryVersionedStore {
    /// Construct an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn next_version(&self) -> u64 {
        let mut counter = self.version_counter.lock().expect("version counter lock poisoned");
        *counter += 1;
        *counter
    }

    /// Remove all entries. Useful between test cases sharing a store.
    pub fn clear(&self) {
        self.data.lock().expect("data lock poisoned").clear();
    }
}

#[async_trait]
impl VersionedStore for InMemoryVersionedStore {
    async fn get(&self, key: &str) -> Result<Option<(Vec<u8>, VersionToken)>, KvError> {
        let data = self.data.lock().expect("data lock poisoned");
        Ok(data
            .get(key)
            .map(|entry| (entry.value.clone(), VersionToken(entry.version))))
    }

    async fn put(&self, key: &str, value: Vec<u8>, version: &VersionToken) -> Result<bool, KvError> {
        let mut data = self.data.lock().expect("data lock poisoned");
        let Some(entry) = data.get_mut(key) else {
            return Ok(false);
        };
        if entry.version != version.0 {
            return Ok(false);
        }
        let next = self.next_version();
        entry.value = value;
        entry.version = next;
        Ok(true)
    }

    async fn create_if_absent(&self, key: &str, value: Vec<u8>) -> Result<bool, KvError> {
        let mut data = self.data.lock().expect("data lock poisoned");
        if data.contains_key(key) {
            return Ok(false);
        }
        let version = self.next_version();
        data.insert(key.to_string(), Entry { value, version });
        Ok(true)
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, KvError> {
        let data = self.data.lock().expect("data lock poisoned");
        Ok(data.keys().filter(|k| k.starts_with(prefix)).cloned().collect())
    }

    async fn delete(&self, key: &str) -> Result<bool, KvError> {
        let mut data = self.data.lock().expect("data lock poisoned");
        Ok(data.remove(key).is_some())
    }
}
