// SPDX-License-Identifier: MIT OR Apache-2.0
//! CAS retry loop: read-modify-write against a [`VersionedStore`] with
//! exponential backoff and jitter on version conflicts (spec.md §4.6).

use crate::error::KvError;
use crate::store::VersionedStore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

/// Backoff parameters for [`update_with_retry`].
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (the read-modify-write cycle, including
    /// the first) before giving up with [`KvError::TooManyRetries`].
    pub max_attempts: u32,
    /// Base delay; doubles on each conflict (`initial_delay * 2^attempt`).
    pub initial_delay: Duration,
    /// Upper bound for the added random jitter.
    pub jitter_max: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            jitter_max: Duration::from_millis(100),
        }
    }
}

fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exp = 2u32.saturating_pow(attempt);
    let nominal = config.initial_delay.saturating_mul(exp);

    let jitter_max_nanos = config.jitter_max.as_nanos() as u64;
    let jitter = if jitter_max_nanos > 0 {
        let nanos = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos() as u64;
        let pseudo = nanos.wrapping_mul(attempt as u64 + 1);
        Duration::from_nanos(pseudo % jitter_max_nanos)
    } else {
        Duration::ZERO
    };

    nominal.saturating_add(jitter)
}

/// Read-modify-write a JSON value under CAS, retrying on version
/// conflicts until `config.max_attempts` is exhausted.
///
/// `update` is applied to the current decoded value and must be pure: it
/// may run more than once if the write races another writer, and its
/// errors are propagated immediately rather than retried (mirrors the
/// "business logic exceptions don't get swallowed" behaviour of the
/// reference implementation this is based on).
pub async fn update_with_retry<T, F, E>(
    store: &dyn VersionedStore,
    key: &str,
    config: &RetryConfig,
    mut update: F,
) -> Result<T, KvError>
where
    T: Serialize + DeserializeOwned,
    F: FnMut(T) -> Result<T, E>,
    E: std::fmt::Display,
{
    for attempt in 0..config.max_attempts {
        let Some((bytes, version)) = store.get(key).await? else {
            return Err(KvError::NotFound(key.to_string()));
        };

        let current: T = serde_json::from_slice(&bytes).map_err(|source| KvError::InvalidJson {
            key: key.to_string(),
            source,
        })?;

        let updated = update(current).map_err(|e| KvError::Backend(e.to_string()))?;

        let encoded = serde_json::to_vec(&updated).map_err(|source| KvError::InvalidJson {
            key: key.to_string(),
            source,
        })?;

        if store.put(key, encoded, &version).await? {
            debug!(target: "sx.kv.retry", key, attempt, "CAS update succeeded");
            return Ok(updated);
        }

        if attempt + 1 >= config.max_attempts {
            warn!(target: "sx.kv.retry", key, attempt, "CAS conflict, no more retries");
            break;
        }

        let delay = backoff_delay(config, attempt);
        warn!(
            target: "sx.kv.retry",
            key,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "CAS conflict, retrying after backoff"
        );
        tokio::time::sleep(delay).await;
    }

    Err(KvError::TooManyRetries {
        key: key.to_string(),
        attempts: config.max_attempts,
    })
}

/// Create a JSON value with a small retry budget for transient backend
/// failures. `create_if_absent` is already atomic, so this does not need
/// CAS-conflict backoff — only resilience against retryable I/O errors.
pub async fn create_with_retry<T: Serialize>(
    store: &dyn VersionedStore,
    key: &str,
    value: &T,
    max_attempts: u32,
) -> Result<bool, KvError> {
    let encoded = serde_json::to_vec(value).map_err(|source| KvError::InvalidJson {
        key: key.to_string(),
        source,
    })?;

    let mut last_err = None;
    for attempt in 0..max_attempts.max(1) {
        match store.create_if_absent(key, encoded.clone()).await {
            Ok(created) => return Ok(created),
            Err(e) => {
                warn!(target: "sx.kv.retry", key, attempt, error = %e, "create_if_absent failed, retrying");
                last_err = Some(e);
                tokio::time::sleep(Duration::from_millis(100 * (attempt as u64 + 1))).await;
            }
        }
    }
    Err(last_err.unwrap_or_else(|| KvError::Backend("create_with_retry: unreachable".to_string())))
}
