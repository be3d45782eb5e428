// SPDX-License-Identifier: MIT OR Apache-2.0
//! `UniqueParameterSet` — an immutable, order-independent parameter mapping
//! with a stable, content-derived `param_id` (spec.md §3).

use crate::error::CoreError;
use crate::hash::blake2b_256_hex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A mapping from parameter name to a JSON scalar, carrying a derived,
/// stable `param_id` computed from the canonical serialisation of the
/// mapping. Two sets with equal keys and values have equal `param_id`s
/// regardless of insertion order. Immutable after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct UniqueParameterSet {
    params: BTreeMap<String, serde_json::Value>,
    param_id: String,
}

impl UniqueParameterSet {
    /// Build a parameter set from an arbitrary-order map, rejecting any
    /// non-scalar value and computing the stable `param_id`.
    pub fn new(
        params: impl IntoIterator<Item = (String, serde_json::Value)>,
    ) -> Result<Self, CoreError> {
        let mut map = BTreeMap::new();
        for (name, value) in params {
            if !is_json_scalar(&value) {
                return Err(CoreError::NonScalarParam {
                    name,
                    value: value.to_string(),
                });
            }
            map.insert(name, value);
        }
        let param_id = compute_param_id(&map);
        Ok(Self {
            params: map,
            param_id,
        })
    }

    /// The underlying parameter mapping, keys in sorted order.
    pub fn params(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.params
    }

    /// The stable, content-derived identifier (blake2b-256 hex, 64 chars).
    pub fn param_id(&self) -> &str {
        &self.param_id
    }
}

fn is_json_scalar(value: &serde_json::Value) -> bool {
    !matches!(
        value,
        serde_json::Value::Array(_) | serde_json::Value::Object(_)
    )
}

/// Canonical serialisation: a `BTreeMap` always serialises its entries in
/// key order, so a compact `serde_json` dump is already the canonical form
/// — no separate key-sorting pass is needed.
fn compute_param_id(map: &BTreeMap<String, serde_json::Value>) -> String {
    let canonical =
        serde_json::to_vec(map).expect("BTreeMap<String, Value> always serialises");
    blake2b_256_hex(&canonical)
}
