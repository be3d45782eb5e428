// SPDX-License-Identifier: MIT OR Apache-2.0
//! `AggregationTask` and `AggregationReturn` — fan-in of replicate outputs
//! through a user target function (spec.md §3).

use crate::bundle::BundleRef;
use crate::hash::{blake2b_256_hex_concat, truncate_hex};
use crate::task::SimReturn;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A request to fan multiple `SimReturn`s into a scalar loss via a target
/// function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AggregationTask {
    /// Which bundle the target entrypoint lives in.
    pub bundle_ref: BundleRef,
    /// `module.path:symbol` naming the target callable.
    pub target_entrypoint: String,
    /// The replicate results being aggregated.
    pub sim_returns: Vec<SimReturn>,
    /// Optional observed-data payload passed through to the target.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_data: Option<serde_json::Value>,
}

impl AggregationTask {
    /// Construct an aggregation task.
    pub fn new(
        bundle_ref: BundleRef,
        target_entrypoint: impl Into<String>,
        sim_returns: Vec<SimReturn>,
        target_data: Option<serde_json::Value>,
    ) -> Self {
        Self {
            bundle_ref,
            target_entrypoint: target_entrypoint.into(),
            sim_returns,
            target_data,
        }
    }

    /// `blake2b(target_entrypoint ‖ sorted(task_ids))[:16]`.
    pub fn aggregation_id(&self) -> String {
        let mut task_ids: Vec<&str> =
            self.sim_returns.iter().map(|r| r.task_id.as_str()).collect();
        task_ids.sort_unstable();
        let joined = task_ids.join(",");
        let full =
            blake2b_256_hex_concat(&[self.target_entrypoint.as_bytes(), joined.as_bytes()]);
        truncate_hex(&full, 16)
    }

    /// Number of replicates being aggregated.
    pub fn n_replicates(&self) -> usize {
        self.sim_returns.len()
    }
}

/// The result of an aggregation: a finite scalar loss plus diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AggregationReturn {
    /// Identifies the aggregation this is a result for.
    pub aggregation_id: String,
    /// The aggregated loss. Must be finite (spec.md §3).
    pub loss: f64,
    /// Free-form diagnostics surfaced by the target (e.g. per-replicate
    /// log-likelihoods).
    pub diagnostics: BTreeMap<String, serde_json::Value>,
    /// Auxiliary named outputs from the target; semantics left to the
    /// target author (spec.md §9, Open Question (c)).
    pub outputs: BTreeMap<String, serde_json::Value>,
    /// Number of replicates that fed into this aggregation.
    pub n_replicates: usize,
}

impl AggregationReturn {
    /// `true` if `loss` satisfies the spec's finiteness invariant.
    pub fn has_finite_loss(&self) -> bool {
        self.loss.is_finite()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap as Map;

    fn ret(task_id: &str) -> SimReturn {
        SimReturn::success(task_id.to_string(), Map::new())
    }

    #[test]
    fn aggregation_id_independent_of_replicate_order() {
        let bundle = BundleRef::new("file:///b").unwrap();
        let a = AggregationTask::new(
            bundle.clone(),
            "targets.prevalence:target",
            vec![ret("t1"), ret("t2")],
            None,
        );
        let b = AggregationTask::new(
            bundle,
            "targets.prevalence:target",
            vec![ret("t2"), ret("t1")],
            None,
        );
        assert_eq!(a.aggregation_id(), b.aggregation_id());
        assert_eq!(a.aggregation_id().len(), 16);
    }

    #[test]
    fn n_replicates_matches_input_len() {
        let bundle = BundleRef::new("file:///b").unwrap();
        let a = AggregationTask::new(
            bundle,
            "targets.prevalence:target",
            (0..10).map(|i| ret(&format!("t{i}"))).collect(),
            None,
        );
        assert_eq!(a.n_replicates(), 10);
    }

    #[test]
    fn finite_loss_check() {
        let good = AggregationReturn {
            aggregation_id: "x".into(),
            loss: 1.0,
            diagnostics: Map::new(),
            outputs: Map::new(),
            n_replicates: 1,
        };
        assert!(good.has_finite_loss());

        let bad = AggregationReturn {
            loss: f64::NAN,
            ..good
        };
        assert!(!bad.has_finite_loss());
    }
}
