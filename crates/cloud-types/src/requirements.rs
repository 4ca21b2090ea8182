//! Label-based scheduling requirements, merged from a NodePool template and
//! a NodeClaim's own overrides (spec.md §3, NodePool/NodeClaim).

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Well-known requirement keys used throughout offering selection.
pub mod keys {
    pub const INSTANCE_TYPE: &str = "node.kubernetes.io/instance-type";
    pub const ZONE: &str = "topology.kubernetes.io/zone";
    pub const CAPACITY_TYPE: &str = "karpenter.sh/capacity-type";
    pub const ARCH: &str = "kubernetes.io/arch";
    pub const OS: &str = "kubernetes.io/os";
    pub const SKU_FAMILY: &str = "karpenter.azure.com/sku-family";
    /// Live-node label carrying the kubelet's client certificate identity,
    /// consulted by the drift detector in VM mode (spec.md §4.6 step 6).
    pub const KUBELET_CLIENT_ID: &str = "karpenter.azure.com/kubelet-client-id";
}

/// Selector operator, matching the upstream generic NodePool requirement
/// schema (`In`, `NotIn`, existence/absence, ordering, and a minimum-values
/// extension used to require a minimum spread across matched values).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum Operator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
    Gt,
    Lt,
}

/// A single requirement: `key Operator [values]`, with an optional minimum
/// number of distinct values that must be schedulable simultaneously.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct Requirement {
    pub key: String,
    pub operator: Operator,
    #[serde(default)]
    pub values: Vec<String>,
    #[serde(default, rename = "minValues", skip_serializing_if = "Option::is_none")]
    pub min_values: Option<u32>,
}

impl Requirement {
    pub fn new(key: &str, operator: Operator, values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            key: key.to_string(),
            operator,
            values: values.into_iter().map(Into::into).collect(),
            min_values: None,
        }
    }

    /// Whether `value` satisfies this requirement for the given key.
    pub fn matches(&self, value: &str) -> bool {
        match self.operator {
            Operator::In => self.values.iter().any(|v| v == value),
            Operator::NotIn => !self.values.iter().any(|v| v == value),
            Operator::Exists => true,
            Operator::DoesNotExist => false,
            Operator::Gt => self
                .values
                .first()
                .and_then(|v| v.parse::<i64>().ok())
                .zip(value.parse::<i64>().ok())
                .is_some_and(|(bound, v)| v > bound),
            Operator::Lt => self
                .values
                .first()
                .and_then(|v| v.parse::<i64>().ok())
                .zip(value.parse::<i64>().ok())
                .is_some_and(|(bound, v)| v < bound),
        }
    }
}

/// An ordered set of requirements merged from NodePool + NodeClaim.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct Requirements(pub Vec<Requirement>);

impl Requirements {
    pub fn get(&self, key: &str) -> Option<&Requirement> {
        self.0.iter().find(|r| r.key == key)
    }

    /// Allowed values for `key`, or `None` if the key is unconstrained
    /// (no requirement present, or an `Exists` requirement).
    pub fn allowed_values(&self, key: &str) -> Option<BTreeSet<&str>> {
        let req = self.get(key)?;
        match req.operator {
            Operator::In => Some(req.values.iter().map(String::as_str).collect()),
            Operator::Exists => None,
            _ => Some(BTreeSet::new()),
        }
    }

    /// True if `value` is compatible with whatever this set of requirements
    /// says about `key` (absence of a requirement is always compatible).
    pub fn compatible(&self, key: &str, value: &str) -> bool {
        match self.get(key) {
            Some(req) => req.matches(value),
            None => true,
        }
    }

    /// Merge a NodePool-level requirement set with a NodeClaim-level one.
    /// NodeClaim requirements take precedence for duplicate keys.
    pub fn merge(pool: &Requirements, claim: &Requirements) -> Requirements {
        let mut merged: Vec<Requirement> = claim.0.clone();
        for req in &pool.0 {
            if !merged.iter().any(|r| r.key == req.key) {
                merged.push(req.clone());
            }
        }
        Requirements(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_operator_matches_listed_values() {
        let req = Requirement::new(keys::CAPACITY_TYPE, Operator::In, ["spot", "on-demand"]);
        assert!(req.matches("spot"));
        assert!(!req.matches("reserved"));
    }

    #[test]
    fn claim_requirement_overrides_pool_requirement() {
        let pool = Requirements(vec![Requirement::new(keys::CAPACITY_TYPE, Operator::In, ["spot"])]);
        let claim = Requirements(vec![Requirement::new(keys::CAPACITY_TYPE, Operator::In, ["on-demand"])]);
        let merged = Requirements::merge(&pool, &claim);
        assert_eq!(merged.get(keys::CAPACITY_TYPE).unwrap().values, vec!["on-demand"]);
    }

    #[test]
    fn absent_requirement_is_compatible_with_anything() {
        let reqs = Requirements::default();
        assert!(reqs.compatible(keys::ZONE, "zone-1"));
    }
}
