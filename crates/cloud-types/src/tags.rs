//! Owner tags applied to every created cloud resource (spec.md §3 invariants).
//! Never overridable by user tag configuration.

pub const CLUSTER_NAME: &str = "karpenter.sh/cluster-name";
pub const NODEPOOL_NAME: &str = "karpenter.sh/nodepool";
pub const MANAGED_BY: &str = "karpenter.sh/managed-by";

pub const MACHINE_RESOURCE_ID_ANNOTATION: &str = "karpenter.azure.com/machine-resource-id";

/// Build the non-overridable owner tag set for a resource created on behalf
/// of `nodepool` in `cluster`. Caller merges this with (and lets it win over)
/// user-supplied tags.
pub fn owner_tags(cluster: &str, nodepool: &str) -> std::collections::BTreeMap<String, String> {
    let mut tags = std::collections::BTreeMap::new();
    tags.insert(CLUSTER_NAME.to_string(), cluster.to_string());
    tags.insert(NODEPOOL_NAME.to_string(), nodepool.to_string());
    tags.insert(MANAGED_BY.to_string(), "cloud-node-provisioner".to_string());
    tags
}

/// Merge user tags under the owner tags, with owner tags always winning on
/// key collision (spec.md §3: "never overridable by user tag configuration").
pub fn merge_with_owner_tags(
    user_tags: &std::collections::BTreeMap<String, String>,
    cluster: &str,
    nodepool: &str,
) -> std::collections::BTreeMap<String, String> {
    let mut merged = user_tags.clone();
    merged.extend(owner_tags(cluster, nodepool));
    merged
}
