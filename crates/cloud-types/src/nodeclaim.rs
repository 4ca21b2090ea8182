//! `NodeClaim` (spec.md §3): a single node request/observation.

use crate::instance_type::Resources;
use crate::nodepool::{NodeClassReference, Taint};
use crate::requirements::Requirements;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "karpenter.sh",
    version = "v1",
    kind = "NodeClaim",
    namespaced = false,
    status = "NodeClaimStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct NodeClaimSpec {
    #[serde(default)]
    pub requirements: Requirements,
    pub node_class_ref: NodeClassReference,
    #[serde(default)]
    pub taints: Vec<Taint>,
    #[serde(default)]
    pub startup_taints: Vec<Taint>,
    /// Owning NodePool, used for owner tags and status.resources reporting.
    #[serde(default)]
    pub nodepool_name: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodeClaimStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
    #[serde(default)]
    pub capacity: BTreeMap<String, String>,
    #[serde(default)]
    pub allocatable: BTreeMap<String, String>,
    /// Labels the cloud provider resolved onto the created resource
    /// (capacity-type, zone, instance-type, sku family/version/cpu/memory,
    /// arch, os) — spec.md §4.1 step 8.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Present only for machine-mode NodeClaims; holds the managed-machine
    /// resource id (spec.md §4.4, §6).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub machine_resource_id: Option<String>,
    /// Present only for VM-mode NodeClaims; the cloud-assigned NIC resource
    /// id, needed to delete the orphan NIC since it isn't derivable from
    /// the NodeClaim name alone (spec.md §4.3, §4.1 Delete).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nic_resource_id: Option<String>,
}

/// In-memory, engine-facing view of a NodeClaim. The CRD type above is the
/// persisted shape; this is what CloudProvider operations take and return,
/// decoupled from `kube::Api` object metadata plumbing (which stays out of
/// scope per spec.md §1).
#[derive(Clone, Debug, Default)]
pub struct NodeClaim {
    pub name: String,
    pub nodepool_name: String,
    pub node_class_name: String,
    pub requirements: Requirements,
    pub taints: Vec<Taint>,
    pub startup_taints: Vec<Taint>,
    pub status: NodeClaimStatus,
}

impl NodeClaim {
    pub fn resources(&self) -> Resources {
        let parse = |m: &BTreeMap<String, String>, k: &str| -> u64 { m.get(k).and_then(|v| v.parse().ok()).unwrap_or_default() };
        Resources {
            cpu_millicores: parse(&self.status.capacity, "cpu_millicores"),
            memory_bytes: parse(&self.status.capacity, "memory_bytes"),
            ephemeral_storage_bytes: parse(&self.status.capacity, "ephemeral_storage_bytes"),
            pods: parse(&self.status.capacity, "pods"),
        }
    }

    pub fn is_machine_mode(&self) -> bool {
        self.status.machine_resource_id.is_some()
    }
}
