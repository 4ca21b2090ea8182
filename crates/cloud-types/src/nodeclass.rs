//! `AKSNodeClass` CRD (spec.md §6): user-authored node template.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum ImageFamily {
    Ubuntu2204,
    AzureLinux,
    Windows2022,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KubeletConfiguration {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_manager_policy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_cfs_quota: Option<bool>,
    #[serde(default = "default_gc_high_threshold")]
    pub image_gc_high_threshold_percent: i32,
    #[serde(default = "default_gc_low_threshold")]
    pub image_gc_low_threshold_percent: i32,
}

fn default_gc_high_threshold() -> i32 {
    85
}
fn default_gc_low_threshold() -> i32 {
    80
}

/// `AKSNodeClass.spec`, field-for-field compatible with spec.md §6.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "karpenter.azure.com",
    version = "v1beta1",
    kind = "AKSNodeClass",
    namespaced = false,
    status = "AksNodeClassStatus",
    shortname = "aksnc"
)]
#[serde(rename_all = "camelCase")]
pub struct AksNodeClassSpec {
    pub image_family: ImageFamily,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
    #[serde(default)]
    pub kubelet: KubeletConfiguration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vnet_subnet_id: Option<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    pub os_disk_size_gb: i32,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: ConditionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

pub const CONDITION_IMAGES_READY: &str = "ImagesReady";
pub const CONDITION_KUBERNETES_VERSION_READY: &str = "KubernetesVersionReady";
pub const CONDITION_READY: &str = "Ready";

pub const FINALIZER_TERMINATION: &str = "karpenter.azure.com/termination";

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AksNodeClassStatus {
    #[serde(default)]
    pub kubernetes_version: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl AksNodeClassStatus {
    pub fn condition(&self, type_: &str) -> ConditionStatus {
        self.conditions
            .iter()
            .find(|c| c.type_ == type_)
            .map(|c| c.status)
            .unwrap_or(ConditionStatus::Unknown)
    }

    pub fn is_ready(&self) -> ConditionStatus {
        self.condition(CONDITION_READY)
    }
}
