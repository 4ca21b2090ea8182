//! The low-level VM API, consumed as an external collaborator. Production
//! code backs this with the cloud SDK; tests drive it through a
//! hand-written fake implementing this trait.

use async_trait::async_trait;
use errors::RawCloudError;

#[derive(Clone, Debug)]
pub struct NicSpec {
    pub name: String,
    pub subnet_id: Option<String>,
    pub accelerated_networking: bool,
    pub tags: std::collections::BTreeMap<String, String>,
}

#[derive(Clone, Debug)]
pub struct OsDisk {
    pub placement: instance_types::EphemeralDiskPlacement,
}

#[derive(Clone, Debug)]
pub struct VmSpec {
    pub name: String,
    pub zone: String,
    pub sku: String,
    pub capacity_type: cloud_types::CapacityType,
    pub image: images::ImageReference,
    pub os_disk: OsDisk,
    pub nic_id: String,
    pub custom_data: String,
    pub identities: Vec<String>,
    pub ssh_public_key: Option<String>,
    pub tags: std::collections::BTreeMap<String, String>,
}

#[derive(Clone, Debug)]
pub struct VmDescription {
    pub provider_id: String,
    pub name: String,
    pub zone: String,
    pub sku: String,
    pub capacity_type: cloud_types::CapacityType,
    pub image_version: String,
    pub nic_id: String,
    pub tags: std::collections::BTreeMap<String, String>,
}

#[async_trait]
pub trait VmApiClient: Send + Sync {
    async fn create_nic(&self, spec: &NicSpec) -> Result<String, RawCloudError>;
    async fn delete_nic(&self, nic_id: &str) -> Result<(), RawCloudError>;
    /// Synchronous from the caller's perspective: returns only after the
    /// LRO reaches a terminal state (spec.md §4.3).
    async fn create_vm(&self, spec: &VmSpec) -> Result<VmDescription, RawCloudError>;
    async fn get_vm(&self, name: &str) -> Result<Option<VmDescription>, RawCloudError>;
    async fn list_vms(&self) -> Result<Vec<VmDescription>, RawCloudError>;
    async fn delete_vm(&self, name: &str) -> Result<(), RawCloudError>;
}
