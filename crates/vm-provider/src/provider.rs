//! VM back-end create/get/list/delete (spec.md §4.3).

use crate::client::{NicSpec, OsDisk, VmApiClient, VmDescription, VmSpec};
use cloud_types::provider_id::{Backend, ProviderId};
use cloud_types::{CapacityType, InstanceType, NodeClaim};
use errors::RawCloudError;
use images::ImageReference;
use instance_types::select_ephemeral_disk_placement;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VmCreateError {
    #[error(transparent)]
    Cloud(#[from] RawCloudError),
}

pub struct VmProvider {
    client: Arc<dyn VmApiClient>,
    subscription_id: String,
    resource_group: String,
}

impl VmProvider {
    pub fn new(client: Arc<dyn VmApiClient>, subscription_id: impl Into<String>, resource_group: impl Into<String>) -> Self {
        Self { client, subscription_id: subscription_id.into(), resource_group: resource_group.into() }
    }

    /// Create a VM + NIC for `claim` on `instance_type`/`zone`/`capacity_type`
    /// (spec.md §4.3). On VM LRO failure, attempts NIC cleanup before
    /// propagating the raw error so the façade can classify it.
    #[tracing::instrument(skip(self, claim, instance_type, image, bootstrap_script), fields(name = %claim.name))]
    pub async fn create(
        &self,
        claim: &NodeClaim,
        instance_type: &InstanceType,
        zone: &str,
        capacity_type: CapacityType,
        image: &ImageReference,
        os_disk_size_gib: Option<u32>,
        bootstrap_script: String,
        identities: Vec<String>,
        ssh_public_key: Option<String>,
        tags: BTreeMap<String, String>,
    ) -> Result<NodeClaim, VmCreateError> {
        let nic_spec = NicSpec {
            name: nic_name(&claim.name),
            subnet_id: None,
            accelerated_networking: instance_type.accelerated_networking,
            tags: tags.clone(),
        };
        let nic_id = self.client.create_nic(&nic_spec).await?;

        let placement = select_ephemeral_disk_placement(instance_type, instance_type.max_cache_os_disk_gib, os_disk_size_gib);

        let vm_spec = VmSpec {
            name: claim.name.clone(),
            zone: zone.to_string(),
            sku: instance_type.name.clone(),
            capacity_type,
            image: image.clone(),
            os_disk: OsDisk { placement },
            nic_id: nic_id.clone(),
            custom_data: bootstrap_script,
            identities,
            ssh_public_key,
            tags,
        };

        match self.client.create_vm(&vm_spec).await {
            Ok(vm) => Ok(self.to_nodeclaim(claim, &vm, image)),
            Err(e) => {
                // Best-effort cleanup; the cleanup error never masks the
                // original failure (spec.md §7).
                if let Err(cleanup_err) = self.client.delete_nic(&nic_id).await {
                    tracing::warn!(error = %cleanup_err, nic_id, "failed to clean up orphan NIC after VM create failure");
                }
                Err(e.into())
            }
        }
    }

    pub async fn get(&self, name: &str) -> Result<Option<NodeClaim>, RawCloudError> {
        let vm = self.client.get_vm(name).await?;
        Ok(vm.map(|vm| self.vm_to_claim_minimal(&vm)))
    }

    pub async fn list(&self) -> Result<Vec<NodeClaim>, RawCloudError> {
        let vms = self.client.list_vms().await?;
        Ok(vms.iter().map(|vm| self.vm_to_claim_minimal(vm)).collect())
    }

    /// Delete the VM then best-effort delete its NIC (spec.md §4.1).
    pub async fn delete(&self, name: &str, nic_id: &str) -> Result<(), RawCloudError> {
        self.client.delete_vm(name).await?;
        if let Err(e) = self.client.delete_nic(nic_id).await {
            tracing::warn!(error = %e, nic_id, "failed to delete orphan NIC after VM deletion");
        }
        Ok(())
    }

    fn provider_id(&self, name: &str) -> String {
        ProviderId::new(&self.subscription_id, &self.resource_group, Backend::Vm, name).to_string()
    }

    fn to_nodeclaim(&self, claim: &NodeClaim, vm: &VmDescription, image: &ImageReference) -> NodeClaim {
        let mut out = claim.clone();
        out.status.provider_id = Some(self.provider_id(&vm.name));
        out.status.image_id = Some(image.version().to_string());
        out.status.labels.insert(cloud_types::requirements::keys::ZONE.to_string(), vm.zone.clone());
        out.status
            .labels
            .insert(cloud_types::requirements::keys::CAPACITY_TYPE.to_string(), vm.capacity_type.to_string());
        out.status
            .labels
            .insert(cloud_types::requirements::keys::INSTANCE_TYPE.to_string(), vm.sku.clone());
        out.status
            .labels
            .insert(cloud_types::requirements::keys::SKU_FAMILY.to_string(), cloud_types::instance_type::sku_family(&vm.sku));
        out.status.machine_resource_id = None;
        out.status.nic_resource_id = Some(vm.nic_id.clone());
        out
    }

    fn vm_to_claim_minimal(&self, vm: &VmDescription) -> NodeClaim {
        let mut claim = NodeClaim { name: vm.name.clone(), ..Default::default() };
        claim.status.provider_id = Some(self.provider_id(&vm.name));
        claim.status.image_id = Some(vm.image_version.clone());
        claim.status.nic_resource_id = Some(vm.nic_id.clone());
        claim.status.labels.insert(cloud_types::requirements::keys::ZONE.to_string(), vm.zone.clone());
        claim
            .status
            .labels
            .insert(cloud_types::requirements::keys::CAPACITY_TYPE.to_string(), vm.capacity_type.to_string());
        claim
    }
}

fn nic_name(claim_name: &str) -> String {
    format!("{claim_name}-nic")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeVmApi {
        created_nics: Mutex<Vec<String>>,
        deleted_nics: Mutex<Vec<String>>,
        fail_create_vm: bool,
    }

    #[async_trait]
    impl VmApiClient for FakeVmApi {
        async fn create_nic(&self, spec: &NicSpec) -> Result<String, RawCloudError> {
            self.created_nics.lock().unwrap().push(spec.name.clone());
            Ok(format!("nic-for-{}", spec.name))
        }
        async fn delete_nic(&self, nic_id: &str) -> Result<(), RawCloudError> {
            self.deleted_nics.lock().unwrap().push(nic_id.to_string());
            Ok(())
        }
        async fn create_vm(&self, spec: &VmSpec) -> Result<VmDescription, RawCloudError> {
            if self.fail_create_vm {
                return Err(RawCloudError::new("AllocationFailed", "no capacity"));
            }
            Ok(VmDescription {
                provider_id: String::new(),
                name: spec.name.clone(),
                zone: spec.zone.clone(),
                sku: spec.sku.clone(),
                capacity_type: spec.capacity_type,
                image_version: spec.image.version().to_string(),
                nic_id: spec.nic_id.clone(),
                tags: spec.tags.clone(),
            })
        }
        async fn get_vm(&self, _name: &str) -> Result<Option<VmDescription>, RawCloudError> {
            Ok(None)
        }
        async fn list_vms(&self) -> Result<Vec<VmDescription>, RawCloudError> {
            Ok(vec![])
        }
        async fn delete_vm(&self, _name: &str) -> Result<(), RawCloudError> {
            Ok(())
        }
    }

    fn instance_type() -> InstanceType {
        InstanceType {
            name: "Standard_D2_v2".to_string(),
            architecture: cloud_types::Architecture::Amd64,
            os: vec![cloud_types::OperatingSystem::Linux],
            capacity: Default::default(),
            allocatable: Default::default(),
            accelerated_networking: false,
            premium_storage: false,
            max_ephemeral_os_disk_gib: Some(50),
            max_cache_os_disk_gib: None,
            gpu: None,
            offerings: vec![],
        }
    }

    fn image() -> ImageReference {
        ImageReference::CommunityGallery { gallery: "aks".to_string(), image: "ubuntu".to_string(), version: "1.0.0".to_string() }
    }

    #[tokio::test]
    async fn create_failure_cleans_up_the_nic() {
        let client = Arc::new(FakeVmApi { fail_create_vm: true, ..Default::default() });
        let provider = VmProvider::new(client.clone(), "sub", "rg");
        let claim = NodeClaim { name: "node-1".to_string(), ..Default::default() };
        let result = provider
            .create(&claim, &instance_type(), "1", CapacityType::Spot, &image(), None, "#!/bin/sh".to_string(), vec![], None, Default::default())
            .await;
        assert!(result.is_err());
        assert_eq!(client.deleted_nics.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn successful_create_populates_provider_id_and_labels() {
        let client = Arc::new(FakeVmApi::default());
        let provider = VmProvider::new(client, "sub", "rg");
        let claim = NodeClaim { name: "node-1".to_string(), ..Default::default() };
        let result = provider
            .create(&claim, &instance_type(), "1", CapacityType::Spot, &image(), None, "#!/bin/sh".to_string(), vec![], None, Default::default())
            .await
            .unwrap();
        assert!(result.status.provider_id.unwrap().contains("node-1"));
        assert_eq!(result.status.labels.get(cloud_types::requirements::keys::ZONE).unwrap(), "1");
    }
}
