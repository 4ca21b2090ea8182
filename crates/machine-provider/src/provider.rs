//! Managed-machine back-end create/get/list/delete (spec.md §4.4).

use crate::client::{MachineApiClient, MachineApiError, MachineCreateOutcome, MachineDescription, MachineSpec};
use cloud_types::provider_id::{Backend, ProviderId};
use cloud_types::NodeClaim;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MachineCreateError {
    /// The agent pool must exist before a machine can be created
    /// (spec.md §4.4: "pool must exist before creating a machine").
    #[error("cannot create a machine: agent pool does not exist")]
    PoolMissing,
    #[error(transparent)]
    Api(#[from] MachineApiError),
}

pub struct MachineProvider {
    client: Arc<dyn MachineApiClient>,
    subscription_id: String,
    resource_group: String,
}

impl MachineProvider {
    pub fn new(client: Arc<dyn MachineApiClient>, subscription_id: impl Into<String>, resource_group: impl Into<String>) -> Self {
        Self { client, subscription_id: subscription_id.into(), resource_group: resource_group.into() }
    }

    #[tracing::instrument(skip(self, claim, spec), fields(name = %claim.name))]
    pub async fn create(&self, claim: &NodeClaim, spec: MachineSpec) -> Result<NodeClaim, MachineCreateError> {
        // At most one delete+retry on an "already exists" spec conflict
        // (spec.md §4.4, §9); a second conflict means something else is
        // racing us and we give up rather than loop forever.
        let mut allow_retry = true;
        loop {
            let outcome = match self.client.begin_create_machine(&spec).await {
                Ok(outcome) => outcome,
                Err(MachineApiError::PoolNotFound) => return Err(MachineCreateError::PoolMissing),
                Err(e) => {
                    self.cleanup(&spec.name).await;
                    return Err(e.into());
                }
            };

            match outcome {
                MachineCreateOutcome::Started(op) => {
                    return match self.client.poll_create(&op).await {
                        Ok(machine) => Ok(self.to_nodeclaim(claim, &machine)),
                        Err(MachineApiError::PoolNotFound) => Err(MachineCreateError::PoolMissing),
                        Err(e) => {
                            self.cleanup(&spec.name).await;
                            Err(e.into())
                        }
                    };
                }
                MachineCreateOutcome::AlreadyExists(existing) => {
                    if spec.essentially_matches(&existing) {
                        // Replay of a prior successful create (spec.md §4.4,
                        // §9 "never leak an orphan").
                        return Ok(self.to_nodeclaim(claim, &existing));
                    }
                    self.cleanup(&spec.name).await;
                    if !allow_retry {
                        return Err(MachineCreateError::Api(MachineApiError::Cloud(errors::RawCloudError::new(
                            "MachineSpecConflict",
                            "existing machine spec differs after retry",
                        ))));
                    }
                    allow_retry = false;
                }
            }
        }
    }

    async fn cleanup(&self, name: &str) {
        if let Err(e) = self.client.delete_machines(&[name.to_string()]).await {
            tracing::warn!(error = %e, name, "failed to clean up half-built machine");
        }
    }

    pub async fn get(&self, name: &str) -> Result<Option<NodeClaim>, MachineApiError> {
        match self.client.get_machine(name).await {
            Ok(m) => Ok(m.map(|m| self.machine_to_claim_minimal(&m))),
            Err(MachineApiError::PoolNotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn list(&self) -> Result<Vec<NodeClaim>, MachineApiError> {
        match self.client.list_machines().await {
            Ok(machines) => Ok(machines.iter().map(|m| self.machine_to_claim_minimal(m)).collect()),
            Err(MachineApiError::PoolNotFound) => Ok(vec![]),
            Err(e) => Err(e),
        }
    }

    pub async fn delete(&self, name: &str) -> Result<(), MachineApiError> {
        match self.client.delete_machines(&[name.to_string()]).await {
            Err(MachineApiError::PoolNotFound) => Ok(()),
            other => other,
        }
    }

    fn provider_id(&self, name: &str) -> String {
        ProviderId::new(&self.subscription_id, &self.resource_group, Backend::Machine, name).to_string()
    }

    fn to_nodeclaim(&self, claim: &NodeClaim, machine: &MachineDescription) -> NodeClaim {
        let mut out = claim.clone();
        out.status.provider_id = Some(self.provider_id(&machine.name));
        out.status.image_id = Some(machine.image_version.clone());
        out.status.machine_resource_id = Some(machine.resource_id.clone());
        out.status.labels.insert(cloud_types::requirements::keys::ZONE.to_string(), machine.zone.clone());
        out.status
            .labels
            .insert(cloud_types::requirements::keys::CAPACITY_TYPE.to_string(), machine.capacity_type.to_string());
        out.status
            .labels
            .insert(cloud_types::requirements::keys::INSTANCE_TYPE.to_string(), machine.sku.clone());
        out
    }

    fn machine_to_claim_minimal(&self, machine: &MachineDescription) -> NodeClaim {
        let mut claim = NodeClaim { name: machine.name.clone(), ..Default::default() };
        claim.status.provider_id = Some(self.provider_id(&machine.name));
        claim.status.image_id = Some(machine.image_version.clone());
        claim.status.machine_resource_id = Some(machine.resource_id.clone());
        claim.status.labels.insert(cloud_types::requirements::keys::ZONE.to_string(), machine.zone.clone());
        claim
    }
}
