//! The `CloudProvider` façade (spec.md §4.1): Create/Get/List/Delete/
//! IsDrifted, routing per-NodeClaim between the VM and managed-machine
//! back-ends and running the provisioning retry strategy (spec.md §4.5).

pub mod events;
pub mod settings;

use cloud_types::nodeclass::ConditionStatus;
use cloud_types::provider_id::Backend;
use cloud_types::requirements::keys;
use cloud_types::{AKSNodeClass, CapacityType, InstanceType, NodeClaim, ProviderId};
use errors::{apply_cache_mutation, ErrorClassifier, ProvisioningError};
use events::{DedupingEventRecorder, EventRecorder, EventSubject, ProvisioningEvent};
use images::ImageProvider;
use instance_types::InstanceTypeProvider;
use machine_provider::{MachineCreateError, MachineProvider, MachineSpec, OsDiskKind};
use offerings_cache::UnavailableOfferingsCache;
use settings::{ProvisionMode, Settings};
use std::collections::BTreeMap;
use std::sync::Arc;
use vm_provider::VmProvider;

/// Everything `Create` needs beyond the `NodeClaim` itself: the resolved
/// NodeClass and the name of the owning NodePool (for event emission).
/// CRD fetching is out of scope (spec.md §1), so callers resolve these via
/// their own `kube::Api` before calling in.
pub struct CreateContext<'a> {
    pub node_class: &'a AKSNodeClass,
    pub nodepool_name: &'a str,
    pub bootstrap_script: String,
}

pub struct CloudProvider<R: EventRecorder> {
    settings: Settings,
    instance_types: Arc<InstanceTypeProvider>,
    offerings_cache: Arc<UnavailableOfferingsCache>,
    image_provider: Arc<dyn ImageProvider>,
    classifier: Arc<dyn ErrorClassifier>,
    vm_provider: Arc<VmProvider>,
    machine_provider: Arc<MachineProvider>,
    events: DedupingEventRecorder<R>,
}

impl<R: EventRecorder> CloudProvider<R> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        settings: Settings,
        instance_types: Arc<InstanceTypeProvider>,
        offerings_cache: Arc<UnavailableOfferingsCache>,
        image_provider: Arc<dyn ImageProvider>,
        classifier: Arc<dyn ErrorClassifier>,
        vm_provider: Arc<VmProvider>,
        machine_provider: Arc<MachineProvider>,
        event_recorder: R,
        event_dedup_window: std::time::Duration,
    ) -> Self {
        Self {
            settings,
            instance_types,
            offerings_cache,
            image_provider,
            classifier,
            vm_provider,
            machine_provider,
            events: DedupingEventRecorder::new(event_recorder, event_dedup_window),
        }
    }

    /// spec.md §4.1 Create.
    #[tracing::instrument(skip(self, claim, ctx), fields(name = %claim.name))]
    pub async fn create(&self, claim: &NodeClaim, ctx: CreateContext<'_>) -> Result<NodeClaim, ProvisioningError> {
        let result = self.create_inner(claim, &ctx).await;
        if let Err(err) = &result {
            self.events.record(ProvisioningEvent::new(EventSubject::NodeClaim(claim.name.clone()), err.reason(), err.truncated_message()));
        }
        result
    }

    async fn create_inner(&self, claim: &NodeClaim, ctx: &CreateContext<'_>) -> Result<NodeClaim, ProvisioningError> {
        let node_class_status = ctx.node_class.status.as_ref();
        let is_ready = node_class_status.map(|s| s.is_ready()).unwrap_or(ConditionStatus::Unknown);
        if is_ready == ConditionStatus::Unknown {
            return Err(ProvisioningError::NodeClassNotReady);
        }

        let instance_types = self
            .instance_types
            .list_for_nodeclass(ctx.node_class)
            .await
            .map_err(ProvisioningError::CreateFailed)?;

        let candidates = self.select_candidates(claim, &instance_types);
        let Some((instance_type, zone, capacity_type)) = candidates.into_iter().next() else {
            return Err(ProvisioningError::InsufficientCapacity(format!(
                "no viable offering for NodeClaim {:?} after requirements and cache filtering",
                claim.name
            )));
        };

        let kubernetes_version = node_class_status.map(|s| s.kubernetes_version.as_str()).unwrap_or_default();
        let images = self
            .image_provider
            .resolve(ctx.node_class, kubernetes_version)
            .await
            .map_err(|e| ProvisioningError::CreateFailed(e.into()))?;
        let image = images.first().ok_or_else(|| {
            ProvisioningError::CreateFailed(anyhow::anyhow!("ImageProvider resolved no candidate images for {:?}", ctx.node_class.spec.image_family))
        })?;

        let tags = cloud_types::tags::merge_with_owner_tags(&ctx.node_class.spec.tags, &self.settings.cluster_name, ctx.nodepool_name);

        // Resolved up front (rather than inside the match below) so a
        // rejected image reference surfaces as CreateFailed without being
        // mistaken for a classifiable cloud error (spec.md §9 "must fail
        // loudly").
        let machine_image_version = if matches!(self.settings.provision_mode, ProvisionMode::Managed) {
            Some(images::require_sig_reference(image).map_err(|e| ProvisioningError::CreateFailed(e.into()))?)
        } else {
            None
        };

        let created: Result<NodeClaim, (errors::RawCloudError, bool)> = match self.settings.provision_mode {
            ProvisionMode::Vm => self
                .vm_provider
                .create(
                    claim,
                    &instance_type,
                    &zone,
                    capacity_type,
                    image,
                    Some(ctx.node_class.spec.os_disk_size_gb as u32),
                    ctx.bootstrap_script.clone(),
                    self.settings.node_identities.clone(),
                    self.settings.ssh_public_key.clone(),
                    tags,
                )
                .await
                .map_err(|vm_provider::VmCreateError::Cloud(raw)| (raw, false)),
            ProvisionMode::Managed => {
                let spec = MachineSpec {
                    name: claim.name.clone(),
                    zone: zone.clone(),
                    sku: instance_type.name.clone(),
                    capacity_type,
                    image_version: machine_image_version.expect("computed above for managed mode"),
                    os_disk_kind: OsDiskKind::Managed,
                    os_disk_size_gib: ctx.node_class.spec.os_disk_size_gb as u32,
                    tags,
                };
                self.machine_provider.create(claim, spec).await.map_err(|e| match e {
                    MachineCreateError::PoolMissing => (errors::RawCloudError::new("PoolNotFound", "agent pool does not exist"), true),
                    MachineCreateError::Api(machine_provider::MachineApiError::Cloud(raw)) => (raw, false),
                    MachineCreateError::Api(machine_provider::MachineApiError::PoolNotFound) => {
                        (errors::RawCloudError::new("PoolNotFound", "agent pool does not exist"), true)
                    }
                })
            }
        };

        match created {
            Ok(mut claim) => {
                enrich_labels(&mut claim, &instance_type);
                Ok(claim)
            }
            Err((raw, skip_classification)) => {
                if skip_classification {
                    return Err(ProvisioningError::CreateFailed(raw.into()));
                }
                let kind = self.classifier.classify(&raw);
                apply_cache_mutation(kind, &instance_type, &zone, capacity_type, &instance_types, &self.offerings_cache);
                // spec.md §4.5/§7: these kinds surface as ICE ("try later with
                // different requirements"), not a generic create failure.
                use errors::ProvisioningErrorKind::*;
                match kind {
                    RegionalCoresQuota | SkuFamilyQuotaExceeded | SkuFamilyQuotaZero | SkuNotAvailable => {
                        Err(ProvisioningError::InsufficientCapacity(raw.to_string()))
                    }
                    _ => Err(ProvisioningError::CreateFailed(raw.into())),
                }
            }
        }
    }

    /// Intersect viable offerings with `claim`'s requirements, drop cache-
    /// unavailable entries, and order by capacity-type preference (on-
    /// demand before spot) then ascending price (spec.md §4.1 steps 3-5).
    fn select_candidates(&self, claim: &NodeClaim, instance_types: &[InstanceType]) -> Vec<(InstanceType, String, CapacityType)> {
        let mut candidates = Vec::new();
        for instance_type in instance_types {
            if !claim.requirements.compatible(keys::INSTANCE_TYPE, &instance_type.name) {
                continue;
            }
            if !claim.requirements.compatible(keys::ARCH, instance_type.architecture.as_str()) {
                continue;
            }
            for offering in &instance_type.offerings {
                if !offering.available {
                    continue;
                }
                if !claim.requirements.compatible(keys::ZONE, &offering.zone) {
                    continue;
                }
                if !claim.requirements.compatible(keys::CAPACITY_TYPE, offering.capacity_type.as_str()) {
                    continue;
                }
                candidates.push((instance_type.clone(), offering.zone.clone(), offering.capacity_type, offering.price));
            }
        }
        candidates.sort_by(|a, b| {
            capacity_type_rank(a.2).cmp(&capacity_type_rank(b.2)).then(a.3.partial_cmp(&b.3).unwrap_or(std::cmp::Ordering::Equal))
        });
        candidates.into_iter().map(|(it, zone, ct, _)| (it, zone, ct)).collect()
    }

    /// spec.md §4.1 Get: query the inferred back-end first, fall through to
    /// the other on not-found (mixed-fleet support).
    #[tracing::instrument(skip(self))]
    pub async fn get(&self, provider_id: &str) -> Result<NodeClaim, ProvisioningError> {
        let parsed = ProviderId::parse(provider_id).map_err(|_| ProvisioningError::NodeClaimNotFound)?;
        let (primary, fallback): (Backend, Backend) = match parsed.backend {
            Backend::Vm => (Backend::Vm, Backend::Machine),
            Backend::Machine => (Backend::Machine, Backend::Vm),
        };
        if let Some(claim) = self.get_from_backend(primary, &parsed.name).await.map_err(ProvisioningError::CreateFailed)? {
            return Ok(claim);
        }
        self.get_from_backend(fallback, &parsed.name)
            .await
            .map_err(ProvisioningError::CreateFailed)?
            .ok_or(ProvisioningError::NodeClaimNotFound)
    }

    async fn get_from_backend(&self, backend: Backend, name: &str) -> anyhow::Result<Option<NodeClaim>> {
        match backend {
            Backend::Vm => Ok(self.vm_provider.get(name).await?),
            Backend::Machine => Ok(self.machine_provider.get(name).await?),
        }
    }

    /// spec.md §4.1 List: query both back-ends unconditionally, union by
    /// providerID (mixed-fleet support).
    #[tracing::instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<NodeClaim>, ProvisioningError> {
        let mut vms = self.vm_provider.list().await.map_err(|e| ProvisioningError::CreateFailed(e.into()))?;
        let machines = self.machine_provider.list().await.map_err(|e| ProvisioningError::CreateFailed(e.into()))?;
        vms.extend(machines);
        Ok(vms)
    }

    /// spec.md §4.1 Delete: back-end chosen by the presence of the machine
    /// annotation. "Already gone" maps to `NodeClaimNotFound` (idempotent).
    #[tracing::instrument(skip(self, claim), fields(name = %claim.name))]
    pub async fn delete(&self, claim: &NodeClaim) -> Result<(), ProvisioningError> {
        if claim.status.machine_resource_id.is_some() {
            return match self.machine_provider.delete(&claim.name).await {
                Ok(()) => Ok(()),
                Err(machine_provider::MachineApiError::PoolNotFound) => Err(ProvisioningError::NodeClaimNotFound),
                Err(machine_provider::MachineApiError::Cloud(raw)) => Err(ProvisioningError::CreateFailed(raw.into())),
            };
        }

        let nic_id = claim.status.nic_resource_id.clone().unwrap_or_default();
        match self.vm_provider.delete(&claim.name, &nic_id).await {
            Ok(()) => Ok(()),
            Err(raw) => {
                if self.classifier.classify(&raw) == errors::ProvisioningErrorKind::Generic && looks_like_not_found(&raw) {
                    Err(ProvisioningError::NodeClaimNotFound)
                } else {
                    Err(ProvisioningError::CreateFailed(raw.into()))
                }
            }
        }
    }

    /// spec.md §4.1 IsDrifted / §4.6.
    pub fn is_drifted(&self, claim: &NodeClaim, drift_ctx: &drift::ProvisionContext<'_>) -> Result<drift::DriftReason, ProvisioningError> {
        drift::is_drifted(claim, drift_ctx).map_err(|e| ProvisioningError::CreateFailed(e.into()))
    }
}

fn capacity_type_rank(ct: CapacityType) -> u8 {
    match ct {
        CapacityType::OnDemand => 0,
        CapacityType::Spot => 1,
    }
}

fn enrich_labels(claim: &mut NodeClaim, instance_type: &InstanceType) {
    claim.status.labels.insert(keys::ARCH.to_string(), instance_type.architecture.as_str().to_string());
    if let Some(os) = instance_type.os.first() {
        claim.status.labels.insert(keys::OS.to_string(), os.as_str().to_string());
    }
    claim.status.capacity = resources_to_map(&instance_type.capacity);
    claim.status.allocatable = resources_to_map(&instance_type.allocatable);
}

fn resources_to_map(resources: &cloud_types::instance_type::Resources) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    map.insert("cpu_millicores".to_string(), resources.cpu_millicores.to_string());
    map.insert("memory_bytes".to_string(), resources.memory_bytes.to_string());
    map.insert("ephemeral_storage_bytes".to_string(), resources.ephemeral_storage_bytes.to_string());
    map.insert("pods".to_string(), resources.pods.to_string());
    map
}

/// Best-effort heuristic for "the VM is already gone" on the delete path;
/// a real cloud SDK error exposes a structured 404 that this would key off
/// of instead (spec.md §9: back-ends are external collaborators here).
fn looks_like_not_found(err: &errors::RawCloudError) -> bool {
    err.message.to_lowercase().contains("not found") || err.code.as_deref() == Some("NotFound")
}
