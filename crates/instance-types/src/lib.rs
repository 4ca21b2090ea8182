//! `InstanceTypeProvider` (spec.md §4.2): enumerates SKUs, annotates each
//! with zones, capabilities, price, and a filtered set of viable offerings.

mod catalog;
mod overhead;

pub use catalog::{SkuCatalogClient, SkuDescription};
pub use overhead::ResourceOverhead;

use async_trait::async_trait;
use cloud_types::nodeclass::ImageFamily;
use cloud_types::{
    instance_type::Resources, AKSNodeClass, Architecture, CapacityType, InstanceType, Offering, OperatingSystem,
};
use offerings_cache::{OfferingKey, UnavailableOfferingsCache};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Default SKU catalog refresh interval (spec.md §4.2 step 1: "short TTL").
pub const CATALOG_TTL: Duration = Duration::from_secs(5 * 60);

struct CatalogCache {
    refreshed_at: Option<Instant>,
    skus: Vec<SkuDescription>,
}

/// Enumerates viable `InstanceType`s for a `NodeClass`, subject to the
/// region's zones and the unavailable-offerings cache.
pub struct InstanceTypeProvider {
    client: Arc<dyn SkuCatalogClient>,
    offerings_cache: Arc<UnavailableOfferingsCache>,
    region: String,
    region_zones: Vec<String>,
    overhead: ResourceOverhead,
    ttl: Duration,
    cache: Mutex<CatalogCache>,
}

impl InstanceTypeProvider {
    pub fn new(
        client: Arc<dyn SkuCatalogClient>,
        offerings_cache: Arc<UnavailableOfferingsCache>,
        region: impl Into<String>,
        region_zones: Vec<String>,
        overhead: ResourceOverhead,
    ) -> Self {
        Self {
            client,
            offerings_cache,
            region: region.into(),
            region_zones,
            overhead,
            ttl: CATALOG_TTL,
            cache: Mutex::new(CatalogCache { refreshed_at: None, skus: Vec::new() }),
        }
    }

    /// Fetch the SKU catalog, refreshing if the cached copy is stale.
    /// Single-flight: callers racing a refresh share one in-flight fetch
    /// because they all contend on the same `Mutex`.
    #[tracing::instrument(skip(self))]
    async fn catalog(&self) -> anyhow::Result<Vec<SkuDescription>> {
        let mut cache = self.cache.lock().await;
        let stale = match cache.refreshed_at {
            Some(t) => t.elapsed() > self.ttl,
            None => true,
        };
        if stale {
            let fresh = self.client.list_skus(&self.region).await?;
            cache.skus = fresh;
            cache.refreshed_at = Some(Instant::now());
        }
        Ok(cache.skus.clone())
    }

    /// List viable `InstanceType`s for `node_class` (spec.md §4.2).
    #[tracing::instrument(skip(self, node_class))]
    pub async fn list_for_nodeclass(&self, node_class: &AKSNodeClass) -> anyhow::Result<Vec<InstanceType>> {
        let skus = self.catalog().await?;
        let wants_os = match node_class.spec.image_family {
            ImageFamily::Windows2022 => OperatingSystem::Windows,
            ImageFamily::Ubuntu2204 | ImageFamily::AzureLinux => OperatingSystem::Linux,
        };

        let mut out = Vec::with_capacity(skus.len());
        for sku in skus.iter().filter(|s| s.os.contains(&wants_os)) {
            out.push(self.build_instance_type(sku));
        }
        Ok(out)
    }

    fn build_instance_type(&self, sku: &SkuDescription) -> InstanceType {
        let zones = self.zonal_availability(sku);
        let offerings = self.offerings_for(sku, &zones);
        let capacity = Resources {
            cpu_millicores: sku.vcpus * 1000,
            memory_bytes: gib_to_bytes(sku.memory_gib),
            ephemeral_storage_bytes: gib_to_bytes(sku.max_ephemeral_os_disk_gib.unwrap_or(0) as f64),
            pods: sku.max_pods,
        };
        let allocatable = self.overhead.allocatable(&capacity);
        InstanceType {
            name: sku.name.clone(),
            architecture: sku.architecture,
            os: sku.os.clone(),
            capacity,
            allocatable,
            accelerated_networking: sku.accelerated_networking,
            premium_storage: sku.premium_storage,
            max_ephemeral_os_disk_gib: sku.max_ephemeral_os_disk_gib,
            max_cache_os_disk_gib: sku.max_cache_os_disk_gib,
            gpu: sku.gpu.clone(),
            offerings,
        }
    }

    /// Intersect the SKU's zone list with the region's zones (spec.md §4.2
    /// step 4). Regions without zones produce a single empty-zone entry.
    fn zonal_availability(&self, sku: &SkuDescription) -> Vec<String> {
        if self.region_zones.is_empty() {
            return vec![String::new()];
        }
        sku.zones.iter().filter(|z| self.region_zones.contains(z)).cloned().collect()
    }

    fn offerings_for(&self, sku: &SkuDescription, zones: &[String]) -> Vec<Offering> {
        let mut offerings = Vec::with_capacity(zones.len() * CapacityType::ALL.len());
        for zone in zones {
            for capacity_type in CapacityType::ALL {
                let key = OfferingKey::new(&sku.name, zone, capacity_type);
                let available = !self.offerings_cache.contains(&key);
                let price = match capacity_type {
                    CapacityType::OnDemand => sku.price_on_demand,
                    CapacityType::Spot => sku.price_spot,
                };
                offerings.push(Offering { zone: zone.clone(), capacity_type, price, available });
            }
        }
        offerings
    }
}

fn gib_to_bytes(gib: f64) -> u64 {
    (gib * 1024.0 * 1024.0 * 1024.0) as u64
}

/// Supports the VM back-end's ephemeral-disk placement rule (spec.md §4.3):
/// choose NVMe if available and big enough, else cache, else managed.
pub fn select_ephemeral_disk_placement(
    instance_type: &InstanceType,
    max_cache_os_disk_gib: Option<u32>,
    requested_os_disk_size_gib: Option<u32>,
) -> EphemeralDiskPlacement {
    const MANAGED_DISK_MINIMUM_GIB: u32 = 128;
    let requested = requested_os_disk_size_gib.unwrap_or(MANAGED_DISK_MINIMUM_GIB);
    if let Some(max) = instance_type.max_ephemeral_os_disk_gib {
        if requested <= max {
            return EphemeralDiskPlacement::Nvme;
        }
    }
    if let Some(max) = max_cache_os_disk_gib {
        if requested <= max {
            return EphemeralDiskPlacement::Cache;
        }
    }
    EphemeralDiskPlacement::Managed { size_gib: requested.max(MANAGED_DISK_MINIMUM_GIB) }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EphemeralDiskPlacement {
    Nvme,
    Cache,
    Managed { size_gib: u32 },
}

#[async_trait]
impl SkuCatalogClient for Arc<dyn SkuCatalogClient> {
    async fn list_skus(&self, region: &str) -> anyhow::Result<Vec<SkuDescription>> {
        (**self).list_skus(region).await
    }
}
