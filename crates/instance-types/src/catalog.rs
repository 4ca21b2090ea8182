//! SKU catalog fetch (spec.md §4.2 step 1): consumed as an external
//! collaborator, the cloud's SKU/pricing API.

use async_trait::async_trait;
use cloud_types::instance_type::Gpu;
use cloud_types::{Architecture, OperatingSystem};

/// A single SKU as reported by the cloud's catalog/pricing APIs, before
/// zonal filtering or the unavailable-offerings cache is applied.
#[derive(Clone, Debug)]
pub struct SkuDescription {
    pub name: String,
    pub architecture: Architecture,
    pub os: Vec<OperatingSystem>,
    pub zones: Vec<String>,
    pub vcpus: u64,
    pub memory_gib: f64,
    pub max_pods: u64,
    pub max_ephemeral_os_disk_gib: Option<u32>,
    pub max_cache_os_disk_gib: Option<u32>,
    pub accelerated_networking: bool,
    pub premium_storage: bool,
    pub gpu: Option<Gpu>,
    pub price_on_demand: f64,
    pub price_spot: f64,
}

#[async_trait]
pub trait SkuCatalogClient: Send + Sync {
    /// List every SKU offered in `region`, with zones and capabilities but
    /// without per-nodeclass filtering.
    async fn list_skus(&self, region: &str) -> anyhow::Result<Vec<SkuDescription>>;
}
