//! `InstanceType` and `Offering` (spec.md §3, §4.2).

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapacityType {
    OnDemand,
    Spot,
}

impl CapacityType {
    pub const ALL: [CapacityType; 2] = [CapacityType::OnDemand, CapacityType::Spot];

    pub fn as_str(self) -> &'static str {
        match self {
            CapacityType::OnDemand => "on-demand",
            CapacityType::Spot => "spot",
        }
    }
}

impl fmt::Display for CapacityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    Amd64,
    Arm64,
}

impl Architecture {
    pub fn as_str(self) -> &'static str {
        match self {
            Architecture::Amd64 => "amd64",
            Architecture::Arm64 => "arm64",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatingSystem {
    Linux,
    Windows,
}

impl OperatingSystem {
    pub fn as_str(self) -> &'static str {
        match self {
            OperatingSystem::Linux => "linux",
            OperatingSystem::Windows => "windows",
        }
    }
}

/// GPU/accelerator capability of a SKU.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Gpu {
    pub manufacturer: String,
    pub name: String,
    pub count: u32,
}

/// `(zone, capacity-type)` availability of a SKU, with price.
///
/// `available` is a point-in-time read of the unavailable-offerings cache;
/// it is not persisted and must be recomputed on every read (spec.md
/// invariant 1 in §8).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Offering {
    /// Empty for non-zonal regions (spec.md §4.2 step 4).
    pub zone: String,
    pub capacity_type: CapacityType,
    pub price: f64,
    pub available: bool,
}

/// Compute resources reported by a SKU, before/after the kubelet/system
/// reservation haircut described in spec.md §4.2 step 6.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Resources {
    pub cpu_millicores: u64,
    pub memory_bytes: u64,
    pub ephemeral_storage_bytes: u64,
    pub pods: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InstanceType {
    pub name: String,
    pub architecture: Architecture,
    pub os: Vec<OperatingSystem>,
    pub capacity: Resources,
    pub allocatable: Resources,
    pub accelerated_networking: bool,
    pub premium_storage: bool,
    pub max_ephemeral_os_disk_gib: Option<u32>,
    pub max_cache_os_disk_gib: Option<u32>,
    pub gpu: Option<Gpu>,
    pub offerings: Vec<Offering>,
}

impl InstanceType {
    /// SKU family, e.g. `Standard_D2_v2` -> `Standard_D_v2`. Used by the
    /// `ZonalAllocationFailed` cache-broadening rule (spec.md §4.5).
    pub fn family(&self) -> String {
        sku_family(&self.name)
    }

    /// The SKU's declared vCPU count, used to compare "members of the same
    /// family with vCPUs >= the failing SKU" (spec.md §4.5).
    pub fn vcpus(&self) -> u64 {
        self.capacity.cpu_millicores / 1000
    }

    pub fn offerings_for(&self, capacity_type: CapacityType) -> impl Iterator<Item = &Offering> {
        self.offerings.iter().filter(move |o| o.capacity_type == capacity_type)
    }
}

/// Parse `Standard_D2_v2` into family `Standard_D_v2`, stripping the numeric
/// core-count segment. Falls back to the whole name if it doesn't match the
/// `Standard_<letters><digits>[_suffix]` shape.
pub fn sku_family(sku_name: &str) -> String {
    let parts: Vec<&str> = sku_name.split('_').collect();
    if let Some(size) = parts.get(1) {
        let letters: String = size.chars().take_while(|c| c.is_alphabetic()).collect();
        if !letters.is_empty() {
            let mut rebuilt = Vec::with_capacity(parts.len());
            rebuilt.push(parts[0].to_string());
            rebuilt.push(letters);
            rebuilt.extend(parts[2..].iter().map(|s| s.to_string()));
            return rebuilt.join("_");
        }
    }
    sku_name.to_string()
}
