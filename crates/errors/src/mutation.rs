//! Cache mutation side-effects of a classified provisioning failure
//! (spec.md §4.5 table, middle column; §7 "cache write precedes the error
//! return").

use crate::classifier::ProvisioningErrorKind;
use cloud_types::{CapacityType, InstanceType};
use offerings_cache::{OfferingKey, UnavailableOfferingsCache, DEFAULT_TTL};

/// Apply the cache mutation prescribed for `kind`, given the SKU/zone/
/// capacity-type of the failed attempt and the full catalog of instance
/// types (needed for the family-wide broadening rules).
pub fn apply_cache_mutation(
    kind: ProvisioningErrorKind,
    failing_sku: &InstanceType,
    zone: &str,
    capacity_type: CapacityType,
    all_instance_types: &[InstanceType],
    cache: &UnavailableOfferingsCache,
) {
    use ProvisioningErrorKind::*;
    match kind {
        LowPriorityCoresQuota => {
            cache.mark_unavailable(OfferingKey::new(&failing_sku.name, zone, CapacityType::Spot), DEFAULT_TTL);
        }
        RegionalCoresQuota => {
            // Surfaced as ICE with no local retry, but we still prune the
            // region-wide exhausted combination so the next round doesn't
            // repeat the doomed call.
            for zone in zones_of(failing_sku) {
                for ct in CapacityType::ALL {
                    cache.mark_unavailable(OfferingKey::new(&failing_sku.name, &zone, ct), DEFAULT_TTL);
                }
            }
        }
        SkuFamilyQuotaExceeded | SkuFamilyQuotaZero => {
            let family = failing_sku.family();
            for sku in all_instance_types.iter().filter(|t| t.family() == family) {
                for zone in zones_of(sku) {
                    cache.mark_unavailable(OfferingKey::new(&sku.name, &zone, capacity_type), DEFAULT_TTL);
                }
            }
        }
        OverconstrainedZonal | OverconstrainedAllocation | AllocationFailed => {
            cache.mark_unavailable(OfferingKey::new(&failing_sku.name, zone, CapacityType::Spot), DEFAULT_TTL);
        }
        ZonalAllocationFailed => {
            let family = failing_sku.family();
            let min_vcpus = failing_sku.vcpus();
            for sku in all_instance_types
                .iter()
                .filter(|t| t.family() == family && t.vcpus() >= min_vcpus)
            {
                for ct in CapacityType::ALL {
                    cache.mark_unavailable(OfferingKey::new(&sku.name, zone, ct), DEFAULT_TTL);
                }
            }
        }
        SkuNotAvailable => {
            for zone in zones_of(failing_sku) {
                cache.mark_unavailable(OfferingKey::new(&failing_sku.name, &zone, capacity_type), DEFAULT_TTL);
            }
        }
        Generic => {}
    }
}

fn zones_of(sku: &InstanceType) -> Vec<String> {
    let mut zones: Vec<String> = sku.offerings.iter().map(|o| o.zone.clone()).collect();
    zones.sort();
    zones.dedup();
    zones
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloud_types::instance_type::{Architecture, OperatingSystem, Resources};
    use cloud_types::Offering;

    fn sku(name: &str, vcpus: u64, zones: &[&str]) -> InstanceType {
        let offerings = zones
            .iter()
            .flat_map(|z| {
                CapacityType::ALL.iter().map(move |ct| Offering {
                    zone: z.to_string(),
                    capacity_type: *ct,
                    price: 1.0,
                    available: true,
                })
            })
            .collect();
        InstanceType {
            name: name.to_string(),
            architecture: Architecture::Amd64,
            os: vec![OperatingSystem::Linux],
            capacity: Resources { cpu_millicores: vcpus * 1000, ..Default::default() },
            allocatable: Resources::default(),
            accelerated_networking: false,
            premium_storage: false,
            max_ephemeral_os_disk_gib: None,
            max_cache_os_disk_gib: None,
            gpu: None,
            offerings,
        }
    }

    #[test]
    fn zonal_allocation_failed_broadens_to_same_family_higher_vcpus() {
        let d2 = sku("Standard_D2_v2", 2, &["1", "2"]);
        let d4 = sku("Standard_D4_v2", 4, &["1", "2"]);
        let d1 = sku("Standard_D1_v2", 1, &["1", "2"]);
        let other_family = sku("Standard_F2s_v2", 2, &["1", "2"]);
        let all = vec![d2.clone(), d4.clone(), d1.clone(), other_family.clone()];
        let cache = UnavailableOfferingsCache::new();

        apply_cache_mutation(ProvisioningErrorKind::ZonalAllocationFailed, &d2, "1", CapacityType::Spot, &all, &cache);

        assert!(cache.contains(&OfferingKey::new("Standard_D2_v2", "1", CapacityType::Spot)));
        assert!(cache.contains(&OfferingKey::new("Standard_D2_v2", "1", CapacityType::OnDemand)));
        assert!(cache.contains(&OfferingKey::new("Standard_D4_v2", "1", CapacityType::Spot)));
        assert!(!cache.contains(&OfferingKey::new("Standard_D1_v2", "1", CapacityType::Spot)), "lower vcpu sibling must not be pruned");
        assert!(!cache.contains(&OfferingKey::new("Standard_F2s_v2", "1", CapacityType::Spot)), "other family must not be pruned");
        assert!(!cache.contains(&OfferingKey::new("Standard_D2_v2", "2", CapacityType::Spot)), "other zone must not be pruned");
    }

    #[test]
    fn low_priority_cores_quota_only_marks_spot() {
        let d2 = sku("Standard_D2_v2", 2, &["1"]);
        let cache = UnavailableOfferingsCache::new();
        apply_cache_mutation(ProvisioningErrorKind::LowPriorityCoresQuota, &d2, "1", CapacityType::Spot, &[d2.clone()], &cache);
        assert!(cache.contains(&OfferingKey::new("Standard_D2_v2", "1", CapacityType::Spot)));
        assert!(!cache.contains(&OfferingKey::new("Standard_D2_v2", "1", CapacityType::OnDemand)));
    }

    #[test]
    fn generic_leaves_cache_untouched() {
        let d2 = sku("Standard_D2_v2", 2, &["1"]);
        let cache = UnavailableOfferingsCache::new();
        apply_cache_mutation(ProvisioningErrorKind::Generic, &d2, "1", CapacityType::Spot, &[d2.clone()], &cache);
        assert!(!cache.contains(&OfferingKey::new("Standard_D2_v2", "1", CapacityType::Spot)));
    }

    #[test]
    fn sku_not_available_marks_every_zone_of_the_region() {
        let d2 = sku("Standard_D2_v2", 2, &["1", "2", "3"]);
        let cache = UnavailableOfferingsCache::new();
        apply_cache_mutation(ProvisioningErrorKind::SkuNotAvailable, &d2, "1", CapacityType::OnDemand, &[d2.clone()], &cache);
        for z in ["1", "2", "3"] {
            assert!(cache.contains(&OfferingKey::new("Standard_D2_v2", z, CapacityType::OnDemand)));
            assert!(!cache.contains(&OfferingKey::new("Standard_D2_v2", z, CapacityType::Spot)), "must not mark the other capacity-type");
        }
    }
}
