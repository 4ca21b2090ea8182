//! Subtracts known-unschedulable resource overhead from a SKU's reported
//! capacity to obtain allocatable (spec.md §4.2 step 6).

use cloud_types::instance_type::Resources;

/// Percentage/flat overheads subtracted when computing allocatable
/// resources. `vm_memory_overhead_percent` comes straight from the
/// `vmMemoryOverheadPercent` configuration key (spec.md §6).
#[derive(Clone, Copy, Debug)]
pub struct ResourceOverhead {
    pub vm_memory_overhead_percent: f64,
    pub kube_reserved_cpu_millicores: u64,
    pub kube_reserved_memory_bytes: u64,
    pub system_reserved_cpu_millicores: u64,
    pub system_reserved_memory_bytes: u64,
}

impl Default for ResourceOverhead {
    fn default() -> Self {
        Self {
            vm_memory_overhead_percent: 0.075,
            kube_reserved_cpu_millicores: 100,
            kube_reserved_memory_bytes: 100 * 1024 * 1024,
            system_reserved_cpu_millicores: 100,
            system_reserved_memory_bytes: 100 * 1024 * 1024,
        }
    }
}

impl ResourceOverhead {
    pub fn allocatable(&self, capacity: &Resources) -> Resources {
        let memory_after_vm_overhead =
            (capacity.memory_bytes as f64 * (1.0 - self.vm_memory_overhead_percent)) as u64;
        Resources {
            cpu_millicores: capacity
                .cpu_millicores
                .saturating_sub(self.kube_reserved_cpu_millicores)
                .saturating_sub(self.system_reserved_cpu_millicores),
            memory_bytes: memory_after_vm_overhead
                .saturating_sub(self.kube_reserved_memory_bytes)
                .saturating_sub(self.system_reserved_memory_bytes),
            ephemeral_storage_bytes: capacity.ephemeral_storage_bytes,
            pods: capacity.pods,
        }
    }
}
