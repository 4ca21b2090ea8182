//! The managed-machine ("agent pool") API, consumed as an external
//! collaborator. The pool is a singleton; machines are nodes under it.

use async_trait::async_trait;
use errors::RawCloudError;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OsDiskKind {
    Managed,
    Ephemeral,
}

#[derive(Clone, Debug)]
pub struct MachineSpec {
    pub name: String,
    pub zone: String,
    pub sku: String,
    pub capacity_type: cloud_types::CapacityType,
    /// Must resolve to an SIG node-image version string (spec.md §4.4).
    pub image_version: String,
    pub os_disk_kind: OsDiskKind,
    pub os_disk_size_gib: u32,
    pub tags: std::collections::BTreeMap<String, String>,
}

impl MachineSpec {
    /// The essential spec compared during the "already exists" race
    /// (spec.md §4.4, §9): SKU, zone, capacity-type.
    pub fn essentially_matches(&self, other: &MachineDescription) -> bool {
        self.sku == other.sku && self.zone == other.zone && self.capacity_type == other.capacity_type
    }
}

#[derive(Clone, Debug)]
pub struct MachineDescription {
    pub name: String,
    pub zone: String,
    pub sku: String,
    pub capacity_type: cloud_types::CapacityType,
    pub image_version: String,
    pub resource_id: String,
    pub drift: DriftSignal,
}

#[derive(Clone, Debug, Default)]
pub struct DriftSignal {
    pub recreate: bool,
    pub reason: Option<String>,
}

#[derive(Debug)]
pub enum MachineCreateOutcome {
    Started(MachineOperation),
    /// begin-create indicated the machine already exists (spec.md §4.4
    /// "already exists" race).
    AlreadyExists(MachineDescription),
}

#[derive(Clone, Debug)]
pub struct MachineOperation {
    pub name: String,
}

#[derive(Debug, Error)]
pub enum MachineApiError {
    /// The agent pool itself does not exist. Treated as "empty list" for
    /// Get/List/Delete, but Create must fail fast (spec.md §4.4).
    #[error("agent pool does not exist")]
    PoolNotFound,
    #[error(transparent)]
    Cloud(#[from] RawCloudError),
}

#[async_trait]
pub trait MachineApiClient: Send + Sync {
    /// Returns immediately; may fail synchronously (spec.md §4.4 "sync/
    /// initial failure") or report the machine already exists.
    async fn begin_create_machine(&self, spec: &MachineSpec) -> Result<MachineCreateOutcome, MachineApiError>;
    /// Polls `operation` to a terminal state. A provisioning error body in
    /// the poll response is the "async/LRO failure" case.
    async fn poll_create(&self, operation: &MachineOperation) -> Result<MachineDescription, MachineApiError>;
    async fn get_machine(&self, name: &str) -> Result<Option<MachineDescription>, MachineApiError>;
    async fn list_machines(&self) -> Result<Vec<MachineDescription>, MachineApiError>;
    /// The pool's delete-machines endpoint; used both for normal deletion
    /// and for cleaning up a half-built machine after a failed create.
    async fn delete_machines(&self, names: &[String]) -> Result<(), MachineApiError>;
}
