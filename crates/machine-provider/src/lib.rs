//! Managed-machine back-end `InstanceProvider` (spec.md §4.4).

pub mod client;
pub mod provider;

pub use client::{
    DriftSignal, MachineApiClient, MachineApiError, MachineCreateOutcome, MachineDescription, MachineOperation, MachineSpec, OsDiskKind,
};
pub use provider::{MachineCreateError, MachineProvider};
