//! Domain types shared by every crate in the node-provisioning core.
//!
//! This mirrors the role `kubelet::pod`/`kubelet::node` play in krustlet: plain
//! data types plus a handful of conversions, with no I/O of their own.

pub mod instance_type;
pub mod nodeclaim;
pub mod nodeclass;
pub mod nodepool;
pub mod provider_id;
pub mod requirements;
pub mod tags;

pub use instance_type::{Architecture, CapacityType, Gpu, InstanceType, Offering, OperatingSystem};
pub use nodeclaim::{NodeClaim, NodeClaimStatus};
pub use nodeclass::{AKSNodeClass, AksNodeClassSpec, AksNodeClassStatus, ImageFamily};
pub use nodepool::{NodePool, NodePoolSpec};
pub use provider_id::ProviderId;
pub use requirements::{Operator, Requirement, Requirements};
