//! Drift detector (spec.md §4.6): computes a single drift reason from the
//! NodeClaim, its NodeClass/NodePool, the live node, and (in machine mode)
//! the backing cloud resource's own drift signal.

use cloud_types::nodeclass::{AksNodeClassStatus, CONDITION_IMAGES_READY, CONDITION_KUBERNETES_VERSION_READY};
use cloud_types::requirements::keys;
use cloud_types::NodeClaim;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriftReason {
    NoDrift,
    ImageDrift,
    K8sVersionDrift,
    KubeletIdentityDrift,
    ClusterConfigDrift,
}

#[derive(Debug, Error)]
pub enum DriftError {
    #[error("NodeClaim has no providerID")]
    NoProviderId,
    /// `ImagesReady` is true but NodeClass reports zero resolved images.
    #[error("NodeClass reports ImagesReady with an empty image list")]
    ImagesReadyWithNoImages,
}

/// The backing managed-machine resource's own drift signal (spec.md §3
/// "Drift signal from cloud"), surfaced only in machine mode.
#[derive(Clone, Debug, Default)]
pub struct CloudDriftSignal {
    pub recreate: bool,
    pub reason: Option<ClusterConfigDriftReason>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClusterConfigDriftReason {
    K8sVersionUpgrade,
    NodeImageVersionUpgrade,
    PropertiesUpdated,
}

/// Enough of the live Kubernetes Node object to evaluate drift without
/// depending on a `kube::Api` round-trip (spec.md §1 keeps object-metadata
/// plumbing out of scope).
#[derive(Clone, Debug, Default)]
pub struct LiveNode {
    pub exists: bool,
    pub deleting: bool,
    pub kubelet_version: Option<String>,
    pub labels: std::collections::BTreeMap<String, String>,
}

/// Whether the configured identity is compared against the live node's
/// kubelet-client-id label (spec.md §4.6 step 6, VM mode only).
pub struct ProvisionContext<'a> {
    pub node_class_exists: bool,
    pub nodepool_exists: bool,
    pub node_class_status: Option<&'a AksNodeClassStatus>,
    pub configured_node_class_version: Option<&'a str>,
    pub live_node: Option<&'a LiveNode>,
    pub is_machine_mode: bool,
    pub cloud_drift: Option<&'a CloudDriftSignal>,
    pub configured_kubelet_identity: Option<&'a str>,
}

/// Evaluate drift for `claim`, reporting only the first reason that applies
/// in the fixed precedence order from spec.md §4.6.
#[tracing::instrument(skip_all, fields(name = %claim.name))]
pub fn is_drifted(claim: &NodeClaim, ctx: &ProvisionContext<'_>) -> Result<DriftReason, DriftError> {
    if claim.status.provider_id.is_none() {
        return Err(DriftError::NoProviderId);
    }
    if !ctx.node_class_exists || !ctx.nodepool_exists {
        return Ok(DriftReason::NoDrift);
    }

    if ctx.is_machine_mode {
        if let Some(signal) = ctx.cloud_drift {
            if signal.recreate {
                if let Some(reason) = signal.reason {
                    return Ok(cluster_config_drift_to_reason(reason));
                }
            }
        }
    }

    let Some(status) = ctx.node_class_status else {
        return Ok(DriftReason::NoDrift);
    };

    if status.condition(CONDITION_IMAGES_READY) == cloud_types::nodeclass::ConditionStatus::True {
        if status.images.is_empty() {
            return Err(DriftError::ImagesReadyWithNoImages);
        }
        if let Some(image_id) = &claim.status.image_id {
            if !status.images.contains(image_id) {
                return Ok(DriftReason::ImageDrift);
            }
        }
    }

    if status.condition(CONDITION_KUBERNETES_VERSION_READY) == cloud_types::nodeclass::ConditionStatus::True {
        if let (Some(want), Some(node)) = (ctx.configured_node_class_version, ctx.live_node) {
            if !want.is_empty() && !node.deleting && node.exists {
                if let Some(have) = &node.kubelet_version {
                    if !have.is_empty() && minor_version(want) != minor_version(have) {
                        return Ok(DriftReason::K8sVersionDrift);
                    }
                }
            }
        }
    }

    if !ctx.is_machine_mode {
        if let (Some(node), Some(configured)) = (ctx.live_node, ctx.configured_kubelet_identity) {
            if let Some(actual) = node.labels.get(keys::KUBELET_CLIENT_ID) {
                if actual != configured {
                    return Ok(DriftReason::KubeletIdentityDrift);
                }
            }
        }
    }

    Ok(DriftReason::NoDrift)
}

fn cluster_config_drift_to_reason(_reason: ClusterConfigDriftReason) -> DriftReason {
    DriftReason::ClusterConfigDrift
}

/// Extract `major.minor` from a `vMAJOR.MINOR.PATCH`-shaped version string,
/// falling back to the whole string if it doesn't parse (spec.md §4.6 step
/// 5 only requires minor-version comparison, not semver validation).
fn minor_version(v: &str) -> String {
    let trimmed = v.trim_start_matches('v');
    trimmed.split('.').take(2).collect::<Vec<_>>().join(".")
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloud_types::nodeclass::{Condition, ConditionStatus};

    fn claim_with_provider_id(image_id: &str) -> NodeClaim {
        let mut c = NodeClaim { name: "node-1".to_string(), ..Default::default() };
        c.status.provider_id = Some("azure:///subscriptions/s/resourceGroups/rg/providers/vm/node-1".to_string());
        c.status.image_id = Some(image_id.to_string());
        c
    }

    fn ready_status(images: Vec<&str>, k8s_version_ready: bool) -> AksNodeClassStatus {
        AksNodeClassStatus {
            kubernetes_version: "v1.28.3".to_string(),
            images: images.into_iter().map(String::from).collect(),
            conditions: vec![
                Condition { type_: CONDITION_IMAGES_READY.to_string(), status: ConditionStatus::True, reason: None, message: None },
                Condition {
                    type_: CONDITION_KUBERNETES_VERSION_READY.to_string(),
                    status: if k8s_version_ready { ConditionStatus::True } else { ConditionStatus::False },
                    reason: None,
                    message: None,
                },
            ],
        }
    }

    #[test]
    fn no_provider_id_is_an_error() {
        let claim = NodeClaim { name: "node-1".to_string(), ..Default::default() };
        let ctx = ProvisionContext {
            node_class_exists: true,
            nodepool_exists: true,
            node_class_status: None,
            configured_node_class_version: None,
            live_node: None,
            is_machine_mode: false,
            cloud_drift: None,
            configured_kubelet_identity: None,
        };
        assert!(matches!(is_drifted(&claim, &ctx), Err(DriftError::NoProviderId)));
    }

    #[test]
    fn deleted_nodeclass_reports_no_drift() {
        let claim = claim_with_provider_id("v2");
        let ctx = ProvisionContext {
            node_class_exists: false,
            nodepool_exists: true,
            node_class_status: None,
            configured_node_class_version: None,
            live_node: None,
            is_machine_mode: false,
            cloud_drift: None,
            configured_kubelet_identity: None,
        };
        assert_eq!(is_drifted(&claim, &ctx).unwrap(), DriftReason::NoDrift);
    }

    #[test]
    fn cluster_config_drift_takes_precedence_over_image_drift() {
        let claim = claim_with_provider_id("stale-image");
        let status = ready_status(vec!["current-image"], false);
        let cloud_drift = CloudDriftSignal { recreate: true, reason: Some(ClusterConfigDriftReason::PropertiesUpdated) };
        let ctx = ProvisionContext {
            node_class_exists: true,
            nodepool_exists: true,
            node_class_status: Some(&status),
            configured_node_class_version: None,
            live_node: None,
            is_machine_mode: true,
            cloud_drift: Some(&cloud_drift),
            configured_kubelet_identity: None,
        };
        assert_eq!(is_drifted(&claim, &ctx).unwrap(), DriftReason::ClusterConfigDrift);
    }

    #[test]
    fn stale_image_id_reports_image_drift() {
        let claim = claim_with_provider_id("stale-image");
        let status = ready_status(vec!["current-image"], false);
        let ctx = ProvisionContext {
            node_class_exists: true,
            nodepool_exists: true,
            node_class_status: Some(&status),
            configured_node_class_version: None,
            live_node: None,
            is_machine_mode: false,
            cloud_drift: None,
            configured_kubelet_identity: None,
        };
        assert_eq!(is_drifted(&claim, &ctx).unwrap(), DriftReason::ImageDrift);
    }

    #[test]
    fn images_ready_with_empty_list_is_an_invariant_violation() {
        let claim = claim_with_provider_id("v2");
        let status = ready_status(vec![], false);
        let ctx = ProvisionContext {
            node_class_exists: true,
            nodepool_exists: true,
            node_class_status: Some(&status),
            configured_node_class_version: None,
            live_node: None,
            is_machine_mode: false,
            cloud_drift: None,
            configured_kubelet_identity: None,
        };
        assert!(matches!(is_drifted(&claim, &ctx), Err(DriftError::ImagesReadyWithNoImages)));
    }

    #[test]
    fn minor_version_mismatch_reports_k8s_version_drift() {
        let claim = claim_with_provider_id("current-image");
        let status = ready_status(vec!["current-image"], true);
        let node = LiveNode { exists: true, deleting: false, kubelet_version: Some("v1.27.9".to_string()), labels: Default::default() };
        let ctx = ProvisionContext {
            node_class_exists: true,
            nodepool_exists: true,
            node_class_status: Some(&status),
            configured_node_class_version: Some("v1.28.3"),
            live_node: Some(&node),
            is_machine_mode: false,
            cloud_drift: None,
            configured_kubelet_identity: None,
        };
        assert_eq!(is_drifted(&claim, &ctx).unwrap(), DriftReason::K8sVersionDrift);
    }

    #[test]
    fn deleting_node_softens_k8s_version_mismatch_to_no_drift() {
        let claim = claim_with_provider_id("current-image");
        let status = ready_status(vec!["current-image"], true);
        let node = LiveNode { exists: true, deleting: true, kubelet_version: Some("v1.27.9".to_string()), labels: Default::default() };
        let ctx = ProvisionContext {
            node_class_exists: true,
            nodepool_exists: true,
            node_class_status: Some(&status),
            configured_node_class_version: Some("v1.28.3"),
            live_node: Some(&node),
            is_machine_mode: false,
            cloud_drift: None,
            configured_kubelet_identity: None,
        };
        assert_eq!(is_drifted(&claim, &ctx).unwrap(), DriftReason::NoDrift);
    }

    #[test]
    fn kubelet_identity_mismatch_reports_drift_in_vm_mode_only() {
        let claim = claim_with_provider_id("current-image");
        let status = ready_status(vec!["current-image"], false);
        let mut labels = std::collections::BTreeMap::new();
        labels.insert(keys::KUBELET_CLIENT_ID.to_string(), "old-identity".to_string());
        let node = LiveNode { exists: true, deleting: false, kubelet_version: None, labels };
        let ctx = ProvisionContext {
            node_class_exists: true,
            nodepool_exists: true,
            node_class_status: Some(&status),
            configured_node_class_version: None,
            live_node: Some(&node),
            is_machine_mode: false,
            cloud_drift: None,
            configured_kubelet_identity: Some("new-identity"),
        };
        assert_eq!(is_drifted(&claim, &ctx).unwrap(), DriftReason::KubeletIdentityDrift);

        let machine_mode_ctx = ProvisionContext { is_machine_mode: true, ..ctx };
        assert_eq!(is_drifted(&claim, &machine_mode_ctx).unwrap(), DriftReason::NoDrift);
    }
}
