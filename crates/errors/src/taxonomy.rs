//! Public error taxonomy surfaced to the upstream scheduler (spec.md §6, §7).

use thiserror::Error;

/// Errors returned by `CloudProvider::{Create,Get,List,Delete,IsDrifted}`.
#[derive(Debug, Error)]
pub enum ProvisioningError {
    /// The pruned offering set was empty, or the cloud signalled a hard
    /// quota. Upstream treats this as "try again later with different
    /// requirements".
    #[error("insufficient capacity: {0}")]
    InsufficientCapacity(String),

    /// Resolvable preconditions (image, k8s version) are not yet computed.
    #[error("NodeClass is not ready")]
    NodeClassNotReady,

    /// Everything else that prevents creation; the wrapped cause is
    /// preserved.
    #[error("create failed: {0}")]
    CreateFailed(#[source] anyhow::Error),

    /// Get/Delete on a resource that no longer exists. Callers treat this
    /// as terminal success for Delete.
    #[error("NodeClaim not found")]
    NodeClaimNotFound,
}

impl ProvisioningError {
    /// Truncate the underlying message to 500 chars for event emission
    /// (spec.md §7: "the truncated (<=500 chars) underlying message").
    pub fn truncated_message(&self) -> String {
        let full = self.to_string();
        if full.len() <= 500 {
            full
        } else {
            let mut truncated: String = full.chars().take(500).collect();
            truncated.push('\u{2026}');
            truncated
        }
    }

    /// A stable, deduplicable reason string for event emission.
    pub fn reason(&self) -> &'static str {
        match self {
            ProvisioningError::InsufficientCapacity(_) => "InsufficientCapacity",
            ProvisioningError::NodeClassNotReady => "NodeClassNotReady",
            ProvisioningError::CreateFailed(_) => "CreateFailed",
            ProvisioningError::NodeClaimNotFound => "NodeClaimNotFound",
        }
    }
}
