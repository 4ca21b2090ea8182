//! `ImageProvider` (spec.md §1, §4.4): resolves an image family + k8s
//! version to a concrete image reference.
//!
//! The node-bootstrap script generator and the full image catalog
//! resolution pipeline are out of scope (spec.md §1); this crate only
//! defines the consumed interface boundary and the reference shape both
//! back-ends need to build a VM/machine create request.

use async_trait::async_trait;
use cloud_types::AKSNodeClass;
use thiserror::Error;

/// A resolved image, either from the community image gallery (CIG, VM mode
/// only) or the shared image gallery (SIG, required for machine mode).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImageReference {
    CommunityGallery { gallery: String, image: String, version: String },
    SharedImageGallery { subscription_id: String, gallery: String, definition: String, version: String },
}

impl ImageReference {
    /// The version string alone, used for NodeClaim.status.imageID
    /// comparisons in the drift detector (spec.md §4.6).
    pub fn version(&self) -> &str {
        match self {
            ImageReference::CommunityGallery { version, .. } => version,
            ImageReference::SharedImageGallery { version, .. } => version,
        }
    }

    pub fn is_community_gallery(&self) -> bool {
        matches!(self, ImageReference::CommunityGallery { .. })
    }
}

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("no resolvable image for family {0:?}")]
    NotFound(String),
    /// spec.md §4.4 / §9: "Community-image-gallery support in machine mode
    /// is absent by design; mapping a CIG reference in that mode must fail
    /// loudly."
    #[error("community image gallery references are not supported in managed-machine mode: {0:?}")]
    CommunityGalleryUnsupportedInMachineMode(String),
}

#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Resolve every candidate image for `node_class` at `kubernetes_version`,
    /// most-preferred first.
    async fn resolve(&self, node_class: &AKSNodeClass, kubernetes_version: &str) -> Result<Vec<ImageReference>, ImageError>;
}

/// Require that `image` is usable in managed-machine mode, i.e. a SIG
/// reference. Used by the machine back-end before issuing a create call
/// (spec.md §4.4, §9 open question: CIG must fail loudly, not silently).
pub fn require_sig_reference(image: &ImageReference) -> Result<String, ImageError> {
    match image {
        ImageReference::SharedImageGallery { version, .. } => Ok(version.clone()),
        ImageReference::CommunityGallery { image, .. } => {
            Err(ImageError::CommunityGalleryUnsupportedInMachineMode(image.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn community_gallery_reference_is_rejected_for_machine_mode() {
        let image = ImageReference::CommunityGallery {
            gallery: "aks".to_string(),
            image: "ubuntu-2204".to_string(),
            version: "202401.01.0".to_string(),
        };
        let err = require_sig_reference(&image).unwrap_err();
        assert!(matches!(err, ImageError::CommunityGalleryUnsupportedInMachineMode(_)));
    }

    #[test]
    fn sig_reference_resolves_to_its_version() {
        let image = ImageReference::SharedImageGallery {
            subscription_id: "sub".to_string(),
            gallery: "gal".to_string(),
            definition: "def".to_string(),
            version: "1.2.3".to_string(),
        };
        assert_eq!(require_sig_reference(&image).unwrap(), "1.2.3");
    }
}
