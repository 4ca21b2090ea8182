//! Parsing and formatting of the `providerID` string (spec.md §6):
//! `azure:///subscriptions/<sub>/resourceGroups/<rg>/providers/<kind>/<name>`

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Low-level VM API (virtualMachines).
    Vm,
    /// Managed-machine API (agentPools/machines).
    Machine,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderId {
    pub subscription_id: String,
    pub resource_group: String,
    pub backend: Backend,
    pub name: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProviderIdError {
    #[error("providerID {0:?} is not a recognized azure provider id")]
    Malformed(String),
}

impl ProviderId {
    pub fn new(subscription_id: impl Into<String>, resource_group: impl Into<String>, backend: Backend, name: impl Into<String>) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            resource_group: resource_group.into(),
            backend,
            name: name.into(),
        }
    }

    fn kind_segment(backend: Backend) -> &'static str {
        match backend {
            Backend::Vm => "Microsoft.Compute/virtualMachines",
            Backend::Machine => "Microsoft.ContainerService/managedClusters/agentPools/machines",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ProviderIdError> {
        let rest = s
            .strip_prefix("azure:///subscriptions/")
            .ok_or_else(|| ProviderIdError::Malformed(s.to_string()))?;
        let segments: Vec<&str> = rest.split('/').collect();
        // <sub>/resourceGroups/<rg>/providers/<provider>/<...kind segments.../><name>
        if segments.len() < 5 || segments[1] != "resourceGroups" || segments[3] != "providers" {
            return Err(ProviderIdError::Malformed(s.to_string()));
        }
        let subscription_id = segments[0].to_string();
        let resource_group = segments[2].to_string();
        let kind_and_name = segments[4..].join("/");
        let backend = if kind_and_name.starts_with("Microsoft.Compute/virtualMachines/") {
            Backend::Vm
        } else if kind_and_name.starts_with("Microsoft.ContainerService/") {
            Backend::Machine
        } else {
            return Err(ProviderIdError::Malformed(s.to_string()));
        };
        let name = kind_and_name
            .rsplit('/')
            .next()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| ProviderIdError::Malformed(s.to_string()))?
            .to_string();
        Ok(ProviderId { subscription_id, resource_group, backend, name })
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "azure:///subscriptions/{}/resourceGroups/{}/providers/{}/{}",
            self.subscription_id,
            self.resource_group,
            Self::kind_segment(self.backend),
            self.name
        )
    }
}
