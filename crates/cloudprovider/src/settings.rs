//! Process-wide configuration loaded once from a `ConfigMap`-shaped map
//! (spec.md §6, §9 "the settings object is a process-wide value populated
//! once at startup... pass it through call contexts explicitly"). Mirrors
//! the shape of krustlet's `Config`/`ServerConfig` split: a flat settings
//! struct with a `from_configmap` constructor instead of CLI flags, since
//! CLI entry points are out of scope (spec.md §1).

use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProvisionMode {
    Vm,
    Managed,
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub cluster_name: String,
    pub cluster_endpoint: String,
    pub vm_memory_overhead_percent: f64,
    pub tags: BTreeMap<String, String>,
    pub cluster_id: String,
    pub kubelet_client_tls_bootstrap_token: String,
    pub ssh_public_key: Option<String>,
    pub network_plugin: String,
    pub network_policy: Option<String>,
    pub node_identities: Vec<String>,
    pub provision_mode: ProvisionMode,
    pub use_sig: bool,
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("missing required configuration key {0:?}")]
    MissingKey(&'static str),
    #[error("configuration key {key:?} has an invalid value: {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

impl Settings {
    /// Build `Settings` from a `ConfigMap`'s `data` map (spec.md §6 table).
    pub fn from_configmap(data: &BTreeMap<String, String>) -> Result<Self, SettingsError> {
        let cluster_name = required(data, "clusterName")?;
        let cluster_endpoint = required(data, "clusterEndpoint")?;
        validate_endpoint(&cluster_endpoint)?;

        let vm_memory_overhead_percent = match data.get("vmMemoryOverheadPercent") {
            Some(v) => v.parse::<f64>().map_err(|e| SettingsError::InvalidValue {
                key: "vmMemoryOverheadPercent",
                reason: e.to_string(),
            })?,
            None => 0.075,
        };
        if vm_memory_overhead_percent < 0.0 {
            return Err(SettingsError::InvalidValue {
                key: "vmMemoryOverheadPercent",
                reason: "must be >= 0".to_string(),
            });
        }

        let tags = match data.get("tags") {
            Some(v) => serde_json::from_str(v)
                .map_err(|e| SettingsError::InvalidValue { key: "tags", reason: e.to_string() })?,
            None => BTreeMap::new(),
        };

        let cluster_id = match data.get("clusterID") {
            Some(v) => v.clone(),
            None => derive_cluster_id(&cluster_endpoint),
        };

        let kubelet_client_tls_bootstrap_token = required(data, "kubeletClientTLSBootstrapToken")?;
        let ssh_public_key = data.get("sshPublicKey").cloned();
        let network_plugin = required(data, "networkPlugin")?;
        let network_policy = data.get("networkPolicy").cloned();

        let node_identities = match data.get("nodeIdentities") {
            Some(v) => serde_json::from_str(v)
                .map_err(|e| SettingsError::InvalidValue { key: "nodeIdentities", reason: e.to_string() })?,
            None => Vec::new(),
        };

        let provision_mode = match data.get("provisionMode").map(String::as_str) {
            None | Some("vm") => ProvisionMode::Vm,
            Some("managed") => ProvisionMode::Managed,
            Some(other) => {
                return Err(SettingsError::InvalidValue {
                    key: "provisionMode",
                    reason: format!("must be \"vm\" or \"managed\", got {other:?}"),
                })
            }
        };

        let use_sig = match data.get("useSIG") {
            Some(v) => v.parse::<bool>().map_err(|e| SettingsError::InvalidValue { key: "useSIG", reason: e.to_string() })?,
            None => false,
        };

        Ok(Self {
            cluster_name,
            cluster_endpoint,
            vm_memory_overhead_percent,
            tags,
            cluster_id,
            kubelet_client_tls_bootstrap_token,
            ssh_public_key,
            network_plugin,
            network_policy,
            node_identities,
            provision_mode,
            use_sig,
        })
    }
}

fn required(data: &BTreeMap<String, String>, key: &'static str) -> Result<String, SettingsError> {
    data.get(key).cloned().ok_or(SettingsError::MissingKey(key))
}

fn validate_endpoint(endpoint: &str) -> Result<(), SettingsError> {
    let has_scheme = endpoint.contains("://");
    let has_host = endpoint.rsplit("://").next().is_some_and(|rest| !rest.trim_matches('/').is_empty());
    if !has_scheme || !has_host {
        return Err(SettingsError::InvalidValue {
            key: "clusterEndpoint",
            reason: "must be an absolute URL with a hostname".to_string(),
        });
    }
    Ok(())
}

/// FNV-1a over the first 33 chars of the endpoint's hostname, rendered as
/// 8 decimal digits (spec.md §6 `clusterID` default).
fn derive_cluster_id(endpoint: &str) -> String {
    let hostname = endpoint.split("://").nth(1).unwrap_or(endpoint).split('/').next().unwrap_or(endpoint);
    let truncated: String = hostname.chars().take(33).collect();

    const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;
    let mut hash = FNV_OFFSET_BASIS;
    for byte in truncated.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    format!("{:08}", hash % 100_000_000)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_data() -> BTreeMap<String, String> {
        let mut data = BTreeMap::new();
        data.insert("clusterName".to_string(), "prod".to_string());
        data.insert("clusterEndpoint".to_string(), "https://prod.example.com:443".to_string());
        data.insert("kubeletClientTLSBootstrapToken".to_string(), "token".to_string());
        data.insert("networkPlugin".to_string(), "azure".to_string());
        data
    }

    #[test]
    fn missing_required_key_is_an_error() {
        let mut data = base_data();
        data.remove("clusterName");
        assert!(matches!(Settings::from_configmap(&data), Err(SettingsError::MissingKey("clusterName"))));
    }

    #[test]
    fn defaults_apply_when_optional_keys_absent() {
        let settings = Settings::from_configmap(&base_data()).unwrap();
        assert_eq!(settings.vm_memory_overhead_percent, 0.075);
        assert_eq!(settings.provision_mode, ProvisionMode::Vm);
        assert!(!settings.use_sig);
        assert!(settings.tags.is_empty());
    }

    #[test]
    fn rejects_endpoint_without_hostname() {
        let mut data = base_data();
        data.insert("clusterEndpoint".to_string(), "https://".to_string());
        assert!(Settings::from_configmap(&data).is_err());
    }

    #[test]
    fn cluster_id_is_deterministic_for_the_same_endpoint() {
        let settings_a = Settings::from_configmap(&base_data()).unwrap();
        let settings_b = Settings::from_configmap(&base_data()).unwrap();
        assert_eq!(settings_a.cluster_id, settings_b.cluster_id);
        assert_eq!(settings_a.cluster_id.len(), 8);
    }

    #[test]
    fn managed_provision_mode_parses() {
        let mut data = base_data();
        data.insert("provisionMode".to_string(), "managed".to_string());
        let settings = Settings::from_configmap(&data).unwrap();
        assert_eq!(settings.provision_mode, ProvisionMode::Managed);
    }
}
