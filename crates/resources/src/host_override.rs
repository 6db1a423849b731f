//! DpmHostOverride descriptor
//!
//! Overrides the cluster-wide DPM automation level for a single host.

use crate::error::ResourceError;
use crate::fields::{Described, Field};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// HostOverrideSpec defines the desired DPM settings of one host in a cluster
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct HostOverrideSpec {
    /// Managed object ID of the compute cluster
    pub compute_cluster_id: String,

    /// Managed object ID of the host (e.g. `host-12`)
    pub host_system_id: String,

    /// DPM automation level for the host
    #[serde(default)]
    pub dpm_automation_level: DpmAutomationLevel,

    /// Enable DPM for the host
    #[serde(default)]
    pub dpm_enabled: bool,
}

/// DPM automation level
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DpmAutomationLevel {
    #[default]
    Manual,
    Automated,
}

impl std::fmt::Display for DpmAutomationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DpmAutomationLevel::Manual => write!(f, "manual"),
            DpmAutomationLevel::Automated => write!(f, "automated"),
        }
    }
}

const HOST_OVERRIDE_FIELDS: &[Field] = &[
    Field::required("compute_cluster_id", "Managed object ID of the compute cluster"),
    Field::required("host_system_id", "Managed object ID of the host"),
    Field::optional("dpm_automation_level", "manual or automated (default manual)"),
    Field::optional("dpm_enabled", "Enable DPM for the host (default false)"),
    Field::computed("key", "Override key assigned by vCenter"),
];

impl Described for HostOverrideSpec {
    const KIND: &'static str = "DpmHostOverride";

    fn fields() -> &'static [Field] {
        HOST_OVERRIDE_FIELDS
    }
}

/// State address of a DPM host override
pub fn host_override_address(cluster_id: &str, host_id: &str) -> String {
    format!("dpm_host_override/{}/{}", cluster_id, host_id)
}

impl HostOverrideSpec {
    pub fn address(&self) -> String {
        host_override_address(&self.compute_cluster_id, &self.host_system_id)
    }

    pub fn validate(&self) -> Result<(), ResourceError> {
        if self.compute_cluster_id.trim().is_empty() || self.host_system_id.trim().is_empty() {
            return Err(ResourceError::Validation {
                resource: self.address(),
                message: "compute_cluster_id and host_system_id must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_manual_and_disabled() {
        let spec: HostOverrideSpec =
            serde_yaml::from_str("compute_cluster_id: domain-c1\nhost_system_id: host-1\n").unwrap();
        assert_eq!(spec.dpm_automation_level, DpmAutomationLevel::Manual);
        assert!(!spec.dpm_enabled);
        assert_eq!(spec.address(), "dpm_host_override/domain-c1/host-1");
    }

    #[test]
    fn test_parse_automated() {
        let spec: HostOverrideSpec = serde_yaml::from_str(
            "compute_cluster_id: domain-c1\nhost_system_id: host-1\ndpm_automation_level: automated\ndpm_enabled: true\n",
        )
        .unwrap();
        assert_eq!(spec.dpm_automation_level, DpmAutomationLevel::Automated);
        assert!(spec.dpm_enabled);
    }
}
