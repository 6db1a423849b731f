//! ClusterRule descriptor
//!
//! Declares a DRS rule inside a compute cluster: VM anti-affinity, VM
//! affinity, VM group dependency or VM-host group rules.

use crate::error::ResourceError;
use crate::fields::{Described, Field};
use crate::tri_state::TriState;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// ClusterRuleSpec defines the desired state of a cluster rule
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct ClusterRuleSpec {
    /// Rule name, unique within the cluster
    pub name: String,

    /// Managed object ID of the compute cluster (e.g. `domain-c8`)
    pub compute_cluster_id: String,

    /// Whether the rule is enabled (unset leaves the vCenter default)
    #[serde(default, skip_serializing_if = "TriState::is_unset")]
    #[schemars(with = "Option<bool>")]
    pub enabled: TriState,

    /// Whether the rule is mandatory (unset leaves the vCenter default)
    #[serde(default, skip_serializing_if = "TriState::is_unset")]
    #[schemars(with = "Option<bool>")]
    pub mandatory: TriState,

    /// Rule body
    pub rule: RuleSpec,
}

/// Rule body, discriminated by `kind`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleSpec {
    /// Keep the listed virtual machines on different hosts
    VmAntiAffinity { virtual_machine_ids: Vec<String> },

    /// Keep the listed virtual machines on the same host
    VmAffinity { virtual_machine_ids: Vec<String> },

    /// Start a VM group only after another VM group is running
    VmDependency {
        vm_group_name: String,
        dependency_vm_group_name: String,
    },

    /// Pin a VM group to (or away from) a host group
    VmHost {
        vm_group_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        affinity_host_group_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        anti_affinity_host_group_name: Option<String>,
    },
}

impl RuleSpec {
    pub fn kind_name(&self) -> &'static str {
        match self {
            RuleSpec::VmAntiAffinity { .. } => "vm_anti_affinity",
            RuleSpec::VmAffinity { .. } => "vm_affinity",
            RuleSpec::VmDependency { .. } => "vm_dependency",
            RuleSpec::VmHost { .. } => "vm_host",
        }
    }
}

const CLUSTER_RULE_FIELDS: &[Field] = &[
    Field::required("name", "Rule name, unique within the cluster"),
    Field::required("compute_cluster_id", "Managed object ID of the compute cluster"),
    Field::optional("enabled", "Enable the rule (unset: vCenter default)"),
    Field::optional("mandatory", "Make the rule mandatory (unset: vCenter default)"),
    Field::required("rule", "Rule body tagged by kind"),
    Field::computed("key", "Rule key assigned by vCenter"),
    Field::computed("rule_uuid", "Rule UUID assigned by vCenter"),
    Field::computed("user_created", "Whether the rule was created by a user"),
    Field::computed("status", "Rule status reported by vCenter"),
    Field::computed("in_compliance", "Whether the cluster complies with the rule"),
];

impl Described for ClusterRuleSpec {
    const KIND: &'static str = "ClusterRule";

    fn fields() -> &'static [Field] {
        CLUSTER_RULE_FIELDS
    }
}

/// State address of a cluster rule
pub fn cluster_rule_address(cluster_id: &str, name: &str) -> String {
    format!("cluster_rule/{}/{}", cluster_id, name)
}

impl ClusterRuleSpec {
    pub fn address(&self) -> String {
        cluster_rule_address(&self.compute_cluster_id, &self.name)
    }

    /// Semantic checks serde cannot express
    pub fn validate(&self) -> Result<(), ResourceError> {
        let invalid = |message: &str| ResourceError::Validation {
            resource: self.address(),
            message: message.to_string(),
        };

        if self.name.trim().is_empty() {
            return Err(invalid("name must not be empty"));
        }
        if self.compute_cluster_id.trim().is_empty() {
            return Err(invalid("compute_cluster_id must not be empty"));
        }

        match &self.rule {
            RuleSpec::VmAntiAffinity { virtual_machine_ids } | RuleSpec::VmAffinity { virtual_machine_ids } => {
                if virtual_machine_ids.is_empty() {
                    return Err(invalid("virtual_machine_ids must list at least one virtual machine"));
                }
                if virtual_machine_ids.iter().any(|id| id.trim().is_empty()) {
                    return Err(invalid("virtual_machine_ids must not contain empty IDs"));
                }
            }
            RuleSpec::VmDependency {
                vm_group_name,
                dependency_vm_group_name,
            } => {
                if vm_group_name.is_empty() || dependency_vm_group_name.is_empty() {
                    return Err(invalid("vm_group_name and dependency_vm_group_name must not be empty"));
                }
            }
            RuleSpec::VmHost {
                vm_group_name,
                affinity_host_group_name,
                anti_affinity_host_group_name,
            } => {
                if vm_group_name.is_empty() {
                    return Err(invalid("vm_group_name must not be empty"));
                }
                if affinity_host_group_name.is_some() == anti_affinity_host_group_name.is_some() {
                    return Err(invalid(
                        "exactly one of affinity_host_group_name and anti_affinity_host_group_name must be set",
                    ));
                }
            }
        }

        Ok(())
    }
}
