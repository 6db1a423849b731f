//! vSphere API models
//!
//! Cluster configuration is modeled after `ClusterConfigInfoEx`: a cluster
//! carries one list of rules and one list of DPM host configs, and every
//! reconfigure call resubmits both lists in full. Optional booleans stay
//! `Option<bool>` here; the controller decides what "unset" means.

use serde::{Deserialize, Serialize};

/// Managed object type of a virtual machine
pub const VIRTUAL_MACHINE: &str = "VirtualMachine";
/// Managed object type of an ESXi host
pub const HOST_SYSTEM: &str = "HostSystem";
/// Managed object type of a compute cluster
pub const CLUSTER_COMPUTE_RESOURCE: &str = "ClusterComputeResource";

/// Reference to a managed object (e.g. `VirtualMachine:vm-42`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ManagedObjectReference {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

impl ManagedObjectReference {
    pub fn new(kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            value: value.into(),
        }
    }

    pub fn virtual_machine(value: impl Into<String>) -> Self {
        Self::new(VIRTUAL_MACHINE, value)
    }

    pub fn host(value: impl Into<String>) -> Self {
        Self::new(HOST_SYSTEM, value)
    }
}

/// Full rule and DPM configuration of a cluster
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ClusterConfiguration {
    #[serde(default)]
    pub rules: Vec<ClusterRuleInfo>,
    #[serde(default)]
    pub dpm_host_configs: Vec<ClusterDpmHostConfigInfo>,
}

/// A single cluster rule as reported by (and submitted to) the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ClusterRuleInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mandatory: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_created: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_compliance: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_uuid: Option<String>,
    #[serde(flatten)]
    pub kind: ClusterRuleKind,
}

/// Rule variants, discriminated by the `type` field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClusterRuleKind {
    AntiAffinity {
        #[serde(default)]
        vm: Vec<ManagedObjectReference>,
    },
    Affinity {
        #[serde(default)]
        vm: Vec<ManagedObjectReference>,
    },
    Dependency {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        vm_group: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        depends_on_vm_group: Option<String>,
    },
    VmHost {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        vm_group_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        affine_host_group_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        anti_affine_host_group_name: Option<String>,
    },
}

/// DPM automation level for a host
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DpmBehavior {
    #[default]
    Manual,
    Automated,
}

/// Per-host DPM override inside a cluster configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ClusterDpmHostConfigInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<ManagedObjectReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub behavior: Option<DpmBehavior>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

/// Handle to an asynchronous remote task
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskHandle {
    pub id: String,
}

impl TaskHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Task state as reported by the tasks endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Running,
    Blocked,
    Succeeded,
    Failed,
}

/// Task info returned by `GET /api/cis/tasks/{task}`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TaskInfo {
    pub status: TaskStatus,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

/// Content library item type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LibraryItemType {
    #[default]
    Ovf,
    Iso,
    VmTemplate,
    #[serde(other)]
    Other,
}

/// Content library item model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LibraryItem {
    pub id: String,
    pub library_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type", default)]
    pub item_type: LibraryItemType,
}

/// Request body for creating a library item
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LibraryItemCreateSpec {
    pub library_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub item_type: LibraryItemType,
}

/// Request body for updating a library item (only set fields change)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LibraryItemUpdateSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}
