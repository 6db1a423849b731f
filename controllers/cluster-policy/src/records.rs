//! Canonical records
//!
//! Desired and observed state are both expressed as records: the manifest
//! side is converted from the `resources` specs, the remote side is produced
//! by the normalizer. Records only hold canonical values (sets instead of
//! lists, tri-states instead of nullable booleans) so the diff engine can
//! compare them field by field.

use crate::diff::ManagedRecord;
use resources::{
    ClusterRuleSpec, ClusterRuleStatus, ContentLibraryItemSpec, ContentLibraryItemStatus, ContentType,
    DpmAutomationLevel, HostOverrideSpec, HostOverrideStatus, RuleSpec, TriState,
};
use std::collections::BTreeSet;
use std::fmt;
use vsphere_client::{
    ClusterDpmHostConfigInfo, ClusterRuleInfo, ClusterRuleKind, DpmBehavior, LibraryItem, LibraryItemCreateSpec,
    LibraryItemType, ManagedObjectReference,
};

/// Virtual machine membership of a rule, compared as a set
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct MemberSet(BTreeSet<String>);

impl MemberSet {
    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Wire form, sorted by managed object ID
    pub fn to_refs(&self) -> Vec<ManagedObjectReference> {
        self.0.iter().map(ManagedObjectReference::virtual_machine).collect()
    }
}

impl<S: Into<String>> FromIterator<S> for MemberSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for MemberSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.iter().cloned().collect::<Vec<_>>().join(", "))
    }
}

/// Rule body in canonical form
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleKind {
    AntiAffinity {
        members: MemberSet,
    },
    Affinity {
        members: MemberSet,
    },
    Dependency {
        vm_group: String,
        depends_on_vm_group: String,
    },
    VmHost {
        vm_group: String,
        affine_host_group: Option<String>,
        anti_affine_host_group: Option<String>,
    },
}

impl RuleKind {
    pub fn from_spec(spec: &RuleSpec) -> Self {
        match spec {
            RuleSpec::VmAntiAffinity { virtual_machine_ids } => RuleKind::AntiAffinity {
                members: virtual_machine_ids.iter().cloned().collect(),
            },
            RuleSpec::VmAffinity { virtual_machine_ids } => RuleKind::Affinity {
                members: virtual_machine_ids.iter().cloned().collect(),
            },
            RuleSpec::VmDependency {
                vm_group_name,
                dependency_vm_group_name,
            } => RuleKind::Dependency {
                vm_group: vm_group_name.clone(),
                depends_on_vm_group: dependency_vm_group_name.clone(),
            },
            RuleSpec::VmHost {
                vm_group_name,
                affinity_host_group_name,
                anti_affinity_host_group_name,
            } => RuleKind::VmHost {
                vm_group: vm_group_name.clone(),
                affine_host_group: affinity_host_group_name.clone(),
                anti_affine_host_group: anti_affinity_host_group_name.clone(),
            },
        }
    }

    pub fn to_spec(&self) -> RuleSpec {
        match self {
            RuleKind::AntiAffinity { members } => RuleSpec::VmAntiAffinity {
                virtual_machine_ids: members.iter().cloned().collect(),
            },
            RuleKind::Affinity { members } => RuleSpec::VmAffinity {
                virtual_machine_ids: members.iter().cloned().collect(),
            },
            RuleKind::Dependency {
                vm_group,
                depends_on_vm_group,
            } => RuleSpec::VmDependency {
                vm_group_name: vm_group.clone(),
                dependency_vm_group_name: depends_on_vm_group.clone(),
            },
            RuleKind::VmHost {
                vm_group,
                affine_host_group,
                anti_affine_host_group,
            } => RuleSpec::VmHost {
                vm_group_name: vm_group.clone(),
                affinity_host_group_name: affine_host_group.clone(),
                anti_affinity_host_group_name: anti_affine_host_group.clone(),
            },
        }
    }

    pub fn to_wire(&self) -> ClusterRuleKind {
        match self {
            RuleKind::AntiAffinity { members } => ClusterRuleKind::AntiAffinity { vm: members.to_refs() },
            RuleKind::Affinity { members } => ClusterRuleKind::Affinity { vm: members.to_refs() },
            RuleKind::Dependency {
                vm_group,
                depends_on_vm_group,
            } => ClusterRuleKind::Dependency {
                vm_group: Some(vm_group.clone()),
                depends_on_vm_group: Some(depends_on_vm_group.clone()),
            },
            RuleKind::VmHost {
                vm_group,
                affine_host_group,
                anti_affine_host_group,
            } => ClusterRuleKind::VmHost {
                vm_group_name: Some(vm_group.clone()),
                affine_host_group_name: affine_host_group.clone(),
                anti_affine_host_group_name: anti_affine_host_group.clone(),
            },
        }
    }

    fn same_variant(&self, other: &RuleKind) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

/// Identity of a rule within its cluster: the remote key once assigned,
/// the name before that
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RuleIdentity {
    Key(i32),
    Name(String),
}

impl fmt::Display for RuleIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleIdentity::Key(key) => write!(f, "rule key {}", key),
            RuleIdentity::Name(name) => write!(f, "rule {}", name),
        }
    }
}

/// Canonical cluster rule
#[derive(Debug, Clone, PartialEq)]
pub struct RuleRecord {
    pub name: String,
    pub enabled: TriState,
    pub mandatory: TriState,
    pub kind: RuleKind,
    // Read-only, assigned by vCenter
    pub key: Option<i32>,
    pub rule_uuid: Option<String>,
    pub user_created: Option<bool>,
    pub status: Option<String>,
    pub in_compliance: TriState,
}

impl RuleRecord {
    /// Desired record for a spec. `key` comes from the last recorded status.
    pub fn from_spec(spec: &ClusterRuleSpec, key: Option<i32>) -> Self {
        Self {
            name: spec.name.clone(),
            enabled: spec.enabled,
            mandatory: spec.mandatory,
            kind: RuleKind::from_spec(&spec.rule),
            key,
            rule_uuid: None,
            user_created: None,
            status: None,
            in_compliance: TriState::Unset,
        }
    }

    pub fn to_info(&self) -> ClusterRuleInfo {
        ClusterRuleInfo {
            key: self.key,
            name: Some(self.name.clone()),
            enabled: self.enabled.into(),
            mandatory: self.mandatory.into(),
            user_created: self.user_created,
            in_compliance: self.in_compliance.into(),
            status: self.status.clone(),
            rule_uuid: self.rule_uuid.clone(),
            kind: self.kind.to_wire(),
        }
    }

    pub fn to_spec(&self, cluster_id: &str) -> ClusterRuleSpec {
        ClusterRuleSpec {
            name: self.name.clone(),
            compute_cluster_id: cluster_id.to_string(),
            enabled: self.enabled,
            mandatory: self.mandatory,
            rule: self.kind.to_spec(),
        }
    }

    /// Status carrying the computed fields; `state` is left for the caller
    pub fn to_status(&self) -> ClusterRuleStatus {
        ClusterRuleStatus {
            key: self.key,
            rule_uuid: self.rule_uuid.clone(),
            user_created: self.user_created,
            in_compliance: self.in_compliance.into(),
            status: self.status.clone(),
            ..Default::default()
        }
    }
}

impl ManagedRecord for RuleRecord {
    type Identity = RuleIdentity;

    fn identity(&self) -> RuleIdentity {
        match self.key {
            Some(key) => RuleIdentity::Key(key),
            None => RuleIdentity::Name(self.name.clone()),
        }
    }

    fn converged_with(&self, observed: &Self) -> bool {
        self.name == observed.name
            && (!self.enabled.is_set() || self.enabled == observed.enabled)
            && (!self.mandatory.is_set() || self.mandatory == observed.mandatory)
            && self.kind == observed.kind
    }

    fn merged_onto(&self, observed: &Self) -> Self {
        Self {
            name: self.name.clone(),
            enabled: self.enabled.or(observed.enabled),
            mandatory: self.mandatory.or(observed.mandatory),
            kind: self.kind.clone(),
            ..observed.clone()
        }
    }

    fn for_create(&self) -> Self {
        Self {
            key: None,
            rule_uuid: None,
            user_created: None,
            status: None,
            in_compliance: TriState::Unset,
            ..self.clone()
        }
    }

    /// vCenter cannot change the type of an existing rule
    fn requires_replacement(&self, observed: &Self) -> bool {
        !self.kind.same_variant(&observed.kind)
    }
}

/// Identity of a DPM host override: the (cluster, host) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostKey {
    pub cluster_id: String,
    pub host_id: String,
}

impl HostKey {
    pub fn new(cluster_id: impl Into<String>, host_id: impl Into<String>) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            host_id: host_id.into(),
        }
    }
}

impl fmt::Display for HostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DPM override for {} in {}", self.host_id, self.cluster_id)
    }
}

/// Canonical DPM host override
#[derive(Debug, Clone, PartialEq)]
pub struct HostOverrideRecord {
    pub cluster_id: String,
    pub host_id: String,
    pub behavior: DpmBehavior,
    pub enabled: bool,
    // Read-only
    pub key: Option<i32>,
}

impl HostOverrideRecord {
    pub fn from_spec(spec: &HostOverrideSpec) -> Self {
        Self {
            cluster_id: spec.compute_cluster_id.clone(),
            host_id: spec.host_system_id.clone(),
            behavior: match spec.dpm_automation_level {
                DpmAutomationLevel::Manual => DpmBehavior::Manual,
                DpmAutomationLevel::Automated => DpmBehavior::Automated,
            },
            enabled: spec.dpm_enabled,
            key: None,
        }
    }

    pub fn to_info(&self) -> ClusterDpmHostConfigInfo {
        ClusterDpmHostConfigInfo {
            key: self.key,
            host: Some(ManagedObjectReference::host(&self.host_id)),
            behavior: Some(self.behavior),
            enabled: Some(self.enabled),
        }
    }

    pub fn to_spec(&self) -> HostOverrideSpec {
        HostOverrideSpec {
            compute_cluster_id: self.cluster_id.clone(),
            host_system_id: self.host_id.clone(),
            dpm_automation_level: match self.behavior {
                DpmBehavior::Manual => DpmAutomationLevel::Manual,
                DpmBehavior::Automated => DpmAutomationLevel::Automated,
            },
            dpm_enabled: self.enabled,
        }
    }

    pub fn to_status(&self) -> HostOverrideStatus {
        HostOverrideStatus {
            key: self.key,
            ..Default::default()
        }
    }
}

impl ManagedRecord for HostOverrideRecord {
    type Identity = HostKey;

    fn identity(&self) -> HostKey {
        HostKey::new(&self.cluster_id, &self.host_id)
    }

    fn converged_with(&self, observed: &Self) -> bool {
        self.host_id == observed.host_id && self.behavior == observed.behavior && self.enabled == observed.enabled
    }

    fn merged_onto(&self, observed: &Self) -> Self {
        Self {
            behavior: self.behavior,
            enabled: self.enabled,
            ..observed.clone()
        }
    }

    fn for_create(&self) -> Self {
        Self {
            key: None,
            ..self.clone()
        }
    }
}

/// Canonical content library item
#[derive(Debug, Clone, PartialEq)]
pub struct LibraryItemRecord {
    pub library_id: String,
    pub name: String,
    pub description: Option<String>,
    pub item_type: LibraryItemType,
    /// Sources pulled at creation. Never observed, never compared.
    pub file_urls: Vec<String>,
    // Read-only
    pub id: Option<String>,
}

impl LibraryItemRecord {
    pub fn from_spec(spec: &ContentLibraryItemSpec, id: Option<String>) -> Self {
        Self {
            library_id: spec.library_id.clone(),
            name: spec.name.clone(),
            description: spec.description.clone(),
            item_type: match spec.item_type {
                ContentType::Ovf => LibraryItemType::Ovf,
                ContentType::Iso => LibraryItemType::Iso,
                ContentType::VmTemplate => LibraryItemType::VmTemplate,
                ContentType::Other => LibraryItemType::Other,
            },
            file_urls: spec.file_url.clone(),
            id,
        }
    }

    pub fn from_item(item: &LibraryItem) -> Self {
        Self {
            library_id: item.library_id.clone(),
            name: item.name.clone(),
            description: item.description.clone(),
            item_type: item.item_type,
            file_urls: Vec::new(),
            id: Some(item.id.clone()),
        }
    }

    pub fn to_create_spec(&self) -> LibraryItemCreateSpec {
        LibraryItemCreateSpec {
            library_id: self.library_id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            item_type: self.item_type,
        }
    }

    pub fn to_spec(&self) -> ContentLibraryItemSpec {
        ContentLibraryItemSpec {
            name: self.name.clone(),
            description: self.description.clone(),
            library_id: self.library_id.clone(),
            item_type: match self.item_type {
                LibraryItemType::Ovf => ContentType::Ovf,
                LibraryItemType::Iso => ContentType::Iso,
                LibraryItemType::VmTemplate => ContentType::VmTemplate,
                LibraryItemType::Other => ContentType::Other,
            },
            file_url: self.file_urls.clone(),
        }
    }

    pub fn to_status(&self) -> ContentLibraryItemStatus {
        ContentLibraryItemStatus {
            id: self.id.clone(),
            ..Default::default()
        }
    }
}

impl ManagedRecord for LibraryItemRecord {
    type Identity = String;

    fn identity(&self) -> String {
        match &self.id {
            Some(id) => format!("library item {}", id),
            None => format!("library item {}/{}", self.library_id, self.name),
        }
    }

    fn converged_with(&self, observed: &Self) -> bool {
        self.name == observed.name
            && self.library_id == observed.library_id
            && self.item_type == observed.item_type
            && (self.description.is_none() || self.description == observed.description)
    }

    fn merged_onto(&self, observed: &Self) -> Self {
        Self {
            name: self.name.clone(),
            description: self.description.clone().or_else(|| observed.description.clone()),
            ..observed.clone()
        }
    }

    fn for_create(&self) -> Self {
        Self {
            id: None,
            ..self.clone()
        }
    }

    fn requires_replacement(&self, observed: &Self) -> bool {
        self.library_id != observed.library_id || self.item_type != observed.item_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_set_ignores_order_and_duplicates() {
        let a: MemberSet = ["vm-2", "vm-1", "vm-2"].into_iter().collect();
        let b: MemberSet = ["vm-1", "vm-2"].into_iter().collect();
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
        assert_eq!(a.to_string(), "[vm-1, vm-2]");
    }

    #[test]
    fn test_rule_record_wire_round_trip_keeps_read_only_fields() {
        let record = RuleRecord {
            name: "r1".to_string(),
            enabled: TriState::True,
            mandatory: TriState::Unset,
            kind: RuleKind::AntiAffinity {
                members: ["vm-b", "vm-a"].into_iter().collect(),
            },
            key: Some(42),
            rule_uuid: Some("x".to_string()),
            user_created: Some(true),
            status: Some("green".to_string()),
            in_compliance: TriState::True,
        };
        let info = record.to_info();
        assert_eq!(info.key, Some(42));
        assert_eq!(info.mandatory, None);
        assert_eq!(info.rule_uuid.as_deref(), Some("x"));
        let ClusterRuleKind::AntiAffinity { vm } = info.kind else {
            panic!("expected anti-affinity");
        };
        assert_eq!(vm[0].value, "vm-a");
    }

    #[test]
    fn test_host_override_spec_round_trip() {
        let spec = HostOverrideSpec {
            compute_cluster_id: "domain-c1".to_string(),
            host_system_id: "host-1".to_string(),
            dpm_automation_level: DpmAutomationLevel::Automated,
            dpm_enabled: true,
        };
        assert_eq!(HostOverrideRecord::from_spec(&spec).to_spec(), spec);
    }

    #[test]
    fn test_library_item_type_change_requires_replacement() {
        let spec: ContentLibraryItemSpec = serde_yaml::from_str("name: a\nlibrary_id: lib-1\ntype: iso\n").unwrap();
        let desired = LibraryItemRecord::from_spec(&spec, None);
        let mut observed = desired.clone();
        observed.item_type = LibraryItemType::Ovf;
        observed.id = Some("item-1".to_string());
        assert!(desired.requires_replacement(&observed));
    }
}
