//! State normalizer
//!
//! Turns raw cluster configuration responses into canonical records keyed
//! by identity. Pure: no gateway calls.

use crate::diff::ManagedRecord;
use crate::error::ControllerError;
use crate::records::{HostKey, HostOverrideRecord, LibraryItemRecord, MemberSet, RuleIdentity, RuleKind, RuleRecord};
use std::collections::HashMap;
use vsphere_client::{
    ClusterConfiguration, ClusterDpmHostConfigInfo, ClusterRuleInfo, ClusterRuleKind, HOST_SYSTEM, LibraryItem,
    ManagedObjectReference, VIRTUAL_MACHINE,
};

/// Canonical view of one cluster's rules and DPM overrides
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedState {
    pub cluster_id: String,
    pub rules: HashMap<RuleIdentity, RuleRecord>,
    pub overrides: HashMap<HostKey, HostOverrideRecord>,
}

impl NormalizedState {
    /// Observed rule matching `desired`: by key when known, otherwise by name
    pub fn rule_for(&self, desired: &RuleRecord) -> Result<Option<&RuleRecord>, ControllerError> {
        if let Some(key) = desired.key {
            if let Some(found) = self.rules.get(&RuleIdentity::Key(key)) {
                return Ok(Some(found));
            }
        }
        self.rule_named(&desired.name)
    }

    /// Observed rule with `name`. Two rules sharing a name is ambiguous.
    pub fn rule_named(&self, name: &str) -> Result<Option<&RuleRecord>, ControllerError> {
        let mut matches: Vec<&RuleRecord> = self.rules.values().filter(|r| r.name == name).collect();
        match matches.len() {
            0 => Ok(None),
            1 => Ok(matches.pop()),
            _ => {
                let mut keys: Vec<String> = matches
                    .iter()
                    .map(|r| r.key.map(|k| format!("key {}", k)).unwrap_or_default())
                    .collect();
                keys.sort();
                Err(ControllerError::AmbiguousReference {
                    reference: format!("rule {} in cluster {}", name, self.cluster_id),
                    matches: keys,
                })
            }
        }
    }

    pub fn override_for(&self, host_id: &str) -> Option<&HostOverrideRecord> {
        self.overrides.get(&HostKey::new(&self.cluster_id, host_id))
    }
}

/// Normalize a full cluster configuration
pub fn normalize(config: &ClusterConfiguration, cluster_id: &str) -> Result<NormalizedState, ControllerError> {
    let mut state = NormalizedState {
        cluster_id: cluster_id.to_string(),
        ..Default::default()
    };

    for info in &config.rules {
        let record = normalize_rule(info)?;
        let identity = record.identity();
        if state.rules.insert(identity.clone(), record).is_some() {
            return Err(ControllerError::MalformedData(format!(
                "cluster {} reports {} more than once",
                cluster_id, identity
            )));
        }
    }

    for info in &config.dpm_host_configs {
        let record = normalize_host_override(cluster_id, info)?;
        let key = HostKey::new(cluster_id, &record.host_id);
        if state.overrides.insert(key, record).is_some() {
            return Err(ControllerError::MalformedData(format!(
                "cluster {} reports more than one DPM override for a host",
                cluster_id
            )));
        }
    }

    Ok(state)
}

/// Normalize a single rule. Rules reported by vCenter always carry a name and a key.
pub fn normalize_rule(info: &ClusterRuleInfo) -> Result<RuleRecord, ControllerError> {
    let name = info
        .name
        .clone()
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ControllerError::MalformedData(format!("rule with key {:?} has no name", info.key)))?;
    let key = info
        .key
        .ok_or_else(|| ControllerError::MalformedData(format!("rule {} has no key", name)))?;

    let kind = match &info.kind {
        ClusterRuleKind::AntiAffinity { vm } => RuleKind::AntiAffinity {
            members: members(&name, vm)?,
        },
        ClusterRuleKind::Affinity { vm } => RuleKind::Affinity {
            members: members(&name, vm)?,
        },
        ClusterRuleKind::Dependency {
            vm_group,
            depends_on_vm_group,
        } => RuleKind::Dependency {
            vm_group: required(&name, "vm_group", vm_group)?,
            depends_on_vm_group: required(&name, "depends_on_vm_group", depends_on_vm_group)?,
        },
        ClusterRuleKind::VmHost {
            vm_group_name,
            affine_host_group_name,
            anti_affine_host_group_name,
        } => RuleKind::VmHost {
            vm_group: required(&name, "vm_group_name", vm_group_name)?,
            affine_host_group: affine_host_group_name.clone(),
            anti_affine_host_group: anti_affine_host_group_name.clone(),
        },
    };

    Ok(RuleRecord {
        name,
        enabled: info.enabled.into(),
        mandatory: info.mandatory.into(),
        kind,
        key: Some(key),
        rule_uuid: info.rule_uuid.clone(),
        user_created: info.user_created,
        status: info.status.clone(),
        in_compliance: info.in_compliance.into(),
    })
}

/// Normalize a DPM host config. Absent behavior means manual, absent enabled means false.
pub fn normalize_host_override(
    cluster_id: &str,
    info: &ClusterDpmHostConfigInfo,
) -> Result<HostOverrideRecord, ControllerError> {
    let host = info.host.as_ref().ok_or_else(|| {
        ControllerError::MalformedData(format!(
            "DPM override with key {:?} in cluster {} has no host",
            info.key, cluster_id
        ))
    })?;
    if host.kind != HOST_SYSTEM {
        return Err(ControllerError::MalformedData(format!(
            "DPM override in cluster {} references {} {}, expected a host",
            cluster_id, host.kind, host.value
        )));
    }

    Ok(HostOverrideRecord {
        cluster_id: cluster_id.to_string(),
        host_id: host.value.clone(),
        behavior: info.behavior.unwrap_or_default(),
        enabled: info.enabled.unwrap_or(false),
        key: info.key,
    })
}

pub fn normalize_library_item(item: &LibraryItem) -> LibraryItemRecord {
    LibraryItemRecord::from_item(item)
}

fn members(rule: &str, refs: &[ManagedObjectReference]) -> Result<MemberSet, ControllerError> {
    if let Some(bad) = refs.iter().find(|r| r.kind != VIRTUAL_MACHINE) {
        return Err(ControllerError::MalformedData(format!(
            "rule {} lists {} {} as a member, expected a virtual machine",
            rule, bad.kind, bad.value
        )));
    }
    Ok(refs.iter().map(|r| r.value.clone()).collect())
}

fn required(rule: &str, field: &str, value: &Option<String>) -> Result<String, ControllerError> {
    value
        .clone()
        .ok_or_else(|| ControllerError::MalformedData(format!("rule {} has no {}", rule, field)))
}
