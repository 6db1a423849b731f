//! Test utilities for unit testing reconcilers
//!
//! This module provides helpers for creating test data and setting up test scenarios.

use crate::reconciler::Reconciler;
use resources::{
    ClusterRuleSpec, ContentLibraryItemSpec, ContentType, DpmAutomationLevel, HostOverrideSpec, RuleSpec, TriState,
};
use vsphere_client::{ClusterRuleInfo, ClusterRuleKind, LibraryItem, LibraryItemType, ManagedObjectReference, MockVSphereClient};

pub const CLUSTER_ID: &str = "domain-c1";
pub const CLUSTER_PATH: &str = "/dc1/host/cluster1";
pub const LIBRARY_ID: &str = "lib-1";

/// Mock vCenter with one empty cluster at `CLUSTER_PATH`
pub fn mock_with_cluster() -> MockVSphereClient {
    let mock = MockVSphereClient::new("http://test-vcenter");
    mock.add_cluster(CLUSTER_ID, CLUSTER_PATH);
    mock
}

/// Reconciler sharing state with `mock`, so tests can inspect it afterwards
pub fn reconciler_for(mock: &MockVSphereClient) -> Reconciler {
    Reconciler::new(Box::new(mock.clone()))
}

pub fn anti_affinity_spec(name: &str, members: &[&str], enabled: TriState, mandatory: TriState) -> ClusterRuleSpec {
    ClusterRuleSpec {
        name: name.to_string(),
        compute_cluster_id: CLUSTER_ID.to_string(),
        enabled,
        mandatory,
        rule: RuleSpec::VmAntiAffinity {
            virtual_machine_ids: members.iter().map(|m| m.to_string()).collect(),
        },
    }
}

/// Anti-affinity rule as vCenter would report it
pub fn observed_rule_info(
    key: i32,
    uuid: &str,
    name: &str,
    enabled: Option<bool>,
    mandatory: Option<bool>,
    members: &[&str],
) -> ClusterRuleInfo {
    ClusterRuleInfo {
        key: Some(key),
        name: Some(name.to_string()),
        enabled,
        mandatory,
        user_created: Some(true),
        in_compliance: Some(true),
        status: Some("green".to_string()),
        rule_uuid: Some(uuid.to_string()),
        kind: ClusterRuleKind::AntiAffinity {
            vm: members.iter().map(|m| ManagedObjectReference::virtual_machine(*m)).collect(),
        },
    }
}

pub fn host_override_spec(host_id: &str, level: DpmAutomationLevel, enabled: bool) -> HostOverrideSpec {
    HostOverrideSpec {
        compute_cluster_id: CLUSTER_ID.to_string(),
        host_system_id: host_id.to_string(),
        dpm_automation_level: level,
        dpm_enabled: enabled,
    }
}

pub fn library_item_spec(name: &str, file_urls: &[&str]) -> ContentLibraryItemSpec {
    ContentLibraryItemSpec {
        name: name.to_string(),
        description: None,
        library_id: LIBRARY_ID.to_string(),
        item_type: ContentType::Ovf,
        file_url: file_urls.iter().map(|u| u.to_string()).collect(),
    }
}

pub fn library_item(id: &str, name: &str, item_type: LibraryItemType) -> LibraryItem {
    LibraryItem {
        id: id.to_string(),
        library_id: LIBRARY_ID.to_string(),
        name: name.to_string(),
        description: None,
        item_type,
    }
}
