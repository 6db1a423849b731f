//! Observed state of managed resources
//!
//! Statuses hold the computed (read-only) fields the remote system assigns,
//! plus the outcome of the last reconciliation.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Reconciliation state of a resource
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum ResourceState {
    #[default]
    Pending,
    Created,
    Updated,
    Failed,
}

/// ClusterRuleStatus defines the observed state of a cluster rule
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct ClusterRuleStatus {
    /// Rule key assigned by vCenter
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<i32>,

    /// Rule UUID assigned by vCenter
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_uuid: Option<String>,

    /// Whether the rule was created by a user (as opposed to the system)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_created: Option<bool>,

    /// Whether the cluster currently complies with the rule
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_compliance: Option<bool>,

    /// Rule status reported by vCenter (green, yellow, red, gray)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    /// Current state of the rule
    pub state: ResourceState,

    /// Error message if reconciliation failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Last reconciliation timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_reconciled: Option<chrono::DateTime<chrono::Utc>>,
}

/// HostOverrideStatus defines the observed state of a DPM host override
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct HostOverrideStatus {
    /// Override key assigned by vCenter
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<i32>,

    pub state: ResourceState,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_reconciled: Option<chrono::DateTime<chrono::Utc>>,
}

/// ContentLibraryItemStatus defines the observed state of a content library item
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct ContentLibraryItemStatus {
    /// Item ID assigned by vCenter
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub state: ResourceState,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_reconciled: Option<chrono::DateTime<chrono::Utc>>,
}

/// Status of any managed resource, tagged by resource kind
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(tag = "kind")]
pub enum ResourceStatus {
    ClusterRule(ClusterRuleStatus),
    DpmHostOverride(HostOverrideStatus),
    ContentLibraryItem(ContentLibraryItemStatus),
}

impl ResourceStatus {
    /// Current state regardless of kind
    pub fn state(&self) -> ResourceState {
        match self {
            ResourceStatus::ClusterRule(s) => s.state,
            ResourceStatus::DpmHostOverride(s) => s.state,
            ResourceStatus::ContentLibraryItem(s) => s.state,
        }
    }

    /// Error message regardless of kind
    pub fn error(&self) -> Option<&str> {
        match self {
            ResourceStatus::ClusterRule(s) => s.error.as_deref(),
            ResourceStatus::DpmHostOverride(s) => s.error.as_deref(),
            ResourceStatus::ContentLibraryItem(s) => s.error.as_deref(),
        }
    }

    /// Mark the resource failed, keeping the computed fields of the last success
    pub fn mark_failed(&mut self, message: impl Into<String>) {
        let message = Some(message.into());
        match self {
            ResourceStatus::ClusterRule(s) => {
                s.state = ResourceState::Failed;
                s.error = message;
            }
            ResourceStatus::DpmHostOverride(s) => {
                s.state = ResourceState::Failed;
                s.error = message;
            }
            ResourceStatus::ContentLibraryItem(s) => {
                s.state = ResourceState::Failed;
                s.error = message;
            }
        }
    }
}
