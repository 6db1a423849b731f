//! Manifest format
//!
//! A manifest is a YAML document listing every resource that should exist:
//!
//! ```yaml
//! resources:
//!   - kind: ClusterRule
//!     name: web-spread
//!     compute_cluster_id: domain-c8
//!     rule:
//!       kind: vm_anti_affinity
//!       virtual_machine_ids: [vm-101, vm-102]
//!   - kind: DpmHostOverride
//!     compute_cluster_id: domain-c8
//!     host_system_id: host-12
//!     dpm_automation_level: automated
//!     dpm_enabled: true
//! ```

use crate::error::ResourceError;
use crate::fields::{Described, Field, check_fields, fields_for_kind};
use crate::{ClusterRuleSpec, ContentLibraryItemSpec, HostOverrideSpec, ResourceStatus};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Top-level manifest document
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Manifest {
    #[serde(default)]
    pub resources: Vec<ResourceDescriptor>,
}

/// A declared resource, discriminated by `kind`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(tag = "kind")]
pub enum ResourceDescriptor {
    ClusterRule(ClusterRuleSpec),
    DpmHostOverride(HostOverrideSpec),
    ContentLibraryItem(ContentLibraryItemSpec),
}

impl ResourceDescriptor {
    /// Stable state key of the resource
    pub fn address(&self) -> String {
        match self {
            ResourceDescriptor::ClusterRule(spec) => spec.address(),
            ResourceDescriptor::DpmHostOverride(spec) => spec.address(),
            ResourceDescriptor::ContentLibraryItem(spec) => spec.address(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ResourceDescriptor::ClusterRule(_) => ClusterRuleSpec::KIND,
            ResourceDescriptor::DpmHostOverride(_) => HostOverrideSpec::KIND,
            ResourceDescriptor::ContentLibraryItem(_) => ContentLibraryItemSpec::KIND,
        }
    }

    /// Key of the parent object whose writes must be serialized.
    ///
    /// Rules and overrides of one cluster share a single configuration
    /// document, so they get the same parent. Library items are grouped per
    /// library.
    pub fn parent(&self) -> String {
        match self {
            ResourceDescriptor::ClusterRule(spec) => format!("cluster/{}", spec.compute_cluster_id),
            ResourceDescriptor::DpmHostOverride(spec) => format!("cluster/{}", spec.compute_cluster_id),
            ResourceDescriptor::ContentLibraryItem(spec) => format!("library/{}", spec.library_id),
        }
    }

    pub fn fields(&self) -> &'static [Field] {
        match self {
            ResourceDescriptor::ClusterRule(_) => ClusterRuleSpec::fields(),
            ResourceDescriptor::DpmHostOverride(_) => HostOverrideSpec::fields(),
            ResourceDescriptor::ContentLibraryItem(_) => ContentLibraryItemSpec::fields(),
        }
    }

    /// Status of a resource nothing is known about yet
    pub fn pending_status(&self) -> ResourceStatus {
        match self {
            ResourceDescriptor::ClusterRule(_) => ResourceStatus::ClusterRule(Default::default()),
            ResourceDescriptor::DpmHostOverride(_) => ResourceStatus::DpmHostOverride(Default::default()),
            ResourceDescriptor::ContentLibraryItem(_) => ResourceStatus::ContentLibraryItem(Default::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ResourceError> {
        match self {
            ResourceDescriptor::ClusterRule(spec) => spec.validate(),
            ResourceDescriptor::DpmHostOverride(spec) => spec.validate(),
            ResourceDescriptor::ContentLibraryItem(spec) => spec.validate(),
        }
    }
}

impl Manifest {
    /// Parse and validate a manifest
    pub fn from_yaml(yaml: &str) -> Result<Self, ResourceError> {
        let raw: serde_yaml::Value = serde_yaml::from_str(yaml)?;

        if let Some(entries) = raw.get("resources").and_then(|r| r.as_sequence()) {
            for (index, entry) in entries.iter().enumerate() {
                let label = format!("resources[{}]", index);
                let mapping = entry.as_mapping().ok_or_else(|| ResourceError::Validation {
                    resource: label.clone(),
                    message: "expected a mapping".to_string(),
                })?;
                let kind = mapping
                    .get("kind")
                    .and_then(|k| k.as_str())
                    .ok_or_else(|| ResourceError::Validation {
                        resource: label.clone(),
                        message: "missing `kind`".to_string(),
                    })?;
                let fields = fields_for_kind(kind).ok_or_else(|| ResourceError::Validation {
                    resource: label.clone(),
                    message: format!("unknown kind `{}`", kind),
                })?;
                check_fields(&format!("{} ({})", label, kind), mapping, fields)?;
            }
        }

        let manifest: Manifest = serde_yaml::from_value(raw)?;

        let mut seen = HashSet::new();
        for resource in &manifest.resources {
            resource.validate()?;
            let address = resource.address();
            if !seen.insert(address.clone()) {
                return Err(ResourceError::Validation {
                    resource: address,
                    message: "declared more than once".to_string(),
                });
            }
        }

        Ok(manifest)
    }

    /// Read, parse and validate a manifest file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ResourceError> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml(&yaml)
    }

    pub fn to_yaml(&self) -> Result<String, ResourceError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Look up a declared resource by address
    pub fn get(&self, address: &str) -> Option<&ResourceDescriptor> {
        self.resources.iter().find(|r| r.address() == address)
    }
}
