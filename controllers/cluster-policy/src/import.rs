//! Import of pre-existing remote objects.
//!
//! An import ID names an object the way an operator sees it, by inventory
//! path, and is encoded as compact JSON:
//!
//! - cluster rule: `{"compute_cluster_path":"/dc1/host/cluster1","name":"web-spread"}`
//! - DPM override: `{"compute_cluster_path":"/dc1/host/cluster1","host_path":"esxi1"}`
//! - content library item: the item ID
//!
//! A host path that is not absolute is taken relative to the cluster path.
//! Paths are not unique in vCenter, so a lookup matching more than one object
//! is an error rather than a guess.

use crate::error::ControllerError;
use crate::normalizer::normalize_library_item;
use crate::reconcile_helpers::Outcome;
use crate::reconciler::Reconciler;
use resources::{ResourceDescriptor, ResourceStatus};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};
use vsphere_client::ManagedObjectReference;

/// Kind of object an import ID refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ImportKind {
    ClusterRule,
    DpmHostOverride,
    ContentLibraryItem,
}

/// Parsed import identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportId {
    ClusterRule {
        compute_cluster_path: String,
        name: String,
    },
    DpmHostOverride {
        compute_cluster_path: String,
        host_path: String,
    },
    ContentLibraryItem {
        id: String,
    },
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleToken {
    compute_cluster_path: String,
    name: String,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct HostOverrideToken {
    compute_cluster_path: String,
    host_path: String,
}

impl ImportId {
    pub fn parse(kind: ImportKind, token: &str) -> Result<Self, ControllerError> {
        let invalid = |reason: String| ControllerError::InvalidImportId {
            id: token.to_string(),
            reason,
        };
        let required = |field: &str, value: String| {
            if value.trim().is_empty() {
                Err(invalid(format!("`{}` must not be empty", field)))
            } else {
                Ok(value)
            }
        };

        match kind {
            ImportKind::ClusterRule => {
                let parsed: RuleToken = serde_json::from_str(token).map_err(|e| invalid(e.to_string()))?;
                Ok(ImportId::ClusterRule {
                    compute_cluster_path: required("compute_cluster_path", parsed.compute_cluster_path)?,
                    name: required("name", parsed.name)?,
                })
            }
            ImportKind::DpmHostOverride => {
                let parsed: HostOverrideToken = serde_json::from_str(token).map_err(|e| invalid(e.to_string()))?;
                Ok(ImportId::DpmHostOverride {
                    compute_cluster_path: required("compute_cluster_path", parsed.compute_cluster_path)?,
                    host_path: required("host_path", parsed.host_path)?,
                })
            }
            ImportKind::ContentLibraryItem => Ok(ImportId::ContentLibraryItem {
                id: required("id", token.trim().to_string())?,
            }),
        }
    }

    /// Compact token that `parse` turns back into this ID
    pub fn encode(&self) -> String {
        let json = match self {
            ImportId::ClusterRule {
                compute_cluster_path,
                name,
            } => serde_json::to_string(&RuleToken {
                compute_cluster_path: compute_cluster_path.clone(),
                name: name.clone(),
            }),
            ImportId::DpmHostOverride {
                compute_cluster_path,
                host_path,
            } => serde_json::to_string(&HostOverrideToken {
                compute_cluster_path: compute_cluster_path.clone(),
                host_path: host_path.clone(),
            }),
            ImportId::ContentLibraryItem { id } => return id.clone(),
        };
        // Two string fields always serialize
        json.unwrap_or_default()
    }

    pub fn kind(&self) -> ImportKind {
        match self {
            ImportId::ClusterRule { .. } => ImportKind::ClusterRule,
            ImportId::DpmHostOverride { .. } => ImportKind::DpmHostOverride,
            ImportId::ContentLibraryItem { .. } => ImportKind::ContentLibraryItem,
        }
    }
}

impl fmt::Display for ImportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// Full path of a host given relative to its cluster
pub fn host_inventory_path(cluster_path: &str, host_path: &str) -> String {
    if host_path.starts_with('/') {
        host_path.to_string()
    } else {
        format!("{}/{}", cluster_path.trim_end_matches('/'), host_path)
    }
}

/// An imported object: a descriptor ready for the manifest, and its status
#[derive(Debug, Clone, PartialEq)]
pub struct Imported {
    pub descriptor: ResourceDescriptor,
    pub status: ResourceStatus,
}

fn single_match(reference: String, matches: Vec<ManagedObjectReference>) -> Result<String, ControllerError> {
    match matches.as_slice() {
        [] => Err(ControllerError::NotFound(reference)),
        [only] => Ok(only.value.clone()),
        _ => Err(ControllerError::AmbiguousReference {
            reference,
            matches: matches.iter().map(|m| m.value.clone()).collect(),
        }),
    }
}

impl Reconciler {
    /// Managed object ID of the one cluster at `path`
    pub async fn resolve_cluster_path(&self, path: &str) -> Result<String, ControllerError> {
        let matches = self.client.find_clusters_by_path(path).await?;
        debug!("Cluster path {} matched {} objects", path, matches.len());
        single_match(format!("cluster at {}", path), matches)
    }

    /// Managed object ID of the one host at `host_path`, relative to `cluster_path`
    pub async fn resolve_host_path(&self, cluster_path: &str, host_path: &str) -> Result<String, ControllerError> {
        let path = host_inventory_path(cluster_path, host_path);
        let matches = self.client.find_hosts_by_path(&path).await?;
        debug!("Host path {} matched {} objects", path, matches.len());
        single_match(format!("host at {}", path), matches)
    }

    /// Locate an existing object and rebuild the descriptor that describes it exactly
    pub async fn import(&self, id: &ImportId) -> Result<Imported, ControllerError> {
        info!("Importing {:?} {}", id.kind(), id);

        let imported = match id {
            ImportId::ClusterRule {
                compute_cluster_path,
                name,
            } => {
                let cluster_id = self.resolve_cluster_path(compute_cluster_path).await?;
                let (_, state) = self
                    .observe_cluster(&cluster_id)
                    .await?
                    .ok_or_else(|| ControllerError::NotFound(format!("cluster {}", cluster_id)))?;
                let rule = state
                    .rule_named(name)?
                    .ok_or_else(|| ControllerError::NotFound(format!("rule {} in {}", name, compute_cluster_path)))?;

                let mut status = rule.to_status();
                status.state = Outcome::Unchanged.resource_state(None);
                status.last_reconciled = Some(chrono::Utc::now());
                Imported {
                    descriptor: ResourceDescriptor::ClusterRule(rule.to_spec(&cluster_id)),
                    status: ResourceStatus::ClusterRule(status),
                }
            }
            ImportId::DpmHostOverride {
                compute_cluster_path,
                host_path,
            } => {
                let cluster_id = self.resolve_cluster_path(compute_cluster_path).await?;
                let host_id = self.resolve_host_path(compute_cluster_path, host_path).await?;
                let (_, state) = self
                    .observe_cluster(&cluster_id)
                    .await?
                    .ok_or_else(|| ControllerError::NotFound(format!("cluster {}", cluster_id)))?;
                let dpm = state.override_for(&host_id).ok_or_else(|| {
                    ControllerError::NotFound(format!("DPM override for host {} in {}", host_id, compute_cluster_path))
                })?;

                let mut status = dpm.to_status();
                status.state = Outcome::Unchanged.resource_state(None);
                status.last_reconciled = Some(chrono::Utc::now());
                Imported {
                    descriptor: ResourceDescriptor::DpmHostOverride(dpm.to_spec()),
                    status: ResourceStatus::DpmHostOverride(status),
                }
            }
            ImportId::ContentLibraryItem { id } => {
                let item = normalize_library_item(&self.client.get_library_item(id).await?);

                let mut status = item.to_status();
                status.state = Outcome::Unchanged.resource_state(None);
                status.last_reconciled = Some(chrono::Utc::now());
                Imported {
                    descriptor: ResourceDescriptor::ContentLibraryItem(item.to_spec()),
                    status: ResourceStatus::ContentLibraryItem(status),
                }
            }
        };

        info!("Imported {} as {}", id, imported.descriptor.address());
        Ok(imported)
    }
}
