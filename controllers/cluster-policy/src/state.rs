//! Local state store
//!
//! Records every resource the controller manages, with the descriptor it was
//! last applied from and its status. Resources that disappear from the
//! manifest are found here and deleted; computed fields such as rule keys and
//! item IDs are carried from one run to the next.
//!
//! The file is JSON and is replaced atomically on save.

use crate::error::ControllerError;
use resources::{Manifest, ResourceDescriptor, ResourceStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

const STATE_VERSION: u32 = 1;

/// One managed resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateEntry {
    pub descriptor: ResourceDescriptor,
    pub status: ResourceStatus,
}

#[derive(Debug, Serialize, Deserialize)]
struct StateFile {
    version: u32,
    #[serde(default)]
    resources: BTreeMap<String, StateEntry>,
}

/// Managed resources keyed by address
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    resources: BTreeMap<String, StateEntry>,
}

impl StateStore {
    /// Load the state file at `path`. A missing file is an empty state.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ControllerError> {
        let path = path.into();
        let resources = match std::fs::read_to_string(&path) {
            Ok(json) => {
                let file: StateFile = serde_json::from_str(&json)
                    .map_err(|e| state_error(&path, e))?;
                if file.version != STATE_VERSION {
                    return Err(ControllerError::State(format!(
                        "{}: unsupported state version {}",
                        path.display(),
                        file.version
                    )));
                }
                file.resources
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No state file at {}, starting empty", path.display());
                BTreeMap::new()
            }
            Err(e) => return Err(state_error(&path, e)),
        };
        Ok(Self { path, resources })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the state next to its final location, then rename it into place
    pub fn save(&self) -> Result<(), ControllerError> {
        let file = StateFile {
            version: STATE_VERSION,
            resources: self.resources.clone(),
        };
        let json = serde_json::to_string_pretty(&file).map_err(|e| state_error(&self.path, e))?;

        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| state_error(&self.path, e))?;
        tmp.write_all(json.as_bytes()).map_err(|e| state_error(&self.path, e))?;
        tmp.as_file().sync_all().map_err(|e| state_error(&self.path, e))?;
        tmp.persist(&self.path).map_err(|e| state_error(&self.path, e.error))?;

        debug!("Saved {} resources to {}", self.resources.len(), self.path.display());
        Ok(())
    }

    pub fn get(&self, address: &str) -> Option<&StateEntry> {
        self.resources.get(address)
    }

    pub fn status(&self, address: &str) -> Option<&ResourceStatus> {
        self.resources.get(address).map(|e| &e.status)
    }

    pub fn upsert(&mut self, descriptor: ResourceDescriptor, status: ResourceStatus) {
        self.resources
            .insert(descriptor.address(), StateEntry { descriptor, status });
    }

    pub fn remove(&mut self, address: &str) -> Option<StateEntry> {
        self.resources.remove(address)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &StateEntry)> {
        self.resources.iter()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Managed resources no longer declared in `manifest`
    pub fn orphans(&self, manifest: &Manifest) -> Vec<StateEntry> {
        self.resources
            .iter()
            .filter(|(address, _)| manifest.get(address).is_none())
            .map(|(_, entry)| entry.clone())
            .collect()
    }
}

fn state_error(path: &Path, e: impl std::fmt::Display) -> ControllerError {
    ControllerError::State(format!("{}: {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use resources::{ClusterRuleStatus, ResourceState, TriState};

    fn rule(name: &str) -> ResourceDescriptor {
        ResourceDescriptor::ClusterRule(anti_affinity_spec(name, &["vm-a"], TriState::True, TriState::Unset))
    }

    fn status(key: i32) -> ResourceStatus {
        ResourceStatus::ClusterRule(ClusterRuleStatus {
            key: Some(key),
            state: ResourceState::Created,
            ..Default::default()
        })
    }

    #[test]
    fn test_missing_file_is_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::load(dir.path().join("state.json")).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut store = StateStore::load(&path).unwrap();
        store.upsert(rule("r1"), status(42));
        store.save().unwrap();

        let reloaded = StateStore::load(&path).unwrap();
        assert_eq!(reloaded.len(), 1);
        let entry = reloaded.get("cluster_rule/domain-c1/r1").unwrap();
        assert_eq!(entry.descriptor, rule("r1"));
        assert_eq!(entry.status, status(42));
    }

    #[test]
    fn test_orphans_are_resources_missing_from_the_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = StateStore::load(dir.path().join("state.json")).unwrap();
        store.upsert(rule("r1"), status(1));
        store.upsert(rule("r2"), status(2));

        let manifest = Manifest {
            resources: vec![rule("r1")],
        };
        let orphans = store.orphans(&manifest);
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].descriptor, rule("r2"));

        store.remove("cluster_rule/domain-c1/r2");
        assert!(store.orphans(&manifest).is_empty());
    }

    #[test]
    fn test_corrupt_file_is_a_state_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = StateStore::load(&path).unwrap_err();
        assert!(matches!(err, ControllerError::State(_)));
    }

    #[test]
    fn test_unknown_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, r#"{"version": 99, "resources": {}}"#).unwrap();

        assert!(matches!(StateStore::load(&path), Err(ControllerError::State(_))));
    }
}
