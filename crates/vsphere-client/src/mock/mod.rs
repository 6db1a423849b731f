//! Mock VSphereClient for unit testing
//!
//! This module provides an in-memory implementation of VSphereClientTrait so
//! reconciler tests run without a vCenter.
//!
//! The mock is organized into domain-specific modules:
//! - `cluster.rs` - cluster configuration, reconfigure tasks, inventory lookup
//! - `content_library.rs` - content library items

mod cluster;
mod content_library;

use crate::error::VSphereError;
use crate::models::*;
use crate::vsphere_trait::VSphereClientTrait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Hook run against a cluster configuration right after the mock accepts it.
/// Lets tests simulate a remote system that rewrites submitted values.
pub type ReconfigureHook = Arc<dyn Fn(&mut ClusterConfiguration) + Send + Sync>;

/// Mock VSphereClient for testing
///
/// Stores clusters, hosts and library items in memory. Reconfigure calls
/// replace the stored configuration wholesale and assign keys, UUIDs and
/// compliance fields the way vCenter does.
#[derive(Clone)]
pub struct MockVSphereClient {
    pub(crate) base_url: String,
    // In-memory storage for resources
    pub(crate) clusters: Arc<Mutex<HashMap<String, ClusterConfiguration>>>,
    pub(crate) inventory: Arc<Mutex<Vec<(String, ManagedObjectReference)>>>,
    pub(crate) library_items: Arc<Mutex<HashMap<String, LibraryItem>>>,
    pub(crate) uploaded_files: Arc<Mutex<HashMap<String, Vec<String>>>>,
    pub(crate) tasks: Arc<Mutex<HashMap<String, Option<String>>>>,
    // Failure injection
    pub(crate) reconfigure_hook: Arc<Mutex<Option<ReconfigureHook>>>,
    pub(crate) fail_next_reconfigure: Arc<Mutex<Option<String>>>,
    pub(crate) fail_next_task: Arc<Mutex<Option<String>>>,
    pub(crate) fail_next_upload: Arc<Mutex<Option<String>>>,
    // Call counters
    pub(crate) reconfigure_calls: Arc<Mutex<u32>>,
    // Counter for generating keys
    pub(crate) next_key: Arc<Mutex<i32>>,
}

/// Lock a mock store, ignoring poisoning from a panicked test thread
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockVSphereClient {
    /// Create a new mock client
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            clusters: Arc::new(Mutex::new(HashMap::new())),
            inventory: Arc::new(Mutex::new(Vec::new())),
            library_items: Arc::new(Mutex::new(HashMap::new())),
            uploaded_files: Arc::new(Mutex::new(HashMap::new())),
            tasks: Arc::new(Mutex::new(HashMap::new())),
            reconfigure_hook: Arc::new(Mutex::new(None)),
            fail_next_reconfigure: Arc::new(Mutex::new(None)),
            fail_next_task: Arc::new(Mutex::new(None)),
            fail_next_upload: Arc::new(Mutex::new(None)),
            reconfigure_calls: Arc::new(Mutex::new(0)),
            next_key: Arc::new(Mutex::new(1)),
        }
    }

    /// Register an empty cluster at an inventory path (for test setup)
    pub fn add_cluster(&self, cluster_id: &str, path: &str) {
        lock(&self.clusters).insert(cluster_id.to_string(), ClusterConfiguration::default());
        lock(&self.inventory).push((
            path.to_string(),
            ManagedObjectReference::new(CLUSTER_COMPUTE_RESOURCE, cluster_id),
        ));
    }

    /// Register a host at an inventory path (for test setup)
    pub fn add_host(&self, host_id: &str, path: &str) {
        lock(&self.inventory).push((path.to_string(), ManagedObjectReference::host(host_id)));
    }

    /// Replace a cluster's configuration verbatim, without assigning keys (for test setup)
    pub fn set_cluster_configuration(&self, cluster_id: &str, config: ClusterConfiguration) {
        lock(&self.clusters).insert(cluster_id.to_string(), config);
    }

    /// Current configuration of a cluster, if it exists
    pub fn cluster_configuration(&self, cluster_id: &str) -> Option<ClusterConfiguration> {
        lock(&self.clusters).get(cluster_id).cloned()
    }

    /// Remove a cluster, as if it was destroyed out of band
    pub fn remove_cluster(&self, cluster_id: &str) {
        lock(&self.clusters).remove(cluster_id);
        lock(&self.inventory).retain(|(_, r)| r.value != cluster_id);
    }

    /// Add a library item (for test setup)
    pub fn add_library_item(&self, item: LibraryItem) {
        lock(&self.library_items).insert(item.id.clone(), item);
    }

    /// Files pulled into a library item so far
    pub fn uploaded_files(&self, item_id: &str) -> Vec<String> {
        lock(&self.uploaded_files).get(item_id).cloned().unwrap_or_default()
    }

    /// Install a hook that rewrites every accepted configuration
    pub fn set_reconfigure_hook(&self, hook: ReconfigureHook) {
        *lock(&self.reconfigure_hook) = Some(hook);
    }

    /// Make the next reconfigure call fail with an API error
    pub fn fail_next_reconfigure(&self, message: impl Into<String>) {
        *lock(&self.fail_next_reconfigure) = Some(message.into());
    }

    /// Make the next reconfigure task end in a failed state
    pub fn fail_next_task(&self, message: impl Into<String>) {
        *lock(&self.fail_next_task) = Some(message.into());
    }

    /// Make the next file upload into a library item fail
    pub fn fail_next_upload(&self, message: impl Into<String>) {
        *lock(&self.fail_next_upload) = Some(message.into());
    }

    /// Number of reconfigure calls accepted so far
    pub fn reconfigure_calls(&self) -> u32 {
        *lock(&self.reconfigure_calls)
    }

    /// Generate next key
    pub(crate) fn next_key(&self) -> i32 {
        let mut key = lock(&self.next_key);
        let current = *key;
        *key += 1;
        current
    }
}

#[async_trait::async_trait]
impl VSphereClientTrait for MockVSphereClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn validate_session(&self) -> Result<(), VSphereError> {
        Ok(())
    }

    // Cluster operations - delegated to cluster module
    async fn get_cluster_configuration(&self, cluster_id: &str) -> Result<ClusterConfiguration, VSphereError> {
        cluster::get_cluster_configuration(self, cluster_id).await
    }

    async fn reconfigure_cluster(&self, cluster_id: &str, config: &ClusterConfiguration) -> Result<TaskHandle, VSphereError> {
        cluster::reconfigure_cluster(self, cluster_id, config).await
    }

    async fn wait_task(&self, task: &TaskHandle) -> Result<(), VSphereError> {
        cluster::wait_task(self, task).await
    }

    async fn find_clusters_by_path(&self, path: &str) -> Result<Vec<ManagedObjectReference>, VSphereError> {
        cluster::find_by_path(self, CLUSTER_COMPUTE_RESOURCE, path).await
    }

    async fn find_hosts_by_path(&self, path: &str) -> Result<Vec<ManagedObjectReference>, VSphereError> {
        cluster::find_by_path(self, HOST_SYSTEM, path).await
    }

    // Content library operations - delegated to content_library module
    async fn get_library_item(&self, id: &str) -> Result<LibraryItem, VSphereError> {
        content_library::get_library_item(self, id).await
    }

    async fn find_library_items(&self, library_id: &str, name: &str) -> Result<Vec<String>, VSphereError> {
        content_library::find_library_items(self, library_id, name).await
    }

    async fn create_library_item(&self, spec: &LibraryItemCreateSpec) -> Result<String, VSphereError> {
        content_library::create_library_item(self, spec).await
    }

    async fn update_library_item(&self, id: &str, spec: &LibraryItemUpdateSpec) -> Result<(), VSphereError> {
        content_library::update_library_item(self, id, spec).await
    }

    async fn delete_library_item(&self, id: &str) -> Result<(), VSphereError> {
        content_library::delete_library_item(self, id).await
    }

    async fn upload_library_item_files(&self, id: &str, sources: &[String]) -> Result<(), VSphereError> {
        content_library::upload_library_item_files(self, id, sources).await
    }
}
