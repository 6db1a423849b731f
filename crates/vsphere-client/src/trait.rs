//! VSphereClient trait for mocking
//!
//! This trait abstracts the VSphereClient so the controller can run against
//! the in-memory mock in unit tests.

use crate::error::VSphereError;
use crate::models::*;

/// Trait for vSphere API client operations
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
/// Errors distinguish `VSphereError::NotFound` from every other failure kind.
#[async_trait::async_trait]
pub trait VSphereClientTrait: Send + Sync {
    /// Get the base URL
    fn base_url(&self) -> &str;

    /// Open (or validate) the API session
    async fn validate_session(&self) -> Result<(), VSphereError>;

    // Cluster configuration
    async fn get_cluster_configuration(&self, cluster_id: &str) -> Result<ClusterConfiguration, VSphereError>;
    async fn reconfigure_cluster(&self, cluster_id: &str, config: &ClusterConfiguration) -> Result<TaskHandle, VSphereError>;
    async fn wait_task(&self, task: &TaskHandle) -> Result<(), VSphereError>;

    // Inventory lookup. Inventory paths are not unique, so every match is returned.
    async fn find_clusters_by_path(&self, path: &str) -> Result<Vec<ManagedObjectReference>, VSphereError>;
    async fn find_hosts_by_path(&self, path: &str) -> Result<Vec<ManagedObjectReference>, VSphereError>;

    // Content library
    async fn get_library_item(&self, id: &str) -> Result<LibraryItem, VSphereError>;
    async fn find_library_items(&self, library_id: &str, name: &str) -> Result<Vec<String>, VSphereError>;
    async fn create_library_item(&self, spec: &LibraryItemCreateSpec) -> Result<String, VSphereError>;
    async fn update_library_item(&self, id: &str, spec: &LibraryItemUpdateSpec) -> Result<(), VSphereError>;
    async fn delete_library_item(&self, id: &str) -> Result<(), VSphereError>;
    async fn upload_library_item_files(&self, id: &str, sources: &[String]) -> Result<(), VSphereError>;
}
