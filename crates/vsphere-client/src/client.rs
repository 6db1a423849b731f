//! vSphere API client
//!
//! Implements the vSphere REST API calls the policy controller needs:
//! cluster configuration read/reconfigure, task polling, inventory lookup by
//! path, and content library items.

use crate::common::HttpClient;
use crate::error::VSphereError;
use crate::models::*;
use crate::vsphere_trait::VSphereClientTrait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// First interval between task status polls
const TASK_POLL_MIN: Duration = Duration::from_millis(500);
/// Upper bound for the interval between task status polls
const TASK_POLL_MAX: Duration = Duration::from_secs(10);

/// vSphere API client
pub struct VSphereClient {
    http: HttpClient,
}

impl VSphereClient {
    /// Create a new vSphere client
    ///
    /// # Arguments
    /// * `base_url` - vCenter base URL (e.g., "https://vcenter.example.com")
    /// * `username` - SSO user name
    /// * `password` - SSO password
    /// * `insecure` - accept self-signed certificates
    pub fn new(
        base_url: String,
        username: String,
        password: String,
        insecure: bool,
    ) -> Result<Self, VSphereError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .danger_accept_invalid_certs(insecure)
            .build()
            .map_err(VSphereError::Http)?;

        Ok(Self {
            http: HttpClient::new(client, base_url, username, password),
        })
    }

    /// Get a cluster's full rule and DPM configuration
    pub async fn get_cluster_configuration(
        &self,
        cluster_id: &str,
    ) -> Result<ClusterConfiguration, VSphereError> {
        debug!("Fetching configuration of cluster {}", cluster_id);
        self.http
            .get(&format!("/api/vcenter/cluster/{}/configuration", cluster_id))
            .await
            .map_err(|e| match e {
                VSphereError::NotFound(_) => {
                    VSphereError::NotFound(format!("Cluster {} not found", cluster_id))
                }
                other => other,
            })
    }

    /// Submit a complete cluster configuration, replacing the existing lists
    ///
    /// # Returns
    /// * `Ok(TaskHandle)` - handle of the reconfigure task
    pub async fn reconfigure_cluster(
        &self,
        cluster_id: &str,
        config: &ClusterConfiguration,
    ) -> Result<TaskHandle, VSphereError> {
        debug!(
            "Reconfiguring cluster {} ({} rules, {} DPM host configs)",
            cluster_id,
            config.rules.len(),
            config.dpm_host_configs.len()
        );
        let body = serde_json::to_value(config)?;
        let task_id: String = self
            .http
            .post(
                &format!(
                    "/api/vcenter/cluster/{}/configuration?action=reconfigure&vmw-task=true",
                    cluster_id
                ),
                &body,
            )
            .await?;
        Ok(TaskHandle::new(task_id))
    }

    /// Block until a task leaves the pending/running states
    ///
    /// Polls the task endpoint, doubling the interval up to `TASK_POLL_MAX`.
    pub async fn wait_task(&self, task: &TaskHandle) -> Result<(), VSphereError> {
        let mut interval = TASK_POLL_MIN;
        loop {
            let info: TaskInfo = self.http.get(&format!("/api/cis/tasks/{}", task.id)).await?;
            match info.status {
                TaskStatus::Succeeded => {
                    debug!("Task {} succeeded", task.id);
                    return Ok(());
                }
                TaskStatus::Failed => {
                    let message = info
                        .error
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| "no error details".to_string());
                    return Err(VSphereError::TaskFailed {
                        task: task.id.clone(),
                        message,
                    });
                }
                TaskStatus::Blocked => {
                    warn!("Task {} is blocked, continuing to wait", task.id);
                }
                TaskStatus::Pending | TaskStatus::Running => {}
            }
            tokio::time::sleep(interval).await;
            interval = std::cmp::min(interval * 2, TASK_POLL_MAX);
        }
    }

    async fn lookup(&self, kind: &str, path: &str) -> Result<Vec<ManagedObjectReference>, VSphereError> {
        let query = self.http.build_query_string(&[("type", kind), ("path", path)]);
        debug!("Looking up {} at inventory path {}", kind, path);
        match self
            .http
            .get::<Vec<ManagedObjectReference>>(&format!("/api/vcenter/inventory/lookup?{}", query))
            .await
        {
            Ok(found) => Ok(found.into_iter().filter(|r| r.kind == kind).collect()),
            Err(VSphereError::NotFound(_)) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    /// Find every cluster registered at an inventory path
    pub async fn find_clusters_by_path(&self, path: &str) -> Result<Vec<ManagedObjectReference>, VSphereError> {
        self.lookup(CLUSTER_COMPUTE_RESOURCE, path).await
    }

    /// Find every host registered at an inventory path
    pub async fn find_hosts_by_path(&self, path: &str) -> Result<Vec<ManagedObjectReference>, VSphereError> {
        self.lookup(HOST_SYSTEM, path).await
    }

    /// Get a content library item by ID
    pub async fn get_library_item(&self, id: &str) -> Result<LibraryItem, VSphereError> {
        debug!("Fetching content library item {}", id);
        self.http
            .get(&format!("/api/content/library/item/{}", id))
            .await
            .map_err(|e| match e {
                VSphereError::NotFound(_) => {
                    VSphereError::NotFound(format!("Content library item {} not found", id))
                }
                other => other,
            })
    }

    /// Find the IDs of every item with `name` in a library
    pub async fn find_library_items(&self, library_id: &str, name: &str) -> Result<Vec<String>, VSphereError> {
        debug!("Looking up content library item {} in library {}", name, library_id);
        self.http
            .post(
                "/api/content/library/item?action=find",
                &serde_json::json!({ "library_id": library_id, "name": name }),
            )
            .await
    }

    /// Create a content library item, returning its ID
    pub async fn create_library_item(&self, spec: &LibraryItemCreateSpec) -> Result<String, VSphereError> {
        if spec.name.is_empty() {
            return Err(VSphereError::InvalidRequest(
                "library item name must not be empty".to_string(),
            ));
        }
        let body = serde_json::to_value(spec)?;
        self.http.post("/api/content/library/item", &body).await
    }

    /// Update name and/or description of a content library item
    pub async fn update_library_item(&self, id: &str, spec: &LibraryItemUpdateSpec) -> Result<(), VSphereError> {
        let body = serde_json::to_value(spec)?;
        self.http
            .patch(&format!("/api/content/library/item/{}", id), &body)
            .await
    }

    /// Delete a content library item
    pub async fn delete_library_item(&self, id: &str) -> Result<(), VSphereError> {
        self.http
            .delete(&format!("/api/content/library/item/{}", id))
            .await
    }

    /// Pull files from source URLs into a library item through an update session
    pub async fn upload_library_item_files(&self, id: &str, sources: &[String]) -> Result<(), VSphereError> {
        if sources.is_empty() {
            return Ok(());
        }

        let session_id: String = self
            .http
            .post(
                "/api/content/library/item/update-session",
                &serde_json::json!({ "library_item_id": id }),
            )
            .await?;
        debug!("Opened update session {} for library item {}", session_id, id);

        for source in sources {
            let name = file_name_from_url(source);
            let body = serde_json::json!({
                "name": name,
                "source_type": "PULL",
                "source_endpoint": { "uri": source },
            });
            if let Err(e) = self
                .http
                .post_empty(
                    &format!(
                        "/api/content/library/item/updatesession/file/{}?action=add",
                        session_id
                    ),
                    &body,
                )
                .await
            {
                self.fail_update_session(&session_id).await;
                return Err(e);
            }
        }

        let complete = self
            .http
            .post_empty(
                &format!(
                    "/api/content/library/item/update-session/{}?action=complete",
                    session_id
                ),
                &serde_json::json!({}),
            )
            .await;
        if let Err(e) = complete {
            self.fail_update_session(&session_id).await;
            return Err(e);
        }

        self.wait_update_session(&session_id).await
    }

    async fn fail_update_session(&self, session_id: &str) {
        if let Err(e) = self
            .http
            .post_empty(
                &format!(
                    "/api/content/library/item/update-session/{}?action=fail",
                    session_id
                ),
                &serde_json::json!({ "client_error_message": "upload aborted" }),
            )
            .await
        {
            warn!("Failed to mark update session {} as failed: {}", session_id, e);
        }
    }

    async fn wait_update_session(&self, session_id: &str) -> Result<(), VSphereError> {
        #[derive(Deserialize)]
        struct UpdateSession {
            state: String,
            #[serde(default)]
            error_message: Option<serde_json::Value>,
        }

        let mut interval = TASK_POLL_MIN;
        loop {
            let session: UpdateSession = self
                .http
                .get(&format!(
                    "/api/content/library/item/update-session/{}",
                    session_id
                ))
                .await?;
            match session.state.as_str() {
                "DONE" => return Ok(()),
                "ERROR" | "CANCELED" => {
                    return Err(VSphereError::TaskFailed {
                        task: session_id.to_string(),
                        message: session
                            .error_message
                            .map(|e| e.to_string())
                            .unwrap_or_else(|| session.state.clone()),
                    });
                }
                _ => {}
            }
            tokio::time::sleep(interval).await;
            interval = std::cmp::min(interval * 2, TASK_POLL_MAX);
        }
    }
}

/// Last path segment of a source URL, used as the library file name
pub(crate) fn file_name_from_url(url: &str) -> String {
    let trimmed = url.split(['?', '#']).next().unwrap_or(url);
    trimmed
        .rsplit('/')
        .find(|s| !s.is_empty())
        .unwrap_or(trimmed)
        .to_string()
}

#[async_trait::async_trait]
impl VSphereClientTrait for VSphereClient {
    fn base_url(&self) -> &str {
        self.http.base_url()
    }

    async fn validate_session(&self) -> Result<(), VSphereError> {
        self.http.login().await
    }

    async fn get_cluster_configuration(&self, cluster_id: &str) -> Result<ClusterConfiguration, VSphereError> {
        VSphereClient::get_cluster_configuration(self, cluster_id).await
    }

    async fn reconfigure_cluster(&self, cluster_id: &str, config: &ClusterConfiguration) -> Result<TaskHandle, VSphereError> {
        VSphereClient::reconfigure_cluster(self, cluster_id, config).await
    }

    async fn wait_task(&self, task: &TaskHandle) -> Result<(), VSphereError> {
        VSphereClient::wait_task(self, task).await
    }

    async fn find_clusters_by_path(&self, path: &str) -> Result<Vec<ManagedObjectReference>, VSphereError> {
        VSphereClient::find_clusters_by_path(self, path).await
    }

    async fn find_hosts_by_path(&self, path: &str) -> Result<Vec<ManagedObjectReference>, VSphereError> {
        VSphereClient::find_hosts_by_path(self, path).await
    }

    async fn get_library_item(&self, id: &str) -> Result<LibraryItem, VSphereError> {
        VSphereClient::get_library_item(self, id).await
    }

    async fn find_library_items(&self, library_id: &str, name: &str) -> Result<Vec<String>, VSphereError> {
        VSphereClient::find_library_items(self, library_id, name).await
    }

    async fn create_library_item(&self, spec: &LibraryItemCreateSpec) -> Result<String, VSphereError> {
        VSphereClient::create_library_item(self, spec).await
    }

    async fn update_library_item(&self, id: &str, spec: &LibraryItemUpdateSpec) -> Result<(), VSphereError> {
        VSphereClient::update_library_item(self, id, spec).await
    }

    async fn delete_library_item(&self, id: &str) -> Result<(), VSphereError> {
        VSphereClient::delete_library_item(self, id).await
    }

    async fn upload_library_item_files(&self, id: &str, sources: &[String]) -> Result<(), VSphereError> {
        VSphereClient::upload_library_item_files(self, id, sources).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_from_url() {
        assert_eq!(
            file_name_from_url("https://images.example.com/ubuntu/focal.ovf"),
            "focal.ovf"
        );
        assert_eq!(
            file_name_from_url("https://images.example.com/disk.vmdk?token=abc"),
            "disk.vmdk"
        );
        assert_eq!(file_name_from_url("https://images.example.com/dir/"), "dir");
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = VSphereClient::new(
            "https://vcenter.example.com/".to_string(),
            "user".to_string(),
            "pass".to_string(),
            false,
        )
        .expect("client");
        assert_eq!(client.base_url(), "https://vcenter.example.com");
    }
}
