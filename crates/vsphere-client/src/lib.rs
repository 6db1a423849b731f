//! vSphere REST API Client
//!
//! A Rust client library for the parts of the vSphere API that cluster policy
//! reconciliation needs. Provides typed models for cluster rules, DPM host
//! overrides and content library items.
//!
//! # Example
//!
//! ```no_run
//! use vsphere_client::{VSphereClient, VSphereClientTrait};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = VSphereClient::new(
//!     "https://vcenter.example.com".to_string(),
//!     "administrator@vsphere.local".to_string(),
//!     "secret".to_string(),
//!     false,
//! )?;
//!
//! // Read the full rule list of a cluster
//! let config = client.get_cluster_configuration("domain-c8").await?;
//!
//! // Resubmit it unchanged and wait for the task
//! let task = client.reconfigure_cluster("domain-c8", &config).await?;
//! client.wait_task(&task).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Cluster configuration**: whole-list read and reconfigure of rules and DPM host configs
//! - **Tasks**: blocking wait on reconfigure tasks
//! - **Inventory**: path lookup returning every match, so callers can detect ambiguity
//! - **Content library**: item CRUD and pulling files from source URLs
//! - **Mocking**: `MockVSphereClient` behind the `test-util` feature

pub mod client;
pub mod common;
pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod vsphere_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::VSphereClient;
pub use common::HttpClient;
pub use error::VSphereError;
pub use models::*;
pub use vsphere_trait::VSphereClientTrait;
#[cfg(any(test, feature = "test-util"))]
pub use mock::{MockVSphereClient, ReconfigureHook};
