//! Command line and environment configuration.
//!
//! Every connection setting can come from a flag or an environment variable,
//! so the same binary runs from a shell or as a long-lived `watch` service.

use crate::error::ControllerError;
use crate::import::ImportKind;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// Reconcile vSphere cluster policies from a declarative manifest
#[derive(Debug, Parser)]
#[command(name = "cluster-policy", version, about)]
pub struct Cli {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Local record of managed resources
    #[arg(long, env = "STATE_FILE", default_value = "cluster-policy.state.json", global = true)]
    pub state_file: PathBuf,

    /// Deadline for reconciling a single resource, in seconds
    #[arg(long, env = "RECONCILE_DEADLINE_SECS", default_value_t = 300, global = true)]
    pub deadline_secs: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args)]
pub struct ConnectionArgs {
    /// vCenter base URL
    #[arg(long = "vsphere-url", env = "VSPHERE_URL", global = true)]
    pub url: Option<String>,

    /// SSO user name
    #[arg(
        long = "vsphere-user",
        env = "VSPHERE_USER",
        default_value = "administrator@vsphere.local",
        global = true
    )]
    pub user: String,

    /// SSO password
    #[arg(long = "vsphere-password", env = "VSPHERE_PASSWORD", hide_env_values = true, global = true)]
    pub password: Option<String>,

    /// Accept self-signed vCenter certificates
    #[arg(long = "vsphere-insecure", env = "VSPHERE_INSECURE", global = true)]
    pub insecure: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show the changes `apply` would make
    Plan {
        #[arg(short, long, env = "MANIFEST")]
        manifest: PathBuf,
    },
    /// Converge vCenter onto the manifest and delete resources removed from it
    Apply {
        #[arg(short, long, env = "MANIFEST")]
        manifest: PathBuf,
    },
    /// Delete every managed resource
    Destroy,
    /// Apply the manifest on every resync, backing off failed resources
    Watch {
        #[arg(short, long, env = "MANIFEST")]
        manifest: PathBuf,

        /// Seconds between reconcile passes
        #[arg(long, env = "RESYNC_INTERVAL_SECS", default_value_t = 300)]
        resync_secs: u64,
    },
    /// Adopt an existing object and print its manifest entry
    Import {
        #[arg(long, value_enum)]
        kind: ImportKind,

        /// Import ID, e.g. {"compute_cluster_path":"/dc1/host/cluster1","name":"web-spread"}
        id: String,
    },
    /// Re-read the computed fields of every managed resource
    Refresh,
    /// List the fields of each resource kind
    Describe {
        /// Only this kind (ClusterRule, DpmHostOverride, ContentLibraryItem)
        kind: Option<String>,
    },
}

/// Resolved vCenter connection settings
#[derive(Debug, Clone)]
pub struct VSphereSettings {
    pub url: String,
    pub user: String,
    pub password: String,
    pub insecure: bool,
}

impl Cli {
    /// Connection settings; the URL and password have no defaults
    pub fn vsphere_settings(&self) -> Result<VSphereSettings, ControllerError> {
        let url = self
            .connection
            .url
            .clone()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| ControllerError::InvalidConfig("VSPHERE_URL environment variable is required".to_string()))?;
        let password = self.connection.password.clone().ok_or_else(|| {
            ControllerError::InvalidConfig("VSPHERE_PASSWORD environment variable is required".to_string())
        })?;
        if !url.starts_with("https://") && !url.starts_with("http://") {
            return Err(ControllerError::InvalidConfig(format!(
                "VSPHERE_URL must be an http(s) URL, got {}",
                url
            )));
        }

        Ok(VSphereSettings {
            url: url.trim_end_matches('/').to_string(),
            user: self.connection.user.clone(),
            password,
            insecure: self.connection.insecure,
        })
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }
}
