//! Cluster Policy Controller
//!
//! Reconciles vSphere cluster-level policies from a declarative manifest:
//! - ClusterRule: VM anti-affinity, affinity, dependency and VM-host rules
//! - DpmHostOverride: per-host DPM automation overrides
//! - ContentLibraryItem: content library items and their source files
//!
//! Run `cluster-policy --help` for the subcommands.

mod backoff;
mod config;
mod controller;
mod diff;
mod error;
mod import;
mod normalizer;
mod reconcile_helpers;
mod reconciler;
mod records;
mod state;

#[cfg(test)]
mod test_utils;

use anyhow::{Context, bail};
use clap::Parser;
use config::{Cli, Command};
use controller::Controller;
use import::ImportId;
use reconcile_helpers::describe_actions;
use reconciler::Reconciler;
use resources::{ClusterRuleSpec, ContentLibraryItemSpec, Described, Field, HostOverrideSpec, Manifest};
use state::StateStore;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;
use vsphere_client::{VSphereClient, VSphereClientTrait};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    if let Command::Describe { kind } = &cli.command {
        return describe(kind.as_deref());
    }

    let settings = cli.vsphere_settings()?;
    info!("Starting Cluster Policy Controller");
    info!("Configuration:");
    info!("  vCenter URL: {}", settings.url);
    info!("  User: {}", settings.user);
    info!("  State file: {}", cli.state_file.display());

    let client = VSphereClient::new(settings.url.clone(), settings.user, settings.password, settings.insecure)
        .context("failed to build the vSphere client")?;
    client
        .validate_session()
        .await
        .with_context(|| format!("failed to log in to {}", settings.url))?;
    info!("vCenter session established");

    let controller = Controller::new(Reconciler::new(Box::new(client)), cli.deadline());
    let mut state = StateStore::load(&cli.state_file)?;

    match &cli.command {
        Command::Plan { manifest } => {
            let manifest = Manifest::from_path(manifest).with_context(|| format!("loading {}", manifest.display()))?;
            let changes = controller.plan(&manifest, &state).await?;
            for change in &changes {
                println!("{}: {}", change.address, describe_actions(&change.actions));
            }
            let pending = changes.iter().filter(|c| !c.actions.is_empty()).count();
            println!("{} of {} resources would change", pending, changes.len());
        }
        Command::Apply { manifest } => {
            let manifest = Manifest::from_path(manifest).with_context(|| format!("loading {}", manifest.display()))?;
            let summary = controller.apply(&manifest, &mut state).await?;
            println!("{}", summary);
            if summary.has_failures() {
                bail!("{} resources failed to reconcile", summary.failed);
            }
        }
        Command::Destroy => {
            let summary = controller.destroy(&mut state).await?;
            println!("{}", summary);
            if summary.has_failures() {
                bail!("{} resources failed to delete", summary.failed);
            }
        }
        Command::Watch { manifest, resync_secs } => {
            controller
                .watch(manifest, &mut state, Duration::from_secs(*resync_secs))
                .await?;
        }
        Command::Import { kind, id } => {
            let id = ImportId::parse(*kind, id)?;
            let imported = controller.import(&id, &mut state).await?;
            let entry = Manifest {
                resources: vec![imported.descriptor],
            };
            print!("{}", entry.to_yaml()?);
        }
        Command::Refresh => {
            let summary = controller.refresh(&mut state).await?;
            println!("{}", summary);
        }
        Command::Describe { .. } => {}
    }

    Ok(())
}

/// Print the field tables of every kind, or of one
fn describe(kind: Option<&str>) -> anyhow::Result<()> {
    let tables: [(&str, &[Field]); 3] = [
        (ClusterRuleSpec::KIND, ClusterRuleSpec::fields()),
        (HostOverrideSpec::KIND, HostOverrideSpec::fields()),
        (ContentLibraryItemSpec::KIND, ContentLibraryItemSpec::fields()),
    ];

    let mut printed = false;
    for (name, fields) in tables {
        if kind.is_some_and(|k| k != name) {
            continue;
        }
        println!("{}", name);
        for field in fields {
            println!("  {:<28} {:<9} {}", field.name, field.mode.to_string(), field.description);
        }
        printed = true;
    }
    if !printed {
        bail!("unknown kind {}", kind.unwrap_or_default());
    }
    Ok(())
}
