//! Reconciliation logic for cluster policy resources.
//!
//! Rules and DPM overrides live inside a single configuration document per
//! cluster, so every change is a read-modify-write of the whole document:
//!
//! 1. read the full configuration
//! 2. locate the target (key first, then name or host)
//! 3. rebuild the full lists with the entry replaced, appended or omitted
//! 4. submit the whole document and wait for the task
//! 5. re-read and verify the user-controlled fields
//!
//! The planned operations are re-resolved against the configuration read in
//! step 1, so an apply that was interrupted or raced is safe to repeat.
//! Nothing here retries.
//!
//! Per-kind logic lives in:
//! - `cluster_rule`: DRS rules
//! - `host_override`: DPM host overrides
//! - `content_library_item`: content library items (separate API, same contract)

pub mod cluster_rule;
pub mod content_library_item;
pub mod host_override;

#[cfg(test)]
mod cluster_rule_test;
#[cfg(test)]
mod host_override_test;

use crate::diff::{Action, ManagedRecord, Operation, OperationSet, diff};
use crate::error::ControllerError;
use crate::normalizer::{NormalizedState, normalize};
use crate::reconcile_helpers::Outcome;
use resources::{ResourceDescriptor, ResourceStatus};
use std::fmt;
use tracing::{debug, info, warn};
use vsphere_client::{ClusterConfiguration, VSphereClientTrait};

/// Sub-objects stored inside a cluster's configuration document
pub trait ClusterMember: ManagedRecord {
    /// Observed counterpart of `target`
    fn locate<'a>(state: &'a NormalizedState, target: &Self) -> Result<Option<&'a Self>, ControllerError>;

    /// Apply one operation to the raw configuration document
    fn splice(config: &mut ClusterConfiguration, op: &Operation<Self>) -> Result<(), ControllerError>;
}

/// Lifecycle of a managed sub-object. `Present` is the only stable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Absent,
    Creating,
    Present,
    Updating,
    Deleting,
}

impl Lifecycle {
    pub fn during(action: Action) -> Self {
        match action {
            Action::Create => Lifecycle::Creating,
            Action::Update => Lifecycle::Updating,
            Action::Delete => Lifecycle::Deleting,
        }
    }

    pub fn settled<R>(record: Option<&R>) -> Self {
        if record.is_some() { Lifecycle::Present } else { Lifecycle::Absent }
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lifecycle::Absent => write!(f, "Absent"),
            Lifecycle::Creating => write!(f, "Creating"),
            Lifecycle::Present => write!(f, "Present"),
            Lifecycle::Updating => write!(f, "Updating"),
            Lifecycle::Deleting => write!(f, "Deleting"),
        }
    }
}

/// Reconciles cluster policy resources against vCenter.
pub struct Reconciler {
    pub(crate) client: Box<dyn VSphereClientTrait>,
}

impl Reconciler {
    pub fn new(client: Box<dyn VSphereClientTrait>) -> Self {
        Self { client }
    }

    /// Read and normalize a cluster's configuration. `None` when the cluster does not exist.
    pub async fn observe_cluster(
        &self,
        cluster_id: &str,
    ) -> Result<Option<(ClusterConfiguration, NormalizedState)>, ControllerError> {
        match self.client.get_cluster_configuration(cluster_id).await {
            Ok(config) => {
                let state = normalize(&config, cluster_id)?;
                Ok(Some((config, state)))
            }
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Observed counterpart of `probe`. A missing cluster is `NotFound`.
    pub async fn observe_member<R: ClusterMember>(
        &self,
        cluster_id: &str,
        probe: &R,
    ) -> Result<Option<R>, ControllerError> {
        let (_, state) = self
            .observe_cluster(cluster_id)
            .await?
            .ok_or_else(|| ControllerError::NotFound(format!("cluster {}", cluster_id)))?;
        Ok(R::locate(&state, probe)?.cloned())
    }

    /// Operations that would converge the cluster member, without applying them.
    /// `desired = None` plans the removal of `probe`.
    pub async fn plan_member<R: ClusterMember>(
        &self,
        cluster_id: &str,
        desired: Option<&R>,
        probe: &R,
    ) -> Result<OperationSet<R>, ControllerError> {
        match self.observe_member(cluster_id, probe).await {
            Ok(observed) => Ok(diff(desired, observed.as_ref())),
            // Nothing to delete inside a cluster that is gone
            Err(e) if e.is_not_found() && desired.is_none() => Ok(OperationSet::empty()),
            Err(e) => Err(e),
        }
    }

    /// Converge a cluster member onto `desired`, returning what it is now
    pub async fn reconcile_member<R: ClusterMember>(
        &self,
        cluster_id: &str,
        desired: &R,
    ) -> Result<(Outcome, R), ControllerError> {
        let observed = self.observe_member(cluster_id, desired).await?;
        let ops = diff(Some(desired), observed.as_ref());

        let (outcome, current) = if ops.is_empty() {
            debug!("{} in cluster {} is up to date", desired.identity(), cluster_id);
            (Outcome::Unchanged, observed)
        } else {
            self.apply(cluster_id, Some(desired), ops).await?
        };

        let current = current.ok_or_else(|| ControllerError::Convergence {
            identity: desired.identity().to_string(),
            operation: "reconcile".to_string(),
            expected: format!("{:?}", desired),
            observed: "absent".to_string(),
        })?;
        Ok((outcome, current))
    }

    /// Remove a cluster member. A missing member or cluster counts as removed.
    pub async fn delete_member<R: ClusterMember>(&self, cluster_id: &str, probe: &R) -> Result<Outcome, ControllerError> {
        let ops = self.plan_member(cluster_id, None, probe).await?;
        if ops.is_empty() {
            debug!("{} in cluster {} is already absent", probe.identity(), cluster_id);
            return Ok(Outcome::Unchanged);
        }
        let (outcome, _) = self.apply(cluster_id, None, ops).await?;
        Ok(outcome)
    }

    /// Apply planned operations to one cluster member and verify the result.
    ///
    /// `desired` is the unmerged record the plan was computed from, `None`
    /// when the member should be removed. The plan is re-resolved by diffing
    /// `desired` against a fresh read: a create whose target now exists turns
    /// into a diff against it, an update whose target vanished becomes a
    /// re-create and a delete of an absent target does nothing. Fields left
    /// unset in `desired` take their values from the fresh read.
    ///
    /// The outcome reflects the operations actually applied.
    pub async fn apply<R: ClusterMember>(
        &self,
        cluster_id: &str,
        desired: Option<&R>,
        planned: OperationSet<R>,
    ) -> Result<(Outcome, Option<R>), ControllerError> {
        let Some(probe) = planned.iter().next().map(|op| op.record().clone()) else {
            return Ok((Outcome::Unchanged, None));
        };
        let identity = probe.identity();

        let Some((mut config, state)) = self.observe_cluster(cluster_id).await? else {
            if desired.is_none() {
                info!("Cluster {} is gone, {} is absent with it", cluster_id, identity);
                return Ok((Outcome::Unchanged, None));
            }
            return Err(ControllerError::NotFound(format!("cluster {}", cluster_id)));
        };

        let current = R::locate(&state, &probe)?.cloned();
        let ops = diff(desired, current.as_ref());
        if ops.actions() != planned.actions() {
            warn!(
                "{} in cluster {} changed since planning: planned {:?}, applying {:?}",
                identity,
                cluster_id,
                planned.actions(),
                ops.actions()
            );
        }
        if ops.is_empty() {
            debug!("{} in cluster {} needs no changes", identity, cluster_id);
            return Ok((Outcome::Unchanged, current));
        }

        let mut lifecycle = Lifecycle::settled(current.as_ref());
        for op in ops.iter() {
            let next = Lifecycle::during(op.action());
            info!("{} in cluster {}: {} -> {}", op.record().identity(), cluster_id, lifecycle, next);
            lifecycle = next;
            R::splice(&mut config, op)?;
        }

        let task = self.client.reconfigure_cluster(cluster_id, &config).await?;
        debug!("Waiting for task {} on cluster {}", task.id, cluster_id);
        self.client.wait_task(&task).await?;

        let last_action = ops.actions().last().copied().unwrap_or(Action::Update);
        let verified = self.verify(cluster_id, ops.target(), &probe, last_action).await?;
        info!(
            "{} in cluster {}: {} -> {}",
            identity,
            cluster_id,
            lifecycle,
            Lifecycle::settled(verified.as_ref())
        );
        Ok((Outcome::from_operations(&ops), verified))
    }

    /// Re-read the cluster and check the member matches `expected`.
    /// `expected = None` checks that `probe` is gone.
    pub async fn verify<R: ClusterMember>(
        &self,
        cluster_id: &str,
        expected: Option<&R>,
        probe: &R,
        action: Action,
    ) -> Result<Option<R>, ControllerError> {
        let Some((_, state)) = self.observe_cluster(cluster_id).await? else {
            return match expected {
                None => Ok(None),
                Some(_) => Err(ControllerError::NotFound(format!("cluster {}", cluster_id))),
            };
        };

        match expected {
            Some(expected) => match R::locate(&state, expected)? {
                Some(observed) if expected.converged_with(observed) => Ok(Some(observed.clone())),
                observed => Err(ControllerError::Convergence {
                    identity: expected.identity().to_string(),
                    operation: action.to_string(),
                    expected: format!("{:?}", expected),
                    observed: observed.map_or_else(|| "absent".to_string(), |o| format!("{:?}", o)),
                }),
            },
            None => match R::locate(&state, probe)? {
                None => Ok(None),
                Some(observed) => Err(ControllerError::Convergence {
                    identity: probe.identity().to_string(),
                    operation: action.to_string(),
                    expected: "absent".to_string(),
                    observed: format!("{:?}", observed),
                }),
            },
        }
    }

    /// Converge one declared resource
    pub async fn reconcile(
        &self,
        descriptor: &ResourceDescriptor,
        previous: Option<&ResourceStatus>,
    ) -> Result<(Outcome, ResourceStatus), ControllerError> {
        match descriptor {
            ResourceDescriptor::ClusterRule(spec) => {
                let previous = match previous {
                    Some(ResourceStatus::ClusterRule(s)) => Some(s),
                    _ => None,
                };
                let (outcome, status) = self.reconcile_cluster_rule(spec, previous).await?;
                Ok((outcome, ResourceStatus::ClusterRule(status)))
            }
            ResourceDescriptor::DpmHostOverride(spec) => {
                let previous = match previous {
                    Some(ResourceStatus::DpmHostOverride(s)) => Some(s),
                    _ => None,
                };
                let (outcome, status) = self.reconcile_host_override(spec, previous).await?;
                Ok((outcome, ResourceStatus::DpmHostOverride(status)))
            }
            ResourceDescriptor::ContentLibraryItem(spec) => {
                let previous = match previous {
                    Some(ResourceStatus::ContentLibraryItem(s)) => Some(s),
                    _ => None,
                };
                let (outcome, status) = self.reconcile_content_library_item(spec, previous).await?;
                Ok((outcome, ResourceStatus::ContentLibraryItem(status)))
            }
        }
    }

    /// Remove one previously managed resource
    pub async fn delete(
        &self,
        descriptor: &ResourceDescriptor,
        previous: Option<&ResourceStatus>,
    ) -> Result<Outcome, ControllerError> {
        match (descriptor, previous) {
            (ResourceDescriptor::ClusterRule(spec), Some(ResourceStatus::ClusterRule(s))) => {
                self.delete_cluster_rule(spec, Some(s)).await
            }
            (ResourceDescriptor::ClusterRule(spec), _) => self.delete_cluster_rule(spec, None).await,
            (ResourceDescriptor::DpmHostOverride(spec), _) => self.delete_host_override(spec).await,
            (ResourceDescriptor::ContentLibraryItem(spec), Some(ResourceStatus::ContentLibraryItem(s))) => {
                self.delete_content_library_item(spec, Some(s)).await
            }
            (ResourceDescriptor::ContentLibraryItem(spec), _) => self.delete_content_library_item(spec, None).await,
        }
    }

    /// Actions a reconcile (`ensure = true`) or delete (`ensure = false`) would take
    pub async fn plan(
        &self,
        descriptor: &ResourceDescriptor,
        previous: Option<&ResourceStatus>,
        ensure: bool,
    ) -> Result<Vec<Action>, ControllerError> {
        match descriptor {
            ResourceDescriptor::ClusterRule(spec) => {
                let previous = match previous {
                    Some(ResourceStatus::ClusterRule(s)) => Some(s),
                    _ => None,
                };
                self.plan_cluster_rule(spec, previous, ensure).await
            }
            ResourceDescriptor::DpmHostOverride(spec) => self.plan_host_override(spec, ensure).await,
            ResourceDescriptor::ContentLibraryItem(spec) => {
                let previous = match previous {
                    Some(ResourceStatus::ContentLibraryItem(s)) => Some(s),
                    _ => None,
                };
                self.plan_content_library_item(spec, previous, ensure).await
            }
        }
    }

    /// Current status of a resource as vCenter reports it. `None` when it no longer exists.
    pub async fn read(
        &self,
        descriptor: &ResourceDescriptor,
        previous: Option<&ResourceStatus>,
    ) -> Result<Option<ResourceStatus>, ControllerError> {
        let state = previous.map(ResourceStatus::state);
        let status = match descriptor {
            ResourceDescriptor::ClusterRule(spec) => {
                let previous = match previous {
                    Some(ResourceStatus::ClusterRule(s)) => Some(s),
                    _ => None,
                };
                self.read_cluster_rule(spec, previous).await?.map(|record| {
                    let mut status = record.to_status();
                    status.state = Outcome::Unchanged.resource_state(state);
                    status.last_reconciled = previous.and_then(|s| s.last_reconciled);
                    ResourceStatus::ClusterRule(status)
                })
            }
            ResourceDescriptor::DpmHostOverride(spec) => {
                let previous = match previous {
                    Some(ResourceStatus::DpmHostOverride(s)) => Some(s),
                    _ => None,
                };
                self.read_host_override(spec).await?.map(|record| {
                    let mut status = record.to_status();
                    status.state = Outcome::Unchanged.resource_state(state);
                    status.last_reconciled = previous.and_then(|s| s.last_reconciled);
                    ResourceStatus::DpmHostOverride(status)
                })
            }
            ResourceDescriptor::ContentLibraryItem(spec) => {
                let previous = match previous {
                    Some(ResourceStatus::ContentLibraryItem(s)) => Some(s),
                    _ => None,
                };
                self.read_content_library_item(spec, previous).await?.map(|record| {
                    let mut status = record.to_status();
                    status.state = Outcome::Unchanged.resource_state(state);
                    status.last_reconciled = previous.and_then(|s| s.last_reconciled);
                    ResourceStatus::ContentLibraryItem(status)
                })
            }
        };
        Ok(status)
    }
}
