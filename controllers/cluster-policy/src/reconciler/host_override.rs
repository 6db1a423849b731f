//! DpmHostOverride reconciler

use super::{ClusterMember, Reconciler};
use crate::diff::{Action, ManagedRecord, Operation};
use crate::error::ControllerError;
use crate::normalizer::NormalizedState;
use crate::reconcile_helpers::Outcome;
use crate::records::HostOverrideRecord;
use resources::{HostOverrideSpec, HostOverrideStatus};
use tracing::info;
use vsphere_client::ClusterConfiguration;

impl ClusterMember for HostOverrideRecord {
    fn locate<'a>(state: &'a NormalizedState, target: &Self) -> Result<Option<&'a Self>, ControllerError> {
        Ok(state.override_for(&target.host_id))
    }

    fn splice(config: &mut ClusterConfiguration, op: &Operation<Self>) -> Result<(), ControllerError> {
        match op {
            Operation::Create(dpm) => config.dpm_host_configs.push(dpm.to_info()),
            Operation::Update(dpm) => {
                let index = override_position(config, dpm)?;
                config.dpm_host_configs[index] = dpm.to_info();
            }
            Operation::Delete(dpm) => {
                let index = override_position(config, dpm)?;
                config.dpm_host_configs.remove(index);
            }
        }
        Ok(())
    }
}

fn override_position(config: &ClusterConfiguration, dpm: &HostOverrideRecord) -> Result<usize, ControllerError> {
    config
        .dpm_host_configs
        .iter()
        .position(|c| c.host.as_ref().is_some_and(|h| h.value == dpm.host_id))
        .ok_or_else(|| ControllerError::NotFound(format!("{} in cluster configuration", dpm.identity())))
}

impl Reconciler {
    pub async fn reconcile_host_override(
        &self,
        spec: &HostOverrideSpec,
        previous: Option<&HostOverrideStatus>,
    ) -> Result<(Outcome, HostOverrideStatus), ControllerError> {
        info!(
            "Reconciling DPM override for host {} in {}",
            spec.host_system_id, spec.compute_cluster_id
        );

        let desired = HostOverrideRecord::from_spec(spec);
        let (outcome, current) = self.reconcile_member(&spec.compute_cluster_id, &desired).await?;

        let mut status = current.to_status();
        status.state = outcome.resource_state(previous.map(|s| s.state));
        status.last_reconciled = Some(chrono::Utc::now());
        Ok((outcome, status))
    }

    /// Remove the override, returning the host to the cluster default
    pub async fn delete_host_override(&self, spec: &HostOverrideSpec) -> Result<Outcome, ControllerError> {
        info!(
            "Deleting DPM override for host {} in {}",
            spec.host_system_id, spec.compute_cluster_id
        );
        let probe = HostOverrideRecord::from_spec(spec);
        self.delete_member(&spec.compute_cluster_id, &probe).await
    }

    pub async fn plan_host_override(&self, spec: &HostOverrideSpec, ensure: bool) -> Result<Vec<Action>, ControllerError> {
        let desired = HostOverrideRecord::from_spec(spec);
        let ops = self
            .plan_member(&spec.compute_cluster_id, ensure.then_some(&desired), &desired)
            .await?;
        Ok(ops.actions())
    }

    /// Read the current state of a DPM override. `None` when it or its cluster is gone.
    pub async fn read_host_override(&self, spec: &HostOverrideSpec) -> Result<Option<HostOverrideRecord>, ControllerError> {
        let probe = HostOverrideRecord::from_spec(spec);
        match self.observe_member(&spec.compute_cluster_id, &probe).await {
            Err(e) if e.is_not_found() => Ok(None),
            other => other,
        }
    }
}
