//! ClusterRule reconciler

use super::{ClusterMember, Reconciler};
use crate::diff::{Action, ManagedRecord, Operation};
use crate::error::ControllerError;
use crate::normalizer::NormalizedState;
use crate::reconcile_helpers::Outcome;
use crate::records::RuleRecord;
use resources::{ClusterRuleSpec, ClusterRuleStatus};
use tracing::info;
use vsphere_client::ClusterConfiguration;

impl ClusterMember for RuleRecord {
    fn locate<'a>(state: &'a NormalizedState, target: &Self) -> Result<Option<&'a Self>, ControllerError> {
        state.rule_for(target)
    }

    fn splice(config: &mut ClusterConfiguration, op: &Operation<Self>) -> Result<(), ControllerError> {
        match op {
            Operation::Create(rule) => config.rules.push(rule.to_info()),
            Operation::Update(rule) => {
                let index = rule_position(config, rule)?;
                config.rules[index] = rule.to_info();
            }
            Operation::Delete(rule) => {
                let index = rule_position(config, rule)?;
                config.rules.remove(index);
            }
        }
        Ok(())
    }
}

fn rule_position(config: &ClusterConfiguration, rule: &RuleRecord) -> Result<usize, ControllerError> {
    rule.key
        .and_then(|key| config.rules.iter().position(|r| r.key == Some(key)))
        .or_else(|| config.rules.iter().position(|r| r.name.as_deref() == Some(rule.name.as_str())))
        .ok_or_else(|| ControllerError::NotFound(format!("{} in cluster configuration", rule.identity())))
}

impl Reconciler {
    /// Converge a cluster rule and return its new status
    pub async fn reconcile_cluster_rule(
        &self,
        spec: &ClusterRuleSpec,
        previous: Option<&ClusterRuleStatus>,
    ) -> Result<(Outcome, ClusterRuleStatus), ControllerError> {
        info!("Reconciling cluster rule {} in {}", spec.name, spec.compute_cluster_id);

        let desired = RuleRecord::from_spec(spec, previous.and_then(|s| s.key));
        let (outcome, current) = self.reconcile_member(&spec.compute_cluster_id, &desired).await?;

        let mut status = current.to_status();
        status.state = outcome.resource_state(previous.map(|s| s.state));
        status.last_reconciled = Some(chrono::Utc::now());

        if outcome.is_change() {
            info!(
                "Cluster rule {} in {} {} (key {:?})",
                spec.name, spec.compute_cluster_id, outcome, status.key
            );
        }
        Ok((outcome, status))
    }

    /// Delete a cluster rule. A missing rule or cluster counts as deleted.
    pub async fn delete_cluster_rule(
        &self,
        spec: &ClusterRuleSpec,
        previous: Option<&ClusterRuleStatus>,
    ) -> Result<Outcome, ControllerError> {
        info!("Deleting cluster rule {} in {}", spec.name, spec.compute_cluster_id);
        let probe = RuleRecord::from_spec(spec, previous.and_then(|s| s.key));
        self.delete_member(&spec.compute_cluster_id, &probe).await
    }

    pub async fn plan_cluster_rule(
        &self,
        spec: &ClusterRuleSpec,
        previous: Option<&ClusterRuleStatus>,
        ensure: bool,
    ) -> Result<Vec<Action>, ControllerError> {
        let desired = RuleRecord::from_spec(spec, previous.and_then(|s| s.key));
        let ops = self
            .plan_member(&spec.compute_cluster_id, ensure.then_some(&desired), &desired)
            .await?;
        Ok(ops.actions())
    }

    /// Read the current state of a cluster rule. `None` when it or its cluster is gone.
    pub async fn read_cluster_rule(
        &self,
        spec: &ClusterRuleSpec,
        previous: Option<&ClusterRuleStatus>,
    ) -> Result<Option<RuleRecord>, ControllerError> {
        let probe = RuleRecord::from_spec(spec, previous.and_then(|s| s.key));
        match self.observe_member(&spec.compute_cluster_id, &probe).await {
            Err(e) if e.is_not_found() => Ok(None),
            other => other,
        }
    }
}
