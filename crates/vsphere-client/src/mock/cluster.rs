//! Cluster operations for MockVSphereClient
//!
//! Handles cluster configuration, reconfigure tasks and inventory lookup

use super::{MockVSphereClient, lock};
use crate::error::VSphereError;
use crate::models::*;
use std::collections::HashSet;

pub async fn get_cluster_configuration(
    client: &MockVSphereClient,
    cluster_id: &str,
) -> Result<ClusterConfiguration, VSphereError> {
    lock(&client.clusters)
        .get(cluster_id)
        .cloned()
        .ok_or_else(|| VSphereError::NotFound(format!("Cluster {} not found", cluster_id)))
}

pub async fn reconfigure_cluster(
    client: &MockVSphereClient,
    cluster_id: &str,
    config: &ClusterConfiguration,
) -> Result<TaskHandle, VSphereError> {
    if !lock(&client.clusters).contains_key(cluster_id) {
        return Err(VSphereError::NotFound(format!("Cluster {} not found", cluster_id)));
    }
    if let Some(message) = lock(&client.fail_next_reconfigure).take() {
        return Err(VSphereError::Api(message));
    }

    let mut accepted = config.clone();

    let mut names = HashSet::new();
    for rule in accepted.rules.iter_mut() {
        let name = rule
            .name
            .clone()
            .ok_or_else(|| VSphereError::InvalidRequest("rule without a name".to_string()))?;
        if !names.insert(name.clone()) {
            return Err(VSphereError::Api(format!("duplicate rule name {}", name)));
        }
        if rule.key.is_none() {
            rule.key = Some(client.next_key());
            rule.user_created = Some(true);
        }
        if rule.rule_uuid.is_none() {
            rule.rule_uuid = Some(uuid::Uuid::new_v4().to_string());
        }
        rule.status = Some("green".to_string());
        rule.in_compliance = Some(true);
    }

    let mut hosts = HashSet::new();
    for dpm in accepted.dpm_host_configs.iter_mut() {
        let host = dpm
            .host
            .clone()
            .ok_or_else(|| VSphereError::InvalidRequest("DPM host config without a host".to_string()))?;
        if !hosts.insert(host.value.clone()) {
            return Err(VSphereError::Api(format!("duplicate DPM host config for {}", host.value)));
        }
        if dpm.key.is_none() {
            dpm.key = Some(client.next_key());
        }
    }

    *lock(&client.reconfigure_calls) += 1;
    let task = TaskHandle::new(format!("task-{}", uuid::Uuid::new_v4()));
    let failure = lock(&client.fail_next_task).take();

    if failure.is_none() {
        let hook = lock(&client.reconfigure_hook).clone();
        if let Some(hook) = hook {
            hook(&mut accepted);
        }
        lock(&client.clusters).insert(cluster_id.to_string(), accepted);
    }
    lock(&client.tasks).insert(task.id.clone(), failure);

    Ok(task)
}

pub async fn wait_task(client: &MockVSphereClient, task: &TaskHandle) -> Result<(), VSphereError> {
    match lock(&client.tasks).get(&task.id) {
        None => Err(VSphereError::NotFound(format!("Task {} not found", task.id))),
        Some(None) => Ok(()),
        Some(Some(message)) => Err(VSphereError::TaskFailed {
            task: task.id.clone(),
            message: message.clone(),
        }),
    }
}

pub async fn find_by_path(
    client: &MockVSphereClient,
    kind: &str,
    path: &str,
) -> Result<Vec<ManagedObjectReference>, VSphereError> {
    Ok(lock(&client.inventory)
        .iter()
        .filter(|(p, r)| p == path && r.kind == kind)
        .map(|(_, r)| r.clone())
        .collect())
}
