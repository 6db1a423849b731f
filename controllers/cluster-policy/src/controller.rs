//! Main controller implementation.
//!
//! The `Controller` turns a manifest and the local state into reconcile and
//! delete jobs, and runs them with one worker per parent object: rules and
//! overrides of a cluster share one configuration document, so their writes
//! must not interleave. Workers for different parents run concurrently.

use crate::backoff::Backoffs;
use crate::diff::Action;
use crate::error::ControllerError;
use crate::import::{ImportId, Imported};
use crate::reconcile_helpers::Outcome;
use crate::reconciler::Reconciler;
use crate::state::{StateEntry, StateStore};
use futures::future::join_all;
use resources::{Manifest, ResourceDescriptor, ResourceStatus};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// One resource to converge (`ensure`) or remove
#[derive(Debug, Clone)]
struct Job {
    descriptor: ResourceDescriptor,
    previous: Option<ResourceStatus>,
    ensure: bool,
    /// Address the resource was recorded under before a rename
    renamed_from: Option<String>,
}

impl Job {
    fn ensure(descriptor: ResourceDescriptor, previous: Option<ResourceStatus>) -> Self {
        Self {
            descriptor,
            previous,
            ensure: true,
            renamed_from: None,
        }
    }

    fn delete(entry: StateEntry) -> Self {
        Self {
            descriptor: entry.descriptor,
            previous: Some(entry.status),
            ensure: false,
            renamed_from: None,
        }
    }
}

#[derive(Debug)]
struct JobResult {
    job: Job,
    result: Result<(Outcome, Option<ResourceStatus>), ControllerError>,
}

/// Planned actions for one resource
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedChange {
    pub address: String,
    pub actions: Vec<Action>,
}

/// Counts of what a run did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub created: usize,
    pub updated: usize,
    pub replaced: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl RunSummary {
    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Created => self.created += 1,
            Outcome::Updated => self.updated += 1,
            Outcome::Replaced => self.replaced += 1,
            Outcome::Deleted => self.deleted += 1,
            Outcome::Unchanged => self.unchanged += 1,
        }
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} created, {} updated, {} replaced, {} deleted, {} unchanged, {} skipped, {} failed",
            self.created, self.updated, self.replaced, self.deleted, self.unchanged, self.skipped, self.failed
        )
    }
}

/// Runs reconcile passes against vCenter.
pub struct Controller {
    reconciler: Arc<Reconciler>,
    deadline: Duration,
}

impl Controller {
    pub fn new(reconciler: Reconciler, deadline: Duration) -> Self {
        Self {
            reconciler: Arc::new(reconciler),
            deadline,
        }
    }

    /// Actions `apply` would take, without changing anything
    pub async fn plan(&self, manifest: &Manifest, state: &StateStore) -> Result<Vec<PlannedChange>, ControllerError> {
        let mut changes = Vec::new();
        for job in jobs_for(manifest, state) {
            let address = job.descriptor.address();
            let actions = self
                .reconciler
                .plan(&job.descriptor, job.previous.as_ref(), job.ensure)
                .await?;
            debug!("Planned {:?} for {}", actions, address);
            changes.push(PlannedChange { address, actions });
        }
        Ok(changes)
    }

    /// Converge everything in `manifest`, delete what was removed from it, and save the state
    pub async fn apply(&self, manifest: &Manifest, state: &mut StateStore) -> Result<RunSummary, ControllerError> {
        let summary = self.run(jobs_for(manifest, state), state, None).await;
        state.save()?;
        Ok(summary)
    }

    /// Delete every managed resource and save the state
    pub async fn destroy(&self, state: &mut StateStore) -> Result<RunSummary, ControllerError> {
        let jobs = state.iter().map(|(_, entry)| Job::delete(entry.clone())).collect();
        let summary = self.run(jobs, state, None).await;
        state.save()?;
        Ok(summary)
    }

    /// Re-read every managed resource. Resources gone from vCenter are dropped from the state.
    pub async fn refresh(&self, state: &mut StateStore) -> Result<RunSummary, ControllerError> {
        let mut summary = RunSummary::default();
        let entries: Vec<_> = state.iter().map(|(_, entry)| entry.clone()).collect();

        for entry in entries {
            let address = entry.descriptor.address();
            match self.reconciler.read(&entry.descriptor, Some(&entry.status)).await {
                Ok(Some(status)) => {
                    summary.unchanged += 1;
                    state.upsert(entry.descriptor, status);
                }
                Ok(None) => {
                    warn!("{} no longer exists in vCenter, dropping it from the state", address);
                    summary.deleted += 1;
                    state.remove(&address);
                }
                Err(e) => {
                    error!("Failed to refresh {}: {}", address, e);
                    summary.failed += 1;
                }
            }
        }

        state.save()?;
        Ok(summary)
    }

    /// Import an existing object into the state
    pub async fn import(&self, id: &ImportId, state: &mut StateStore) -> Result<Imported, ControllerError> {
        let imported = self.reconciler.import(id).await?;
        let address = imported.descriptor.address();
        if state.get(&address).is_some() {
            warn!("{} is already managed, replacing its recorded state", address);
        }
        state.upsert(imported.descriptor.clone(), imported.status.clone());
        state.save()?;
        Ok(imported)
    }

    /// Apply the manifest at `manifest_path` every `resync` until interrupted
    pub async fn watch(&self, manifest_path: &Path, state: &mut StateStore, resync: Duration) -> Result<(), ControllerError> {
        info!(
            "Watching {} (resync every {}s)",
            manifest_path.display(),
            resync.as_secs()
        );
        let mut backoffs = Backoffs::default();

        loop {
            match self.reconcile_once(manifest_path, state, &mut backoffs).await {
                Ok(summary) => info!("Reconcile pass finished: {}", summary),
                Err(e) => error!("Reconcile pass failed: {}", e),
            }

            tokio::select! {
                _ = tokio::time::sleep(resync) => {}
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted, stopping");
                    return Ok(());
                }
            }
        }
    }

    /// One `watch` pass: reload the manifest and apply it, skipping resources still backing off
    pub async fn reconcile_once(
        &self,
        manifest_path: &Path,
        state: &mut StateStore,
        backoffs: &mut Backoffs,
    ) -> Result<RunSummary, ControllerError> {
        let manifest = Manifest::from_path(manifest_path)?;
        let summary = self.run(jobs_for(&manifest, state), state, Some(backoffs)).await;
        state.save()?;
        Ok(summary)
    }

    /// Run jobs grouped by parent and record the results in `state`
    async fn run(&self, jobs: Vec<Job>, state: &mut StateStore, mut backoffs: Option<&mut Backoffs>) -> RunSummary {
        let mut summary = RunSummary::default();
        let now = Instant::now();

        let mut by_parent: BTreeMap<String, Vec<Job>> = BTreeMap::new();
        for job in jobs {
            let address = job.descriptor.address();
            if backoffs.as_deref().is_some_and(|b| !b.ready(&address, now)) {
                debug!("Skipping {}, still backing off", address);
                summary.skipped += 1;
                continue;
            }
            by_parent.entry(job.descriptor.parent()).or_default().push(job);
        }

        let mut assigned = Vec::with_capacity(by_parent.len());
        let mut workers = Vec::with_capacity(by_parent.len());
        for (parent, jobs) in by_parent {
            let reconciler = Arc::clone(&self.reconciler);
            let deadline = self.deadline;
            let worker_jobs = jobs.clone();
            let worker_parent = parent.clone();
            workers.push(tokio::spawn(async move {
                debug!("Worker for {} started with {} jobs", worker_parent, worker_jobs.len());
                let mut results = Vec::with_capacity(worker_jobs.len());
                for job in worker_jobs {
                    let result = run_job(&reconciler, &job, deadline).await;
                    results.push(JobResult { job, result });
                }
                results
            }));
            assigned.push((parent, jobs));
        }

        for ((parent, jobs), joined) in assigned.into_iter().zip(join_all(workers).await) {
            let results = match joined {
                Ok(results) => results,
                Err(e) => {
                    // What the worker already changed is unknown; every job it held failed
                    error!("Worker for {} failed: {}", parent, e);
                    jobs.into_iter()
                        .map(|job| JobResult {
                            job,
                            result: Err(ControllerError::Worker {
                                parent: parent.clone(),
                                reason: e.to_string(),
                            }),
                        })
                        .collect()
                }
            };
            for JobResult { job, result } in results {
                let address = job.descriptor.address();
                if let Some(old) = &job.renamed_from {
                    state.remove(old);
                }
                match result {
                    Ok((outcome, Some(status))) => {
                        summary.record(outcome);
                        if let Some(backoffs) = backoffs.as_deref_mut() {
                            backoffs.record_success(&address);
                        }
                        state.upsert(job.descriptor, status);
                    }
                    Ok((outcome, None)) => {
                        summary.record(outcome);
                        if let Some(backoffs) = backoffs.as_deref_mut() {
                            backoffs.record_success(&address);
                        }
                        state.remove(&address);
                    }
                    Err(e) => {
                        summary.failed += 1;
                        match backoffs.as_deref_mut() {
                            Some(backoffs) => {
                                let (delay, count) = backoffs.record_failure(&address, now);
                                error!(
                                    "{} failed ({} consecutive errors, next attempt in {}s): {}",
                                    address,
                                    count,
                                    delay.as_secs(),
                                    e
                                );
                            }
                            None => error!("{} failed: {}", address, e),
                        }
                        let mut status = job
                            .previous
                            .unwrap_or_else(|| job.descriptor.pending_status());
                        status.mark_failed(e.to_string());
                        state.upsert(job.descriptor, status);
                    }
                }
            }
        }

        summary
    }
}

/// Deletes of removed resources first, then the manifest in order.
///
/// A new rule whose cluster and body match a removed one is treated as a
/// rename: it inherits the removed rule's status, and with it the key.
fn jobs_for(manifest: &Manifest, state: &StateStore) -> Vec<Job> {
    let mut orphans = state.orphans(manifest);
    let ensures: Vec<Job> = manifest
        .resources
        .iter()
        .map(|descriptor| {
            let address = descriptor.address();
            if let Some(previous) = state.status(&address) {
                return Job::ensure(descriptor.clone(), Some(previous.clone()));
            }
            match take_renamed(&mut orphans, descriptor) {
                Some(entry) => {
                    let from = entry.descriptor.address();
                    info!("{} was renamed from {}", address, from);
                    Job {
                        renamed_from: Some(from),
                        ..Job::ensure(descriptor.clone(), Some(entry.status))
                    }
                }
                None => Job::ensure(descriptor.clone(), None),
            }
        })
        .collect();
    orphans.into_iter().map(Job::delete).chain(ensures).collect()
}

/// Removed rule that `descriptor` renames: same cluster and body, with a known key
fn take_renamed(orphans: &mut Vec<StateEntry>, descriptor: &ResourceDescriptor) -> Option<StateEntry> {
    let ResourceDescriptor::ClusterRule(spec) = descriptor else {
        return None;
    };
    let index = orphans.iter().position(|entry| match (&entry.descriptor, &entry.status) {
        (ResourceDescriptor::ClusterRule(old), ResourceStatus::ClusterRule(status)) => {
            old.compute_cluster_id == spec.compute_cluster_id && old.rule == spec.rule && status.key.is_some()
        }
        _ => false,
    })?;
    Some(orphans.remove(index))
}

async fn run_job(
    reconciler: &Reconciler,
    job: &Job,
    deadline: Duration,
) -> Result<(Outcome, Option<ResourceStatus>), ControllerError> {
    let work = async {
        if job.ensure {
            let (outcome, status) = reconciler.reconcile(&job.descriptor, job.previous.as_ref()).await?;
            Ok::<_, ControllerError>((outcome, Some(status)))
        } else {
            let outcome = reconciler.delete(&job.descriptor, job.previous.as_ref()).await?;
            Ok((outcome, None))
        }
    };

    match tokio::time::timeout(deadline, work).await {
        Ok(result) => result,
        Err(_) => Err(ControllerError::Timeout {
            identity: job.descriptor.address(),
            seconds: deadline.as_secs(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use resources::{DpmAutomationLevel, ResourceState, TriState};
    use std::sync::Arc;
    use vsphere_client::{ClusterConfiguration, MockVSphereClient};

    fn manifest(resources: Vec<ResourceDescriptor>) -> Manifest {
        Manifest { resources }
    }

    fn rule(name: &str, members: &[&str]) -> ResourceDescriptor {
        ResourceDescriptor::ClusterRule(anti_affinity_spec(name, members, TriState::True, TriState::False))
    }

    fn controller_for(mock: &MockVSphereClient) -> Controller {
        Controller::new(reconciler_for(mock), Duration::from_secs(30))
    }

    #[tokio::test]
    async fn test_apply_twice_changes_nothing_the_second_time() {
        let mock = mock_with_cluster();
        let controller = controller_for(&mock);
        let dir = tempfile::tempdir().unwrap();
        let mut state = StateStore::load(dir.path().join("state.json")).unwrap();
        let manifest = manifest(vec![
            rule("r1", &["vm-a", "vm-b"]),
            rule("r2", &["vm-c", "vm-d"]),
            ResourceDescriptor::DpmHostOverride(host_override_spec("host-1", DpmAutomationLevel::Automated, true)),
        ]);

        let first = controller.apply(&manifest, &mut state).await.unwrap();
        assert_eq!(first.created, 3);
        assert!(!first.has_failures());
        assert_eq!(state.len(), 3);
        let calls = mock.reconfigure_calls();

        let plan = controller.plan(&manifest, &state).await.unwrap();
        assert!(plan.iter().all(|c| c.actions.is_empty()));

        let second = controller.apply(&manifest, &mut state).await.unwrap();
        assert_eq!(second.unchanged, 3);
        assert_eq!(mock.reconfigure_calls(), calls);

        // Persisted for the next run
        let reloaded = StateStore::load(state.path()).unwrap();
        assert_eq!(reloaded.len(), 3);
    }

    #[tokio::test]
    async fn test_removed_resources_are_deleted() {
        let mock = mock_with_cluster();
        let controller = controller_for(&mock);
        let dir = tempfile::tempdir().unwrap();
        let mut state = StateStore::load(dir.path().join("state.json")).unwrap();

        controller
            .apply(&manifest(vec![rule("r1", &["vm-a"]), rule("r2", &["vm-b"])]), &mut state)
            .await
            .unwrap();

        let remaining = manifest(vec![rule("r1", &["vm-a"])]);
        let plan = controller.plan(&remaining, &state).await.unwrap();
        assert!(plan.contains(&PlannedChange {
            address: "cluster_rule/domain-c1/r2".to_string(),
            actions: vec![Action::Delete],
        }));

        let summary = controller.apply(&remaining, &mut state).await.unwrap();
        assert_eq!(summary.deleted, 1);
        assert!(state.get("cluster_rule/domain-c1/r2").is_none());

        let config = mock.cluster_configuration(CLUSTER_ID).unwrap();
        assert_eq!(config.rules.len(), 1);
        assert_eq!(config.rules[0].name.as_deref(), Some("r1"));
    }

    #[tokio::test]
    async fn test_failure_is_recorded_and_other_resources_continue() {
        let mock = mock_with_cluster();
        let controller = controller_for(&mock);
        let dir = tempfile::tempdir().unwrap();
        let mut state = StateStore::load(dir.path().join("state.json")).unwrap();

        let mut elsewhere = anti_affinity_spec("r9", &["vm-z"], TriState::True, TriState::Unset);
        elsewhere.compute_cluster_id = "domain-c404".to_string();
        let manifest = manifest(vec![rule("r1", &["vm-a"]), ResourceDescriptor::ClusterRule(elsewhere)]);

        let summary = controller.apply(&manifest, &mut state).await.unwrap();
        assert_eq!(summary.created, 1);
        assert_eq!(summary.failed, 1);

        let failed = state.status("cluster_rule/domain-c404/r9").unwrap();
        assert_eq!(failed.state(), ResourceState::Failed);
        assert!(failed.error().is_some());
        assert_eq!(
            state.status("cluster_rule/domain-c1/r1").unwrap().state(),
            ResourceState::Created
        );
    }

    #[tokio::test]
    async fn test_destroy_removes_everything() {
        let mock = mock_with_cluster();
        let controller = controller_for(&mock);
        let dir = tempfile::tempdir().unwrap();
        let mut state = StateStore::load(dir.path().join("state.json")).unwrap();
        let manifest = manifest(vec![
            rule("r1", &["vm-a"]),
            ResourceDescriptor::ContentLibraryItem(library_item_spec("photon", &["https://repo.example.com/photon.ova"])),
        ]);
        controller.apply(&manifest, &mut state).await.unwrap();

        let summary = controller.destroy(&mut state).await.unwrap();
        assert_eq!(summary.deleted, 2);
        assert!(state.is_empty());
        assert!(mock.cluster_configuration(CLUSTER_ID).unwrap().rules.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_drops_resources_deleted_out_of_band() {
        let mock = mock_with_cluster();
        let controller = controller_for(&mock);
        let dir = tempfile::tempdir().unwrap();
        let mut state = StateStore::load(dir.path().join("state.json")).unwrap();
        controller
            .apply(&manifest(vec![rule("r1", &["vm-a"]), rule("r2", &["vm-b"])]), &mut state)
            .await
            .unwrap();

        let mut config = mock.cluster_configuration(CLUSTER_ID).unwrap();
        config.rules.retain(|r| r.name.as_deref() != Some("r2"));
        mock.set_cluster_configuration(CLUSTER_ID, config);

        let summary = controller.refresh(&mut state).await.unwrap();
        assert_eq!(summary.unchanged, 1);
        assert_eq!(summary.deleted, 1);
        assert!(state.get("cluster_rule/domain-c1/r2").is_none());
        assert!(state.get("cluster_rule/domain-c1/r1").is_some());
    }

    #[tokio::test]
    async fn test_import_records_state() {
        let mock = mock_with_cluster();
        mock.set_cluster_configuration(
            CLUSTER_ID,
            ClusterConfiguration {
                rules: vec![observed_rule_info(42, "x", "r1", Some(true), Some(false), &["vm-a"])],
                dpm_host_configs: vec![],
            },
        );
        let controller = controller_for(&mock);
        let dir = tempfile::tempdir().unwrap();
        let mut state = StateStore::load(dir.path().join("state.json")).unwrap();

        let id = ImportId::ClusterRule {
            compute_cluster_path: CLUSTER_PATH.to_string(),
            name: "r1".to_string(),
        };
        let imported = controller.import(&id, &mut state).await.unwrap();

        // Applying the imported descriptor changes nothing
        let summary = controller
            .apply(&manifest(vec![imported.descriptor]), &mut state)
            .await
            .unwrap();
        assert_eq!(summary.unchanged, 1);
        assert_eq!(mock.reconfigure_calls(), 0);
    }

    #[tokio::test]
    async fn test_watch_pass_skips_resources_backing_off() {
        let mock = mock_with_cluster();
        let controller = controller_for(&mock);
        let dir = tempfile::tempdir().unwrap();
        let manifest_path = dir.path().join("policies.yaml");
        std::fs::write(
            &manifest_path,
            r#"
resources:
  - kind: ClusterRule
    name: r1
    compute_cluster_id: domain-c404
    rule:
      kind: vm_anti_affinity
      virtual_machine_ids: [vm-a]
"#,
        )
        .unwrap();
        let mut state = StateStore::load(dir.path().join("state.json")).unwrap();
        let mut backoffs = Backoffs::default();

        let first = controller
            .reconcile_once(&manifest_path, &mut state, &mut backoffs)
            .await
            .unwrap();
        assert_eq!(first.failed, 1);
        assert_eq!(backoffs.error_count("cluster_rule/domain-c404/r1"), 1);

        let second = controller
            .reconcile_once(&manifest_path, &mut state, &mut backoffs)
            .await
            .unwrap();
        assert_eq!(second.skipped, 1);
        assert_eq!(second.failed, 0);
    }

    #[tokio::test]
    async fn test_renamed_rule_keeps_its_key() {
        let mock = mock_with_cluster();
        let controller = controller_for(&mock);
        let dir = tempfile::tempdir().unwrap();
        let mut state = StateStore::load(dir.path().join("state.json")).unwrap();
        controller
            .apply(&manifest(vec![rule("r1", &["vm-a"])]), &mut state)
            .await
            .unwrap();
        let before = mock.cluster_configuration(CLUSTER_ID).unwrap().rules[0].clone();

        let renamed = manifest(vec![rule("r1-spread", &["vm-a"])]);
        let plan = controller.plan(&renamed, &state).await.unwrap();
        assert_eq!(
            plan,
            vec![PlannedChange {
                address: "cluster_rule/domain-c1/r1-spread".to_string(),
                actions: vec![Action::Update],
            }]
        );

        let summary = controller.apply(&renamed, &mut state).await.unwrap();
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.created, 0);
        assert_eq!(summary.deleted, 0);
        assert_eq!(state.len(), 1);
        assert!(state.get("cluster_rule/domain-c1/r1").is_none());
        match state.status("cluster_rule/domain-c1/r1-spread") {
            Some(ResourceStatus::ClusterRule(status)) => assert_eq!(status.key, before.key),
            other => panic!("unexpected status {other:?}"),
        }

        let rules = mock.cluster_configuration(CLUSTER_ID).unwrap().rules;
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].name.as_deref(), Some("r1-spread"));
        assert_eq!(rules[0].key, before.key);
        assert_eq!(rules[0].rule_uuid, before.rule_uuid);
    }

    #[tokio::test]
    async fn test_crashed_worker_marks_its_jobs_failed() {
        let mock = mock_with_cluster();
        mock.set_reconfigure_hook(Arc::new(|config: &mut ClusterConfiguration| {
            if !config.rules.is_empty() {
                panic!("connection reset while applying");
            }
        }));
        let controller = controller_for(&mock);
        let dir = tempfile::tempdir().unwrap();
        let mut state = StateStore::load(dir.path().join("state.json")).unwrap();
        let manifest = manifest(vec![
            rule("r1", &["vm-a"]),
            rule("r2", &["vm-b"]),
            ResourceDescriptor::ContentLibraryItem(library_item_spec("photon", &[])),
        ]);

        let summary = controller.apply(&manifest, &mut state).await.unwrap();
        assert_eq!(summary.failed, 2);
        // The library worker is unaffected
        assert_eq!(summary.created, 1);

        for address in ["cluster_rule/domain-c1/r1", "cluster_rule/domain-c1/r2"] {
            let status = state.status(address).unwrap();
            assert_eq!(status.state(), ResourceState::Failed);
            assert!(status.error().unwrap().contains("cluster/domain-c1"));
        }
    }
}
