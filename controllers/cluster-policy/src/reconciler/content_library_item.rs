//! ContentLibraryItem reconciler
//!
//! Library items have their own CRUD endpoints, so there is no
//! whole-document write here. The plan, re-resolve and verify steps follow
//! the same contract as cluster members.

use super::{Lifecycle, Reconciler};
use crate::diff::{Action, ManagedRecord, Operation, OperationSet, diff};
use crate::error::ControllerError;
use crate::normalizer::normalize_library_item;
use crate::reconcile_helpers::Outcome;
use crate::records::LibraryItemRecord;
use resources::{ContentLibraryItemSpec, ContentLibraryItemStatus};
use tracing::{debug, error, info, warn};
use vsphere_client::LibraryItemUpdateSpec;

impl Reconciler {
    /// Observed item for `probe`: by ID when known, otherwise by name within the library
    pub async fn observe_library_item(
        &self,
        probe: &LibraryItemRecord,
    ) -> Result<Option<LibraryItemRecord>, ControllerError> {
        if let Some(id) = &probe.id {
            match self.client.get_library_item(id).await {
                Ok(item) => return Ok(Some(normalize_library_item(&item))),
                Err(e) if e.is_not_found() => {
                    debug!("Library item {} no longer exists, looking it up by name", id);
                }
                Err(e) => return Err(e.into()),
            }
        }

        let ids = match self.client.find_library_items(&probe.library_id, &probe.name).await {
            Ok(ids) => ids,
            Err(e) if e.is_not_found() => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        match ids.as_slice() {
            [] => Ok(None),
            [id] => match self.client.get_library_item(id).await {
                Ok(item) => Ok(Some(normalize_library_item(&item))),
                Err(e) if e.is_not_found() => Ok(None),
                Err(e) => Err(e.into()),
            },
            _ => Err(ControllerError::AmbiguousReference {
                reference: format!("library item {} in library {}", probe.name, probe.library_id),
                matches: ids,
            }),
        }
    }

    /// Apply planned operations to a library item and verify the result.
    /// `desired` is the unmerged record the plan came from, `None` to remove the item.
    pub async fn apply_library_item(
        &self,
        desired: Option<&LibraryItemRecord>,
        planned: OperationSet<LibraryItemRecord>,
    ) -> Result<(Outcome, Option<LibraryItemRecord>), ControllerError> {
        let Some(probe) = planned.iter().next().map(|op| op.record().clone()) else {
            return Ok((Outcome::Unchanged, None));
        };

        let current = self.observe_library_item(&probe).await?;
        let ops = diff(desired, current.as_ref());
        if ops.actions() != planned.actions() {
            warn!(
                "{} changed since planning: planned {:?}, applying {:?}",
                probe.identity(),
                planned.actions(),
                ops.actions()
            );
        }
        if ops.is_empty() {
            return Ok((Outcome::Unchanged, current));
        }

        let mut resulting_id = current.as_ref().and_then(|c| c.id.clone());
        let mut last_action = Action::Update;
        for op in ops.iter() {
            info!(
                "{}: {} -> {}",
                op.record().identity(),
                Lifecycle::settled(resulting_id.as_ref()),
                Lifecycle::during(op.action())
            );
            last_action = op.action();
            match op {
                Operation::Delete(item) => {
                    if let Some(id) = &item.id {
                        match self.client.delete_library_item(id).await {
                            Ok(()) => {}
                            Err(e) if e.is_not_found() => debug!("Library item {} already deleted", id),
                            Err(e) => return Err(e.into()),
                        }
                    }
                    resulting_id = None;
                }
                Operation::Update(item) => {
                    let id = item
                        .id
                        .as_deref()
                        .ok_or_else(|| ControllerError::NotFound(item.identity()))?;
                    let observed = current.as_ref();
                    let update = LibraryItemUpdateSpec {
                        name: (observed.map(|o| &o.name) != Some(&item.name)).then(|| item.name.clone()),
                        description: item
                            .description
                            .clone()
                            .filter(|d| observed.and_then(|o| o.description.as_ref()) != Some(d)),
                    };
                    self.client.update_library_item(id, &update).await?;
                }
                Operation::Create(item) => {
                    let id = self.client.create_library_item(&item.to_create_spec()).await?;
                    if !item.file_urls.is_empty() {
                        if let Err(e) = self.client.upload_library_item_files(&id, &item.file_urls).await {
                            error!("Pulling sources into library item {} failed: {}", id, e);
                            // Roll back so the next run creates the item from scratch
                            if let Err(cleanup) = self.client.delete_library_item(&id).await {
                                warn!("Failed to remove partially created library item {}: {}", id, cleanup);
                            }
                            return Err(e.into());
                        }
                    }
                    resulting_id = Some(id);
                }
            }
        }

        let verified = self.verify_library_item(ops.target(), resulting_id.as_deref(), &probe, last_action).await?;
        info!(
            "{}: -> {}",
            probe.identity(),
            Lifecycle::settled(verified.as_ref())
        );
        Ok((Outcome::from_operations(&ops), verified))
    }

    async fn verify_library_item(
        &self,
        expected: Option<&LibraryItemRecord>,
        id: Option<&str>,
        probe: &LibraryItemRecord,
        action: Action,
    ) -> Result<Option<LibraryItemRecord>, ControllerError> {
        let observed = match id {
            Some(id) => match self.client.get_library_item(id).await {
                Ok(item) => Some(normalize_library_item(&item)),
                Err(e) if e.is_not_found() => None,
                Err(e) => return Err(e.into()),
            },
            None => None,
        };

        match (expected, observed) {
            (Some(expected), Some(observed)) if expected.converged_with(&observed) => Ok(Some(observed)),
            (None, None) => Ok(None),
            (expected, observed) => Err(ControllerError::Convergence {
                identity: expected.unwrap_or(probe).identity(),
                operation: action.to_string(),
                expected: expected.map_or_else(|| "absent".to_string(), |e| format!("{:?}", e)),
                observed: observed.map_or_else(|| "absent".to_string(), |o| format!("{:?}", o)),
            }),
        }
    }

    pub async fn reconcile_content_library_item(
        &self,
        spec: &ContentLibraryItemSpec,
        previous: Option<&ContentLibraryItemStatus>,
    ) -> Result<(Outcome, ContentLibraryItemStatus), ControllerError> {
        info!("Reconciling content library item {} in {}", spec.name, spec.library_id);

        let desired = LibraryItemRecord::from_spec(spec, previous.and_then(|s| s.id.clone()));
        let observed = self.observe_library_item(&desired).await?;
        let ops = diff(Some(&desired), observed.as_ref());

        let (outcome, current) = if ops.is_empty() {
            (Outcome::Unchanged, observed)
        } else {
            self.apply_library_item(Some(&desired), ops).await?
        };
        let current = current.ok_or_else(|| ControllerError::Convergence {
            identity: desired.identity(),
            operation: "reconcile".to_string(),
            expected: format!("{:?}", desired),
            observed: "absent".to_string(),
        })?;

        let mut status = current.to_status();
        status.state = outcome.resource_state(previous.map(|s| s.state));
        status.last_reconciled = Some(chrono::Utc::now());
        Ok((outcome, status))
    }

    pub async fn delete_content_library_item(
        &self,
        spec: &ContentLibraryItemSpec,
        previous: Option<&ContentLibraryItemStatus>,
    ) -> Result<Outcome, ControllerError> {
        info!("Deleting content library item {} in {}", spec.name, spec.library_id);
        let probe = LibraryItemRecord::from_spec(spec, previous.and_then(|s| s.id.clone()));
        let observed = self.observe_library_item(&probe).await?;
        let ops = diff(None, observed.as_ref());
        if ops.is_empty() {
            return Ok(Outcome::Unchanged);
        }
        let (outcome, _) = self.apply_library_item(None, ops).await?;
        Ok(outcome)
    }

    pub async fn plan_content_library_item(
        &self,
        spec: &ContentLibraryItemSpec,
        previous: Option<&ContentLibraryItemStatus>,
        ensure: bool,
    ) -> Result<Vec<Action>, ControllerError> {
        let desired = LibraryItemRecord::from_spec(spec, previous.and_then(|s| s.id.clone()));
        let observed = self.observe_library_item(&desired).await?;
        Ok(diff(ensure.then_some(&desired), observed.as_ref()).actions())
    }

    pub async fn read_content_library_item(
        &self,
        spec: &ContentLibraryItemSpec,
        previous: Option<&ContentLibraryItemStatus>,
    ) -> Result<Option<LibraryItemRecord>, ControllerError> {
        let probe = LibraryItemRecord::from_spec(spec, previous.and_then(|s| s.id.clone()));
        self.observe_library_item(&probe).await
    }
}
