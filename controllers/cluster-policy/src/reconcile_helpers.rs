//! Helper functions for common reconciliation patterns
//!
//! Shared by all reconcilers: classifying what an apply did and turning that
//! into the state recorded for a resource.

use crate::diff::{Action, ManagedRecord, OperationSet};
use resources::ResourceState;
use std::fmt;

/// What a reconcile pass did to one resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Created,
    Updated,
    Replaced,
    Deleted,
    Unchanged,
}

impl Outcome {
    pub fn from_operations<R: ManagedRecord>(ops: &OperationSet<R>) -> Self {
        if ops.is_replacement() {
            return Outcome::Replaced;
        }
        match ops.actions().first() {
            None => Outcome::Unchanged,
            Some(Action::Create) => Outcome::Created,
            Some(Action::Update) => Outcome::Updated,
            Some(Action::Delete) => Outcome::Deleted,
        }
    }

    pub fn is_change(self) -> bool {
        self != Outcome::Unchanged
    }

    /// State to record after this outcome, given the previously recorded one
    pub fn resource_state(self, previous: Option<ResourceState>) -> ResourceState {
        match self {
            Outcome::Created | Outcome::Replaced => ResourceState::Created,
            Outcome::Updated => ResourceState::Updated,
            Outcome::Deleted => ResourceState::Pending,
            Outcome::Unchanged => match previous {
                Some(state @ (ResourceState::Created | ResourceState::Updated)) => state,
                _ => ResourceState::Created,
            },
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Created => write!(f, "created"),
            Outcome::Updated => write!(f, "updated"),
            Outcome::Replaced => write!(f, "replaced"),
            Outcome::Deleted => write!(f, "deleted"),
            Outcome::Unchanged => write!(f, "unchanged"),
        }
    }
}

/// Render planned actions the way `plan` prints them
pub fn describe_actions(actions: &[Action]) -> String {
    match actions {
        [] => "no changes".to_string(),
        [Action::Delete, Action::Create] => "replace".to_string(),
        _ => actions.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "),
    }
}
