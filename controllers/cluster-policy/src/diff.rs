//! Diff engine
//!
//! Compares one desired record against one observed record and produces the
//! operations that turn the latter into the former. The remote API replaces
//! whole records, so an update always carries the complete merged record.

use std::fmt;

/// A record the diff engine can compare
pub trait ManagedRecord: Clone + fmt::Debug + PartialEq + Send + Sync + 'static {
    type Identity: Clone + fmt::Debug + fmt::Display + PartialEq + Send;

    fn identity(&self) -> Self::Identity;

    /// Whether `observed` already satisfies every user-controlled field of `self`.
    /// Fields left unset in `self` carry no opinion.
    fn converged_with(&self, observed: &Self) -> bool;

    /// `observed` overlaid with the user-controlled fields set in `self`.
    /// Read-only fields always come from `observed`.
    fn merged_onto(&self, observed: &Self) -> Self;

    /// Copy of `self` with every read-only field cleared
    fn for_create(&self) -> Self;

    /// Whether an immutable field differs, forcing delete and re-create
    fn requires_replacement(&self, _observed: &Self) -> bool {
        false
    }
}

/// Kind of change, without the payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Create,
    Update,
    Delete,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Create => write!(f, "create"),
            Action::Update => write!(f, "update"),
            Action::Delete => write!(f, "delete"),
        }
    }
}

/// A single change to a remote object
#[derive(Debug, Clone, PartialEq)]
pub enum Operation<R> {
    /// Create with user-controlled fields only
    Create(R),
    /// Replace with the full merged record
    Update(R),
    /// Remove the observed record
    Delete(R),
}

impl<R: ManagedRecord> Operation<R> {
    pub fn action(&self) -> Action {
        match self {
            Operation::Create(_) => Action::Create,
            Operation::Update(_) => Action::Update,
            Operation::Delete(_) => Action::Delete,
        }
    }

    pub fn record(&self) -> &R {
        match self {
            Operation::Create(r) | Operation::Update(r) | Operation::Delete(r) => r,
        }
    }
}

/// Ordered operations for one object. Empty means converged.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationSet<R>(Vec<Operation<R>>);

impl<R: ManagedRecord> OperationSet<R> {
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn single(op: Operation<R>) -> Self {
        Self(vec![op])
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Operation<R>> {
        self.0.iter()
    }

    pub fn actions(&self) -> Vec<Action> {
        self.0.iter().map(Operation::action).collect()
    }

    /// Record the object should end up as, `None` when it should be absent
    pub fn target(&self) -> Option<&R> {
        match self.0.last() {
            Some(Operation::Create(r)) | Some(Operation::Update(r)) => Some(r),
            Some(Operation::Delete(_)) | None => None,
        }
    }

    /// Whether the set replaces the object (delete followed by create)
    pub fn is_replacement(&self) -> bool {
        matches!(self.0.as_slice(), [Operation::Delete(_), Operation::Create(_)])
    }
}

impl<R> IntoIterator for OperationSet<R> {
    type Item = Operation<R>;
    type IntoIter = std::vec::IntoIter<Operation<R>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Compute the operations that converge `observed` onto `desired`
pub fn diff<R: ManagedRecord>(desired: Option<&R>, observed: Option<&R>) -> OperationSet<R> {
    match (desired, observed) {
        (None, None) => OperationSet::empty(),
        (Some(desired), None) => OperationSet::single(Operation::Create(desired.for_create())),
        (None, Some(observed)) => OperationSet::single(Operation::Delete(observed.clone())),
        (Some(desired), Some(observed)) => {
            if desired.requires_replacement(observed) {
                OperationSet(vec![
                    Operation::Delete(observed.clone()),
                    Operation::Create(desired.for_create()),
                ])
            } else if desired.converged_with(observed) {
                OperationSet::empty()
            } else {
                OperationSet::single(Operation::Update(desired.merged_onto(observed)))
            }
        }
    }
}
