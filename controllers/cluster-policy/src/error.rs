//! Controller-specific error types.
//!
//! Gateway failures are wrapped unmodified. Everything else carries the
//! identity of the object and the operation that failed.

use resources::ResourceError;
use thiserror::Error;
use vsphere_client::VSphereError;

/// Errors that can occur in the cluster-policy controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// vSphere API error
    #[error("vSphere error: {0}")]
    Gateway(#[from] VSphereError),

    /// Parent or child object missing
    #[error("Not found: {0}")]
    NotFound(String),

    /// A lookup matched more than one object
    #[error("Ambiguous reference {reference}: matches {}", .matches.join(", "))]
    AmbiguousReference { reference: String, matches: Vec<String> },

    /// Post-task state does not match what was submitted
    #[error("{operation} of {identity} did not converge: expected {expected}, observed {observed}")]
    Convergence {
        identity: String,
        operation: String,
        expected: String,
        observed: String,
    },

    /// Remote response is missing required fields or violates an invariant
    #[error("Malformed data: {0}")]
    MalformedData(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Manifest could not be loaded
    #[error("Manifest error: {0}")]
    Manifest(#[from] ResourceError),

    /// Import identifier could not be parsed
    #[error("Invalid import ID {id}: {reason}")]
    InvalidImportId { id: String, reason: String },

    /// Caller deadline expired
    #[error("Reconciling {identity} timed out after {seconds}s")]
    Timeout { identity: String, seconds: u64 },

    /// A worker task panicked or was cancelled before reporting its results
    #[error("Worker for {parent} stopped: {reason}")]
    Worker { parent: String, reason: String },

    /// State file could not be read or written
    #[error("State store error: {0}")]
    State(String),
}

impl ControllerError {
    pub fn is_not_found(&self) -> bool {
        match self {
            ControllerError::NotFound(_) => true,
            ControllerError::Gateway(e) => e.is_not_found(),
            _ => false,
        }
    }
}
