//! vSphere client errors

use thiserror::Error;

/// Errors that can occur when interacting with the vSphere API
#[derive(Debug, Error)]
pub enum VSphereError {
    /// HTTP request/response error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// vSphere API returned an error
    #[error("vSphere API error: {0}")]
    Api(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Authentication failed (bad credentials, expired session, etc.)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Managed object not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Remote task finished in an error state
    #[error("Task {task} failed: {message}")]
    TaskFailed {
        /// Task identifier
        task: String,
        /// Error reported by the task
        message: String,
    },

    /// Invalid request (e.g., missing required fields)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl VSphereError {
    /// Whether this error means the addressed managed object does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, VSphereError::NotFound(_))
    }
}
