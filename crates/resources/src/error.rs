//! Manifest loading and validation errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("Failed to read manifest: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid manifest YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid resource {resource}: {message}")]
    Validation { resource: String, message: String },
}
