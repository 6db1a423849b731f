//! Cluster policy resource definitions
//!
//! Declarative descriptors for the objects the cluster-policy controller
//! manages, their observed status, and the manifest format they are read from.

pub mod cluster_rule;
pub mod content_library_item;
pub mod error;
pub mod fields;
pub mod host_override;
pub mod manifest;
pub mod status;
pub mod tri_state;

pub use cluster_rule::*;
pub use content_library_item::*;
pub use error::ResourceError;
pub use fields::{Described, Field, FieldMode};
pub use host_override::*;
pub use manifest::*;
pub use status::*;
pub use tri_state::TriState;
