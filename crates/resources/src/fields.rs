//! Field tables
//!
//! Every descriptor kind lists its fields together with who owns them:
//! required and optional fields come from the manifest, computed fields are
//! assigned by vCenter and must never be supplied.

use crate::error::ResourceError;
use serde::Serialize;

/// Ownership of a descriptor field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldMode {
    Required,
    Optional,
    Computed,
}

impl std::fmt::Display for FieldMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldMode::Required => write!(f, "required"),
            FieldMode::Optional => write!(f, "optional"),
            FieldMode::Computed => write!(f, "computed"),
        }
    }
}

/// One row of a field table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Field {
    pub name: &'static str,
    pub mode: FieldMode,
    pub description: &'static str,
}

impl Field {
    pub const fn required(name: &'static str, description: &'static str) -> Self {
        Self { name, mode: FieldMode::Required, description }
    }

    pub const fn optional(name: &'static str, description: &'static str) -> Self {
        Self { name, mode: FieldMode::Optional, description }
    }

    pub const fn computed(name: &'static str, description: &'static str) -> Self {
        Self { name, mode: FieldMode::Computed, description }
    }
}

/// Descriptor kinds with a static field table
pub trait Described {
    /// Value of the `kind` discriminator in manifests
    const KIND: &'static str;

    /// Field table of this kind
    fn fields() -> &'static [Field];
}

/// Field table for a manifest `kind`, if the kind is known
pub fn fields_for_kind(kind: &str) -> Option<&'static [Field]> {
    use crate::{ClusterRuleSpec, ContentLibraryItemSpec, HostOverrideSpec};

    match kind {
        k if k == ClusterRuleSpec::KIND => Some(ClusterRuleSpec::fields()),
        k if k == HostOverrideSpec::KIND => Some(HostOverrideSpec::fields()),
        k if k == ContentLibraryItemSpec::KIND => Some(ContentLibraryItemSpec::fields()),
        _ => None,
    }
}

/// Check a raw manifest entry against a field table
///
/// Required fields must be present, computed fields must be absent and
/// unknown fields are rejected. `kind` itself is the discriminator and always
/// allowed.
pub fn check_fields(
    resource: &str,
    entry: &serde_yaml::Mapping,
    fields: &[Field],
) -> Result<(), ResourceError> {
    for field in fields.iter().filter(|f| f.mode == FieldMode::Required) {
        if !entry.contains_key(field.name) {
            return Err(ResourceError::Validation {
                resource: resource.to_string(),
                message: format!("missing required field `{}`", field.name),
            });
        }
    }

    for key in entry.keys() {
        let Some(name) = key.as_str() else {
            return Err(ResourceError::Validation {
                resource: resource.to_string(),
                message: format!("field names must be strings, got {:?}", key),
            });
        };
        if name == "kind" {
            continue;
        }
        match fields.iter().find(|f| f.name == name) {
            Some(f) if f.mode == FieldMode::Computed => {
                return Err(ResourceError::Validation {
                    resource: resource.to_string(),
                    message: format!("field `{}` is computed and cannot be set", name),
                });
            }
            Some(_) => {}
            None => {
                return Err(ResourceError::Validation {
                    resource: resource.to_string(),
                    message: format!("unknown field `{}`", name),
                });
            }
        }
    }

    Ok(())
}
