//! ContentLibraryItem descriptor

use crate::error::ResourceError;
use crate::fields::{Described, Field};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// ContentLibraryItemSpec defines the desired state of a content library item
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct ContentLibraryItemSpec {
    /// Item name, unique within the library
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// ID of the owning content library (changing it replaces the item)
    pub library_id: String,

    /// Item type (changing it replaces the item)
    #[serde(rename = "type", default)]
    pub item_type: ContentType,

    /// Source URLs pulled into the item when it is created
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub file_url: Vec<String>,
}

/// Content library item type
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ContentType {
    #[default]
    Ovf,
    Iso,
    VmTemplate,
    Other,
}

const CONTENT_LIBRARY_ITEM_FIELDS: &[Field] = &[
    Field::required("name", "Item name, unique within the library"),
    Field::optional("description", "Item description"),
    Field::required("library_id", "ID of the owning content library (forces replacement)"),
    Field::optional("type", "ovf, iso, vm-template or other (default ovf, forces replacement)"),
    Field::optional("file_url", "Source URLs pulled at creation"),
    Field::computed("id", "Item ID assigned by vCenter"),
];

impl Described for ContentLibraryItemSpec {
    const KIND: &'static str = "ContentLibraryItem";

    fn fields() -> &'static [Field] {
        CONTENT_LIBRARY_ITEM_FIELDS
    }
}

pub fn content_library_item_address(library_id: &str, name: &str) -> String {
    format!("content_library_item/{}/{}", library_id, name)
}

impl ContentLibraryItemSpec {
    pub fn address(&self) -> String {
        content_library_item_address(&self.library_id, &self.name)
    }

    pub fn validate(&self) -> Result<(), ResourceError> {
        let invalid = |message: &str| ResourceError::Validation {
            resource: self.address(),
            message: message.to_string(),
        };
        if self.name.trim().is_empty() {
            return Err(invalid("name must not be empty"));
        }
        if self.library_id.trim().is_empty() {
            return Err(invalid("library_id must not be empty"));
        }
        if self.file_url.iter().any(|u| !(u.starts_with("http://") || u.starts_with("https://") || u.starts_with("ds://"))) {
            return Err(invalid("file_url entries must be http(s):// or ds:// URLs"));
        }
        Ok(())
    }
}
