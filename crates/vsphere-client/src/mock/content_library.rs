//! Content library operations for MockVSphereClient

use super::{MockVSphereClient, lock};
use crate::client::file_name_from_url;
use crate::error::VSphereError;
use crate::models::*;

pub async fn get_library_item(client: &MockVSphereClient, id: &str) -> Result<LibraryItem, VSphereError> {
    lock(&client.library_items)
        .get(id)
        .cloned()
        .ok_or_else(|| VSphereError::NotFound(format!("Content library item {} not found", id)))
}

pub async fn find_library_items(
    client: &MockVSphereClient,
    library_id: &str,
    name: &str,
) -> Result<Vec<String>, VSphereError> {
    let mut ids: Vec<String> = lock(&client.library_items)
        .values()
        .filter(|i| i.library_id == library_id && i.name == name)
        .map(|i| i.id.clone())
        .collect();
    ids.sort();
    Ok(ids)
}

pub async fn create_library_item(
    client: &MockVSphereClient,
    spec: &LibraryItemCreateSpec,
) -> Result<String, VSphereError> {
    if spec.name.is_empty() {
        return Err(VSphereError::InvalidRequest(
            "library item name must not be empty".to_string(),
        ));
    }
    let mut items = lock(&client.library_items);
    if items
        .values()
        .any(|i| i.library_id == spec.library_id && i.name == spec.name)
    {
        return Err(VSphereError::Api(format!(
            "item {} already exists in library {}",
            spec.name, spec.library_id
        )));
    }

    let id = uuid::Uuid::new_v4().to_string();
    items.insert(
        id.clone(),
        LibraryItem {
            id: id.clone(),
            library_id: spec.library_id.clone(),
            name: spec.name.clone(),
            description: spec.description.clone(),
            item_type: spec.item_type,
        },
    );
    Ok(id)
}

pub async fn update_library_item(
    client: &MockVSphereClient,
    id: &str,
    spec: &LibraryItemUpdateSpec,
) -> Result<(), VSphereError> {
    let mut items = lock(&client.library_items);
    let item = items
        .get_mut(id)
        .ok_or_else(|| VSphereError::NotFound(format!("Content library item {} not found", id)))?;
    if let Some(name) = &spec.name {
        item.name = name.clone();
    }
    if let Some(description) = &spec.description {
        item.description = Some(description.clone());
    }
    Ok(())
}

pub async fn delete_library_item(client: &MockVSphereClient, id: &str) -> Result<(), VSphereError> {
    lock(&client.uploaded_files).remove(id);
    lock(&client.library_items)
        .remove(id)
        .map(|_| ())
        .ok_or_else(|| VSphereError::NotFound(format!("Content library item {} not found", id)))
}

pub async fn upload_library_item_files(
    client: &MockVSphereClient,
    id: &str,
    sources: &[String],
) -> Result<(), VSphereError> {
    get_library_item(client, id).await?;
    if let Some(message) = lock(&client.fail_next_upload).take() {
        return Err(VSphereError::Api(message));
    }
    lock(&client.uploaded_files)
        .entry(id.to_string())
        .or_default()
        .extend(sources.iter().map(|s| file_name_from_url(s)));
    Ok(())
}
