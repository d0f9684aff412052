//! Append blob engine.

use bytes::Bytes;
use std::time::Duration;
use tracing::debug;

use crate::error::StorageResult;
use crate::models::{ContentSettings, StorageEntity};

/// Creates an empty append blob. Must precede any append.
pub async fn create_blob(entity: &StorageEntity, timeout: Option<Duration>) -> StorageResult<()> {
    entity.mode.ensure_blob("create append blobs")?;
    let settings = ContentSettings {
        content_type: Some(entity.content_type.clone()),
        cache_control: entity.cache_control.clone(),
        content_md5: None,
    };
    let (name, _) = entity.blob_name();
    entity
        .client
        .create_append_blob(&entity.container, &name, &settings, timeout)
        .await
}

/// Appends `data` to the end of the blob.
///
/// Appends to one blob land in call order; callers serialize them.
pub async fn append_block(
    entity: &StorageEntity,
    data: Option<Bytes>,
    timeout: Option<Duration>,
) -> StorageResult<()> {
    entity.mode.ensure_blob("append blocks")?;
    let data = data.unwrap_or_default();
    let (name, _) = entity.blob_name();
    debug!(
        "appending {} bytes to {}/{}",
        data.len(),
        entity.container,
        name
    );
    entity
        .client
        .append_block(&entity.container, &name, data, timeout)
        .await
}
