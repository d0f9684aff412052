//! Page blob engine.
//!
//! Blob sizes are rounded up to whole pages when the blob is created or
//! resized. Page writes are range addressed and may complete in any order.

use bytes::{Bytes, BytesMut};
use std::time::Duration;
use tracing::debug;

use crate::error::{StorageError, StorageResult};
use crate::models::{page_align_content_length, ByteRange, ContentSettings, StorageEntity};

/// Creates a page blob sized to the entity's size rounded up to a page.
pub async fn create_blob(entity: &StorageEntity, timeout: Option<Duration>) -> StorageResult<()> {
    entity.mode.ensure_blob("create page blobs")?;
    let size = page_align_content_length(entity.size);
    let settings = ContentSettings {
        content_type: Some(entity.content_type.clone()),
        ..Default::default()
    };
    let (name, _) = entity.blob_name();
    debug!(
        "creating page blob {}/{} of {} bytes ({} requested)",
        entity.container, name, size, entity.size
    );
    entity
        .client
        .create_page_blob(&entity.container, &name, size, &settings, timeout)
        .await
}

/// Writes `data` into `[page_start, page_end)`.
///
/// Data shorter than the range is zero filled to its end. Alignment of the
/// bounds is left to the caller.
pub async fn put_page(
    entity: &StorageEntity,
    page_start: u64,
    page_end: u64,
    data: Option<Bytes>,
    timeout: Option<Duration>,
) -> StorageResult<()> {
    entity.mode.ensure_blob("write pages")?;
    if page_end < page_start {
        return Err(StorageError::invalid_input(format!(
            "page range [{}, {}) ends before it starts",
            page_start, page_end
        )));
    }
    let range = ByteRange::new(page_start, page_end);
    let mut data = data.unwrap_or_default();
    if range.is_empty() && data.is_empty() {
        return Ok(());
    }
    if (data.len() as u64) < range.len() {
        let mut padded = BytesMut::from(&data[..]);
        padded.resize(range.len() as usize, 0);
        data = padded.freeze();
    }
    let (name, _) = entity.blob_name();
    debug!(
        "writing pages [{}, {}) of {}/{}",
        page_start, page_end, entity.container, name
    );
    entity
        .client
        .upload_pages(&entity.container, &name, range, data, timeout)
        .await
}

/// Resizes the page blob to `size` rounded up to a page.
pub async fn resize_blob(
    entity: &StorageEntity,
    size: u64,
    timeout: Option<Duration>,
) -> StorageResult<()> {
    entity.mode.ensure_blob("resize page blobs")?;
    let (name, _) = entity.blob_name();
    entity
        .client
        .resize_blob(
            &entity.container,
            &name,
            page_align_content_length(size),
            timeout,
        )
        .await
}
