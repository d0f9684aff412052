//! Listing, mode resolution and protocol-independent blob operations.

use bytes::Bytes;
use futures::stream::{self, BoxStream, Stream, StreamExt, TryStreamExt};
use std::future;
use std::time::Duration;
use tracing::debug;

use crate::client::BlobClient;
use crate::error::{StorageError, StorageResult};
use crate::models::{
    blob_is_snapshot, split_snapshot, BlobProperties, ContentMd5, ContentSettings, Metadata,
    Offsets, SnapshotRef, StorageEntity, StorageMode,
};

/// Whether `prefix` names exactly one object.
///
/// Snapshot references are taken at their word without a round trip.
pub async fn check_if_single_blob(
    client: &dyn BlobClient,
    container: &str,
    prefix: &str,
    timeout: Option<Duration>,
) -> StorageResult<bool> {
    if blob_is_snapshot(prefix) {
        return Ok(true);
    }
    match client
        .get_blob_properties(container, prefix, None, timeout)
        .await
    {
        Ok(_) => Ok(true),
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e),
    }
}

/// Fetches the properties of `prefix`, or `None` if it does not exist.
///
/// Fails with `TypeMismatch` if the object exists with a blob type that
/// `mode` does not accept.
pub async fn get_blob_properties(
    client: &dyn BlobClient,
    container: &str,
    prefix: &str,
    mode: StorageMode,
    timeout: Option<Duration>,
) -> StorageResult<Option<BlobProperties>> {
    mode.ensure_blob("get Azure Blob properties")?;
    let (name, snapshot) = split_snapshot(prefix);
    let props = match client
        .get_blob_properties(container, &name, snapshot.as_deref(), timeout)
        .await
    {
        Ok(props) => props,
        Err(e) if e.is_not_found() => return Ok(None),
        Err(e) => return Err(e),
    };
    mode.check_blob_type(props.blob_type)?;
    Ok(Some(props))
}

/// Lists blobs under `prefix` whose type `mode` accepts.
///
/// A snapshot reference yields that one snapshot. Without `recursive`,
/// names that continue into a virtual directory past the prefix are skipped.
/// Pages are fetched as the stream is polled.
pub fn list_blobs<'a>(
    client: &'a dyn BlobClient,
    container: &'a str,
    prefix: &'a str,
    mode: StorageMode,
    recursive: bool,
    timeout: Option<Duration>,
) -> StorageResult<BoxStream<'a, StorageResult<BlobProperties>>> {
    mode.ensure_blob("list Azure Blobs")?;

    if let Some(snapshot) = SnapshotRef::parse(prefix) {
        let fetch = async move {
            client
                .get_blob_properties(container, &snapshot.name, Some(&snapshot.snapshot), timeout)
                .await
        };
        return Ok(stream::once(fetch).boxed());
    }

    let filter = (!prefix.is_empty()).then_some(prefix);
    let listed = blob_pages(client, container, filter, timeout).try_filter(move |blob| {
        let keep = mode.accepts(blob.blob_type)
            && (recursive || !blob.name.strip_prefix(prefix).unwrap_or(&blob.name).contains('/'));
        if !keep {
            debug!("skipping {} ({}) under mode {}", blob.name, blob.blob_type, mode);
        }
        future::ready(keep)
    });
    Ok(listed.boxed())
}

/// Every blob in `container`, unfiltered.
pub fn list_all_blobs<'a>(
    client: &'a dyn BlobClient,
    container: &'a str,
    timeout: Option<Duration>,
) -> BoxStream<'a, StorageResult<BlobProperties>> {
    blob_pages(client, container, None, timeout).boxed()
}

fn blob_pages<'a>(
    client: &'a dyn BlobClient,
    container: &'a str,
    prefix: Option<&'a str>,
    timeout: Option<Duration>,
) -> impl Stream<Item = StorageResult<BlobProperties>> + Send + 'a {
    // `None` once the last page has been read; otherwise the marker to resume at.
    stream::try_unfold(Some(None::<String>), move |state| async move {
        let Some(marker) = state else {
            return Ok(None);
        };
        let segment = client
            .list_blobs_segment(container, prefix, marker.as_deref(), timeout)
            .await?;
        let next = segment.next_marker.filter(|m| !m.is_empty()).map(Some);
        let items = stream::iter(segment.items.into_iter().map(Ok::<_, StorageError>));
        Ok::<_, StorageError>(Some((items, next)))
    })
    .try_flatten()
}

/// Deletes a blob together with its snapshots.
pub async fn delete_blob(
    client: &dyn BlobClient,
    container: &str,
    name: &str,
    timeout: Option<Duration>,
) -> StorageResult<()> {
    client.delete_blob(container, name, true, timeout).await
}

/// Downloads the bytes of one chunk.
pub async fn get_blob_range(
    entity: &StorageEntity,
    offsets: &Offsets,
    timeout: Option<Duration>,
) -> StorageResult<Bytes> {
    entity.mode.ensure_blob("download Azure Blob ranges")?;
    if offsets.is_empty() {
        return Ok(Bytes::new());
    }
    let (name, snapshot) = entity.blob_name();
    debug!(
        "reading chunk {} [{}, {}) of {}/{}",
        offsets.chunk_num, offsets.range_start, offsets.range_end, entity.container, name
    );
    entity
        .client
        .download_range(
            &entity.container,
            &name,
            snapshot.as_deref(),
            offsets.range(),
            timeout,
        )
        .await
}

/// Sets content headers once a multi-part upload is complete.
///
/// `md5` is the base64 digest of the whole object.
pub async fn set_blob_properties(
    entity: &StorageEntity,
    md5: Option<&str>,
    timeout: Option<Duration>,
) -> StorageResult<()> {
    entity.mode.ensure_blob("set Azure Blob properties")?;
    let settings = ContentSettings {
        content_type: Some(entity.content_type.clone()),
        cache_control: entity.cache_control.clone(),
        content_md5: md5.map(ContentMd5::from_base64).transpose()?,
    };
    let (name, _) = entity.blob_name();
    entity
        .client
        .set_http_headers(&entity.container, &name, &settings, timeout)
        .await
}

pub async fn set_blob_metadata(
    entity: &StorageEntity,
    metadata: &Metadata,
    timeout: Option<Duration>,
) -> StorageResult<()> {
    entity.mode.ensure_blob("set Azure Blob metadata")?;
    let (name, _) = entity.blob_name();
    entity
        .client
        .set_metadata(&entity.container, &name, metadata, timeout)
        .await
}
