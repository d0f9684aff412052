//! Block blob engine: one-shot uploads, staged blocks and commits.

use bytes::Bytes;
use std::time::Duration;
use tracing::debug;

use crate::auth::generate_read_sas;
use crate::error::{StorageError, StorageResult};
use crate::models::{
    block_ids_through, Block, BlockId, BlockListType, ContentMd5, ContentSettings, Metadata,
    Offsets, StorageEntity,
};

fn content_settings(entity: &StorageEntity, md5: Option<ContentMd5>) -> ContentSettings {
    ContentSettings {
        content_type: Some(entity.content_type.clone()),
        cache_control: entity.cache_control.clone(),
        content_md5: md5,
    }
}

/// Writes a whole block blob in a single call.
pub async fn create_blob(
    entity: &StorageEntity,
    data: Option<Bytes>,
    md5: Option<ContentMd5>,
    metadata: Option<&Metadata>,
    timeout: Option<Duration>,
) -> StorageResult<()> {
    entity.mode.ensure_blob("upload block blobs")?;
    let data = data.unwrap_or_default();
    let (name, _) = entity.blob_name();
    debug!(
        "uploading {} bytes to {}/{} in one call",
        data.len(),
        entity.container,
        name
    );
    entity
        .client
        .upload_block_blob(
            &entity.container,
            &name,
            data,
            &content_settings(entity, md5),
            metadata.unwrap_or(&Metadata::new()),
            timeout,
        )
        .await
}

/// Stages one chunk as an uncommitted block.
pub async fn put_block(
    entity: &StorageEntity,
    offsets: &Offsets,
    data: Option<Bytes>,
    timeout: Option<Duration>,
) -> StorageResult<()> {
    entity.mode.ensure_blob("stage blocks")?;
    let block_id = BlockId::new(offsets.chunk_num)?;
    let data = data.unwrap_or_default();
    let (name, _) = entity.blob_name();
    debug!(
        "staging block {} ({} bytes) for {}/{}",
        block_id,
        data.len(),
        entity.container,
        name
    );
    entity
        .client
        .stage_block(&entity.container, &name, block_id, data, timeout)
        .await
}

/// URL the store can read `src` from, including a read credential when one
/// is available.
pub fn source_url(src: &StorageEntity) -> StorageResult<String> {
    if src.is_arbitrary_url {
        return Ok(src.path.clone());
    }
    let account = src.client.account();
    let token = if account.has_key() {
        let (name, _) = src.blob_name();
        Some(generate_read_sas(account, src.mode, &src.container, &name)?)
    } else {
        account
            .sas_token
            .as_deref()
            .map(|t| t.trim_start_matches('?').to_string())
            .filter(|t| !t.is_empty())
    };

    let url = src.url();
    Ok(match token {
        Some(token) => {
            let sep = if url.contains('?') { '&' } else { '?' };
            format!("{}{}{}", url, sep, token)
        }
        None => url,
    })
}

/// Stages one chunk of `dst` by having the store copy it from `src`.
///
/// The copied range is `[range_start, range_end)` of the source, the same
/// bytes [`put_block`] would stage for these offsets. An empty range is
/// rejected before any request is made.
pub async fn put_block_from_url(
    src: &StorageEntity,
    dst: &StorageEntity,
    offsets: &Offsets,
    timeout: Option<Duration>,
) -> StorageResult<()> {
    dst.mode.ensure_blob("stage blocks from a URL")?;
    let block_id = BlockId::new(offsets.chunk_num)?;
    if offsets.is_empty() {
        return Err(StorageError::invalid_input(format!(
            "empty source range [{}, {}) for block {}",
            offsets.range_start, offsets.range_end, block_id
        )));
    }
    let url = source_url(src)?;
    let (name, _) = dst.blob_name();
    debug!(
        "staging block {} of {}/{} from source range [{}, {})",
        block_id, dst.container, name, offsets.range_start, offsets.range_end
    );
    dst.client
        .stage_block_from_url(
            &dst.container,
            &name,
            block_id,
            &url,
            offsets.range(),
            timeout,
        )
        .await
}

/// Commits blocks `0..=last_chunk_num` in order as the blob's content.
pub async fn put_block_list(
    entity: &StorageEntity,
    last_chunk_num: u64,
    md5: Option<ContentMd5>,
    metadata: Option<&Metadata>,
    timeout: Option<Duration>,
) -> StorageResult<()> {
    entity.mode.ensure_blob("commit block lists")?;
    let block_ids = block_ids_through(last_chunk_num)?;
    let (name, _) = entity.blob_name();
    debug!(
        "committing {} blocks to {}/{}",
        block_ids.len(),
        entity.container,
        name
    );
    entity
        .client
        .commit_block_list(
            &entity.container,
            &name,
            &block_ids,
            &content_settings(entity, md5),
            metadata.unwrap_or(&Metadata::new()),
            timeout,
        )
        .await
}

pub async fn get_committed_block_list(
    entity: &StorageEntity,
    timeout: Option<Duration>,
) -> StorageResult<Vec<Block>> {
    entity.mode.ensure_blob("get block lists")?;
    let (name, snapshot) = entity.blob_name();
    let list = entity
        .client
        .get_block_list(
            &entity.container,
            &name,
            snapshot.as_deref(),
            BlockListType::Committed,
            timeout,
        )
        .await?;
    Ok(list.committed)
}

/// Applies the entity's access tier. A no-op when no tier is set.
pub async fn set_blob_access_tier(
    entity: &StorageEntity,
    timeout: Option<Duration>,
) -> StorageResult<()> {
    entity.mode.ensure_blob("set access tiers")?;
    let Some(tier) = entity.access_tier else {
        return Ok(());
    };
    let (name, _) = entity.blob_name();
    debug!(
        "setting access tier {} on {}/{}",
        tier.as_str(),
        entity.container,
        name
    );
    entity
        .client
        .set_blob_tier(&entity.container, &name, tier, timeout)
        .await
}
