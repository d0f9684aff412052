//! Dispatch of chunked writes to the engine matching a storage mode.

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

use super::{append_blob, block_blob, page_blob, set_blob_metadata, set_blob_properties};
use crate::error::{StorageError, StorageResult};
use crate::models::{page_align_content_length, ContentMd5, Metadata, Offsets, StorageEntity, StorageMode};

/// Writes one blob as a sequence of chunks.
///
/// `prepare` runs once before the first chunk and `finalize` once after the
/// last. Block and page chunks may be written concurrently; append chunks
/// must be written in chunk order.
#[async_trait]
pub trait ChunkWriter: Send + Sync {
    /// The storage mode this writer speaks.
    fn mode(&self) -> StorageMode;

    async fn prepare(&self, entity: &StorageEntity, timeout: Option<Duration>) -> StorageResult<()>;

    async fn write_chunk(
        &self,
        entity: &StorageEntity,
        offsets: &Offsets,
        data: Option<Bytes>,
        timeout: Option<Duration>,
    ) -> StorageResult<()>;

    async fn finalize(
        &self,
        entity: &StorageEntity,
        last_chunk_num: u64,
        md5: Option<ContentMd5>,
        metadata: Option<&Metadata>,
        timeout: Option<Duration>,
    ) -> StorageResult<()>;
}

/// Picks the writer for `mode`. `Auto` writes block blobs.
pub fn chunk_writer_for(mode: StorageMode) -> StorageResult<Box<dyn ChunkWriter>> {
    match mode {
        StorageMode::Block | StorageMode::Auto => Ok(Box::new(BlockWriter)),
        StorageMode::Append => Ok(Box::new(AppendWriter)),
        StorageMode::Page => Ok(Box::new(PageWriter)),
        StorageMode::File => Err(StorageError::UnsupportedMode {
            mode,
            operation: "write chunks",
        }),
    }
}

/// Stages chunks as blocks and commits them in chunk order.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockWriter;

#[async_trait]
impl ChunkWriter for BlockWriter {
    fn mode(&self) -> StorageMode {
        StorageMode::Block
    }

    async fn prepare(&self, entity: &StorageEntity, _timeout: Option<Duration>) -> StorageResult<()> {
        entity.mode.ensure_blob("upload block blobs")
    }

    async fn write_chunk(
        &self,
        entity: &StorageEntity,
        offsets: &Offsets,
        data: Option<Bytes>,
        timeout: Option<Duration>,
    ) -> StorageResult<()> {
        block_blob::put_block(entity, offsets, data, timeout).await
    }

    async fn finalize(
        &self,
        entity: &StorageEntity,
        last_chunk_num: u64,
        md5: Option<ContentMd5>,
        metadata: Option<&Metadata>,
        timeout: Option<Duration>,
    ) -> StorageResult<()> {
        block_blob::put_block_list(entity, last_chunk_num, md5, metadata, timeout).await?;
        block_blob::set_blob_access_tier(entity, timeout).await
    }
}

/// Appends chunks in call order.
#[derive(Debug, Clone, Copy, Default)]
pub struct AppendWriter;

#[async_trait]
impl ChunkWriter for AppendWriter {
    fn mode(&self) -> StorageMode {
        StorageMode::Append
    }

    async fn prepare(&self, entity: &StorageEntity, timeout: Option<Duration>) -> StorageResult<()> {
        append_blob::create_blob(entity, timeout).await
    }

    async fn write_chunk(
        &self,
        entity: &StorageEntity,
        _offsets: &Offsets,
        data: Option<Bytes>,
        timeout: Option<Duration>,
    ) -> StorageResult<()> {
        append_blob::append_block(entity, data, timeout).await
    }

    async fn finalize(
        &self,
        entity: &StorageEntity,
        _last_chunk_num: u64,
        md5: Option<ContentMd5>,
        metadata: Option<&Metadata>,
        timeout: Option<Duration>,
    ) -> StorageResult<()> {
        finalize_non_block(entity, md5, metadata, timeout).await
    }
}

/// Writes chunks into their page ranges of a pre-sized blob.
#[derive(Debug, Clone, Copy, Default)]
pub struct PageWriter;

#[async_trait]
impl ChunkWriter for PageWriter {
    fn mode(&self) -> StorageMode {
        StorageMode::Page
    }

    async fn prepare(&self, entity: &StorageEntity, timeout: Option<Duration>) -> StorageResult<()> {
        page_blob::create_blob(entity, timeout).await
    }

    /// The last chunk is padded out to the page boundary.
    async fn write_chunk(
        &self,
        entity: &StorageEntity,
        offsets: &Offsets,
        data: Option<Bytes>,
        timeout: Option<Duration>,
    ) -> StorageResult<()> {
        let page_end = page_align_content_length(offsets.range_end);
        page_blob::put_page(entity, offsets.range_start, page_end, data, timeout).await
    }

    async fn finalize(
        &self,
        entity: &StorageEntity,
        _last_chunk_num: u64,
        md5: Option<ContentMd5>,
        metadata: Option<&Metadata>,
        timeout: Option<Duration>,
    ) -> StorageResult<()> {
        finalize_non_block(entity, md5, metadata, timeout).await
    }
}

async fn finalize_non_block(
    entity: &StorageEntity,
    md5: Option<ContentMd5>,
    metadata: Option<&Metadata>,
    timeout: Option<Duration>,
) -> StorageResult<()> {
    if md5.is_some() || entity.cache_control.is_some() {
        let md5 = md5.map(|m| m.to_base64());
        set_blob_properties(entity, md5.as_deref(), timeout).await?;
    }
    if let Some(metadata) = metadata.filter(|m| !m.is_empty()) {
        set_blob_metadata(entity, metadata, timeout).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_dispatch() {
        assert_eq!(chunk_writer_for(StorageMode::Auto).unwrap().mode(), StorageMode::Block);
        assert_eq!(chunk_writer_for(StorageMode::Block).unwrap().mode(), StorageMode::Block);
        assert_eq!(chunk_writer_for(StorageMode::Append).unwrap().mode(), StorageMode::Append);
        assert_eq!(chunk_writer_for(StorageMode::Page).unwrap().mode(), StorageMode::Page);
        assert!(matches!(
            chunk_writer_for(StorageMode::File),
            Err(StorageError::UnsupportedMode { .. })
        ));
    }
}
