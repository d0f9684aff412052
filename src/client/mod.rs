//! Transport clients bound to one storage account.
//!
//! [`BlobClient`] is the seam between the transfer engines and the wire.
//! [`RestClient`] speaks the Azure Blob REST API; [`MemoryClient`] keeps
//! everything in process with the same observable semantics.

mod memory;
mod rest;

pub use memory::*;
pub use rest::*;

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

use crate::error::StorageResult;
use crate::models::{
    AccessTier, BlobListSegment, BlobProperties, BlockId, BlockList, BlockListType, ByteRange,
    ContentSettings, Metadata, StorageAccount,
};

/// Container and blob scoped operations against one account.
///
/// Every call takes an optional server timeout. Implementations apply their
/// retry policy to each call; callers only see the final outcome.
#[async_trait]
pub trait BlobClient: Send + Sync {
    /// The account this client is bound to.
    fn account(&self) -> &StorageAccount;

    async fn create_container(
        &self,
        container: &str,
        timeout: Option<Duration>,
    ) -> StorageResult<()>;

    async fn get_blob_properties(
        &self,
        container: &str,
        blob: &str,
        snapshot: Option<&str>,
        timeout: Option<Duration>,
    ) -> StorageResult<BlobProperties>;

    /// One page of blobs whose names start with `prefix`, resuming after `marker`.
    async fn list_blobs_segment(
        &self,
        container: &str,
        prefix: Option<&str>,
        marker: Option<&str>,
        timeout: Option<Duration>,
    ) -> StorageResult<BlobListSegment>;

    async fn delete_blob(
        &self,
        container: &str,
        blob: &str,
        include_snapshots: bool,
        timeout: Option<Duration>,
    ) -> StorageResult<()>;

    /// Writes a complete block blob in one call.
    async fn upload_block_blob(
        &self,
        container: &str,
        blob: &str,
        body: Bytes,
        settings: &ContentSettings,
        metadata: &Metadata,
        timeout: Option<Duration>,
    ) -> StorageResult<()>;

    async fn stage_block(
        &self,
        container: &str,
        blob: &str,
        block_id: BlockId,
        body: Bytes,
        timeout: Option<Duration>,
    ) -> StorageResult<()>;

    /// Stages a block whose content the store reads from `source_url`.
    async fn stage_block_from_url(
        &self,
        container: &str,
        blob: &str,
        block_id: BlockId,
        source_url: &str,
        source_range: ByteRange,
        timeout: Option<Duration>,
    ) -> StorageResult<()>;

    async fn commit_block_list(
        &self,
        container: &str,
        blob: &str,
        block_ids: &[BlockId],
        settings: &ContentSettings,
        metadata: &Metadata,
        timeout: Option<Duration>,
    ) -> StorageResult<()>;

    async fn get_block_list(
        &self,
        container: &str,
        blob: &str,
        snapshot: Option<&str>,
        list_type: BlockListType,
        timeout: Option<Duration>,
    ) -> StorageResult<BlockList>;

    async fn set_blob_tier(
        &self,
        container: &str,
        blob: &str,
        tier: AccessTier,
        timeout: Option<Duration>,
    ) -> StorageResult<()>;

    async fn create_append_blob(
        &self,
        container: &str,
        blob: &str,
        settings: &ContentSettings,
        timeout: Option<Duration>,
    ) -> StorageResult<()>;

    async fn append_block(
        &self,
        container: &str,
        blob: &str,
        body: Bytes,
        timeout: Option<Duration>,
    ) -> StorageResult<()>;

    /// Creates a page blob of `size` bytes; `size` must be page aligned.
    async fn create_page_blob(
        &self,
        container: &str,
        blob: &str,
        size: u64,
        settings: &ContentSettings,
        timeout: Option<Duration>,
    ) -> StorageResult<()>;

    async fn upload_pages(
        &self,
        container: &str,
        blob: &str,
        range: ByteRange,
        body: Bytes,
        timeout: Option<Duration>,
    ) -> StorageResult<()>;

    async fn resize_blob(
        &self,
        container: &str,
        blob: &str,
        size: u64,
        timeout: Option<Duration>,
    ) -> StorageResult<()>;

    /// Replaces the content headers stored with the blob.
    async fn set_http_headers(
        &self,
        container: &str,
        blob: &str,
        settings: &ContentSettings,
        timeout: Option<Duration>,
    ) -> StorageResult<()>;

    async fn set_metadata(
        &self,
        container: &str,
        blob: &str,
        metadata: &Metadata,
        timeout: Option<Duration>,
    ) -> StorageResult<()>;

    async fn download_range(
        &self,
        container: &str,
        blob: &str,
        snapshot: Option<&str>,
        range: ByteRange,
        timeout: Option<Duration>,
    ) -> StorageResult<Bytes>;
}
