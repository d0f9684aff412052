//! In-process blob store behind the [`BlobClient`] seam.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use http::StatusCode;
use parking_lot::Mutex;
use percent_encoding::percent_decode_str;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use super::BlobClient;
use crate::auth::{compute_signature, SasResource, ServiceSas};
use crate::config::{DEFAULT_ACCOUNT, DEFAULT_ACCOUNT_KEY, DEFAULT_BLOB_ENDPOINT};
use crate::error::{ErrorCode, RemoteError, StorageError, StorageResult};
use crate::models::{
    is_page_aligned, AccessTier, BlobListSegment, BlobProperties, BlobType, Block, BlockId,
    BlockList, BlockListType, ByteRange, ContentMd5, ContentSettings, Metadata, StorageAccount,
    StorageMode, DEFAULT_ENDPOINT_SUFFIX,
};
use crate::retry::ExponentialRetryWithMaxWait;

/// Default number of blobs per list page.
pub const DEFAULT_LIST_PAGE_SIZE: usize = 5000;

/// Key type for blobs: (container, name, snapshot). Base blobs use an empty snapshot.
type BlobKey = (Arc<str>, Arc<str>, Arc<str>);

/// Key type for staged blocks: (container, blob, block id).
type BlockKey = (Arc<str>, Arc<str>, Arc<str>);

#[derive(Debug, Clone)]
struct StoredBlob {
    properties: BlobProperties,
    data: Vec<u8>,
    /// Committed blocks of a block blob, in commit order.
    blocks: Vec<(String, Bytes)>,
}

fn remote(code: ErrorCode) -> StorageError {
    RemoteError::new(code).into()
}

fn remote_msg(code: ErrorCode, message: impl Into<String>) -> StorageError {
    RemoteError::with_message(code, message).into()
}

fn cannot_verify_copy_source(message: impl Into<String>) -> StorageError {
    RemoteError::with_message(ErrorCode::Other("CannotVerifyCopySource".into()), message)
        .with_status(StatusCode::FORBIDDEN)
        .into()
}

/// A blob store held entirely in memory.
///
/// Calls go through the same retry policy as the REST transport, and
/// [`MemoryClient::fail_next`] queues failures to exercise it.
pub struct MemoryClient {
    account: StorageAccount,
    retry: ExponentialRetryWithMaxWait,
    page_size: usize,

    /// Containers indexed by name.
    containers: DashMap<Arc<str>, DateTime<Utc>>,

    /// Blobs and snapshots indexed by (container, name, snapshot).
    blobs: DashMap<BlobKey, StoredBlob>,

    /// Staged (uncommitted) blocks indexed by (container, blob, block id).
    blocks: DashMap<BlockKey, Bytes>,

    etag_counter: AtomicU64,
    create_container_calls: AtomicUsize,
    calls: Mutex<Vec<&'static str>>,
    copy_sources: Mutex<Vec<String>>,
    faults: Mutex<VecDeque<StorageError>>,
}

impl Default for MemoryClient {
    fn default() -> Self {
        Self::new(StorageAccount {
            name: DEFAULT_ACCOUNT.to_string(),
            key: Some(DEFAULT_ACCOUNT_KEY.to_string()),
            sas_token: None,
            endpoint_suffix: DEFAULT_ENDPOINT_SUFFIX.to_string(),
            blob_endpoint: Url::parse(DEFAULT_BLOB_ENDPOINT).ok(),
        })
    }
}

impl MemoryClient {
    pub fn new(account: StorageAccount) -> Self {
        Self {
            account,
            retry: ExponentialRetryWithMaxWait::new(Some(3))
                .with_backoff(Duration::from_millis(1), Duration::from_millis(10)),
            page_size: DEFAULT_LIST_PAGE_SIZE,
            containers: DashMap::new(),
            blobs: DashMap::new(),
            blocks: DashMap::new(),
            etag_counter: AtomicU64::new(0),
            create_container_calls: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
            copy_sources: Mutex::new(Vec::new()),
            faults: Mutex::new(VecDeque::new()),
        }
    }

    pub fn with_retry(mut self, retry: ExponentialRetryWithMaxWait) -> Self {
        self.retry = retry;
        self
    }

    /// Limits list pages to `page_size` entries.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Number of create-container requests that reached the store.
    pub fn create_container_calls(&self) -> usize {
        self.create_container_calls.load(Ordering::SeqCst)
    }

    /// Every request that reached the store, in arrival order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self, operation: &str) -> usize {
        self.calls.lock().iter().filter(|op| **op == operation).count()
    }

    /// Source URLs handed to stage-block-from-URL.
    pub fn copy_sources(&self) -> Vec<String> {
        self.copy_sources.lock().clone()
    }

    /// Fails the next request with `error` before it touches the store.
    pub fn fail_next(&self, error: StorageError) {
        self.faults.lock().push_back(error);
    }

    pub fn contains_container(&self, container: &str) -> bool {
        self.containers.contains_key(container)
    }

    /// Takes a snapshot of a base blob and returns its token.
    pub fn snapshot_blob(&self, container: &str, blob: &str) -> StorageResult<String> {
        let mut stored = self.stored(container, blob, None)?;
        let snapshot = format!("{}0Z", Utc::now().format("%Y-%m-%dT%H:%M:%S%.6f"));
        stored.properties.snapshot = Some(snapshot.clone());
        self.blobs
            .insert(Self::blob_key(container, blob, Some(&snapshot)), stored);
        Ok(snapshot)
    }

    /// Runs one store operation under the retry policy.
    async fn call<T, F>(&self, operation: &'static str, f: F) -> StorageResult<T>
    where
        F: Fn() -> StorageResult<T> + Send + Sync,
        T: Send,
    {
        let f = &f;
        self.retry
            .run(operation, move || async move {
                tokio::task::yield_now().await;
                self.calls.lock().push(operation);
                let fault = self.faults.lock().pop_front();
                if let Some(fault) = fault {
                    return Err(fault);
                }
                f()
            })
            .await
    }

    #[inline]
    fn arc_str(s: &str) -> Arc<str> {
        Arc::from(s)
    }

    fn blob_key(container: &str, name: &str, snapshot: Option<&str>) -> BlobKey {
        (
            Self::arc_str(container),
            Self::arc_str(name),
            Self::arc_str(snapshot.unwrap_or("")),
        )
    }

    fn block_key(container: &str, blob: &str, block_id: &str) -> BlockKey {
        (
            Self::arc_str(container),
            Self::arc_str(blob),
            Self::arc_str(block_id),
        )
    }

    fn next_etag(&self) -> String {
        format!("\"0x{:X}\"", self.etag_counter.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn new_blob(
        &self,
        name: &str,
        blob_type: BlobType,
        content_length: u64,
        settings: &ContentSettings,
    ) -> StoredBlob {
        let mut properties = BlobProperties::new(name, blob_type, content_length);
        properties.content_type = settings.content_type.clone();
        properties.cache_control = settings.cache_control.clone();
        properties.content_md5 = settings.content_md5.map(|md5| md5.to_base64());
        properties.etag = Some(self.next_etag());
        properties.last_modified = Some(Utc::now());
        StoredBlob {
            properties,
            data: Vec::new(),
            blocks: Vec::new(),
        }
    }

    fn require_container(&self, container: &str) -> StorageResult<()> {
        if self.containers.contains_key(container) {
            Ok(())
        } else {
            Err(remote(ErrorCode::ContainerNotFound))
        }
    }

    fn stored(&self, container: &str, blob: &str, snapshot: Option<&str>) -> StorageResult<StoredBlob> {
        self.require_container(container)?;
        self.blobs
            .get(&Self::blob_key(container, blob, snapshot))
            .map(|b| b.value().clone())
            .ok_or_else(|| remote(ErrorCode::BlobNotFound))
    }

    /// Rejects writes of `expected` type over an existing blob of another type.
    fn ensure_type_if_exists(&self, container: &str, blob: &str, expected: BlobType) -> StorageResult<()> {
        let actual = self
            .blobs
            .get(&Self::blob_key(container, blob, None))
            .map(|b| b.properties.blob_type);
        match actual {
            Some(actual) if actual != expected => Err(remote(ErrorCode::InvalidBlobType)),
            _ => Ok(()),
        }
    }

    /// Mutates an existing base blob and bumps its etag on success.
    fn with_blob<T>(
        &self,
        container: &str,
        blob: &str,
        f: impl FnOnce(&mut StoredBlob) -> StorageResult<T>,
    ) -> StorageResult<T> {
        self.require_container(container)?;
        let etag = self.next_etag();
        let mut entry = self
            .blobs
            .get_mut(&Self::blob_key(container, blob, None))
            .ok_or_else(|| remote(ErrorCode::BlobNotFound))?;
        let value = f(entry.value_mut())?;
        entry.properties.etag = Some(etag);
        entry.properties.last_modified = Some(Utc::now());
        Ok(value)
    }

    fn clear_staged(&self, container: &str, blob: &str) {
        self.blocks
            .retain(|(c, b, _), _| c.as_ref() != container || b.as_ref() != blob);
    }

    fn put_container(&self, container: &str) -> StorageResult<()> {
        self.create_container_calls.fetch_add(1, Ordering::SeqCst);
        let key = Self::arc_str(container);
        if self.containers.contains_key(&key) {
            return Err(remote(ErrorCode::ContainerAlreadyExists));
        }
        self.containers.insert(key, Utc::now());
        Ok(())
    }

    fn list_segment(
        &self,
        container: &str,
        prefix: Option<&str>,
        marker: Option<&str>,
    ) -> StorageResult<BlobListSegment> {
        self.require_container(container)?;

        let mut items: Vec<BlobProperties> = self
            .blobs
            .iter()
            .filter(|entry| {
                let (c, name, snapshot) = entry.key();
                c.as_ref() == container
                    && snapshot.is_empty()
                    && prefix.map_or(true, |p| name.starts_with(p))
                    && marker.map_or(true, |m| name.as_ref() > m)
            })
            .map(|entry| entry.value().properties.clone())
            .collect();
        items.sort_by(|a, b| a.name.cmp(&b.name));

        let next_marker = if items.len() > self.page_size {
            items.truncate(self.page_size);
            items.last().map(|b| b.name.clone())
        } else {
            None
        };

        Ok(BlobListSegment { items, next_marker })
    }

    fn remove_blob(&self, container: &str, blob: &str, include_snapshots: bool) -> StorageResult<()> {
        self.require_container(container)?;
        let base = Self::blob_key(container, blob, None);
        if !self.blobs.contains_key(&base) {
            return Err(remote(ErrorCode::BlobNotFound));
        }

        let snapshots: Vec<BlobKey> = self
            .blobs
            .iter()
            .filter(|entry| {
                let (c, name, snapshot) = entry.key();
                c.as_ref() == container && name.as_ref() == blob && !snapshot.is_empty()
            })
            .map(|entry| entry.key().clone())
            .collect();
        if !snapshots.is_empty() && !include_snapshots {
            return Err(RemoteError::with_message(
                ErrorCode::Other("SnapshotsPresent".into()),
                "This operation is not permitted because the blob has snapshots.",
            )
            .with_status(StatusCode::CONFLICT)
            .into());
        }

        for key in snapshots {
            self.blobs.remove(&key);
        }
        self.blobs.remove(&base);
        self.clear_staged(container, blob);
        Ok(())
    }

    fn put_blob(
        &self,
        container: &str,
        blob: &str,
        body: &Bytes,
        settings: &ContentSettings,
        metadata: &Metadata,
    ) -> StorageResult<()> {
        self.require_container(container)?;
        let mut settings = settings.clone();
        settings.content_md5 = settings.content_md5.or_else(|| Some(ContentMd5::of(body)));

        let mut stored = self.new_blob(blob, BlobType::BlockBlob, body.len() as u64, &settings);
        stored.properties.metadata = metadata.clone();
        stored.data = body.to_vec();

        self.clear_staged(container, blob);
        self.blobs.insert(Self::blob_key(container, blob, None), stored);
        Ok(())
    }

    fn stage(&self, container: &str, blob: &str, block_id: BlockId, body: Bytes) -> StorageResult<()> {
        self.require_container(container)?;
        self.ensure_type_if_exists(container, blob, BlobType::BlockBlob)?;
        self.blocks
            .insert(Self::block_key(container, blob, &block_id.to_string()), body);
        Ok(())
    }

    /// Resolves a copy source on this account and reads its range.
    fn read_source(&self, source_url: &str, range: ByteRange) -> StorageResult<Bytes> {
        let url = Url::parse(source_url)
            .map_err(|e| cannot_verify_copy_source(format!("invalid source url: {}", e)))?;

        let base = format!("{}/", self.account.service_url(StorageMode::Block));
        let without_query = source_url.split('?').next().unwrap_or(source_url);
        let path = without_query.strip_prefix(&base).ok_or_else(|| {
            cannot_verify_copy_source(format!("source {} is not on this account", without_query))
        })?;
        let (container, blob) = path
            .split_once('/')
            .ok_or_else(|| cannot_verify_copy_source("source url names no blob"))?;
        let blob = percent_decode_str(blob).decode_utf8_lossy().to_string();

        let params: HashMap<String, String> = url.query_pairs().into_owned().collect();
        self.verify_source_sas(&params, container, &blob)?;

        let stored = self.stored(container, &blob, params.get("snapshot").map(String::as_str))?;
        read_range(&stored, range)
    }

    /// Checks a service SAS attached to a copy source. Unsigned sources are
    /// treated as public.
    fn verify_source_sas(
        &self,
        params: &HashMap<String, String>,
        container: &str,
        blob: &str,
    ) -> StorageResult<()> {
        let Some(signature) = params.get("sig") else {
            return Ok(());
        };
        let key = self
            .account
            .key
            .as_deref()
            .ok_or_else(|| remote(ErrorCode::AuthenticationFailed))?;

        let expiry = params
            .get("se")
            .and_then(|se| DateTime::parse_from_rfc3339(se).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| remote_msg(ErrorCode::AuthenticationFailed, "SAS token has no expiry"))?;
        if Utc::now() > expiry {
            return Err(remote_msg(ErrorCode::AuthenticationFailed, "SAS token has expired"));
        }

        let permissions = params.get("sp").cloned().unwrap_or_default();
        if !permissions.contains('r') {
            return Err(remote(ErrorCode::AuthorizationPermissionMismatch));
        }

        let sas = ServiceSas {
            resource: match params.get("sr").map(String::as_str) {
                Some("f") => SasResource::File,
                _ => SasResource::Blob,
            },
            container: container.to_string(),
            path: blob.to_string(),
            permissions,
            expiry,
            version: params.get("sv").cloned().unwrap_or_default(),
        };
        let expected = compute_signature(&sas.string_to_sign(&self.account.name), key)?;
        if &expected != signature {
            tracing::debug!(
                "copy source signature mismatch: expected {}, provided {}",
                expected,
                signature
            );
            return Err(remote(ErrorCode::AuthenticationFailed));
        }
        Ok(())
    }

    fn stage_from_url(
        &self,
        container: &str,
        blob: &str,
        block_id: BlockId,
        source_url: &str,
        source_range: ByteRange,
    ) -> StorageResult<()> {
        self.require_container(container)?;
        self.ensure_type_if_exists(container, blob, BlobType::BlockBlob)?;
        self.copy_sources.lock().push(source_url.to_string());
        let body = self.read_source(source_url, source_range)?;
        self.blocks
            .insert(Self::block_key(container, blob, &block_id.to_string()), body);
        Ok(())
    }

    fn commit(
        &self,
        container: &str,
        blob: &str,
        block_ids: &[BlockId],
        settings: &ContentSettings,
        metadata: &Metadata,
    ) -> StorageResult<()> {
        self.require_container(container)?;
        self.ensure_type_if_exists(container, blob, BlobType::BlockBlob)?;

        let key = Self::blob_key(container, blob, None);
        let (committed, tier) = self
            .blobs
            .get(&key)
            .map(|b| (b.blocks.clone(), b.properties.access_tier))
            .unwrap_or_default();

        let mut blocks = Vec::with_capacity(block_ids.len());
        for id in block_ids {
            let name = id.to_string();
            let staged = self
                .blocks
                .get(&Self::block_key(container, blob, &name))
                .map(|b| b.value().clone());
            let data = staged
                .or_else(|| {
                    committed
                        .iter()
                        .find(|(n, _)| *n == name)
                        .map(|(_, d)| d.clone())
                })
                .ok_or_else(|| {
                    remote_msg(
                        ErrorCode::InvalidBlockList,
                        format!("block {} is neither staged nor committed", name),
                    )
                })?;
            blocks.push((name, data));
        }

        let data: Vec<u8> = blocks.iter().flat_map(|(_, d)| d.iter().copied()).collect();
        let mut stored = self.new_blob(blob, BlobType::BlockBlob, data.len() as u64, settings);
        stored.properties.metadata = metadata.clone();
        stored.properties.access_tier = tier;
        stored.data = data;
        stored.blocks = blocks;

        self.clear_staged(container, blob);
        self.blobs.insert(key, stored);
        Ok(())
    }

    fn block_list(
        &self,
        container: &str,
        blob: &str,
        snapshot: Option<&str>,
        list_type: BlockListType,
    ) -> StorageResult<BlockList> {
        self.require_container(container)?;
        let stored = self
            .blobs
            .get(&Self::blob_key(container, blob, snapshot))
            .map(|b| b.value().clone());

        let mut staged: Vec<Block> = if snapshot.is_none() {
            self.blocks
                .iter()
                .filter(|entry| {
                    let (c, b, _) = entry.key();
                    c.as_ref() == container && b.as_ref() == blob
                })
                .map(|entry| Block {
                    name: entry.key().2.to_string(),
                    size: entry.value().len() as u64,
                })
                .collect()
        } else {
            Vec::new()
        };
        staged.sort_by(|a, b| a.name.cmp(&b.name));

        if stored.is_none() && staged.is_empty() {
            return Err(remote(ErrorCode::BlobNotFound));
        }
        if let Some(s) = &stored {
            if s.properties.blob_type != BlobType::BlockBlob {
                return Err(remote(ErrorCode::InvalidBlobType));
            }
        }

        let committed: Vec<Block> = stored
            .map(|s| {
                s.blocks
                    .iter()
                    .map(|(name, data)| Block {
                        name: name.clone(),
                        size: data.len() as u64,
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(match list_type {
            BlockListType::Committed => BlockList {
                committed,
                uncommitted: Vec::new(),
            },
            BlockListType::Uncommitted => BlockList {
                committed: Vec::new(),
                uncommitted: staged,
            },
            BlockListType::All => BlockList {
                committed,
                uncommitted: staged,
            },
        })
    }

    fn put_append_blob(&self, container: &str, blob: &str, settings: &ContentSettings) -> StorageResult<()> {
        self.require_container(container)?;
        let stored = self.new_blob(blob, BlobType::AppendBlob, 0, settings);
        self.clear_staged(container, blob);
        self.blobs.insert(Self::blob_key(container, blob, None), stored);
        Ok(())
    }

    fn put_page_blob(
        &self,
        container: &str,
        blob: &str,
        size: u64,
        settings: &ContentSettings,
    ) -> StorageResult<()> {
        self.require_container(container)?;
        if !is_page_aligned(size) {
            return Err(remote_msg(
                ErrorCode::InvalidHeaderValue,
                format!("page blob size {} is not a multiple of 512", size),
            ));
        }
        let stored = self.new_blob(blob, BlobType::PageBlob, size, settings);
        self.clear_staged(container, blob);
        self.blobs.insert(Self::blob_key(container, blob, None), stored);
        Ok(())
    }
}

/// Reads `range` of a stored blob; bytes never written read as zero.
fn read_range(stored: &StoredBlob, range: ByteRange) -> StorageResult<Bytes> {
    if range.end > stored.properties.content_length || range.start > range.end {
        return Err(remote(ErrorCode::InvalidRange));
    }
    let mut out = vec![0u8; range.len() as usize];
    let data_end = (stored.data.len() as u64).min(range.end);
    if range.start < data_end {
        let n = (data_end - range.start) as usize;
        out[..n].copy_from_slice(&stored.data[range.start as usize..data_end as usize]);
    }
    Ok(Bytes::from(out))
}

fn require_type(stored: &StoredBlob, expected: BlobType) -> StorageResult<()> {
    if stored.properties.blob_type != expected {
        return Err(remote_msg(
            ErrorCode::InvalidBlobType,
            format!(
                "operation requires a {} but the blob is a {}",
                expected, stored.properties.blob_type
            ),
        ));
    }
    Ok(())
}

#[async_trait]
impl BlobClient for MemoryClient {
    fn account(&self) -> &StorageAccount {
        &self.account
    }

    async fn create_container(&self, container: &str, _timeout: Option<Duration>) -> StorageResult<()> {
        self.call("create_container", || self.put_container(container))
            .await
    }

    async fn get_blob_properties(
        &self,
        container: &str,
        blob: &str,
        snapshot: Option<&str>,
        _timeout: Option<Duration>,
    ) -> StorageResult<BlobProperties> {
        self.call("get_blob_properties", || {
            self.stored(container, blob, snapshot).map(|b| b.properties)
        })
        .await
    }

    async fn list_blobs_segment(
        &self,
        container: &str,
        prefix: Option<&str>,
        marker: Option<&str>,
        _timeout: Option<Duration>,
    ) -> StorageResult<BlobListSegment> {
        self.call("list_blobs", || self.list_segment(container, prefix, marker))
            .await
    }

    async fn delete_blob(
        &self,
        container: &str,
        blob: &str,
        include_snapshots: bool,
        _timeout: Option<Duration>,
    ) -> StorageResult<()> {
        self.call("delete_blob", || {
            self.remove_blob(container, blob, include_snapshots)
        })
        .await
    }

    async fn upload_block_blob(
        &self,
        container: &str,
        blob: &str,
        body: Bytes,
        settings: &ContentSettings,
        metadata: &Metadata,
        _timeout: Option<Duration>,
    ) -> StorageResult<()> {
        self.call("put_blob", || {
            self.put_blob(container, blob, &body, settings, metadata)
        })
        .await
    }

    async fn stage_block(
        &self,
        container: &str,
        blob: &str,
        block_id: BlockId,
        body: Bytes,
        _timeout: Option<Duration>,
    ) -> StorageResult<()> {
        self.call("put_block", || {
            self.stage(container, blob, block_id, body.clone())
        })
        .await
    }

    async fn stage_block_from_url(
        &self,
        container: &str,
        blob: &str,
        block_id: BlockId,
        source_url: &str,
        source_range: ByteRange,
        _timeout: Option<Duration>,
    ) -> StorageResult<()> {
        if source_range.is_empty() {
            return Err(StorageError::invalid_input(format!(
                "empty source range for block {}",
                block_id
            )));
        }
        self.call("put_block_from_url", || {
            self.stage_from_url(container, blob, block_id, source_url, source_range)
        })
        .await
    }

    async fn commit_block_list(
        &self,
        container: &str,
        blob: &str,
        block_ids: &[BlockId],
        settings: &ContentSettings,
        metadata: &Metadata,
        _timeout: Option<Duration>,
    ) -> StorageResult<()> {
        self.call("put_block_list", || {
            self.commit(container, blob, block_ids, settings, metadata)
        })
        .await
    }

    async fn get_block_list(
        &self,
        container: &str,
        blob: &str,
        snapshot: Option<&str>,
        list_type: BlockListType,
        _timeout: Option<Duration>,
    ) -> StorageResult<BlockList> {
        self.call("get_block_list", || {
            self.block_list(container, blob, snapshot, list_type)
        })
        .await
    }

    async fn set_blob_tier(
        &self,
        container: &str,
        blob: &str,
        tier: AccessTier,
        _timeout: Option<Duration>,
    ) -> StorageResult<()> {
        self.call("set_blob_tier", || {
            self.with_blob(container, blob, |stored| {
                require_type(stored, BlobType::BlockBlob)?;
                stored.properties.access_tier = Some(tier);
                Ok(())
            })
        })
        .await
    }

    async fn create_append_blob(
        &self,
        container: &str,
        blob: &str,
        settings: &ContentSettings,
        _timeout: Option<Duration>,
    ) -> StorageResult<()> {
        self.call("create_append_blob", || {
            self.put_append_blob(container, blob, settings)
        })
        .await
    }

    async fn append_block(
        &self,
        container: &str,
        blob: &str,
        body: Bytes,
        _timeout: Option<Duration>,
    ) -> StorageResult<()> {
        self.call("append_block", || {
            self.with_blob(container, blob, |stored| {
                require_type(stored, BlobType::AppendBlob)?;
                stored.data.extend_from_slice(&body);
                stored.properties.content_length = stored.data.len() as u64;
                Ok(())
            })
        })
        .await
    }

    async fn create_page_blob(
        &self,
        container: &str,
        blob: &str,
        size: u64,
        settings: &ContentSettings,
        _timeout: Option<Duration>,
    ) -> StorageResult<()> {
        self.call("create_page_blob", || {
            self.put_page_blob(container, blob, size, settings)
        })
        .await
    }

    async fn upload_pages(
        &self,
        container: &str,
        blob: &str,
        range: ByteRange,
        body: Bytes,
        _timeout: Option<Duration>,
    ) -> StorageResult<()> {
        self.call("put_page", || {
            self.with_blob(container, blob, |stored| {
                require_type(stored, BlobType::PageBlob)?;
                if range.start > range.end
                    || !is_page_aligned(range.start)
                    || !is_page_aligned(range.end)
                    || range.end > stored.properties.content_length
                {
                    return Err(remote(ErrorCode::InvalidPageRange));
                }
                if body.len() as u64 != range.len() {
                    return Err(remote_msg(
                        ErrorCode::InvalidHeaderValue,
                        format!(
                            "body of {} bytes does not fill range of {} bytes",
                            body.len(),
                            range.len()
                        ),
                    ));
                }
                let (start, end) = (range.start as usize, range.end as usize);
                if stored.data.len() < end {
                    stored.data.resize(end, 0);
                }
                stored.data[start..end].copy_from_slice(&body);
                Ok(())
            })
        })
        .await
    }

    async fn resize_blob(
        &self,
        container: &str,
        blob: &str,
        size: u64,
        _timeout: Option<Duration>,
    ) -> StorageResult<()> {
        self.call("resize_blob", || {
            self.with_blob(container, blob, |stored| {
                require_type(stored, BlobType::PageBlob)?;
                if !is_page_aligned(size) {
                    return Err(remote_msg(
                        ErrorCode::InvalidHeaderValue,
                        format!("page blob size {} is not a multiple of 512", size),
                    ));
                }
                stored.properties.content_length = size;
                stored.data.truncate(size as usize);
                Ok(())
            })
        })
        .await
    }

    async fn set_http_headers(
        &self,
        container: &str,
        blob: &str,
        settings: &ContentSettings,
        _timeout: Option<Duration>,
    ) -> StorageResult<()> {
        self.call("set_blob_properties", || {
            self.with_blob(container, blob, |stored| {
                stored.properties.content_type = settings.content_type.clone();
                stored.properties.cache_control = settings.cache_control.clone();
                stored.properties.content_md5 = settings.content_md5.map(|md5| md5.to_base64());
                Ok(())
            })
        })
        .await
    }

    async fn set_metadata(
        &self,
        container: &str,
        blob: &str,
        metadata: &Metadata,
        _timeout: Option<Duration>,
    ) -> StorageResult<()> {
        self.call("set_blob_metadata", || {
            self.with_blob(container, blob, |stored| {
                stored.properties.metadata = metadata.clone();
                Ok(())
            })
        })
        .await
    }

    async fn download_range(
        &self,
        container: &str,
        blob: &str,
        snapshot: Option<&str>,
        range: ByteRange,
        _timeout: Option<Duration>,
    ) -> StorageResult<Bytes> {
        self.call("get_blob", || {
            let stored = self.stored(container, blob, snapshot)?;
            read_range(&stored, range)
        })
        .await
    }
}
