//! Remote object identity and chunk offsets.

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use std::sync::Arc;

use super::{split_snapshot, AccessTier, BlobProperties, ByteRange, StorageMode};
use crate::client::BlobClient;
use crate::error::{StorageError, StorageResult};

/// Characters escaped in blob path segments; `/` is kept as a separator.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Escapes a blob name for use in a URL path.
pub fn encode_blob_name(name: &str) -> String {
    utf8_percent_encode(name, PATH_SEGMENT).to_string()
}

/// Default content type for uploaded blobs.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Identity and transfer policy for one remote object.
#[derive(Clone)]
pub struct StorageEntity {
    /// Transport bound to the object's account.
    pub client: Arc<dyn BlobClient>,
    pub container: String,
    /// Blob name; may carry a `?snapshot=` reference.
    pub name: String,
    pub mode: StorageMode,
    pub size: u64,
    pub content_type: String,
    pub cache_control: Option<String>,
    pub access_tier: Option<AccessTier>,
    /// Base64 MD5 recorded on the remote object, if known.
    pub md5: Option<String>,
    pub can_create_containers: bool,
    pub is_arbitrary_url: bool,
    /// Full source URL, only meaningful when `is_arbitrary_url` is set.
    pub path: String,
}

impl std::fmt::Debug for StorageEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEntity")
            .field("account", &self.client.account().name)
            .field("container", &self.container)
            .field("name", &self.name)
            .field("mode", &self.mode)
            .field("size", &self.size)
            .field("is_arbitrary_url", &self.is_arbitrary_url)
            .finish()
    }
}

impl StorageEntity {
    pub fn new(
        client: Arc<dyn BlobClient>,
        container: impl Into<String>,
        name: impl Into<String>,
        mode: StorageMode,
    ) -> Self {
        let can_create_containers = client.account().can_create_containers();
        Self {
            client,
            container: container.into(),
            name: name.into(),
            mode,
            size: 0,
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            cache_control: None,
            access_tier: None,
            md5: None,
            can_create_containers,
            is_arbitrary_url: false,
            path: String::new(),
        }
    }

    /// A source that is addressed by a caller-supplied URL.
    pub fn from_url(client: Arc<dyn BlobClient>, url: impl Into<String>, mode: StorageMode) -> Self {
        let mut entity = Self::new(client, String::new(), String::new(), mode);
        entity.is_arbitrary_url = true;
        entity.can_create_containers = false;
        entity.path = url.into();
        entity
    }

    pub fn size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn cache_control(mut self, cache_control: impl Into<String>) -> Self {
        self.cache_control = Some(cache_control.into());
        self
    }

    pub fn access_tier(mut self, tier: AccessTier) -> Self {
        self.access_tier = Some(tier);
        self
    }

    pub fn can_create_containers(mut self, allowed: bool) -> Self {
        self.can_create_containers = allowed;
        self
    }

    /// Copies size and content properties from a fetched or listed blob.
    pub fn populate_from_blob(&mut self, props: &BlobProperties) {
        self.name = match &props.snapshot {
            Some(snapshot) => format!("{}?snapshot={}", props.name, snapshot),
            None => props.name.clone(),
        };
        self.size = props.content_length;
        if let Some(ct) = &props.content_type {
            self.content_type = ct.clone();
        }
        self.cache_control = props.cache_control.clone();
        self.access_tier = props.access_tier;
        self.md5 = props.content_md5.clone();
    }

    /// Base name and snapshot token of `name`.
    pub fn blob_name(&self) -> (String, Option<String>) {
        split_snapshot(&self.name)
    }

    /// `{container}/{name}` with the snapshot stripped and segments escaped.
    pub fn remote_path(&self) -> String {
        let (name, _) = self.blob_name();
        format!("{}/{}", self.container, encode_blob_name(&name))
    }

    /// URL of the object on its account's primary endpoint, without credentials.
    pub fn url(&self) -> String {
        if self.is_arbitrary_url {
            return self.path.clone();
        }
        let base = self.client.account().service_url(self.mode);
        let mut url = format!("{}/{}", base, self.remote_path());
        if let (_, Some(snapshot)) = self.blob_name() {
            url.push_str("?snapshot=");
            url.push_str(&snapshot);
        }
        url
    }
}

/// One chunk's position within a transfer.
///
/// Ranges are half-open: the chunk covers `[range_start, range_end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Offsets {
    pub chunk_num: u64,
    pub range_start: u64,
    pub range_end: u64,
}

impl Offsets {
    pub fn new(chunk_num: u64, range_start: u64, range_end: u64) -> StorageResult<Self> {
        if range_end < range_start {
            return Err(StorageError::invalid_input(format!(
                "chunk {} range end {} precedes start {}",
                chunk_num, range_end, range_start
            )));
        }
        Ok(Self {
            chunk_num,
            range_start,
            range_end,
        })
    }

    /// Number of bytes in the chunk.
    pub fn len(&self) -> u64 {
        self.range_end - self.range_start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn range(&self) -> ByteRange {
        ByteRange::new(self.range_start, self.range_end)
    }
}
