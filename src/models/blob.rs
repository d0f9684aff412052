//! Blob properties and content settings.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{AccessTier, BlobType};
use crate::error::{StorageError, StorageResult};

/// User-defined metadata. Key order carries no meaning.
pub type Metadata = HashMap<String, String>;

/// 16-byte MD5 digest attached to a blob at create or commit time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentMd5([u8; 16]);

impl ContentMd5 {
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Decodes the base64 form carried in `Content-MD5` headers.
    pub fn from_base64(s: &str) -> StorageResult<Self> {
        let bytes = BASE64
            .decode(s)
            .map_err(|e| StorageError::invalid_input(format!("invalid md5 encoding: {}", e)))?;
        let digest: [u8; 16] = bytes.try_into().map_err(|v: Vec<u8>| {
            StorageError::invalid_input(format!("md5 digest must be 16 bytes, got {}", v.len()))
        })?;
        Ok(Self(digest))
    }

    /// Digest of `data`.
    pub fn of(data: &[u8]) -> Self {
        Self(Md5::digest(data).into())
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(self.0)
    }
}

/// HTTP content headers stored with a blob.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentSettings {
    pub content_type: Option<String>,
    pub cache_control: Option<String>,
    pub content_md5: Option<ContentMd5>,
}

/// Properties of one remote blob, from a property fetch or a listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlobProperties {
    /// Blob name (without snapshot parameter).
    pub name: String,
    /// Snapshot timestamp when the entry refers to a snapshot.
    pub snapshot: Option<String>,
    pub blob_type: BlobType,
    pub content_length: u64,
    pub content_type: Option<String>,
    /// Base64 encoded MD5, as reported by the service.
    pub content_md5: Option<String>,
    pub cache_control: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub access_tier: Option<AccessTier>,
    pub metadata: Metadata,
}

impl BlobProperties {
    pub fn new(name: impl Into<String>, blob_type: BlobType, content_length: u64) -> Self {
        Self {
            name: name.into(),
            snapshot: None,
            blob_type,
            content_length,
            content_type: None,
            content_md5: None,
            cache_control: None,
            etag: None,
            last_modified: None,
            access_tier: None,
            metadata: Metadata::new(),
        }
    }
}

/// One page of a blob listing.
#[derive(Debug, Clone, Default)]
pub struct BlobListSegment {
    pub items: Vec<BlobProperties>,
    /// Continuation token; `None` on the last page.
    pub next_marker: Option<String>,
}
