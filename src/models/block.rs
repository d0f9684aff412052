//! Block identifiers and block lists for block blobs.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{StorageError, StorageResult};

/// Largest chunk number representable by an 8-digit block id.
pub const MAX_BLOCK_NUM: u64 = 99_999_999;

/// Block id derived from a chunk number.
///
/// The logical id is exactly 8 zero-padded decimal digits. On the wire the
/// service expects ids base64 encoded, see [`BlockId::encoded`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(u32);

impl BlockId {
    pub fn new(chunk_num: u64) -> StorageResult<Self> {
        if chunk_num > MAX_BLOCK_NUM {
            return Err(StorageError::invalid_input(format!(
                "chunk number {} exceeds maximum block id {}",
                chunk_num, MAX_BLOCK_NUM
            )));
        }
        Ok(Self(chunk_num as u32))
    }

    pub fn chunk_num(&self) -> u64 {
        self.0 as u64
    }

    /// Base64 form sent in `blockid` query parameters and block list bodies.
    pub fn encoded(&self) -> String {
        BASE64.encode(self.to_string())
    }

    /// Parses either the 8-digit form or its base64 encoding.
    pub fn parse(s: &str) -> Option<Self> {
        if s.len() == 8 && s.bytes().all(|b| b.is_ascii_digit()) {
            return s.parse::<u32>().ok().map(Self);
        }
        let decoded = BASE64.decode(s).ok()?;
        let text = String::from_utf8(decoded).ok()?;
        if text.len() == 8 && text.bytes().all(|b| b.is_ascii_digit()) {
            return text.parse::<u32>().ok().map(Self);
        }
        None
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08}", self.0)
    }
}

/// Formats the block id for a chunk number.
pub fn format_block_id(chunk_num: u64) -> StorageResult<String> {
    BlockId::new(chunk_num).map(|id| id.to_string())
}

/// Builds the ordered id list `0..=last_chunk_num`.
pub fn block_ids_through(last_chunk_num: u64) -> StorageResult<Vec<BlockId>> {
    BlockId::new(last_chunk_num)?;
    (0..=last_chunk_num).map(BlockId::new).collect()
}

/// Block list type for GetBlockList operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockListType {
    #[default]
    Committed,
    Uncommitted,
    All,
}

impl BlockListType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockListType::Committed => "committed",
            BlockListType::Uncommitted => "uncommitted",
            BlockListType::All => "all",
        }
    }
}

/// Block entry in a block list response.
///
/// `name` is the id as reported by the service, decoded from base64 when it
/// decodes to text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub name: String,
    pub size: u64,
}

impl Block {
    /// The chunk number, when the name is an 8-digit block id.
    pub fn block_id(&self) -> Option<BlockId> {
        BlockId::parse(&self.name)
    }
}

/// Parsed GetBlockList response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockList {
    pub committed: Vec<Block>,
    pub uncommitted: Vec<Block>,
}
