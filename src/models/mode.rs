//! Storage modes and remote blob types.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{StorageError, StorageResult};

/// Blob types supported by Azure Blob Storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlobType {
    BlockBlob,
    PageBlob,
    AppendBlob,
}

impl BlobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlobType::BlockBlob => "BlockBlob",
            BlobType::PageBlob => "PageBlob",
            BlobType::AppendBlob => "AppendBlob",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "BlockBlob" => Some(BlobType::BlockBlob),
            "PageBlob" => Some(BlobType::PageBlob),
            "AppendBlob" => Some(BlobType::AppendBlob),
            _ => None,
        }
    }
}

impl fmt::Display for BlobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The protocol a transfer is requested in.
///
/// `Auto` accepts whatever blob type exists remotely. `File` names the file
/// share flavor of the account, which the blob engines do not speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum StorageMode {
    #[default]
    Auto,
    Append,
    Block,
    File,
    Page,
}

impl StorageMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageMode::Auto => "Auto",
            StorageMode::Append => "Append",
            StorageMode::Block => "Block",
            StorageMode::File => "File",
            StorageMode::Page => "Page",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "auto" => Some(StorageMode::Auto),
            "append" => Some(StorageMode::Append),
            "block" => Some(StorageMode::Block),
            "file" => Some(StorageMode::File),
            "page" => Some(StorageMode::Page),
            _ => None,
        }
    }

    /// The blob type this mode pins, if any.
    pub fn blob_type(&self) -> Option<BlobType> {
        match self {
            StorageMode::Append => Some(BlobType::AppendBlob),
            StorageMode::Block => Some(BlobType::BlockBlob),
            StorageMode::Page => Some(BlobType::PageBlob),
            StorageMode::Auto | StorageMode::File => None,
        }
    }

    /// Whether a remote object of `blob_type` is acceptable under this mode.
    pub fn accepts(&self, blob_type: BlobType) -> bool {
        match self.blob_type() {
            Some(expected) => expected == blob_type,
            None => *self == StorageMode::Auto,
        }
    }

    /// Fails with `UnsupportedMode` for the file share flavor.
    pub fn ensure_blob(&self, operation: &'static str) -> StorageResult<()> {
        if *self == StorageMode::File {
            return Err(StorageError::UnsupportedMode {
                mode: *self,
                operation,
            });
        }
        Ok(())
    }

    /// Fails with `TypeMismatch` unless `actual` is acceptable.
    pub fn check_blob_type(&self, actual: BlobType) -> StorageResult<()> {
        if !self.accepts(actual) {
            return Err(StorageError::TypeMismatch {
                requested: *self,
                actual,
            });
        }
        Ok(())
    }

    /// Service flavor used in container registry keys.
    pub fn service(&self) -> &'static str {
        match self {
            StorageMode::File => "file",
            _ => "blob",
        }
    }
}

impl fmt::Display for StorageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Access tiers for blobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessTier {
    Hot,
    Cool,
    Cold,
    Archive,
}

impl AccessTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessTier::Hot => "Hot",
            AccessTier::Cool => "Cool",
            AccessTier::Cold => "Cold",
            AccessTier::Archive => "Archive",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "hot" => Some(AccessTier::Hot),
            "cool" => Some(AccessTier::Cool),
            "cold" => Some(AccessTier::Cold),
            "archive" => Some(AccessTier::Archive),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_accepts() {
        assert!(StorageMode::Block.accepts(BlobType::BlockBlob));
        assert!(!StorageMode::Block.accepts(BlobType::AppendBlob));
        assert!(StorageMode::Append.accepts(BlobType::AppendBlob));
        assert!(StorageMode::Page.accepts(BlobType::PageBlob));
        assert!(StorageMode::Auto.accepts(BlobType::PageBlob));
        assert!(!StorageMode::File.accepts(BlobType::BlockBlob));
    }

    #[test]
    fn test_file_mode_rejected() {
        let err = StorageMode::File.ensure_blob("list blobs").unwrap_err();
        assert!(matches!(err, StorageError::UnsupportedMode { .. }));
        assert!(err.to_string().contains("File"));
        assert!(StorageMode::Auto.ensure_blob("list blobs").is_ok());
    }

    #[test]
    fn test_check_blob_type() {
        let err = StorageMode::Block.check_blob_type(BlobType::PageBlob).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Page"));
        assert!(msg.contains("Block"));
        assert!(StorageMode::Auto.check_blob_type(BlobType::AppendBlob).is_ok());
    }

    #[test]
    fn test_parse_names() {
        assert_eq!(StorageMode::from_str("PAGE"), Some(StorageMode::Page));
        assert_eq!(StorageMode::from_str("tape"), None);
        assert_eq!(BlobType::from_str("AppendBlob"), Some(BlobType::AppendBlob));
        assert_eq!(AccessTier::from_str("cool"), Some(AccessTier::Cool));
    }
}
