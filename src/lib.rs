//! blobxfer-rs: chunked transfers to and from Azure Blob Storage.
//!
//! The engines in [`operations`] write and read one blob per call, one chunk
//! at a time, in the block, append or page protocol. They drive a
//! [`BlobClient`]; [`RestClient`] talks to Azure or a local emulator and
//! [`MemoryClient`] keeps everything in process.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use blobxfer_rs::operations::{block_blob, ensure_container, ContainerRegistry};
//! use blobxfer_rs::{Config, Offsets, RestClient, StorageEntity, StorageMode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let client = Arc::new(RestClient::new(config.storage_account()?, config.retry_policy())?);
//!     let entity = StorageEntity::new(client, "data", "hello.txt", StorageMode::Block);
//!
//!     ensure_container(&entity, &ContainerRegistry::new(), None).await?;
//!     let offsets = Offsets::new(0, 0, 5)?;
//!     block_blob::put_block(&entity, &offsets, Some("hello".into()), None).await?;
//!     block_blob::put_block_list(&entity, 0, None, None, None).await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod operations;
pub mod retry;
pub mod xml;

// Re-exports for convenience
pub use client::{BlobClient, MemoryClient, RestClient};
pub use config::{Args, Command, Config, DEFAULT_ACCOUNT, DEFAULT_ACCOUNT_KEY, DEFAULT_BLOB_ENDPOINT};
pub use error::{ErrorCode, RemoteError, StorageError, StorageResult};
pub use models::{
    AccessTier, BlobProperties, BlobType, BlockId, ContentMd5, Metadata, Offsets, StorageAccount,
    StorageEntity, StorageMode,
};
pub use operations::{chunk_writer_for, ChunkWriter, ContainerRegistry};
pub use retry::ExponentialRetryWithMaxWait;
