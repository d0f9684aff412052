//! Common test utilities.

#![allow(dead_code)]

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::TryStreamExt;
use std::sync::Arc;

use blobxfer_rs::{BlobClient, BlobProperties, MemoryClient, StorageEntity, StorageMode, StorageResult};

/// Container created by [`memory_client`].
pub const CONTAINER: &str = "data";

/// Creates an in-memory store holding one empty container.
pub async fn memory_client() -> Arc<MemoryClient> {
    let client = Arc::new(MemoryClient::default());
    client.create_container(CONTAINER, None).await.unwrap();
    client
}

/// Entity for `name` in the test container.
pub fn entity(client: &Arc<MemoryClient>, name: &str, mode: StorageMode) -> StorageEntity {
    StorageEntity::new(client.clone(), CONTAINER, name, mode)
}

/// `len` bytes of a repeating, position dependent pattern.
pub fn pattern(len: usize) -> Bytes {
    (0..len).map(|i| (i % 251) as u8).collect::<Vec<u8>>().into()
}

/// Drains a listing into blob names.
pub async fn names(stream: BoxStream<'_, StorageResult<BlobProperties>>) -> Vec<String> {
    let blobs: Vec<BlobProperties> = stream.try_collect().await.unwrap();
    blobs.into_iter().map(|b| b.name).collect()
}
