//! Container provisioning with a process-wide memo of ensured containers.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::error::StorageResult;
use crate::models::{StorageAccount, StorageEntity, StorageMode};

/// Containers already known to exist, keyed by account, service and name.
///
/// Concurrent callers for one key share a single create call. The key is
/// recorded once that call settles, whatever its outcome, so a container is
/// never created twice in one process.
#[derive(Debug, Default)]
pub struct ContainerRegistry {
    entries: DashMap<String, Arc<OnceCell<()>>>,
}

impl ContainerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `{account}:{service}={container}`
    pub fn key(account: &StorageAccount, mode: StorageMode, container: &str) -> String {
        format!("{}:{}={}", account.name, mode.service(), container)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .map(|cell| cell.initialized())
            .unwrap_or(false)
    }

    /// Number of ensured containers.
    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.value().initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn cell(&self, key: &str) -> Arc<OnceCell<()>> {
        self.entries.entry(key.to_string()).or_default().clone()
    }
}

/// Creates the entity's container unless it is already known to exist.
///
/// Does nothing when the entity's credentials cannot create containers.
/// A container that already exists remotely counts as created. A failed
/// create is returned to the caller that issued it, but the key is still
/// recorded and later calls return without a network round trip.
pub async fn ensure_container(
    entity: &StorageEntity,
    registry: &ContainerRegistry,
    timeout: Option<Duration>,
) -> StorageResult<()> {
    if !entity.can_create_containers {
        return Ok(());
    }
    entity.mode.ensure_blob("create blob containers")?;

    let account = entity.client.account();
    let key = ContainerRegistry::key(account, entity.mode, &entity.container);
    if registry.contains(&key) {
        return Ok(());
    }

    let cell = registry.cell(&key);
    let mut failure = None;
    let slot = &mut failure;
    cell.get_or_init(|| async move {
        match entity
            .client
            .create_container(&entity.container, timeout)
            .await
        {
            Ok(()) => info!(
                "created blob container {} on storage account {}",
                entity.container, account.name
            ),
            Err(e) if e.is_already_exists() => debug!(
                "blob container {} already exists on storage account {}",
                entity.container, account.name
            ),
            Err(e) => {
                warn!(
                    "failed to create blob container {} on storage account {}: {}",
                    entity.container, account.name, e
                );
                *slot = Some(e);
            }
        }
    })
    .await;

    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
