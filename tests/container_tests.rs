//! Container provisioning tests.

use std::sync::Arc;

use blobxfer_rs::operations::{ensure_container, ContainerRegistry};
use blobxfer_rs::{
    BlobClient, ErrorCode, MemoryClient, RemoteError, StorageAccount, StorageEntity, StorageMode,
};

fn container_entity(client: &Arc<MemoryClient>, container: &str) -> StorageEntity {
    StorageEntity::new(client.clone(), container, "blob.bin", StorageMode::Block)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_ensure_issues_one_create() {
    let client = Arc::new(MemoryClient::default());
    let registry = Arc::new(ContainerRegistry::new());

    let mut handles = Vec::new();
    for _ in 0..16 {
        let entity = container_entity(&client, "shared");
        let registry = registry.clone();
        handles.push(tokio::spawn(async move {
            ensure_container(&entity, &registry, None).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(client.create_container_calls(), 1);
    assert!(client.contains_container("shared"));
    assert_eq!(registry.len(), 1);
    let key = ContainerRegistry::key(client.account(), StorageMode::Block, "shared");
    assert!(registry.contains(&key));
}

#[tokio::test]
async fn test_repeated_ensure_is_memoized() {
    let client = Arc::new(MemoryClient::default());
    let registry = ContainerRegistry::new();
    let entity = container_entity(&client, "once");

    for _ in 0..3 {
        ensure_container(&entity, &registry, None).await.unwrap();
    }
    assert_eq!(client.create_container_calls(), 1);
}

#[tokio::test]
async fn test_existing_container_counts_as_ensured() {
    let client = Arc::new(MemoryClient::default());
    client.create_container("existing", None).await.unwrap();
    let registry = ContainerRegistry::new();
    let entity = container_entity(&client, "existing");

    ensure_container(&entity, &registry, None).await.unwrap();
    ensure_container(&entity, &registry, None).await.unwrap();

    assert_eq!(client.create_container_calls(), 2);
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn test_failed_create_is_still_recorded() {
    let client = Arc::new(MemoryClient::default());
    let registry = ContainerRegistry::new();
    let entity = container_entity(&client, "flaky");

    client.fail_next(RemoteError::new(ErrorCode::AuthorizationFailure).into());
    let err = ensure_container(&entity, &registry, None).await.unwrap_err();
    assert_eq!(
        err.remote().map(|e| e.code.clone()),
        Some(ErrorCode::AuthorizationFailure)
    );
    assert_eq!(registry.len(), 1);
    assert!(registry.contains("devstoreaccount1:blob=flaky"));

    ensure_container(&entity, &registry, None).await.unwrap();
    assert_eq!(client.call_count("create_container"), 1);
    assert!(!client.contains_container("flaky"));
}

#[tokio::test]
async fn test_without_create_permission_is_noop() {
    let account = StorageAccount::with_sas("acct", "sv=2021-10-04&ss=b&srt=o&sp=rw&sig=abc");
    let client = Arc::new(MemoryClient::new(account));
    let registry = ContainerRegistry::new();
    let entity = container_entity(&client, "data");
    assert!(!entity.can_create_containers);

    ensure_container(&entity, &registry, None).await.unwrap();
    assert_eq!(client.create_container_calls(), 0);
    assert!(client.calls().is_empty());
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_sas_with_container_scope_may_create() {
    let account = StorageAccount::with_sas("acct", "?sv=2021-10-04&ss=b&srt=sco&sp=rwc&sig=abc");
    let client = Arc::new(MemoryClient::new(account));
    let registry = ContainerRegistry::new();

    ensure_container(&container_entity(&client, "data"), &registry, None)
        .await
        .unwrap();
    assert_eq!(client.create_container_calls(), 1);
    assert!(registry.contains("acct:blob=data"));
}

#[tokio::test]
async fn test_registry_keys_per_container() {
    let client = Arc::new(MemoryClient::default());
    let registry = ContainerRegistry::new();

    ensure_container(&container_entity(&client, "one"), &registry, None)
        .await
        .unwrap();
    ensure_container(&container_entity(&client, "two"), &registry, None)
        .await
        .unwrap();

    assert_eq!(registry.len(), 2);
    assert!(registry.contains("devstoreaccount1:blob=one"));
    assert!(registry.contains("devstoreaccount1:blob=two"));
}

#[tokio::test]
async fn test_file_mode_is_rejected() {
    let client = Arc::new(MemoryClient::default());
    let mut entity = container_entity(&client, "share");
    entity.mode = StorageMode::File;

    assert!(ensure_container(&entity, &ContainerRegistry::new(), None)
        .await
        .is_err());
    assert_eq!(client.create_container_calls(), 0);
}
