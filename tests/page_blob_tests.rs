//! Page blob engine tests.

mod common;

use bytes::Bytes;
use common::{entity, memory_client, pattern, CONTAINER};

use blobxfer_rs::operations::{self, page_blob};
use blobxfer_rs::{
    chunk_writer_for, BlobType, ContentMd5, ErrorCode, Offsets, StorageError, StorageMode,
};

async fn content_length(client: &blobxfer_rs::MemoryClient, name: &str) -> u64 {
    operations::get_blob_properties(client, CONTAINER, name, StorageMode::Page, None)
        .await
        .unwrap()
        .unwrap()
        .content_length
}

#[tokio::test]
async fn test_create_rounds_size_up() {
    let client = memory_client().await;
    let e = entity(&client, "disk.vhd", StorageMode::Page)
        .size(1000)
        .content_type("application/x-vhd");
    page_blob::create_blob(&e, None).await.unwrap();

    let props = operations::get_blob_properties(&*client, CONTAINER, "disk.vhd", StorageMode::Page, None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(props.blob_type, BlobType::PageBlob);
    assert_eq!(props.content_length, 1024);
    assert_eq!(props.content_type.as_deref(), Some("application/x-vhd"));
}

#[tokio::test]
async fn test_create_keeps_aligned_size() {
    let client = memory_client().await;
    let e = entity(&client, "aligned.vhd", StorageMode::Page).size(2048);
    page_blob::create_blob(&e, None).await.unwrap();
    assert_eq!(content_length(&client, "aligned.vhd").await, 2048);
}

#[tokio::test]
async fn test_resize_rounds_size_up() {
    let client = memory_client().await;
    let e = entity(&client, "grow.vhd", StorageMode::Page).size(512);
    page_blob::create_blob(&e, None).await.unwrap();

    page_blob::resize_blob(&e, 1000, None).await.unwrap();
    assert_eq!(content_length(&client, "grow.vhd").await, 1024);

    page_blob::resize_blob(&e, 1500, None).await.unwrap();
    assert_eq!(content_length(&client, "grow.vhd").await, 1536);
}

#[tokio::test]
async fn test_resize_requires_page_blob() {
    let client = memory_client().await;
    let append = entity(&client, "log.txt", StorageMode::Append);
    operations::append_blob::create_blob(&append, None).await.unwrap();

    let page = entity(&client, "log.txt", StorageMode::Page);
    let err = page_blob::resize_blob(&page, 1024, None).await.unwrap_err();
    assert_eq!(err.remote().map(|e| e.code.clone()), Some(ErrorCode::InvalidBlobType));
}

#[tokio::test]
async fn test_pages_written_out_of_order() {
    let client = memory_client().await;
    let data = pattern(1536);
    let e = entity(&client, "random.vhd", StorageMode::Page).size(1536);
    page_blob::create_blob(&e, None).await.unwrap();

    for start in [1024u64, 0, 512] {
        let chunk = data.slice(start as usize..(start + 512) as usize);
        page_blob::put_page(&e, start, start + 512, Some(chunk), None)
            .await
            .unwrap();
    }

    let body = operations::get_blob_range(&e, &Offsets::new(0, 0, 1536).unwrap(), None)
        .await
        .unwrap();
    assert_eq!(body, data);
}

#[tokio::test]
async fn test_short_page_data_is_zero_filled() {
    let client = memory_client().await;
    let e = entity(&client, "tail.vhd", StorageMode::Page).size(1024);
    page_blob::create_blob(&e, None).await.unwrap();

    page_blob::put_page(&e, 512, 1024, Some(Bytes::from(vec![9u8; 100])), None)
        .await
        .unwrap();
    page_blob::put_page(&e, 0, 512, None, None).await.unwrap();

    let body = operations::get_blob_range(&e, &Offsets::new(0, 0, 1024).unwrap(), None)
        .await
        .unwrap();
    assert!(body[..512].iter().all(|b| *b == 0));
    assert!(body[512..612].iter().all(|b| *b == 9));
    assert!(body[612..].iter().all(|b| *b == 0));
}

#[tokio::test]
async fn test_page_range_past_end_fails() {
    let client = memory_client().await;
    let e = entity(&client, "small.vhd", StorageMode::Page).size(512);
    page_blob::create_blob(&e, None).await.unwrap();

    let err = page_blob::put_page(&e, 512, 1024, Some(Bytes::from(vec![1u8; 512])), None)
        .await
        .unwrap_err();
    assert_eq!(err.remote().map(|e| e.code.clone()), Some(ErrorCode::InvalidPageRange));
}

#[tokio::test]
async fn test_inverted_page_range_fails() {
    let client = memory_client().await;
    let e = entity(&client, "backwards.vhd", StorageMode::Page).size(1024);
    page_blob::create_blob(&e, None).await.unwrap();

    let err = page_blob::put_page(&e, 1024, 512, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::InvalidInput(_)));
    assert_eq!(client.call_count("put_page"), 0);
}

#[tokio::test]
async fn test_page_writer_pads_last_chunk() {
    let client = memory_client().await;
    let data = pattern(1000);
    let e = entity(&client, "image.vhd", StorageMode::Page).size(1000);

    let writer = chunk_writer_for(StorageMode::Page).unwrap();
    writer.prepare(&e, None).await.unwrap();
    let chunks = [(0u64, 0u64, 512u64), (1, 512, 1000)];
    for (chunk_num, start, end) in chunks {
        let offsets = Offsets::new(chunk_num, start, end).unwrap();
        writer
            .write_chunk(&e, &offsets, Some(data.slice(start as usize..end as usize)), None)
            .await
            .unwrap();
    }
    let md5 = ContentMd5::of(&data);
    writer.finalize(&e, 1, Some(md5), None, None).await.unwrap();

    let props = operations::get_blob_properties(&*client, CONTAINER, "image.vhd", StorageMode::Page, None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(props.content_length, 1024);
    assert_eq!(props.content_md5, Some(md5.to_base64()));

    let body = operations::get_blob_range(&e, &Offsets::new(0, 0, 1024).unwrap(), None)
        .await
        .unwrap();
    assert_eq!(&body[..1000], &data[..]);
    assert!(body[1000..].iter().all(|b| *b == 0));
}
