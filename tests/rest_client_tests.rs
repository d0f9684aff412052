//! Wire format tests for the REST transport against an in-process mock.

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Method, Response, StatusCode, Uri};
use axum::Router;
use bytes::Bytes;
use futures::TryStreamExt;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use blobxfer_rs::models::{ByteRange, Offsets};
use blobxfer_rs::operations::{self, block_blob, ensure_container, page_blob, ContainerRegistry};
use blobxfer_rs::{
    BlobClient, BlobType, ContentMd5, ErrorCode, ExponentialRetryWithMaxWait, Metadata, RestClient,
    StorageAccount, StorageEntity, StorageError, StorageMode, DEFAULT_ACCOUNT, DEFAULT_ACCOUNT_KEY,
};

/// One request as the mock saw it.
#[derive(Debug, Clone)]
struct Recorded {
    method: String,
    path: String,
    query: HashMap<String, String>,
    headers: HashMap<String, String>,
    body: Bytes,
}

impl Recorded {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    fn param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }
}

#[derive(Clone, Default)]
struct Mock {
    requests: Arc<Mutex<Vec<Recorded>>>,
    containers: Arc<Mutex<HashSet<String>>>,
    busy_responses: Arc<AtomicUsize>,
}

const LIST_PAGE_1: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<EnumerationResults ContainerName="data">
  <Blobs>
    <Blob><Name>a.bin</Name><Properties><Content-Length>1</Content-Length><BlobType>BlockBlob</BlobType></Properties></Blob>
    <Blob><Name>b.log</Name><Properties><Content-Length>2</Content-Length><BlobType>AppendBlob</BlobType></Properties></Blob>
  </Blobs>
  <NextMarker>2!page2</NextMarker>
</EnumerationResults>"#;

const LIST_PAGE_2: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<EnumerationResults ContainerName="data">
  <Blobs>
    <Blob><Name>c.bin</Name><Properties><Content-Length>3</Content-Length><BlobType>BlockBlob</BlobType></Properties></Blob>
    <Blob><Name>dir/d.bin</Name><Properties><Content-Length>4</Content-Length><BlobType>BlockBlob</BlobType></Properties></Blob>
  </Blobs>
  <NextMarker />
</EnumerationResults>"#;

const BLOCK_LIST: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<BlockList>
  <CommittedBlocks>
    <Block><Name>MDAwMDAwMDA=</Name><Size>512</Size></Block>
    <Block><Name>MDAwMDAwMDE=</Name><Size>488</Size></Block>
  </CommittedBlocks>
</BlockList>"#;

const CONTENT: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

fn respond(status: StatusCode, headers: &[(&str, &str)], body: impl Into<Body>) -> Response<Body> {
    let mut builder = Response::builder().status(status);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(body.into()).unwrap()
}

fn error_response(status: StatusCode, code: &str) -> Response<Body> {
    respond(status, &[("x-ms-error-code", code), ("x-ms-request-id", "req-1")], Body::empty())
}

async fn handle(
    State(mock): State<Mock>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response<Body> {
    let query: HashMap<String, String> = url::form_urlencoded::parse(uri.query().unwrap_or("").as_bytes())
        .into_owned()
        .collect();
    let recorded = Recorded {
        method: method.to_string(),
        path: uri.path().to_string(),
        query: query.clone(),
        headers: headers
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect(),
        body,
    };
    mock.requests.lock().push(recorded.clone());

    let path = uri.path();
    let restype = query.get("restype").map(String::as_str);
    let comp = query.get("comp").map(String::as_str);
    match (method.as_str(), restype, comp) {
        ("PUT", Some("container"), None) => {
            if mock.containers.lock().insert(path.to_string()) {
                respond(StatusCode::CREATED, &[], Body::empty())
            } else {
                error_response(StatusCode::CONFLICT, "ContainerAlreadyExists")
            }
        }
        ("GET", Some("container"), Some("list")) => match query.get("marker").map(String::as_str) {
            None => respond(StatusCode::OK, &[("content-type", "application/xml")], LIST_PAGE_1),
            Some("2!page2") => respond(StatusCode::OK, &[("content-type", "application/xml")], LIST_PAGE_2),
            Some(_) => error_response(StatusCode::BAD_REQUEST, "OutOfRangeInput"),
        },
        ("HEAD", None, None) => {
            if path.ends_with("/missing.bin") {
                error_response(StatusCode::NOT_FOUND, "BlobNotFound")
            } else {
                respond(
                    StatusCode::OK,
                    &[
                        ("x-ms-blob-type", "PageBlob"),
                        ("content-type", "application/x-vhd"),
                        ("x-ms-meta-owner", "ops"),
                        ("etag", "\"0x1\""),
                    ],
                    Body::empty(),
                )
            }
        }
        ("GET", None, Some("blocklist")) => {
            respond(StatusCode::OK, &[("content-type", "application/xml")], BLOCK_LIST)
        }
        ("GET", None, None) => {
            let range = recorded
                .header("x-ms-range")
                .and_then(ByteRange::from_header)
                .unwrap_or(ByteRange::new(0, CONTENT.len() as u64));
            let slice = &CONTENT[range.start as usize..range.end as usize];
            respond(StatusCode::PARTIAL_CONTENT, &[], Bytes::copy_from_slice(slice))
        }
        ("PUT", None, Some("tier")) => respond(
            StatusCode::FORBIDDEN,
            &[],
            r#"<?xml version="1.0" encoding="utf-8"?><Error><Code>AuthorizationPermissionMismatch</Code><Message>This request is not authorized to perform this operation using this permission.</Message></Error>"#,
        ),
        ("PUT", None, Some("appendblock")) => {
            if mock.busy_responses.load(Ordering::SeqCst) > 0 {
                mock.busy_responses.fetch_sub(1, Ordering::SeqCst);
                error_response(StatusCode::SERVICE_UNAVAILABLE, "ServerBusy")
            } else {
                respond(StatusCode::CREATED, &[], Body::empty())
            }
        }
        ("PUT", _, _) => respond(StatusCode::CREATED, &[], Body::empty()),
        ("DELETE", None, None) => respond(StatusCode::ACCEPTED, &[], Body::empty()),
        _ => error_response(StatusCode::BAD_REQUEST, "UnsupportedHttpVerb"),
    }
}

struct MockServer {
    mock: Mock,
    endpoint: String,
}

impl MockServer {
    async fn start() -> Self {
        let mock = Mock::default();
        let app = Router::new().fallback(handle).with_state(mock.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            mock,
            endpoint: format!("http://{}/{}", addr, DEFAULT_ACCOUNT),
        }
    }

    fn client(&self) -> Arc<RestClient> {
        let account = StorageAccount::with_key(DEFAULT_ACCOUNT, DEFAULT_ACCOUNT_KEY)
            .blob_endpoint(&self.endpoint)
            .unwrap();
        let retry = ExponentialRetryWithMaxWait::new(Some(3))
            .with_backoff(Duration::from_millis(1), Duration::from_millis(10));
        Arc::new(RestClient::new(account, retry).unwrap())
    }

    fn requests(&self) -> Vec<Recorded> {
        self.mock.requests.lock().clone()
    }

    fn last(&self) -> Recorded {
        self.requests().pop().unwrap()
    }
}

#[tokio::test]
async fn test_put_block_wire_format() {
    let server = MockServer::start().await;
    let client = server.client();
    let e = StorageEntity::new(client, "data", "dir/a b.bin", StorageMode::Block);

    let offsets = Offsets::new(3, 1536, 2048).unwrap();
    block_blob::put_block(&e, &offsets, Some(Bytes::from_static(b"chunk")), Some(Duration::from_secs(30)))
        .await
        .unwrap();

    let req = server.last();
    assert_eq!(req.method, "PUT");
    assert_eq!(req.path, "/devstoreaccount1/data/dir/a%20b.bin");
    assert_eq!(req.param("comp"), Some("block"));
    assert_eq!(req.param("blockid"), Some("MDAwMDAwMDM="));
    assert_eq!(req.param("timeout"), Some("30"));
    assert_eq!(req.header("x-ms-version"), Some("2021-10-04"));
    assert!(req.header("x-ms-date").is_some());
    assert!(req.header("x-ms-client-request-id").is_some());
    assert!(req
        .header("authorization")
        .unwrap()
        .starts_with("SharedKey devstoreaccount1:"));
    assert_eq!(req.header("content-length"), Some("5"));
    assert_eq!(&req.body[..], b"chunk");
}

#[tokio::test]
async fn test_put_block_list_wire_format() {
    let server = MockServer::start().await;
    let client = server.client();
    let e = StorageEntity::new(client, "data", "big.bin", StorageMode::Block)
        .content_type("application/zip")
        .cache_control("no-cache");

    let mut metadata = Metadata::new();
    metadata.insert("owner".to_string(), "ops".to_string());
    let md5 = ContentMd5::of(b"payload");
    block_blob::put_block_list(&e, 1, Some(md5), Some(&metadata), None)
        .await
        .unwrap();

    let req = server.last();
    assert_eq!(req.param("comp"), Some("blocklist"));
    assert_eq!(
        String::from_utf8(req.body.to_vec()).unwrap(),
        r#"<?xml version="1.0" encoding="utf-8"?><BlockList><Latest>MDAwMDAwMDA=</Latest><Latest>MDAwMDAwMDE=</Latest></BlockList>"#
    );
    assert_eq!(req.header("x-ms-blob-content-type"), Some("application/zip"));
    assert_eq!(req.header("x-ms-blob-cache-control"), Some("no-cache"));
    assert_eq!(req.header("x-ms-blob-content-md5"), Some(md5.to_base64().as_str()));
    assert_eq!(req.header("x-ms-meta-owner"), Some("ops"));
}

#[tokio::test]
async fn test_put_block_from_url_wire_format() {
    let server = MockServer::start().await;
    let client = server.client();
    let src = StorageEntity::new(client.clone(), "src", "source.bin", StorageMode::Block);
    let dst = StorageEntity::new(client, "data", "copy.bin", StorageMode::Block);

    let offsets = Offsets::new(0, 0, 512).unwrap();
    block_blob::put_block_from_url(&src, &dst, &offsets, None)
        .await
        .unwrap();

    let req = server.last();
    assert_eq!(req.path, "/devstoreaccount1/data/copy.bin");
    assert_eq!(req.param("blockid"), Some("MDAwMDAwMDA="));
    assert_eq!(req.header("x-ms-source-range"), Some("bytes=0-511"));
    let source = req.header("x-ms-copy-source").unwrap();
    assert!(source.starts_with(&format!("{}/src/source.bin?", server.endpoint)));
    assert!(source.contains("sp=r"));
    assert!(source.contains("sig="));
    assert!(req.body.is_empty());
}

#[tokio::test]
async fn test_ensure_container_tolerates_conflict() {
    let server = MockServer::start().await;
    let client = server.client();
    let e = StorageEntity::new(client, "data", "x.bin", StorageMode::Block);

    ensure_container(&e, &ContainerRegistry::new(), None).await.unwrap();
    ensure_container(&e, &ContainerRegistry::new(), None).await.unwrap();

    let creates: Vec<Recorded> = server
        .requests()
        .into_iter()
        .filter(|r| r.param("restype") == Some("container"))
        .collect();
    assert_eq!(creates.len(), 2);
    assert_eq!(creates[0].path, "/devstoreaccount1/data");
    assert_eq!(creates[1].method, "PUT");
}

#[tokio::test]
async fn test_properties_and_not_found() {
    let server = MockServer::start().await;
    let client = server.client();

    let props = operations::get_blob_properties(&*client, "data", "disk.vhd", StorageMode::Page, None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(props.blob_type, BlobType::PageBlob);
    assert_eq!(props.content_type.as_deref(), Some("application/x-vhd"));
    assert_eq!(props.metadata.get("owner").map(String::as_str), Some("ops"));

    let missing = operations::get_blob_properties(&*client, "data", "missing.bin", StorageMode::Auto, None)
        .await
        .unwrap();
    assert!(missing.is_none());

    let err = client
        .get_blob_properties("data", "missing.bin", None, None)
        .await
        .unwrap_err();
    let remote = err.remote().unwrap();
    assert_eq!(remote.code, ErrorCode::BlobNotFound);
    assert_eq!(remote.request_id.as_deref(), Some("req-1"));

    let err = operations::get_blob_properties(&*client, "data", "disk.vhd", StorageMode::Block, None)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::TypeMismatch { .. }));
}

#[tokio::test]
async fn test_snapshot_properties_query() {
    let server = MockServer::start().await;
    let client = server.client();
    let name = "disk.vhd?snapshot=2024-01-27T12:34:56.1234567Z";

    assert!(operations::check_if_single_blob(&*client, "data", name, None)
        .await
        .unwrap());
    assert!(server.requests().is_empty());

    operations::get_blob_properties(&*client, "data", name, StorageMode::Page, None)
        .await
        .unwrap();
    let req = server.last();
    assert_eq!(req.method, "HEAD");
    assert_eq!(req.path, "/devstoreaccount1/data/disk.vhd");
    assert_eq!(req.param("snapshot"), Some("2024-01-27T12:34:56.1234567Z"));
}

#[tokio::test]
async fn test_listing_follows_markers() {
    let server = MockServer::start().await;
    let client = server.client();

    let blobs: Vec<_> = operations::list_blobs(&*client, "data", "", StorageMode::Block, false, None)
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    let names: Vec<&str> = blobs.iter().map(|b| b.name.as_str()).collect();
    assert_eq!(names, vec!["a.bin", "c.bin"]);

    let lists: Vec<Recorded> = server
        .requests()
        .into_iter()
        .filter(|r| r.param("comp") == Some("list"))
        .collect();
    assert_eq!(lists.len(), 2);
    assert_eq!(lists[0].param("include"), Some("metadata"));
    assert_eq!(lists[0].param("marker"), None);
    assert_eq!(lists[1].param("marker"), Some("2!page2"));
}

#[tokio::test]
async fn test_committed_block_list_decoding() {
    let server = MockServer::start().await;
    let client = server.client();
    let e = StorageEntity::new(client, "data", "big.bin", StorageMode::Block);

    let blocks = block_blob::get_committed_block_list(&e, None).await.unwrap();
    let names: Vec<&str> = blocks.iter().map(|b| b.name.as_str()).collect();
    assert_eq!(names, vec!["00000000", "00000001"]);
    assert_eq!(server.last().param("blocklisttype"), Some("committed"));
}

#[tokio::test]
async fn test_range_download_is_half_open() {
    let server = MockServer::start().await;
    let client = server.client();
    let e = StorageEntity::new(client, "data", "text.bin", StorageMode::Block);

    let offsets = Offsets::new(1, 10, 20).unwrap();
    let body = operations::get_blob_range(&e, &offsets, None).await.unwrap();
    assert_eq!(&body[..], &CONTENT[10..20]);
    assert_eq!(server.last().header("x-ms-range"), Some("bytes=10-19"));

    let empty = Offsets::new(2, 20, 20).unwrap();
    let requests_before = server.requests().len();
    assert!(operations::get_blob_range(&e, &empty, None).await.unwrap().is_empty());
    assert_eq!(server.requests().len(), requests_before);
}

#[tokio::test]
async fn test_page_write_headers() {
    let server = MockServer::start().await;
    let client = server.client();
    let e = StorageEntity::new(client, "data", "disk.vhd", StorageMode::Page).size(1000);

    page_blob::create_blob(&e, None).await.unwrap();
    let create = server.last();
    assert_eq!(create.header("x-ms-blob-type"), Some("PageBlob"));
    assert_eq!(create.header("x-ms-blob-content-length"), Some("1024"));

    page_blob::put_page(&e, 512, 1024, Some(Bytes::from(vec![1u8; 512])), None)
        .await
        .unwrap();
    let put = server.last();
    assert_eq!(put.param("comp"), Some("page"));
    assert_eq!(put.header("x-ms-page-write"), Some("update"));
    assert_eq!(put.header("x-ms-range"), Some("bytes=512-1023"));

    page_blob::resize_blob(&e, 1500, None).await.unwrap();
    let resize = server.last();
    assert_eq!(resize.param("comp"), Some("properties"));
    assert_eq!(resize.header("x-ms-blob-content-length"), Some("1536"));
}

#[tokio::test]
async fn test_busy_responses_are_retried() {
    let server = MockServer::start().await;
    server.mock.busy_responses.store(2, Ordering::SeqCst);
    let client = server.client();
    let e = StorageEntity::new(client, "data", "log.txt", StorageMode::Append);

    operations::append_blob::append_block(&e, Some(Bytes::from_static(b"line\n")), None)
        .await
        .unwrap();
    let appends = server
        .requests()
        .into_iter()
        .filter(|r| r.param("comp") == Some("appendblock"))
        .count();
    assert_eq!(appends, 3);

    server.mock.busy_responses.store(10, Ordering::SeqCst);
    let err = operations::append_blob::append_block(&e, None, None)
        .await
        .unwrap_err();
    match err {
        StorageError::RetriesExhausted { attempts, .. } => assert_eq!(attempts, 4),
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_error_body_code_is_decoded() {
    let server = MockServer::start().await;
    let client = server.client();
    let e = StorageEntity::new(client, "data", "cold.bin", StorageMode::Block)
        .access_tier(blobxfer_rs::AccessTier::Archive);

    let err = block_blob::set_blob_access_tier(&e, None).await.unwrap_err();
    let remote = err.remote().unwrap();
    assert_eq!(remote.status.as_u16(), 403);
    assert_eq!(remote.code, ErrorCode::AuthorizationPermissionMismatch);
    assert!(remote.message.contains("not authorized"));
    assert_eq!(server.last().header("x-ms-access-tier"), Some("Archive"));
    assert_eq!(server.requests().len(), 1);
}

#[tokio::test]
async fn test_sas_client_signs_with_token() {
    let server = MockServer::start().await;
    let account = StorageAccount::with_sas(DEFAULT_ACCOUNT, "?sv=2021-10-04&sp=rwdl&sig=abc%3D")
        .blob_endpoint(&server.endpoint)
        .unwrap();
    let client = RestClient::new(account, ExponentialRetryWithMaxWait::none()).unwrap();

    client
        .delete_blob("data", "old.bin", true, None)
        .await
        .unwrap();

    let req = server.last();
    assert_eq!(req.method, "DELETE");
    assert_eq!(req.header("x-ms-delete-snapshots"), Some("include"));
    assert_eq!(req.param("sig"), Some("abc="));
    assert_eq!(req.param("sp"), Some("rwdl"));
    assert!(req.header("authorization").is_none());
}
