//! Azure Blob REST transport over reqwest.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use http::StatusCode;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::header::HeaderMap;
use reqwest::Method;
use std::time::Duration;
use tracing::debug;
use url::Url;
use uuid::Uuid;

use super::BlobClient;
use crate::auth::{authorization_header, SignedHeaders};
use crate::config::DEFAULT_API_VERSION;
use crate::error::{ErrorCode, RemoteError, StorageError, StorageResult};
use crate::models::{
    encode_blob_name, AccessTier, BlobListSegment, BlobProperties, BlobType, BlockId, BlockList,
    BlockListType, ByteRange, ContentSettings, Metadata, StorageAccount, StorageMode,
};
use crate::retry::ExponentialRetryWithMaxWait;
use crate::xml::{parse_blob_list, parse_block_list, parse_error_body, parse_http_date, serialize_block_list};

/// Query values keep only unreserved characters.
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

const META_PREFIX: &str = "x-ms-meta-";

/// One REST call, kept unsigned so every retry signs afresh.
#[derive(Debug, Clone)]
struct BlobRequest {
    method: Method,
    path: String,
    query: Vec<(&'static str, String)>,
    headers: SignedHeaders,
    body: Bytes,
    timeout: Option<Duration>,
}

impl BlobRequest {
    fn new(method: Method, container: &str, blob: Option<&str>, timeout: Option<Duration>) -> Self {
        let path = match blob {
            Some(blob) => format!("/{}/{}", container, encode_blob_name(blob)),
            None => format!("/{}", container),
        };
        Self {
            method,
            path,
            query: Vec::new(),
            headers: SignedHeaders::new(),
            body: Bytes::new(),
            timeout,
        }
    }

    fn query(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.query.push((key, value.into()));
        self
    }

    fn snapshot(self, snapshot: Option<&str>) -> Self {
        match snapshot {
            Some(s) => self.query("snapshot", s),
            None => self,
        }
    }

    fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_lowercase(), value.into());
        self
    }

    fn content_settings(mut self, settings: &ContentSettings) -> Self {
        if let Some(ct) = &settings.content_type {
            self = self.header("x-ms-blob-content-type", ct.as_str());
        }
        if let Some(cc) = &settings.cache_control {
            self = self.header("x-ms-blob-cache-control", cc.as_str());
        }
        if let Some(md5) = &settings.content_md5 {
            self = self.header("x-ms-blob-content-md5", md5.to_base64());
        }
        self
    }

    fn metadata(mut self, metadata: &Metadata) -> Self {
        for (key, value) in metadata {
            self = self.header(&format!("{}{}", META_PREFIX, key), value.as_str());
        }
        self
    }

    fn body(mut self, body: Bytes) -> Self {
        self.body = body;
        self
    }
}

/// Transport speaking the Azure Blob REST API for one account.
pub struct RestClient {
    http: reqwest::Client,
    account: StorageAccount,
    retry: ExponentialRetryWithMaxWait,
}

impl RestClient {
    pub fn new(account: StorageAccount, retry: ExponentialRetryWithMaxWait) -> StorageResult<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| StorageError::transport(format!("failed to create HTTP client: {}", e), false))?;
        Ok(Self::with_http_client(http, account, retry))
    }

    pub fn with_http_client(
        http: reqwest::Client,
        account: StorageAccount,
        retry: ExponentialRetryWithMaxWait,
    ) -> Self {
        Self {
            http,
            account,
            retry,
        }
    }

    pub fn retry_policy(&self) -> &ExponentialRetryWithMaxWait {
        &self.retry
    }

    /// Full request URL: service root, path, query, server timeout and SAS.
    fn request_url(&self, req: &BlobRequest) -> StorageResult<Url> {
        let mut params: Vec<String> = req
            .query
            .iter()
            .map(|(k, v)| format!("{}={}", k, utf8_percent_encode(v, QUERY_VALUE)))
            .collect();
        if let Some(timeout) = req.timeout {
            params.push(format!("timeout={}", timeout.as_secs().max(1)));
        }
        if !self.account.has_key() {
            if let Some(sas) = self.account.sas_token.as_deref().filter(|s| !s.is_empty()) {
                params.push(sas.to_string());
            }
        }

        let mut url = format!("{}{}", self.account.service_url(StorageMode::Block), req.path);
        if !params.is_empty() {
            url.push('?');
            url.push_str(&params.join("&"));
        }
        Url::parse(&url).map_err(|e| StorageError::invalid_input(format!("invalid request url {}: {}", url, e)))
    }

    async fn send(&self, operation: &'static str, req: BlobRequest) -> StorageResult<reqwest::Response> {
        self.retry.run(operation, || self.send_once(operation, &req)).await
    }

    async fn send_once(&self, operation: &'static str, req: &BlobRequest) -> StorageResult<reqwest::Response> {
        let url = self.request_url(req)?;

        let mut headers = req.headers.clone();
        headers.insert("x-ms-version".into(), DEFAULT_API_VERSION.into());
        headers.insert(
            "x-ms-date".into(),
            Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
        );
        headers.insert("x-ms-client-request-id".into(), Uuid::new_v4().to_string());
        if req.method == Method::PUT {
            headers.insert("content-length".into(), req.body.len().to_string());
        }

        let authorization = match self.account.key.as_deref().filter(|k| !k.is_empty()) {
            Some(key) => Some(authorization_header(
                &self.account.name,
                key,
                req.method.as_str(),
                &url,
                &headers,
            )?),
            None => None,
        };

        let mut builder = self.http.request(req.method.clone(), url.as_str());
        for (name, value) in headers.iter().filter(|(n, _)| n.as_str() != "content-length") {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(authorization) = authorization {
            builder = builder.header("authorization", authorization);
        }
        if req.method == Method::PUT {
            builder = builder.body(req.body.clone());
        }
        if let Some(timeout) = req.timeout {
            builder = builder.timeout(timeout);
        }

        debug!("{} {} {}", operation, req.method, url.path());
        let response = builder
            .send()
            .await
            .map_err(|e| StorageError::transport(format!("{} failed: {}", operation, e), e.is_timeout()))?;

        if response.status().is_success() {
            Ok(response)
        } else {
            Err(decode_error(response).await)
        }
    }

    async fn send_empty(&self, operation: &'static str, req: BlobRequest) -> StorageResult<()> {
        self.send(operation, req).await.map(|_| ())
    }

    async fn read_body(operation: &'static str, response: reqwest::Response) -> StorageResult<Bytes> {
        response
            .bytes()
            .await
            .map_err(|e| StorageError::transport(format!("{} body: {}", operation, e), e.is_timeout()))
    }

    async fn read_text(operation: &'static str, response: reqwest::Response) -> StorageResult<String> {
        let body = Self::read_body(operation, response).await?;
        String::from_utf8(body.to_vec())
            .map_err(|e| StorageError::invalid_response(format!("{} body is not UTF-8: {}", operation, e)))
    }
}

/// Builds the remote error of a failed response.
///
/// The `x-ms-error-code` header wins over the `<Code>` of the body.
async fn decode_error(response: reqwest::Response) -> StorageError {
    let status =
        StatusCode::from_u16(response.status().as_u16()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let header_code = header_str(response.headers(), "x-ms-error-code").map(str::to_string);
    let request_id = header_str(response.headers(), "x-ms-request-id").map(str::to_string);
    let body = response.text().await.unwrap_or_default();
    let parsed = parse_error_body(&body);

    let code = header_code
        .or(parsed.code)
        .map(|c| ErrorCode::from_str(&c))
        .unwrap_or_else(|| {
            ErrorCode::Other(status.canonical_reason().unwrap_or("Unknown").replace(' ', ""))
        });
    let message = parsed
        .message
        .unwrap_or_else(|| code.default_message().to_string());

    let mut error = RemoteError::with_message(code, message).with_status(status);
    if let Some(id) = request_id {
        error = error.with_request_id(id);
    }
    error.into()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Reads blob properties from the headers of a HEAD response.
fn properties_from_headers(
    name: &str,
    snapshot: Option<&str>,
    headers: &HeaderMap,
) -> StorageResult<BlobProperties> {
    let blob_type = header_str(headers, "x-ms-blob-type")
        .and_then(BlobType::from_str)
        .ok_or_else(|| StorageError::invalid_response(format!("blob {} has no x-ms-blob-type", name)))?;
    let content_length = header_str(headers, "content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    let mut props = BlobProperties::new(name, blob_type, content_length);
    props.snapshot = snapshot.map(str::to_string);
    props.content_type = header_str(headers, "content-type").map(str::to_string);
    props.content_md5 = header_str(headers, "content-md5").map(str::to_string);
    props.cache_control = header_str(headers, "cache-control").map(str::to_string);
    props.etag = header_str(headers, "etag").map(str::to_string);
    props.last_modified = header_str(headers, "last-modified").and_then(parse_http_date);
    props.access_tier = header_str(headers, "x-ms-access-tier").and_then(AccessTier::from_str);
    for (key, value) in headers.iter() {
        if let Some(meta) = key.as_str().strip_prefix(META_PREFIX) {
            if let Ok(value) = value.to_str() {
                props.metadata.insert(meta.to_string(), value.to_string());
            }
        }
    }
    Ok(props)
}

#[async_trait]
impl BlobClient for RestClient {
    fn account(&self) -> &StorageAccount {
        &self.account
    }

    async fn create_container(&self, container: &str, timeout: Option<Duration>) -> StorageResult<()> {
        let req = BlobRequest::new(Method::PUT, container, None, timeout).query("restype", "container");
        self.send_empty("create_container", req).await
    }

    async fn get_blob_properties(
        &self,
        container: &str,
        blob: &str,
        snapshot: Option<&str>,
        timeout: Option<Duration>,
    ) -> StorageResult<BlobProperties> {
        let req = BlobRequest::new(Method::HEAD, container, Some(blob), timeout).snapshot(snapshot);
        let response = self.send("get_blob_properties", req).await?;
        properties_from_headers(blob, snapshot, response.headers())
    }

    async fn list_blobs_segment(
        &self,
        container: &str,
        prefix: Option<&str>,
        marker: Option<&str>,
        timeout: Option<Duration>,
    ) -> StorageResult<BlobListSegment> {
        let mut req = BlobRequest::new(Method::GET, container, None, timeout)
            .query("restype", "container")
            .query("comp", "list")
            .query("include", "metadata");
        if let Some(prefix) = prefix.filter(|p| !p.is_empty()) {
            req = req.query("prefix", prefix);
        }
        if let Some(marker) = marker {
            req = req.query("marker", marker);
        }
        let response = self.send("list_blobs", req).await?;
        parse_blob_list(&Self::read_text("list_blobs", response).await?)
    }

    async fn delete_blob(
        &self,
        container: &str,
        blob: &str,
        include_snapshots: bool,
        timeout: Option<Duration>,
    ) -> StorageResult<()> {
        let mut req = BlobRequest::new(Method::DELETE, container, Some(blob), timeout);
        if include_snapshots {
            req = req.header("x-ms-delete-snapshots", "include");
        }
        self.send_empty("delete_blob", req).await
    }

    async fn upload_block_blob(
        &self,
        container: &str,
        blob: &str,
        body: Bytes,
        settings: &ContentSettings,
        metadata: &Metadata,
        timeout: Option<Duration>,
    ) -> StorageResult<()> {
        let req = BlobRequest::new(Method::PUT, container, Some(blob), timeout)
            .header("x-ms-blob-type", BlobType::BlockBlob.as_str())
            .content_settings(settings)
            .metadata(metadata)
            .body(body);
        self.send_empty("put_blob", req).await
    }

    async fn stage_block(
        &self,
        container: &str,
        blob: &str,
        block_id: BlockId,
        body: Bytes,
        timeout: Option<Duration>,
    ) -> StorageResult<()> {
        let req = BlobRequest::new(Method::PUT, container, Some(blob), timeout)
            .query("comp", "block")
            .query("blockid", block_id.encoded())
            .body(body);
        self.send_empty("put_block", req).await
    }

    async fn stage_block_from_url(
        &self,
        container: &str,
        blob: &str,
        block_id: BlockId,
        source_url: &str,
        source_range: ByteRange,
        timeout: Option<Duration>,
    ) -> StorageResult<()> {
        let range = source_range.to_header().ok_or_else(|| {
            StorageError::invalid_input(format!("empty source range for block {}", block_id))
        })?;
        let req = BlobRequest::new(Method::PUT, container, Some(blob), timeout)
            .query("comp", "block")
            .query("blockid", block_id.encoded())
            .header("x-ms-copy-source", source_url)
            .header("x-ms-source-range", range);
        self.send_empty("put_block_from_url", req).await
    }

    async fn commit_block_list(
        &self,
        container: &str,
        blob: &str,
        block_ids: &[BlockId],
        settings: &ContentSettings,
        metadata: &Metadata,
        timeout: Option<Duration>,
    ) -> StorageResult<()> {
        let req = BlobRequest::new(Method::PUT, container, Some(blob), timeout)
            .query("comp", "blocklist")
            .header("content-type", "application/xml")
            .content_settings(settings)
            .metadata(metadata)
            .body(Bytes::from(serialize_block_list(block_ids)));
        self.send_empty("put_block_list", req).await
    }

    async fn get_block_list(
        &self,
        container: &str,
        blob: &str,
        snapshot: Option<&str>,
        list_type: BlockListType,
        timeout: Option<Duration>,
    ) -> StorageResult<BlockList> {
        let req = BlobRequest::new(Method::GET, container, Some(blob), timeout)
            .query("comp", "blocklist")
            .query("blocklisttype", list_type.as_str())
            .snapshot(snapshot);
        let response = self.send("get_block_list", req).await?;
        parse_block_list(&Self::read_text("get_block_list", response).await?)
    }

    async fn set_blob_tier(
        &self,
        container: &str,
        blob: &str,
        tier: AccessTier,
        timeout: Option<Duration>,
    ) -> StorageResult<()> {
        let req = BlobRequest::new(Method::PUT, container, Some(blob), timeout)
            .query("comp", "tier")
            .header("x-ms-access-tier", tier.as_str());
        self.send_empty("set_blob_tier", req).await
    }

    async fn create_append_blob(
        &self,
        container: &str,
        blob: &str,
        settings: &ContentSettings,
        timeout: Option<Duration>,
    ) -> StorageResult<()> {
        let req = BlobRequest::new(Method::PUT, container, Some(blob), timeout)
            .header("x-ms-blob-type", BlobType::AppendBlob.as_str())
            .content_settings(settings);
        self.send_empty("create_append_blob", req).await
    }

    async fn append_block(
        &self,
        container: &str,
        blob: &str,
        body: Bytes,
        timeout: Option<Duration>,
    ) -> StorageResult<()> {
        let req = BlobRequest::new(Method::PUT, container, Some(blob), timeout)
            .query("comp", "appendblock")
            .body(body);
        self.send_empty("append_block", req).await
    }

    async fn create_page_blob(
        &self,
        container: &str,
        blob: &str,
        size: u64,
        settings: &ContentSettings,
        timeout: Option<Duration>,
    ) -> StorageResult<()> {
        let req = BlobRequest::new(Method::PUT, container, Some(blob), timeout)
            .header("x-ms-blob-type", BlobType::PageBlob.as_str())
            .header("x-ms-blob-content-length", size.to_string())
            .content_settings(settings);
        self.send_empty("create_page_blob", req).await
    }

    async fn upload_pages(
        &self,
        container: &str,
        blob: &str,
        range: ByteRange,
        body: Bytes,
        timeout: Option<Duration>,
    ) -> StorageResult<()> {
        let header = range
            .to_header()
            .ok_or_else(|| StorageError::invalid_input("empty page range"))?;
        let req = BlobRequest::new(Method::PUT, container, Some(blob), timeout)
            .query("comp", "page")
            .header("x-ms-page-write", "update")
            .header("x-ms-range", header)
            .body(body);
        self.send_empty("put_page", req).await
    }

    async fn resize_blob(
        &self,
        container: &str,
        blob: &str,
        size: u64,
        timeout: Option<Duration>,
    ) -> StorageResult<()> {
        let req = BlobRequest::new(Method::PUT, container, Some(blob), timeout)
            .query("comp", "properties")
            .header("x-ms-blob-content-length", size.to_string());
        self.send_empty("resize_blob", req).await
    }

    async fn set_http_headers(
        &self,
        container: &str,
        blob: &str,
        settings: &ContentSettings,
        timeout: Option<Duration>,
    ) -> StorageResult<()> {
        let req = BlobRequest::new(Method::PUT, container, Some(blob), timeout)
            .query("comp", "properties")
            .content_settings(settings);
        self.send_empty("set_blob_properties", req).await
    }

    async fn set_metadata(
        &self,
        container: &str,
        blob: &str,
        metadata: &Metadata,
        timeout: Option<Duration>,
    ) -> StorageResult<()> {
        let req = BlobRequest::new(Method::PUT, container, Some(blob), timeout)
            .query("comp", "metadata")
            .metadata(metadata);
        self.send_empty("set_blob_metadata", req).await
    }

    async fn download_range(
        &self,
        container: &str,
        blob: &str,
        snapshot: Option<&str>,
        range: ByteRange,
        timeout: Option<Duration>,
    ) -> StorageResult<Bytes> {
        let Some(header) = range.to_header() else {
            return Ok(Bytes::new());
        };
        let req = BlobRequest::new(Method::GET, container, Some(blob), timeout)
            .snapshot(snapshot)
            .header("x-ms-range", header);
        let response = self.send("get_blob", req).await?;
        Self::read_body("get_blob", response).await
    }
}
