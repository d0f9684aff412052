//! XML response deserialization for Azure Blob Storage API.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{StorageError, StorageResult};
use crate::models::{
    AccessTier, BlobListSegment, BlobProperties, BlobType, Block, BlockList,
};

fn malformed(what: &str, e: impl std::fmt::Display) -> StorageError {
    StorageError::invalid_response(format!("{}: {}", what, e))
}

/// Parses a List Blobs `EnumerationResults` body.
pub fn parse_blob_list(xml: &str) -> StorageResult<BlobListSegment> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut segment = BlobListSegment::default();
    let mut buf = Vec::new();
    let mut path: Vec<String> = Vec::new();
    let mut current_text = String::new();

    let mut blob = BlobProperties::new("", BlobType::BlockBlob, 0);
    let mut blob_type_seen = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                path.push(String::from_utf8_lossy(e.name().as_ref()).to_string());
                current_text.clear();
            }
            Ok(Event::End(_)) => {
                let path_str: Vec<&str> = path.iter().map(|s| s.as_str()).collect();

                match path_str.as_slice() {
                    [_, "NextMarker"] => {
                        if !current_text.is_empty() {
                            segment.next_marker = Some(current_text.clone());
                        }
                    }
                    [.., "Blob", "Metadata", key] => {
                        blob.metadata
                            .insert(key.to_string(), current_text.clone());
                    }
                    [.., "Blob", "Name"] => blob.name = current_text.clone(),
                    [.., "Blob", "Snapshot"] => {
                        if !current_text.is_empty() {
                            blob.snapshot = Some(current_text.clone());
                        }
                    }
                    [.., "Blob", "Properties", field] => {
                        apply_property(&mut blob, field, &current_text, &mut blob_type_seen)?;
                    }
                    [.., "Blobs", "Blob"] => {
                        if !blob_type_seen {
                            return Err(StorageError::invalid_response(format!(
                                "listed blob {} has no BlobType",
                                blob.name
                            )));
                        }
                        let done = std::mem::replace(
                            &mut blob,
                            BlobProperties::new("", BlobType::BlockBlob, 0),
                        );
                        segment.items.push(done);
                        blob_type_seen = false;
                    }
                    _ => {}
                }

                path.pop();
                current_text.clear();
            }
            Ok(Event::Text(e)) => {
                current_text = e
                    .unescape()
                    .map_err(|e| malformed("blob list", e))?
                    .to_string();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(malformed("blob list", e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(segment)
}

fn apply_property(
    blob: &mut BlobProperties,
    field: &str,
    value: &str,
    blob_type_seen: &mut bool,
) -> StorageResult<()> {
    let opt = || (!value.is_empty()).then(|| value.to_string());
    match field {
        "Content-Length" => {
            blob.content_length = value
                .parse()
                .map_err(|e| malformed("Content-Length", e))?;
        }
        "Content-Type" => blob.content_type = opt(),
        "Content-MD5" => blob.content_md5 = opt(),
        "Cache-Control" => blob.cache_control = opt(),
        "Etag" => blob.etag = opt(),
        "Last-Modified" => blob.last_modified = parse_http_date(value),
        "AccessTier" => blob.access_tier = AccessTier::from_str(value),
        "BlobType" => {
            blob.blob_type = BlobType::from_str(value).ok_or_else(|| {
                StorageError::invalid_response(format!("unknown blob type {}", value))
            })?;
            *blob_type_seen = true;
        }
        _ => {}
    }
    Ok(())
}

/// Parses an RFC 1123 date as used in `Last-Modified`.
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parses a Get Block List body.
///
/// Block names are reported base64 encoded; they are decoded when the bytes
/// are valid UTF-8 and kept verbatim otherwise.
pub fn parse_block_list(xml: &str) -> StorageResult<BlockList> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut list = BlockList::default();
    let mut buf = Vec::new();
    let mut path: Vec<String> = Vec::new();
    let mut current_text = String::new();
    let mut name = String::new();
    let mut size = 0u64;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                path.push(String::from_utf8_lossy(e.name().as_ref()).to_string());
                current_text.clear();
            }
            Ok(Event::End(_)) => {
                let path_str: Vec<&str> = path.iter().map(|s| s.as_str()).collect();

                match path_str.as_slice() {
                    [.., "Block", "Name"] => name = decode_block_name(&current_text),
                    [.., "Block", "Size"] => {
                        size = current_text
                            .parse()
                            .map_err(|e| malformed("block size", e))?;
                    }
                    [.., section, "Block"] => {
                        let block = Block {
                            name: std::mem::take(&mut name),
                            size: std::mem::take(&mut size),
                        };
                        match *section {
                            "CommittedBlocks" => list.committed.push(block),
                            "UncommittedBlocks" => list.uncommitted.push(block),
                            _ => {}
                        }
                    }
                    _ => {}
                }

                path.pop();
                current_text.clear();
            }
            Ok(Event::Text(e)) => {
                current_text = e
                    .unescape()
                    .map_err(|e| malformed("block list", e))?
                    .to_string();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(malformed("block list", e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(list)
}

fn decode_block_name(raw: &str) -> String {
    BASE64
        .decode(raw)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| raw.to_string())
}

/// `Code` and `Message` of an error response body.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ErrorBody {
    pub code: Option<String>,
    pub message: Option<String>,
}

/// Parses an `<Error>` body. Unparseable bodies yield an empty result.
pub fn parse_error_body(xml: &str) -> ErrorBody {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut body = ErrorBody::default();
    let mut buf = Vec::new();
    let mut current_text = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(_)) => current_text.clear(),
            Ok(Event::End(e)) => {
                match e.name().as_ref() {
                    b"Code" => body.code = Some(current_text.clone()),
                    b"Message" => body.message = Some(current_text.clone()),
                    _ => {}
                }
                current_text.clear();
            }
            Ok(Event::Text(e)) => {
                if let Ok(text) = e.unescape() {
                    current_text = text.to_string();
                }
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    body
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIST: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<EnumerationResults ServiceEndpoint="https://acct.blob.core.windows.net/" ContainerName="data">
  <Prefix>dir/</Prefix>
  <Blobs>
    <Blob>
      <Name>dir/a.bin</Name>
      <Properties>
        <Last-Modified>Mon, 01 Jan 2024 10:00:00 GMT</Last-Modified>
        <Etag>0x8D</Etag>
        <Content-Length>1024</Content-Length>
        <Content-Type>application/octet-stream</Content-Type>
        <Content-MD5>XUFAKrxLKna5cZ2REBfFkg==</Content-MD5>
        <BlobType>PageBlob</BlobType>
        <AccessTier>Hot</AccessTier>
      </Properties>
      <Metadata><owner>ops</owner></Metadata>
    </Blob>
    <Blob>
      <Name>dir/b &amp; c.txt</Name>
      <Snapshot>2017-02-23T22:17:25.4562000Z</Snapshot>
      <Properties>
        <Content-Length>3</Content-Length>
        <Content-Type />
        <BlobType>AppendBlob</BlobType>
      </Properties>
    </Blob>
  </Blobs>
  <NextMarker>2!72!token</NextMarker>
</EnumerationResults>"#;

    #[test]
    fn test_parse_blob_list() {
        let segment = parse_blob_list(LIST).unwrap();
        assert_eq!(segment.items.len(), 2);
        assert_eq!(segment.next_marker.as_deref(), Some("2!72!token"));

        let a = &segment.items[0];
        assert_eq!(a.name, "dir/a.bin");
        assert_eq!(a.blob_type, BlobType::PageBlob);
        assert_eq!(a.content_length, 1024);
        assert_eq!(a.content_md5.as_deref(), Some("XUFAKrxLKna5cZ2REBfFkg=="));
        assert_eq!(a.access_tier, Some(AccessTier::Hot));
        assert_eq!(a.metadata.get("owner").map(String::as_str), Some("ops"));
        assert!(a.last_modified.is_some());
        assert!(a.snapshot.is_none());

        let b = &segment.items[1];
        assert_eq!(b.name, "dir/b & c.txt");
        assert_eq!(b.snapshot.as_deref(), Some("2017-02-23T22:17:25.4562000Z"));
        assert_eq!(b.blob_type, BlobType::AppendBlob);
        assert!(b.content_type.is_none());
    }

    #[test]
    fn test_last_page_has_no_marker() {
        let xml = r#"<EnumerationResults><Blobs /><NextMarker /></EnumerationResults>"#;
        let segment = parse_blob_list(xml).unwrap();
        assert!(segment.items.is_empty());
        assert!(segment.next_marker.is_none());
    }

    #[test]
    fn test_parse_block_list() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
<BlockList>
  <CommittedBlocks>
    <Block><Name>MDAwMDAwMDA=</Name><Size>4</Size></Block>
    <Block><Name>MDAwMDAwMDE=</Name><Size>2</Size></Block>
  </CommittedBlocks>
  <UncommittedBlocks>
    <Block><Name>MDAwMDAwMDI=</Name><Size>7</Size></Block>
  </UncommittedBlocks>
</BlockList>"#;
        let list = parse_block_list(xml).unwrap();
        let names: Vec<&str> = list.committed.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["00000000", "00000001"]);
        assert_eq!(list.committed[1].size, 2);
        assert_eq!(list.uncommitted.len(), 1);
        assert_eq!(list.uncommitted[0].block_id().map(|id| id.chunk_num()), Some(2));
    }

    #[test]
    fn test_parse_error_body() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?><Error><Code>ContainerAlreadyExists</Code><Message>The specified container already exists.</Message></Error>"#;
        let body = parse_error_body(xml);
        assert_eq!(body.code.as_deref(), Some("ContainerAlreadyExists"));
        assert!(body.message.unwrap().contains("already exists"));
        assert_eq!(parse_error_body(""), ErrorBody::default());
    }
}
