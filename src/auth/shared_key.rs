//! SharedKey request signing for the Azure Blob Storage API.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::BTreeMap;
use url::Url;

use crate::error::{StorageError, StorageResult};

type HmacSha256 = Hmac<Sha256>;

/// Request headers keyed by lowercase name.
pub type SignedHeaders = BTreeMap<String, String>;

/// Builds the `Authorization` header value for a request.
pub fn authorization_header(
    account: &str,
    account_key: &str,
    method: &str,
    url: &Url,
    headers: &SignedHeaders,
) -> StorageResult<String> {
    let string_to_sign = build_string_to_sign(account, method, url, headers);
    let signature = compute_signature(&string_to_sign, account_key)?;
    Ok(format!("SharedKey {}:{}", account, signature))
}

/// Builds the string-to-sign for SharedKey authentication.
pub fn build_string_to_sign(
    account: &str,
    method: &str,
    url: &Url,
    headers: &SignedHeaders,
) -> String {
    let header = |name: &str| headers.get(name).map(String::as_str).unwrap_or("");

    let mut parts = vec![method.to_uppercase()];

    for name in ["content-encoding", "content-language"] {
        parts.push(header(name).to_string());
    }
    // Content-Length is empty when zero
    parts.push(match header("content-length") {
        "0" => String::new(),
        len => len.to_string(),
    });
    for name in ["content-md5", "content-type"] {
        parts.push(header(name).to_string());
    }

    // Date is empty whenever x-ms-date is sent
    if headers.contains_key("x-ms-date") {
        parts.push(String::new());
    } else {
        parts.push(header("date").to_string());
    }

    for name in [
        "if-modified-since",
        "if-match",
        "if-none-match",
        "if-unmodified-since",
        "range",
    ] {
        parts.push(header(name).to_string());
    }

    format!(
        "{}\n{}{}",
        parts.join("\n"),
        canonicalized_headers(headers),
        canonicalized_resource(account, url)
    )
}

/// `x-ms-*` headers, sorted, one `name:value\n` line each.
fn canonicalized_headers(headers: &SignedHeaders) -> String {
    let mut result = String::new();
    for (name, value) in headers.iter().filter(|(n, _)| n.starts_with("x-ms-")) {
        let normalized = value.split_whitespace().collect::<Vec<_>>().join(" ");
        result.push_str(name);
        result.push(':');
        result.push_str(&normalized);
        result.push('\n');
    }
    result
}

/// `/{account}{path}` followed by the sorted, decoded query parameters.
///
/// For path-style endpoints the path already starts with the account name, so
/// the account appears twice.
fn canonicalized_resource(account: &str, url: &Url) -> String {
    let mut resource = format!("/{}{}", account, url.path());

    let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (key, value) in url.query_pairs() {
        params
            .entry(key.to_lowercase())
            .or_default()
            .push(value.into_owned());
    }
    for (key, mut values) in params {
        values.sort();
        resource.push('\n');
        resource.push_str(&key);
        resource.push(':');
        resource.push_str(&values.join(","));
    }

    resource
}

/// Computes the base64 HMAC-SHA256 of `string_to_sign` under the account key.
pub fn compute_signature(string_to_sign: &str, account_key: &str) -> StorageResult<String> {
    let key_bytes = BASE64
        .decode(account_key)
        .map_err(|_| StorageError::invalid_input("invalid account key encoding"))?;

    let mut mac = HmacSha256::new_from_slice(&key_bytes)
        .map_err(|_| StorageError::invalid_input("failed to create HMAC from account key"))?;

    mac.update(string_to_sign.as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}
