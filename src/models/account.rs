//! Storage account identity and credentials.

use url::Url;

use super::StorageMode;
use crate::error::{StorageError, StorageResult};

/// Default endpoint suffix for public cloud accounts.
pub const DEFAULT_ENDPOINT_SUFFIX: &str = "core.windows.net";

/// One storage account as seen by a transport client.
#[derive(Clone)]
pub struct StorageAccount {
    /// Account name.
    pub name: String,
    /// Base64 shared key, when the caller holds full credentials.
    pub key: Option<String>,
    /// SAS token without the leading `?`.
    pub sas_token: Option<String>,
    /// Endpoint suffix, e.g. `core.windows.net`.
    pub endpoint_suffix: String,
    /// Explicit blob endpoint, e.g. `http://127.0.0.1:10000/devstoreaccount1`.
    pub blob_endpoint: Option<Url>,
}

impl std::fmt::Debug for StorageAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageAccount")
            .field("name", &self.name)
            .field("key", &self.key.as_ref().map(|_| "<redacted>"))
            .field("sas_token", &self.sas_token.as_ref().map(|_| "<redacted>"))
            .field("endpoint_suffix", &self.endpoint_suffix)
            .field("blob_endpoint", &self.blob_endpoint)
            .finish()
    }
}

impl StorageAccount {
    /// Account authenticated with a shared key.
    pub fn with_key(name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: Some(key.into()),
            sas_token: None,
            endpoint_suffix: DEFAULT_ENDPOINT_SUFFIX.to_string(),
            blob_endpoint: None,
        }
    }

    /// Account authenticated with a SAS token. A leading `?` is stripped.
    pub fn with_sas(name: impl Into<String>, sas_token: &str) -> Self {
        Self {
            name: name.into(),
            key: None,
            sas_token: Some(normalize_sas(sas_token)),
            endpoint_suffix: DEFAULT_ENDPOINT_SUFFIX.to_string(),
            blob_endpoint: None,
        }
    }

    pub fn endpoint_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.endpoint_suffix = suffix.into();
        self
    }

    /// Points the account at an explicit blob endpoint (emulator or private link).
    pub fn blob_endpoint(mut self, endpoint: &str) -> StorageResult<Self> {
        let url = Url::parse(endpoint.trim_end_matches('/')).map_err(|e| {
            StorageError::invalid_input(format!("invalid blob endpoint {}: {}", endpoint, e))
        })?;
        self.blob_endpoint = Some(url);
        Ok(self)
    }

    pub fn has_key(&self) -> bool {
        self.key.as_deref().map(|k| !k.is_empty()).unwrap_or(false)
    }

    pub fn is_sas(&self) -> bool {
        !self.has_key() && self.sas_token.is_some()
    }

    /// Shared keys may create containers; SAS tokens only when their resource
    /// types include containers.
    pub fn can_create_containers(&self) -> bool {
        if self.has_key() {
            return true;
        }
        self.sas_token
            .as_deref()
            .map(|token| {
                token.split('&').any(|param| {
                    param
                        .strip_prefix("srt=")
                        .map(|v| v.contains('c'))
                        .unwrap_or(false)
                })
            })
            .unwrap_or(false)
    }

    /// Whether requests use path-style addressing (`/{account}/{container}`).
    pub fn is_path_style(&self) -> bool {
        self.blob_endpoint
            .as_ref()
            .map(|u| u.path().trim_matches('/') == self.name)
            .unwrap_or(false)
    }

    /// Service root for the mode's flavor, without a trailing slash.
    pub fn service_url(&self, mode: StorageMode) -> String {
        match (&self.blob_endpoint, mode) {
            (Some(url), m) if m != StorageMode::File => {
                url.as_str().trim_end_matches('/').to_string()
            }
            _ => format!("https://{}", self.primary_endpoint(mode)),
        }
    }

    /// Host name of the account's primary endpoint for the mode's flavor.
    pub fn primary_endpoint(&self, mode: StorageMode) -> String {
        format!("{}.{}.{}", self.name, mode.service(), self.endpoint_suffix)
    }
}

fn normalize_sas(token: &str) -> String {
    token.strip_prefix('?').unwrap_or(token).to_string()
}
