//! Client configuration.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::StorageResult;
use crate::models::{StorageAccount, StorageMode, DEFAULT_ENDPOINT_SUFFIX};
use crate::retry::ExponentialRetryWithMaxWait;

/// Default account name for development storage.
pub const DEFAULT_ACCOUNT: &str = "devstoreaccount1";

/// Default account key for development storage (base64 encoded).
pub const DEFAULT_ACCOUNT_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";

/// Blob endpoint of the local development storage emulator.
pub const DEFAULT_BLOB_ENDPOINT: &str = "http://127.0.0.1:10000/devstoreaccount1";

/// API version sent with every request.
pub const DEFAULT_API_VERSION: &str = "2021-10-04";

/// Default chunk size for uploads and downloads.
pub const DEFAULT_CHUNK_SIZE: u64 = 4 * 1024 * 1024;

/// Retries per request before a call gives up.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

fn parse_mode(s: &str) -> Result<StorageMode, String> {
    StorageMode::from_str(s).ok_or_else(|| format!("unknown storage mode {}", s))
}

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "blobxfer-rs")]
#[command(about = "Chunked transfers to and from Azure Blob Storage")]
#[command(version)]
pub struct Args {
    /// Storage account name.
    #[arg(long, default_value = DEFAULT_ACCOUNT)]
    pub account: String,

    /// Shared key for the account.
    #[arg(long)]
    pub key: Option<String>,

    /// SAS token used when no shared key is given.
    #[arg(long)]
    pub sas: Option<String>,

    /// Endpoint suffix for cloud accounts.
    #[arg(long, default_value = DEFAULT_ENDPOINT_SUFFIX)]
    pub endpoint_suffix: String,

    /// Explicit blob endpoint, e.g. a local emulator.
    #[arg(long)]
    pub blob_endpoint: Option<String>,

    /// Server timeout per request, in seconds.
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Maximum retries per request.
    #[arg(long, default_value_t = DEFAULT_MAX_RETRIES)]
    pub max_retries: u32,

    /// Retry transient failures without limit, ignoring `--max-retries`.
    #[arg(long)]
    pub retry_forever: bool,

    /// First retry wait, in milliseconds.
    #[arg(long, default_value_t = 100)]
    pub initial_backoff_ms: u64,

    /// Longest retry wait, in milliseconds.
    #[arg(long, default_value_t = 1000)]
    pub max_backoff_ms: u64,

    /// Enable debug logging.
    #[arg(long, short = 'd')]
    pub debug: bool,

    /// Enable silent mode (minimal logging).
    #[arg(long, short = 's')]
    pub silent: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List blobs under a prefix.
    Ls {
        container: String,
        #[arg(default_value = "")]
        prefix: String,
        #[arg(long, default_value = "auto", value_parser = parse_mode)]
        mode: StorageMode,
        #[arg(long, short = 'r')]
        recursive: bool,
    },
    /// Show the properties of one blob.
    Stat {
        container: String,
        name: String,
        #[arg(long, default_value = "auto", value_parser = parse_mode)]
        mode: StorageMode,
    },
    /// Show the committed block list of a block blob.
    Blocks { container: String, name: String },
    /// Delete a blob and its snapshots.
    Rm { container: String, name: String },
    /// Create a container if it does not exist.
    Mkcontainer { container: String },
    /// Upload a local file.
    Put {
        file: PathBuf,
        container: String,
        name: String,
        #[arg(long, default_value = "block", value_parser = parse_mode)]
        mode: StorageMode,
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: u64,
        #[arg(long)]
        access_tier: Option<String>,
    },
    /// Download a blob to a local file.
    Get {
        container: String,
        name: String,
        file: PathBuf,
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: u64,
    },
}

/// Connection and retry settings derived from command-line arguments.
#[derive(Debug, Clone)]
pub struct Config {
    pub account_name: String,
    pub account_key: Option<String>,
    pub sas_token: Option<String>,
    pub endpoint_suffix: String,
    pub blob_endpoint: Option<String>,
    /// Server timeout applied to every request.
    pub timeout: Option<Duration>,
    pub max_retries: Option<u32>,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            account_name: DEFAULT_ACCOUNT.to_string(),
            account_key: Some(DEFAULT_ACCOUNT_KEY.to_string()),
            sas_token: None,
            endpoint_suffix: DEFAULT_ENDPOINT_SUFFIX.to_string(),
            blob_endpoint: Some(DEFAULT_BLOB_ENDPOINT.to_string()),
            timeout: None,
            max_retries: Some(DEFAULT_MAX_RETRIES),
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(1),
            debug: false,
        }
    }
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        let sas_token = args
            .sas
            .map(|t| t.trim_start_matches('?').to_string())
            .filter(|t| !t.is_empty());

        // Without credentials the development storage emulator is assumed.
        let dev_storage = args.account == DEFAULT_ACCOUNT && args.key.is_none() && sas_token.is_none();
        let account_key = match args.key {
            Some(key) => Some(key),
            None if dev_storage => Some(DEFAULT_ACCOUNT_KEY.to_string()),
            None => None,
        };
        let blob_endpoint = match args.blob_endpoint {
            Some(endpoint) => Some(endpoint),
            None if dev_storage => Some(DEFAULT_BLOB_ENDPOINT.to_string()),
            None => None,
        };

        Self {
            account_name: args.account,
            account_key,
            sas_token,
            endpoint_suffix: args.endpoint_suffix,
            blob_endpoint,
            timeout: args.timeout.map(Duration::from_secs),
            max_retries: (!args.retry_forever).then_some(args.max_retries),
            initial_backoff: Duration::from_millis(args.initial_backoff_ms),
            max_backoff: Duration::from_millis(args.max_backoff_ms),
            debug: args.debug,
        }
    }
}

impl Config {
    /// Builds the storage account these settings describe.
    pub fn storage_account(&self) -> StorageResult<StorageAccount> {
        let account = match (&self.account_key, &self.sas_token) {
            (Some(key), _) => StorageAccount::with_key(&self.account_name, key),
            (None, Some(sas)) => StorageAccount::with_sas(&self.account_name, sas),
            (None, None) => StorageAccount {
                name: self.account_name.clone(),
                key: None,
                sas_token: None,
                endpoint_suffix: DEFAULT_ENDPOINT_SUFFIX.to_string(),
                blob_endpoint: None,
            },
        }
        .endpoint_suffix(&self.endpoint_suffix);

        match &self.blob_endpoint {
            Some(endpoint) => account.blob_endpoint(endpoint),
            None => Ok(account),
        }
    }

    pub fn retry_policy(&self) -> ExponentialRetryWithMaxWait {
        ExponentialRetryWithMaxWait::new(self.max_retries)
            .with_backoff(self.initial_backoff, self.max_backoff)
    }
}
