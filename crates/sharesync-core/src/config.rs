//! Service configuration.
//!
//! [`ShareConfig`] selects and parameterises the storage backend explicitly.
//! It is built once at process start, either from a storage URI or from
//! environment variables, and handed to the runtime; nothing reads provider
//! settings from global state afterwards.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ShareError;
use crate::Result;

/// Default region for AWS S3 when none is configured.
pub const DEFAULT_S3_REGION: &str = "us-east-1";

/// Default per-request storage deadline: 30 seconds.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const ENV_ADAPTER: &str = "SHARESYNC_STORAGE_ADAPTER";
const ENV_BUCKET: &str = "SHARESYNC_STORAGE_BUCKET";
const ENV_REGION: &str = "SHARESYNC_STORAGE_REGION";
const ENV_ACCOUNT_ID: &str = "SHARESYNC_STORAGE_ACCOUNT_ID";
const ENV_ACCESS_KEY_ID: &str = "SHARESYNC_STORAGE_ACCESS_KEY_ID";
const ENV_SECRET_ACCESS_KEY: &str = "SHARESYNC_STORAGE_SECRET_ACCESS_KEY";
const ENV_PATH: &str = "SHARESYNC_STORAGE_PATH";

/// Static signing credentials for an S3-compatible provider.
///
/// When absent, the S3 client falls back to the standard AWS environment
/// and instance credential chain.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

/// Which object store holds share documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "adapter", rename_all = "lowercase")]
pub enum StorageConfig {
    /// AWS S3, addressed through the regional endpoint.
    S3 {
        bucket: String,
        region: String,
        credentials: Option<Credentials>,
    },
    /// Cloudflare R2, addressed through the account endpoint.
    R2 {
        account_id: String,
        bucket: String,
        credentials: Option<Credentials>,
    },
    /// A directory on the local filesystem.
    Local { path: PathBuf },
    /// Process memory; contents are lost on exit.
    Memory,
}

impl StorageConfig {
    /// Parse a storage URI.
    ///
    /// # URI Format
    ///
    /// - `s3://bucket?region=eu-west-1`
    /// - `r2://bucket?account=<account id>`
    /// - `local://~/.sharesync/data` (or a bare path)
    /// - `memory://`
    ///
    /// Credentials are never part of the URI; the S3 client picks them up
    /// from the standard AWS environment variables.
    pub fn from_uri(uri: &str) -> Result<Self> {
        if let Some(rest) = uri.strip_prefix("s3://") {
            let bucket = bucket_of(uri, rest)?;
            let region = extract_query_param(uri, "region")
                .unwrap_or_else(|| DEFAULT_S3_REGION.to_string());
            return Ok(Self::S3 {
                bucket,
                region,
                credentials: None,
            });
        }
        if let Some(rest) = uri.strip_prefix("r2://") {
            let bucket = bucket_of(uri, rest)?;
            let account_id =
                extract_query_param(uri, "account").ok_or_else(|| ShareError::Config {
                    message: format!("R2 URI must include ?account=<id>: {uri}"),
                })?;
            return Ok(Self::R2 {
                account_id,
                bucket,
                credentials: None,
            });
        }
        if uri == "memory://" || uri == "memory" {
            return Ok(Self::Memory);
        }
        let path = uri.strip_prefix("local://").unwrap_or(uri);
        if path.is_empty() {
            return Err(ShareError::Config {
                message: "Local storage URI must include a path".to_string(),
            });
        }
        Ok(Self::Local {
            path: expand_home(path)?,
        })
    }

    /// Build the configuration from `SHARESYNC_STORAGE_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let adapter = lookup(ENV_ADAPTER).ok_or_else(|| ShareError::Config {
            message: "No storage adapter configured".to_string(),
        })?;
        let required = |name: &str| {
            lookup(name).ok_or_else(|| ShareError::Config {
                message: format!("{name} must be set for the {adapter} adapter"),
            })
        };
        let credentials = match (lookup(ENV_ACCESS_KEY_ID), lookup(ENV_SECRET_ACCESS_KEY)) {
            (Some(access_key_id), Some(secret_access_key)) => Some(Credentials {
                access_key_id,
                secret_access_key,
            }),
            _ => None,
        };

        match adapter.as_str() {
            "s3" => Ok(Self::S3 {
                bucket: required(ENV_BUCKET)?,
                region: lookup(ENV_REGION).unwrap_or_else(|| DEFAULT_S3_REGION.to_string()),
                credentials,
            }),
            "r2" => Ok(Self::R2 {
                account_id: required(ENV_ACCOUNT_ID)?,
                bucket: required(ENV_BUCKET)?,
                credentials,
            }),
            "local" => Ok(Self::Local {
                path: expand_home(&required(ENV_PATH)?)?,
            }),
            "memory" => Ok(Self::Memory),
            other => Err(ShareError::Config {
                message: format!("Unknown storage adapter: {other}"),
            }),
        }
    }

    /// The HTTPS endpoint the S3 protocol is spoken against, for remote
    /// adapters.
    pub fn endpoint(&self) -> Option<String> {
        match self {
            Self::S3 { region, .. } => Some(format!("https://s3.{region}.amazonaws.com")),
            Self::R2 { account_id, .. } => {
                Some(format!("https://{account_id}.r2.cloudflarestorage.com"))
            }
            Self::Local { .. } | Self::Memory => None,
        }
    }
}

/// Configuration for a sharesync node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareConfig {
    /// Where share documents live.
    pub storage: StorageConfig,

    /// Deadline applied to every individual storage call.
    pub request_timeout: Duration,

    /// Mark every created share as non-production (`test_` id prefix).
    pub non_production: bool,
}

impl ShareConfig {
    /// Configuration with default tuning for the given storage.
    pub fn new(storage: StorageConfig) -> Self {
        Self {
            storage,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            non_production: false,
        }
    }

    /// Configuration read from the environment.
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(StorageConfig::from_env()?))
    }
}

fn bucket_of(uri: &str, rest: &str) -> Result<String> {
    // Remove query string and any trailing path
    let bucket = rest
        .split('?')
        .next()
        .unwrap_or(rest)
        .split('/')
        .next()
        .unwrap_or("");
    if bucket.is_empty() {
        return Err(ShareError::Config {
            message: format!("Storage URI must include a bucket name: {uri}"),
        });
    }
    Ok(bucket.to_string())
}

/// Extract a query parameter value from a URI.
fn extract_query_param(uri: &str, param: &str) -> Option<String> {
    let query = uri.split('?').nth(1)?;
    for pair in query.split('&') {
        let mut kv = pair.splitn(2, '=');
        if kv.next()? == param {
            return kv.next().map(|v| v.to_string());
        }
    }
    None
}

/// Expand a leading `~/` to the home directory.
fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = home_dir().ok_or_else(|| ShareError::Config {
                message: "Cannot determine home directory".to_string(),
            })?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}

fn home_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE").ok().map(PathBuf::from)
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME").ok().map(PathBuf::from)
    }
}
