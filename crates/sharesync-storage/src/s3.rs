//! S3-compatible object storage backend.
//!
//! [`S3Backend`] implements the [`StorageBackend`] trait using the
//! `object_store` crate, which signs every request with SigV4. Two providers
//! are supported by varying credentials and endpoint host:
//!
//! - AWS S3: `https://s3.{region}.amazonaws.com/{bucket}/{key}`
//! - Cloudflare R2: `https://{account_id}.r2.cloudflarestorage.com/{bucket}/{key}`
//!
//! `list` forwards `after` as the S3 `start-after` marker and `limit` as a cap
//! on the keys consumed from the listing; `before` is filtered client-side.
//! Conditional creates use `PutMode::Create` (`If-None-Match: *`).

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::{ClientOptions, ObjectStore, PutMode, PutOptions, PutPayload};
use tracing::{debug, instrument};

use sharesync_core::config::{Credentials, StorageConfig};
use sharesync_core::error::ShareError;
use sharesync_core::storage::{ListOptions, StorageBackend};
use sharesync_core::Result;

/// Region R2 expects in request signatures.
const R2_REGION: &str = "auto";

/// A [`StorageBackend`] backed by an S3-compatible object store.
pub struct S3Backend {
    store: Box<dyn ObjectStore>,
    bucket: String,
    endpoint: String,
}

impl S3Backend {
    /// Connect to AWS S3 in `region`.
    pub fn aws(
        bucket: &str,
        region: &str,
        credentials: Option<&Credentials>,
        timeout: Duration,
    ) -> Result<Self> {
        let endpoint = format!("https://s3.{region}.amazonaws.com");
        let builder = AmazonS3Builder::from_env().with_region(region);
        Self::build(builder, bucket, endpoint, credentials, timeout)
    }

    /// Connect to Cloudflare R2 for the given account.
    pub fn r2(
        account_id: &str,
        bucket: &str,
        credentials: Option<&Credentials>,
        timeout: Duration,
    ) -> Result<Self> {
        let endpoint = format!("https://{account_id}.r2.cloudflarestorage.com");
        let builder = AmazonS3Builder::from_env().with_region(R2_REGION);
        Self::build(builder, bucket, endpoint, credentials, timeout)
    }

    /// Connect according to a remote [`StorageConfig`].
    pub fn from_config(config: &StorageConfig, timeout: Duration) -> Result<Self> {
        match config {
            StorageConfig::S3 {
                bucket,
                region,
                credentials,
            } => Self::aws(bucket, region, credentials.as_ref(), timeout),
            StorageConfig::R2 {
                account_id,
                bucket,
                credentials,
            } => Self::r2(account_id, bucket, credentials.as_ref(), timeout),
            other => Err(ShareError::Config {
                message: format!("Not an S3-compatible storage config: {other:?}"),
            }),
        }
    }

    fn build(
        mut builder: AmazonS3Builder,
        bucket: &str,
        endpoint: String,
        credentials: Option<&Credentials>,
        timeout: Duration,
    ) -> Result<Self> {
        builder = builder
            .with_bucket_name(bucket)
            .with_endpoint(&endpoint)
            .with_client_options(ClientOptions::new().with_timeout(timeout));

        if let Some(credentials) = credentials {
            builder = builder
                .with_access_key_id(&credentials.access_key_id)
                .with_secret_access_key(&credentials.secret_access_key);
        }

        let store = builder.build().map_err(|e| {
            ShareError::storage(format!("Failed to create S3 client for {endpoint}/{bucket}"), e)
        })?;

        debug!(bucket = %bucket, endpoint = %endpoint, "S3Backend initialised");

        Ok(Self {
            store: Box::new(store),
            bucket: bucket.to_string(),
            endpoint,
        })
    }

    /// The base URL objects are addressed under.
    pub fn base_url(&self) -> String {
        format!("{}/{}", self.endpoint, self.bucket)
    }
}

#[async_trait]
impl StorageBackend for S3Backend {
    #[instrument(skip(self), fields(key = %key))]
    async fn read(&self, key: &str) -> Result<Option<Bytes>> {
        let path = ObjectPath::from(key);
        let result = match self.store.get(&path).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(ShareError::storage(format!("Failed to read {key}"), e)),
        };
        let bytes = result
            .bytes()
            .await
            .map_err(|e| ShareError::storage(format!("Failed to read body of {key}"), e))?;
        Ok(Some(bytes))
    }

    #[instrument(skip(self, data), fields(key = %key, size = data.len()))]
    async fn write(&self, key: &str, data: Bytes) -> Result<()> {
        let path = ObjectPath::from(key);
        self.store
            .put(&path, PutPayload::from(data))
            .await
            .map_err(|e| ShareError::storage(format!("Failed to write {key}"), e))?;
        Ok(())
    }

    #[instrument(skip(self, data), fields(key = %key, size = data.len()))]
    async fn write_if_absent(&self, key: &str, data: Bytes) -> Result<bool> {
        let path = ObjectPath::from(key);
        let opts = PutOptions {
            mode: PutMode::Create,
            ..Default::default()
        };
        match self
            .store
            .put_opts(&path, PutPayload::from(data), opts)
            .await
        {
            Ok(_) => Ok(true),
            Err(object_store::Error::AlreadyExists { .. }) => Ok(false),
            // Some S3-compatible stores return Precondition instead of AlreadyExists
            Err(object_store::Error::Precondition { .. }) => Ok(false),
            Err(e) => Err(ShareError::storage(
                format!("Failed to conditionally write {key}"),
                e,
            )),
        }
    }

    #[instrument(skip(self), fields(key = %key))]
    async fn remove(&self, key: &str) -> Result<()> {
        let path = ObjectPath::from(key);
        // S3 delete is idempotent; it does not error if key is missing
        self.store
            .delete(&path)
            .await
            .map_err(|e| ShareError::storage(format!("Failed to remove {key}"), e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(prefix = %options.prefix))]
    async fn list(&self, options: &ListOptions) -> Result<Vec<String>> {
        let trimmed = options.prefix.trim_end_matches('/');
        let prefix = (!trimmed.is_empty()).then(|| ObjectPath::from(trimmed));

        let mut stream = match options.after_key() {
            Some(after) => self
                .store
                .list_with_offset(prefix.as_ref(), &ObjectPath::from(after)),
            None => self.store.list(prefix.as_ref()),
        };

        // S3 pages arrive in key order, so the first `limit` keys consumed
        // are the first `limit` keys of the range.
        let limit = options.limit.unwrap_or(usize::MAX);
        let mut keys = Vec::new();
        while keys.len() < limit {
            let Some(meta) = stream.try_next().await.map_err(|e| {
                ShareError::storage(format!("Failed to list {}", options.prefix), e)
            })?
            else {
                break;
            };
            let key = meta.location.to_string();
            if key.starts_with(&options.prefix) {
                keys.push(key);
            }
        }

        options.retain_before(&mut keys);
        debug!("Listed {} keys with prefix '{}'", keys.len(), options.prefix);
        Ok(keys)
    }
}
