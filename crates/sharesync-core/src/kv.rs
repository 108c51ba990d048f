//! Key-value façade over a [`StorageBackend`].
//!
//! Keys are arrays of path segments. `["share_event", "abc", "0f3e"]` is
//! stored as the object `share_event/abc/0f3e.json`, holding the JSON
//! serialization of the value. Every backend call is bounded by the façade's
//! request timeout; an elapsed deadline is reported as a storage error.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::ShareError;
use crate::storage::{ListOptions, StorageBackend, KEY_SUFFIX};
use crate::Result;

/// Resolve path segments to the stored object key.
pub fn resolve<S: AsRef<str>>(segments: &[S]) -> String {
    let mut key = join(segments);
    key.push_str(KEY_SUFFIX);
    key
}

/// Split a stored object key back into path segments.
pub fn segments(key: &str) -> Vec<String> {
    key.strip_suffix(KEY_SUFFIX)
        .unwrap_or(key)
        .split('/')
        .map(str::to_string)
        .collect()
}

fn join<S: AsRef<str>>(segments: &[S]) -> String {
    segments
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join("/")
}

/// A listing request expressed in path segments.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    /// Segments every listed key starts with.
    pub prefix: Vec<String>,
    /// Maximum number of keys requested from the backend.
    pub limit: Option<usize>,
    /// Logical name after which listing starts.
    pub after: Option<String>,
    /// Logical name before which results are cut off.
    pub before: Option<String>,
}

impl ListQuery {
    /// List everything under the given segments.
    pub fn prefix<S: AsRef<str>>(prefix: &[S]) -> Self {
        Self {
            prefix: prefix.iter().map(|s| s.as_ref().to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn after(mut self, after: impl Into<String>) -> Self {
        self.after = Some(after.into());
        self
    }

    pub fn before(mut self, before: impl Into<String>) -> Self {
        self.before = Some(before.into());
        self
    }

    fn to_options(&self) -> ListOptions {
        let prefix = if self.prefix.is_empty() {
            String::new()
        } else {
            format!("{}/", join(&self.prefix))
        };
        ListOptions {
            prefix,
            limit: self.limit,
            after: self.after.clone(),
            before: self.before.clone(),
        }
    }
}

/// JSON documents addressed by path segments.
#[derive(Clone)]
pub struct Kv {
    storage: Arc<dyn StorageBackend>,
    timeout: Option<Duration>,
}

impl Kv {
    /// Wrap a backend with no request deadline.
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self {
            storage,
            timeout: None,
        }
    }

    /// Bound every backend call by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The underlying backend.
    pub fn storage(&self) -> &Arc<dyn StorageBackend> {
        &self.storage
    }

    /// Read and decode a document. Returns `Ok(None)` if it does not exist.
    pub async fn read<T, S>(&self, key: &[S]) -> Result<Option<T>>
    where
        T: DeserializeOwned,
        S: AsRef<str>,
    {
        let path = resolve(key);
        let Some(data) = self.bounded(&path, self.storage.read(&path)).await? else {
            return Ok(None);
        };
        let value = serde_json::from_slice(&data)
            .map_err(|e| ShareError::serialization(&path, e))?;
        Ok(Some(value))
    }

    /// Encode and write a document, replacing any existing one.
    pub async fn write<T, S>(&self, key: &[S], value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
        S: AsRef<str>,
    {
        let path = resolve(key);
        let data = encode(&path, value)?;
        self.bounded(&path, self.storage.write(&path, data)).await
    }

    /// Write a document only if none exists yet. Returns whether it was written.
    pub async fn create<T, S>(&self, key: &[S], value: &T) -> Result<bool>
    where
        T: Serialize + ?Sized,
        S: AsRef<str>,
    {
        let path = resolve(key);
        let data = encode(&path, value)?;
        self.bounded(&path, self.storage.write_if_absent(&path, data))
            .await
    }

    /// Delete a document. Missing documents are not an error.
    pub async fn remove<S: AsRef<str>>(&self, key: &[S]) -> Result<()> {
        let path = resolve(key);
        self.bounded(&path, self.storage.remove(&path)).await
    }

    /// List document keys, each split back into its segments.
    pub async fn list(&self, query: &ListQuery) -> Result<Vec<Vec<String>>> {
        let options = query.to_options();
        let keys = self
            .bounded(&options.prefix, self.storage.list(&options))
            .await?;
        debug!(prefix = %options.prefix, count = keys.len(), "Listed keys");
        Ok(keys.iter().map(|key| segments(key)).collect())
    }

    /// Read a document, apply `mutate` to it and write it back.
    ///
    /// Fails with [`ShareError::NotFound`] when the document does not exist.
    /// This is not a transaction: concurrent updates of one key can race and
    /// the last write wins.
    pub async fn update<T, S, F>(&self, key: &[S], mutate: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        S: AsRef<str>,
        F: FnOnce(&mut T),
    {
        let mut value: T = self.read(key).await?.ok_or_else(|| ShareError::NotFound {
            id: join(key).into(),
        })?;
        mutate(&mut value);
        self.write(key, &value).await?;
        Ok(value)
    }

    async fn bounded<T>(&self, key: &str, op: impl Future<Output = Result<T>>) -> Result<T> {
        match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, op).await.map_err(|_| {
                ShareError::storage_msg(format!("Storage call for {key} exceeded {timeout:?}"))
            })?,
            None => op.await,
        }
    }
}

fn encode<T: Serialize + ?Sized>(path: &str, value: &T) -> Result<Bytes> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(|e| ShareError::serialization(path, e))
}
