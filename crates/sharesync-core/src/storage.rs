//! The StorageBackend trait: the single interface for all object storage.
//!
//! Every stored document in sharesync goes through this trait. Implementations
//! include an S3-compatible backend (AWS S3 and Cloudflare R2), a filesystem
//! backend and an in-memory backend. Share logic never talks to a provider
//! directly; it goes through the [`Kv`](crate::kv::Kv) façade.

use async_trait::async_trait;
use bytes::Bytes;

use crate::Result;

/// Suffix appended to every logical key to form the stored object name.
pub const KEY_SUFFIX: &str = ".json";

/// Options for [`StorageBackend::list`].
///
/// `after` and `before` are logical names relative to `prefix` (no suffix).
/// They are deliberately asymmetric: `after` becomes a start-after marker the
/// backend applies while listing, `before` is a filter applied to whatever the
/// backend returned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// Raw key prefix, usually ending in `/`. Empty lists everything.
    pub prefix: String,
    /// Maximum number of keys the backend should return.
    pub limit: Option<usize>,
    /// Only keys strictly after `prefix + after + ".json"`.
    pub after: Option<String>,
    /// Only keys strictly before `prefix + before + ".json"`.
    pub before: Option<String>,
}

impl ListOptions {
    /// List everything under `prefix`.
    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Default::default()
        }
    }

    /// The start-after marker key, if `after` is set.
    pub fn after_key(&self) -> Option<String> {
        self.after
            .as_ref()
            .map(|after| format!("{}{}{}", self.prefix, after, KEY_SUFFIX))
    }

    /// The exclusive upper bound key, if `before` is set.
    pub fn before_key(&self) -> Option<String> {
        self.before
            .as_ref()
            .map(|before| format!("{}{}{}", self.prefix, before, KEY_SUFFIX))
    }

    /// Drop keys at or beyond the `before` bound.
    ///
    /// Backends call this after fetching a page, never as part of the
    /// storage request itself.
    pub fn retain_before(&self, keys: &mut Vec<String>) {
        if let Some(bound) = self.before_key() {
            keys.retain(|key| key.as_str() < bound.as_str());
        }
    }
}

/// The storage interface for all sharesync documents.
///
/// Implementations must be `Send + Sync` for use across async tasks.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Read an object. Returns `Ok(None)` if the key does not exist.
    async fn read(&self, key: &str) -> Result<Option<Bytes>>;

    /// Write an object. Overwrites if it already exists.
    async fn write(&self, key: &str, data: Bytes) -> Result<()>;

    /// Conditional write: succeeds only if the key does not already exist.
    ///
    /// Returns `Ok(true)` if the key was created, `Ok(false)` if it already
    /// existed and nothing was written.
    async fn write_if_absent(&self, key: &str, data: Bytes) -> Result<bool>;

    /// Delete an object. Does not error if the key does not exist.
    async fn remove(&self, key: &str) -> Result<()>;

    /// List keys matching `options`, in lexicographic order.
    async fn list(&self, options: &ListOptions) -> Result<Vec<String>>;
}
