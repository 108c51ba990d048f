//! In-memory storage backend.
//!
//! [`MemoryBackend`] keeps objects in a sorted map. It is the backend tests
//! inject into the share service, so it also counts writes and can be told to
//! fail removals of specific keys.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;

use sharesync_core::error::ShareError;
use sharesync_core::storage::{ListOptions, StorageBackend};
use sharesync_core::Result;

/// A [`StorageBackend`] holding every object in process memory.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    objects: Mutex<BTreeMap<String, Bytes>>,
    failing_removals: Mutex<HashSet<String>>,
    writes: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `write`/`write_if_absent` calls that stored data.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.lock_objects().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make every later `remove` of `key` fail with a storage error.
    pub fn fail_removal_of(&self, key: impl Into<String>) {
        self.failing_removals
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.into());
    }

    fn lock_objects(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Bytes>> {
        self.objects.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn read(&self, key: &str) -> Result<Option<Bytes>> {
        Ok(self.lock_objects().get(key).cloned())
    }

    async fn write(&self, key: &str, data: Bytes) -> Result<()> {
        self.lock_objects().insert(key.to_string(), data);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn write_if_absent(&self, key: &str, data: Bytes) -> Result<bool> {
        let mut objects = self.lock_objects();
        if objects.contains_key(key) {
            return Ok(false);
        }
        objects.insert(key.to_string(), data);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let failing = self
            .failing_removals
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(key);
        if failing {
            return Err(ShareError::storage_msg(format!(
                "Failed to remove {key}: injected failure"
            )));
        }
        self.lock_objects().remove(key);
        Ok(())
    }

    async fn list(&self, options: &ListOptions) -> Result<Vec<String>> {
        let after = options.after_key();
        let limit = options.limit.unwrap_or(usize::MAX);
        let mut keys: Vec<String> = self
            .lock_objects()
            .keys()
            .filter(|key| key.starts_with(&options.prefix))
            .filter(|key| after.as_ref().map_or(true, |a| key.as_str() > a.as_str()))
            .take(limit)
            .cloned()
            .collect();
        options.retain_before(&mut keys);
        Ok(keys)
    }
}
