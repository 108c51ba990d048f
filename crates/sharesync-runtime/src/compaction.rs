//! Log compaction with last-write-wins merging.
//!
//! A share's snapshot holds one [`Data`] item per merge key, sorted by merge
//! key, plus the cursor: the id of the newest event already folded in.
//! Compacting reads only the events appended after the cursor, replays them
//! oldest to newest over the snapshot and persists the result. Reads therefore
//! cost one listing plus the new events, however long the log grows.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, instrument};

use sharesync_core::binary::{search_by, Search};
use sharesync_core::{Data, EventId, Kv, Result, ShareId};

use crate::event_log::{EventLog, OldestFirst};

/// Path segment under which snapshots live.
pub const COMPACTION_PREFIX: &str = "share_compaction";

/// The compacted state of one share.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Newest event folded into `data`.
    #[serde(rename = "event", default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<EventId>,
    /// One item per merge key, sorted ascending by merge key.
    #[serde(default)]
    pub data: Vec<Data>,
}

impl Snapshot {
    /// Merge one item: replace the entry with the same merge key, or insert
    /// the item at its sorted position.
    pub fn merge(&mut self, item: Data) {
        let key = item.merge_key().into_owned();
        match search_by(&self.data, |entry| (*entry.merge_key()).cmp(key.as_str())) {
            Search::Found(i) => self.data[i] = item,
            Search::Vacant(i) => self.data.insert(i, item),
        }
    }

    /// Replay events over the snapshot and move the cursor to the newest one.
    ///
    /// Events whose body is `None` (deleted between listing and reading) are
    /// skipped but still advance the cursor.
    pub fn fold(&mut self, events: OldestFirst<(EventId, Option<Vec<Data>>)>) {
        if let Some((newest, _)) = events.newest() {
            let newest = newest.clone();
            for (_, items) in events {
                for item in items.into_iter().flatten() {
                    self.merge(item);
                }
            }
            self.cursor = Some(newest);
        }
    }
}

/// Per-share async locks serializing compaction inside one process.
///
/// Entries are dropped again once no task holds or waits for them.
#[derive(Debug, Default)]
pub struct CompactionLocks {
    locks: Mutex<HashMap<ShareId, Arc<AsyncMutex<()>>>>,
}

impl CompactionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive compaction rights on `share_id`.
    pub async fn acquire(&self, share_id: &ShareId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry(share_id.clone())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Number of shares with a live lock entry.
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Folds a share's pending events into its snapshot.
#[derive(Clone)]
pub struct Compactor {
    kv: Kv,
    log: EventLog,
    locks: Arc<CompactionLocks>,
}

impl Compactor {
    pub fn new(kv: Kv, log: EventLog) -> Self {
        Self {
            kv,
            log,
            locks: Arc::new(CompactionLocks::new()),
        }
    }

    /// Read the stored snapshot without compacting.
    pub async fn snapshot(&self, share_id: &ShareId) -> Result<Snapshot> {
        Ok(self
            .kv
            .read(&[COMPACTION_PREFIX, share_id.as_str()])
            .await?
            .unwrap_or_default())
    }

    /// Compact the share and return its up-to-date data.
    ///
    /// Nothing is written when no event is newer than the cursor.
    ///
    /// # Errors
    ///
    /// Storage and serialization errors from reading the snapshot, listing or
    /// reading events, or persisting the new snapshot.
    #[instrument(skip(self), fields(share_id = %share_id))]
    pub async fn compact(&self, share_id: &ShareId) -> Result<Vec<Data>> {
        let _guard = self.locks.acquire(share_id).await;

        let mut snapshot = self.snapshot(share_id).await?;
        let pending = self.log.since(share_id, snapshot.cursor.as_ref()).await?;
        if pending.is_empty() {
            debug!("No pending events");
            return Ok(snapshot.data);
        }

        let bodies = try_join_all(pending.iter().map(|id| self.log.read(share_id, id))).await?;
        let count = pending.len();
        snapshot.fold(pending.zip(bodies));

        self.kv
            .write(&[COMPACTION_PREFIX, share_id.as_str()], &snapshot)
            .await?;
        info!(
            pending = count,
            items = snapshot.data.len(),
            cursor = ?snapshot.cursor,
            "Compacted share"
        );
        Ok(snapshot.data)
    }

    /// Delete the share's snapshot.
    pub async fn remove(&self, share_id: &ShareId) -> Result<()> {
        self.kv.remove(&[COMPACTION_PREFIX, share_id.as_str()]).await
    }
}
