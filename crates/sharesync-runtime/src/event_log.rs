//! Append-only event log of a share.
//!
//! Every `sync` batch is stored as one immutable document,
//! `share_event/{share_id}/{event_id}.json`. Event ids descend, so object
//! storage lists a share's events newest-first. [`NewestFirst`] and
//! [`OldestFirst`] carry that direction in the type system: listings come back
//! as `NewestFirst`, and replay only accepts `OldestFirst`.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, warn};

use sharesync_core::{Data, EventId, Kv, ListQuery, Result, ShareError, ShareId};

use crate::identifier::EventIdGenerator;

/// Path segment under which event documents live.
pub const EVENT_PREFIX: &str = "share_event";

/// How many removals run at once when a share's log is deleted.
const REMOVE_CONCURRENCY: usize = 16;

/// Items in reverse chronological order, as object storage lists events.
#[derive(Debug, Clone, PartialEq)]
pub struct NewestFirst<T>(Vec<T>);

/// Items in chronological order, as compaction must replay them.
#[derive(Debug, Clone, PartialEq)]
pub struct OldestFirst<T>(Vec<T>);

impl<T> NewestFirst<T> {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Reverse into chronological order.
    pub fn into_oldest_first(mut self) -> OldestFirst<T> {
        self.0.reverse();
        OldestFirst(self.0)
    }
}

impl<T> OldestFirst<T> {
    /// Wrap items that are already in chronological order.
    pub fn from_chronological(items: Vec<T>) -> Self {
        Self(items)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.0.iter()
    }

    /// The most recent item.
    pub fn newest(&self) -> Option<&T> {
        self.0.last()
    }

    /// Pair each item with the value at the same position of `other`.
    pub fn zip<U>(self, other: Vec<U>) -> OldestFirst<(T, U)> {
        OldestFirst(self.0.into_iter().zip(other).collect())
    }
}

impl<T> IntoIterator for OldestFirst<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Outcome of deleting a batch of documents where individual failures are
/// tolerated.
#[derive(Debug, Default)]
pub struct RemovalReport {
    /// Documents deleted.
    pub removed: usize,
    /// Documents that could not be deleted, with the error for each.
    pub failed: Vec<(Vec<String>, ShareError)>,
}

impl RemovalReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub(crate) fn record(&mut self, key: Vec<String>, result: Result<()>) {
        match result {
            Ok(()) => self.removed += 1,
            Err(e) => {
                warn!(key = %key.join("/"), error = %e, "Failed to remove document");
                self.failed.push((key, e));
            }
        }
    }
}

/// The per-share event log.
#[derive(Clone)]
pub struct EventLog {
    kv: Kv,
    ids: Arc<dyn EventIdGenerator>,
}

impl EventLog {
    pub fn new(kv: Kv, ids: Arc<dyn EventIdGenerator>) -> Self {
        Self { kv, ids }
    }

    /// Append `items` as one new event and return its id.
    pub async fn append(&self, share_id: &ShareId, items: &[Data]) -> Result<EventId> {
        let event_id = self.ids.next_id();
        self.kv
            .write(&[EVENT_PREFIX, share_id.as_str(), event_id.as_str()], items)
            .await?;
        debug!(share_id = %share_id, event_id = %event_id, items = items.len(), "Appended event");
        Ok(event_id)
    }

    /// Every event of the share, newest first.
    pub async fn events(&self, share_id: &ShareId) -> Result<NewestFirst<EventId>> {
        self.list(ListQuery::prefix(&[EVENT_PREFIX, share_id.as_str()]))
            .await
    }

    /// Events appended after `cursor` (all events when there is no cursor),
    /// oldest first.
    pub async fn since(
        &self,
        share_id: &ShareId,
        cursor: Option<&EventId>,
    ) -> Result<OldestFirst<EventId>> {
        let mut query = ListQuery::prefix(&[EVENT_PREFIX, share_id.as_str()]);
        if let Some(cursor) = cursor {
            // Newer ids sort lower, so "after the cursor in time" is
            // "before the cursor in key order".
            query = query.before(cursor.as_str());
        }
        Ok(self.list(query).await?.into_oldest_first())
    }

    /// Read the items of one event. `None` if the event no longer exists.
    pub async fn read(&self, share_id: &ShareId, event_id: &EventId) -> Result<Option<Vec<Data>>> {
        self.kv
            .read(&[EVENT_PREFIX, share_id.as_str(), event_id.as_str()])
            .await
    }

    /// Delete every event of the share.
    ///
    /// Removals are independent: a failure is recorded in the report and the
    /// remaining events are still attempted.
    pub async fn remove_all(&self, share_id: &ShareId) -> Result<RemovalReport> {
        let keys = self
            .kv
            .list(&ListQuery::prefix(&[EVENT_PREFIX, share_id.as_str()]))
            .await?;

        let results: Vec<(Vec<String>, Result<()>)> = stream::iter(keys)
            .map(|key| async move {
                let result = self.kv.remove(&key).await;
                (key, result)
            })
            .buffer_unordered(REMOVE_CONCURRENCY)
            .collect()
            .await;

        let mut report = RemovalReport::default();
        for (key, result) in results {
            report.record(key, result);
        }
        Ok(report)
    }

    async fn list(&self, query: ListQuery) -> Result<NewestFirst<EventId>> {
        let keys = self.kv.list(&query).await?;
        let ids = keys
            .into_iter()
            .filter_map(|mut segments| segments.pop().map(EventId::new))
            .collect();
        Ok(NewestFirst(ids))
    }
}
