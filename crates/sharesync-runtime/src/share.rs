//! The share service: share lifecycle, authorization, sync and compacted reads.
//!
//! A share is created for one session and identified by a short id derived
//! from the session id. Writers holding the share's secret append batches of
//! [`Data`] items with [`ShareService::sync`]; anyone may read the compacted
//! result with [`ShareService::data`].
//!
//! # Persisted layout
//!
//! - `share/{share_id}.json`: the [`ShareRecord`]
//! - `share_event/{share_id}/{event_id}.json`: one synced batch
//! - `share_compaction/{share_id}.json`: the compaction snapshot

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use sharesync_core::{Data, EventId, Kv, Result, SessionId, ShareError, ShareId, StorageBackend};

use crate::compaction::{Compactor, COMPACTION_PREFIX};
use crate::event_log::{EventLog, RemovalReport, EVENT_PREFIX};
use crate::identifier::{DescendingIdGenerator, EventIdGenerator};
use crate::view::ShareView;

/// Path segment under which share records live.
pub const SHARE_PREFIX: &str = "share";

/// Prefix marking non-production shares and sessions.
pub const TEST_PREFIX: &str = "test_";

/// Number of trailing session id characters forming a share id.
const SHARE_ID_LENGTH: usize = 8;

/// A persisted share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareRecord {
    pub id: ShareId,
    pub secret: String,
    #[serde(rename = "sessionID")]
    pub session_id: SessionId,
}

impl ShareRecord {
    /// Path at which viewers open the share, `/share/{id}`.
    pub fn url_path(&self) -> String {
        format!("/{SHARE_PREFIX}/{}", self.id)
    }

    /// The share's public link under `base_url` (scheme and host), or just
    /// its path when no base is known.
    pub fn link(&self, base_url: Option<&str>) -> ShareLink {
        let path = self.url_path();
        ShareLink {
            id: self.id.clone(),
            secret: self.secret.clone(),
            url: match base_url {
                Some(base) => format!("{}{path}", base.trim_end_matches('/')),
                None => path,
            },
        }
    }
}

/// What a share's creator is handed back: the id, the write secret and the
/// link to give to viewers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareLink {
    pub id: ShareId,
    pub secret: String,
    pub url: String,
}

/// Credentials for mutating a share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareAuth {
    pub id: ShareId,
    pub secret: String,
}

impl ShareAuth {
    pub fn new(id: impl Into<ShareId>, secret: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            secret: secret.into(),
        }
    }
}

impl From<&ShareRecord> for ShareAuth {
    fn from(record: &ShareRecord) -> Self {
        Self {
            id: record.id.clone(),
            secret: record.secret.clone(),
        }
    }
}

/// Derive the share id of a session.
///
/// The id is the last eight characters of the session id, prefixed with
/// `test_` for non-production shares.
pub fn share_id_for(session_id: &SessionId, non_production: bool) -> ShareId {
    let session = session_id.as_str();
    let start = session
        .char_indices()
        .rev()
        .nth(SHARE_ID_LENGTH - 1)
        .map_or(0, |(i, _)| i);
    let is_test = non_production || session.starts_with(TEST_PREFIX);
    let prefix = if is_test { TEST_PREFIX } else { "" };
    ShareId::new(format!("{prefix}{}", &session[start..]))
}

/// Compare secrets without exiting early on the first mismatch.
fn secrets_match(expected: &str, provided: &str) -> bool {
    let (a, b) = (expected.as_bytes(), provided.as_bytes());
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Builder for [`ShareService`].
pub struct ShareServiceBuilder {
    storage: Arc<dyn StorageBackend>,
    ids: Arc<dyn EventIdGenerator>,
    request_timeout: Option<Duration>,
    non_production: bool,
}

impl ShareServiceBuilder {
    /// Use a specific event id generator.
    pub fn id_generator(mut self, ids: Arc<dyn EventIdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// Bound every storage call by `timeout`.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Mark every created share as non-production.
    pub fn non_production(mut self, non_production: bool) -> Self {
        self.non_production = non_production;
        self
    }

    pub fn build(self) -> ShareService {
        let mut kv = Kv::new(self.storage);
        if let Some(timeout) = self.request_timeout {
            kv = kv.with_timeout(timeout);
        }
        let log = EventLog::new(kv.clone(), self.ids);
        let compactor = Compactor::new(kv.clone(), log.clone());
        ShareService {
            kv,
            log,
            compactor,
            non_production: self.non_production,
        }
    }
}

/// Share lifecycle and data operations over injected storage.
///
/// Cloning is cheap; clones share the storage handle and the per-share
/// compaction locks.
#[derive(Clone)]
pub struct ShareService {
    kv: Kv,
    log: EventLog,
    compactor: Compactor,
    non_production: bool,
}

impl ShareService {
    /// Service with a time-based id generator and no request deadline.
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self::builder(storage).build()
    }

    pub fn builder(storage: Arc<dyn StorageBackend>) -> ShareServiceBuilder {
        ShareServiceBuilder {
            storage,
            ids: Arc::new(DescendingIdGenerator::new()),
            request_timeout: None,
            non_production: false,
        }
    }

    /// The id a share for `session_id` would get from this service.
    pub fn share_id_for(&self, session_id: &SessionId) -> ShareId {
        share_id_for(session_id, self.non_production)
    }

    /// Create a share for a session.
    ///
    /// # Errors
    ///
    /// [`ShareError::AlreadyExists`] if a share with the derived id exists.
    pub async fn create(&self, session_id: impl Into<SessionId>) -> Result<ShareRecord> {
        let session_id = session_id.into();
        let record = ShareRecord {
            id: self.share_id_for(&session_id),
            secret: Uuid::new_v4().to_string(),
            session_id,
        };
        if !self.kv.create(&[SHARE_PREFIX, record.id.as_str()], &record).await? {
            return Err(ShareError::AlreadyExists { id: record.id });
        }
        info!(share_id = %record.id, session_id = %record.session_id, "Created share");
        Ok(record)
    }

    /// Look a share up. No authorization is required.
    pub async fn get(&self, id: &ShareId) -> Result<Option<ShareRecord>> {
        self.kv.read(&[SHARE_PREFIX, id.as_str()]).await
    }

    /// Delete a share, its events and its snapshot.
    ///
    /// The record goes first, so the share is gone even if some events
    /// survive. Event and snapshot deletions are best effort: failures are
    /// logged and returned in the report, never rolled back.
    #[instrument(skip(self, auth), fields(share_id = %auth.id))]
    pub async fn remove(&self, auth: &ShareAuth) -> Result<RemovalReport> {
        self.authorize(auth).await?;
        self.kv.remove(&[SHARE_PREFIX, auth.id.as_str()]).await?;

        let mut report = match self.log.remove_all(&auth.id).await {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "Failed to list events of removed share");
                RemovalReport {
                    removed: 0,
                    failed: vec![(vec![EVENT_PREFIX.to_string(), auth.id.to_string()], e)],
                }
            }
        };
        report.record(
            vec![COMPACTION_PREFIX.to_string(), auth.id.to_string()],
            self.compactor.remove(&auth.id).await,
        );

        info!(
            removed = report.removed,
            failed = report.failed.len(),
            "Removed share"
        );
        Ok(report)
    }

    /// Append a batch of items to the share as one event.
    ///
    /// # Errors
    ///
    /// [`ShareError::NotFound`] or [`ShareError::InvalidSecret`]; nothing is
    /// appended in either case.
    #[instrument(skip(self, auth, items), fields(share_id = %auth.id, items = items.len()))]
    pub async fn sync(&self, auth: &ShareAuth, items: &[Data]) -> Result<EventId> {
        self.authorize(auth).await?;
        let event_id = self.log.append(&auth.id, items).await?;
        debug!(event_id = %event_id, "Synced");
        Ok(event_id)
    }

    /// The share's compacted data: one item per merge key, sorted by merge
    /// key, each the most recently synced version.
    ///
    /// # Errors
    ///
    /// [`ShareError::NotFound`] if the share does not exist.
    pub async fn data(&self, id: &ShareId) -> Result<Vec<Data>> {
        self.require(id).await?;
        self.compactor.compact(id).await
    }

    /// The share's compacted data grouped for display.
    ///
    /// # Errors
    ///
    /// [`ShareError::NotFound`] if the share does not exist, and
    /// [`ShareError::SessionDataMissing`] if its session was never synced.
    pub async fn view(&self, id: &ShareId) -> Result<ShareView> {
        let record = self.require(id).await?;
        let data = self.compactor.compact(id).await?;
        ShareView::build(&record, data)
    }

    async fn require(&self, id: &ShareId) -> Result<ShareRecord> {
        self.get(id)
            .await?
            .ok_or_else(|| ShareError::NotFound { id: id.clone() })
    }

    async fn authorize(&self, auth: &ShareAuth) -> Result<ShareRecord> {
        let record = self.require(&auth.id).await?;
        if !secrets_match(&record.secret, &auth.secret) {
            warn!(share_id = %auth.id, "Rejected share secret");
            return Err(ShareError::InvalidSecret {
                id: auth.id.clone(),
            });
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_share_id_is_session_suffix() {
        let session = SessionId::new("ses_0123456789abcdef");
        assert_eq!(share_id_for(&session, false), ShareId::new("89abcdef"));
    }

    #[test]
    fn test_share_id_test_prefix() {
        let session = SessionId::new("test_session_abcdefgh");
        assert_eq!(share_id_for(&session, false), ShareId::new("test_abcdefgh"));

        let session = SessionId::new("ses_0123456789abcdef");
        assert_eq!(share_id_for(&session, true), ShareId::new("test_89abcdef"));
    }

    #[test]
    fn test_share_id_of_short_session() {
        assert_eq!(share_id_for(&SessionId::new("abc"), false), ShareId::new("abc"));
    }

    #[test]
    fn test_share_id_counts_characters_not_bytes() {
        let session = SessionId::new("ses_ééééééééé");
        assert_eq!(share_id_for(&session, false), ShareId::new("éééééééé"));
    }

    #[test]
    fn test_secrets_match() {
        assert!(secrets_match("abc", "abc"));
        assert!(!secrets_match("abc", "abd"));
        assert!(!secrets_match("abc", "abcd"));
        assert!(!secrets_match("abc", ""));
    }

    #[test]
    fn test_record_wire_format() {
        let record = ShareRecord {
            id: ShareId::new("89abcdef"),
            secret: "s3cret".to_string(),
            session_id: SessionId::new("ses_0123456789abcdef"),
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "id": "89abcdef",
                "secret": "s3cret",
                "sessionID": "ses_0123456789abcdef"
            })
        );
    }

    #[test]
    fn test_link_joins_base_and_path() {
        let record = ShareRecord {
            id: ShareId::new("89abcdef"),
            secret: "s3cret".to_string(),
            session_id: SessionId::new("ses_0123456789abcdef"),
        };
        assert_eq!(record.url_path(), "/share/89abcdef");
        assert_eq!(record.link(None).url, "/share/89abcdef");

        let link = record.link(Some("https://share.example.com/"));
        assert_eq!(link.url, "https://share.example.com/share/89abcdef");
        assert_eq!(link.secret, "s3cret");
        assert_eq!(
            serde_json::to_value(&link).unwrap(),
            serde_json::json!({
                "id": "89abcdef",
                "secret": "s3cret",
                "url": "https://share.example.com/share/89abcdef"
            })
        );
    }

    /// Issues ids from a scripted wall clock.
    struct ScriptedClock {
        ids: DescendingIdGenerator,
        millis: std::sync::Mutex<std::vec::IntoIter<u64>>,
    }

    impl EventIdGenerator for ScriptedClock {
        fn next_id(&self) -> EventId {
            let millis = self
                .millis
                .lock()
                .unwrap()
                .next()
                .expect("clock script exhausted");
            self.ids.id_at(millis)
        }
    }

    #[tokio::test]
    async fn test_sync_after_clock_crosses_48_bits_is_visible() {
        let boundary = 26 * (1u64 << 36);
        let script = vec![boundary - 2, boundary - 1, boundary];
        let clock = ScriptedClock {
            ids: DescendingIdGenerator::new(),
            millis: std::sync::Mutex::new(script.into_iter()),
        };
        let service = ShareService::builder(Arc::new(sharesync_storage::MemoryBackend::new()))
            .id_generator(Arc::new(clock))
            .build();
        let record = service.create("ses_clockwrap1").await.unwrap();
        let auth = ShareAuth::from(&record);
        let text = |value: &str| {
            Data::Part(sharesync_core::data::Part::text(
                "p1",
                "ses_clockwrap1",
                "msg1",
                value,
            ))
        };

        service.sync(&auth, &[text("v1")]).await.unwrap();
        service.sync(&auth, &[text("v2")]).await.unwrap();
        service.data(&record.id).await.unwrap();
        service.sync(&auth, &[text("v3")]).await.unwrap();

        let data = service.data(&record.id).await.unwrap();
        match data.as_slice() {
            [Data::Part(part)] => assert_eq!(part.text_content(), Some("v3")),
            other => panic!("unexpected data {other:?}"),
        }
    }
}
