//! Compacted share data grouped the way viewers render it.

use std::collections::BTreeMap;

use serde::Serialize;

use sharesync_core::binary::search;
use sharesync_core::data::{FileDiff, Message, Model, Part, Session};
use sharesync_core::{Data, Result, SessionId, ShareError, ShareId};

use crate::share::ShareRecord;

/// A share's data grouped by kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShareView {
    #[serde(rename = "shareID")]
    pub share_id: ShareId,
    #[serde(rename = "sessionID")]
    pub session_id: SessionId,
    /// Sessions sorted by id.
    pub sessions: Vec<Session>,
    /// Messages keyed by session id.
    pub messages: BTreeMap<String, Vec<Message>>,
    /// Parts keyed by message id.
    pub parts: BTreeMap<String, Vec<Part>>,
    pub diffs: Vec<FileDiff>,
    pub models: Vec<Model>,
}

impl ShareView {
    /// Group compacted `data` of the share described by `record`.
    ///
    /// Items keep their compacted order within each group.
    ///
    /// # Errors
    ///
    /// [`ShareError::SessionDataMissing`] if the share's own session is not
    /// among the data.
    pub fn build(record: &ShareRecord, data: Vec<Data>) -> Result<Self> {
        let mut view = Self {
            share_id: record.id.clone(),
            session_id: record.session_id.clone(),
            sessions: Vec::new(),
            messages: BTreeMap::new(),
            parts: BTreeMap::new(),
            diffs: Vec::new(),
            models: Vec::new(),
        };

        for item in data {
            match item {
                Data::Session(session) => view.sessions.push(session),
                Data::Message(message) => view
                    .messages
                    .entry(message.session_id.clone())
                    .or_default()
                    .push(message),
                Data::Part(part) => view
                    .parts
                    .entry(part.message_id.clone())
                    .or_default()
                    .push(part),
                Data::SessionDiff(diffs) => view.diffs = diffs,
                Data::Model(models) => view.models = models,
            }
        }
        view.sessions.sort_by(|a, b| a.id.cmp(&b.id));

        let own = search(&view.sessions, record.session_id.as_str(), |s| s.id.as_str());
        if !own.is_found() {
            return Err(ShareError::SessionDataMissing {
                session_id: record.session_id.clone(),
            });
        }
        Ok(view)
    }

    /// The share's own session.
    pub fn session(&self) -> Option<&Session> {
        let found = search(&self.sessions, self.session_id.as_str(), |s| s.id.as_str());
        found.is_found().then(|| &self.sessions[found.index()])
    }

    /// Messages of the share's own session.
    pub fn messages(&self) -> &[Message] {
        self.messages
            .get(self.session_id.as_str())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Parts of one message.
    pub fn parts_of(&self, message_id: &str) -> &[Part] {
        self.parts.get(message_id).map(Vec::as_slice).unwrap_or_default()
    }
}
