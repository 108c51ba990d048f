//! Data items synced into a share.
//!
//! A share's event log is a sequence of batches of [`Data`] items. Every item
//! has a merge key; compaction keeps one item per key, the most recent one.
//!
//! Payloads model only the identity fields sharesync needs. Everything else a
//! producer sends is kept in `extra` and written back unchanged.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One synced item, tagged by kind.
///
/// Serialized as `{"type": "<kind>", "data": <payload>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Data {
    /// Session metadata. Singleton per share.
    Session(Session),
    /// A chat message.
    Message(Message),
    /// One part of a chat message.
    Part(Part),
    /// The session's file diffs, replaced as a whole.
    SessionDiff(Vec<FileDiff>),
    /// The models used by the session, replaced as a whole.
    Model(Vec<Model>),
}

impl Data {
    /// The identity used to deduplicate items during compaction.
    pub fn merge_key(&self) -> Cow<'_, str> {
        match self {
            Data::Session(_) => Cow::Borrowed("session"),
            Data::Message(message) => Cow::Owned(format!("message/{}", message.id)),
            Data::Part(part) => Cow::Owned(format!("{}/{}", part.message_id, part.id)),
            Data::SessionDiff(_) => Cow::Borrowed("session_diff"),
            Data::Model(_) => Cow::Borrowed("model"),
        }
    }

    /// The wire tag of this item's kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Data::Session(_) => "session",
            Data::Message(_) => "message",
            Data::Part(_) => "part",
            Data::SessionDiff(_) => "session_diff",
            Data::Model(_) => "model",
        }
    }
}

/// Session metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(rename = "sessionID")]
    pub session_id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A part of a chat message (text, tool call, file, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    pub id: String,
    #[serde(rename = "sessionID")]
    pub session_id: String,
    #[serde(rename = "messageID")]
    pub message_id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A single file's change within the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDiff {
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additions: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletions: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A model descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub id: String,
    #[serde(rename = "providerID", default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            extra: Map::new(),
        }
    }
}

impl FileDiff {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            before: None,
            after: None,
            additions: None,
            deletions: None,
            extra: Map::new(),
        }
    }
}

impl Message {
    pub fn new(id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            session_id: session_id.into(),
            extra: Map::new(),
        }
    }
}

impl Part {
    pub fn new(
        id: impl Into<String>,
        session_id: impl Into<String>,
        message_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            session_id: session_id.into(),
            message_id: message_id.into(),
            extra: Map::new(),
        }
    }

    /// A text part.
    pub fn text(
        id: impl Into<String>,
        session_id: impl Into<String>,
        message_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        let mut part = Self::new(id, session_id, message_id);
        part.extra.insert("type".to_string(), Value::from("text"));
        part.extra.insert("text".to_string(), Value::from(text.into()));
        part
    }

    /// The `text` field of a text part.
    pub fn text_content(&self) -> Option<&str> {
        self.extra.get("text").and_then(Value::as_str)
    }
}
