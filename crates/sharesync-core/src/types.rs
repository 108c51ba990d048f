//! Typed identifiers for sharesync entities.
//!
//! Each identifier is a newtype wrapper around `String`, so a [`ShareId`]
//! cannot be passed where an [`EventId`] is expected. Identifiers order by
//! their string value, which is the order object storage lists them in.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Create a new identifier from a string.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Return the inner string value.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id!(
    /// Identifier of a share, derived from the tail of its session id.
    ShareId
);

define_id!(
    /// Identifier of the collaborative session a share publishes.
    SessionId
);

define_id!(
    /// Identifier of one appended event.
    ///
    /// Generated ids sort newest-first: an id that compares smaller was
    /// issued later.
    EventId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_creation() {
        let id = ShareId::new("abcd1234");
        assert_eq!(id.as_str(), "abcd1234");
        assert_eq!(id.to_string(), "abcd1234");
    }

    #[test]
    fn test_id_ordering_is_lexicographic() {
        let a = EventId::new("ffff0000");
        let b = EventId::new("ffff0001");
        assert!(a < b);
    }

    #[test]
    fn test_id_from_string() {
        let id: SessionId = "ses_01".into();
        assert_eq!(id.as_str(), "ses_01");
    }

    #[test]
    fn test_id_serializes_as_plain_string() {
        let id = ShareId::new("test_1234");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"test_1234\"");
        let back: ShareId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
