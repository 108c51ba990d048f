//! Unified error types for sharesync.
//!
//! All errors are represented by [`ShareError`], using `thiserror` for
//! ergonomic definitions. The three share-level kinds (`NotFound`,
//! `InvalidSecret`, `AlreadyExists`) are permanent for a given input; storage
//! failures are transient and reported separately.

use thiserror::Error;

use crate::types::{SessionId, ShareId};

/// The unified error type for all sharesync operations.
#[derive(Error, Debug)]
pub enum ShareError {
    /// No share record exists for this id.
    #[error("Share not found: {id}")]
    NotFound {
        /// The share id that was looked up.
        id: ShareId,
    },

    /// The supplied secret does not match the share record.
    #[error("Share secret invalid: {id}")]
    InvalidSecret {
        /// The share whose secret was rejected.
        id: ShareId,
    },

    /// A share record already exists for this id.
    #[error("Share already exists: {id}")]
    AlreadyExists {
        /// The conflicting share id.
        id: ShareId,
    },

    /// A storage operation failed (non-success response, network error,
    /// or deadline elapsed).
    #[error("Storage error: {message}")]
    Storage {
        /// Human-readable description of the failure.
        message: String,
        /// The underlying error, if available.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A storage key the backend cannot address safely.
    #[error("Invalid storage key: {key:?}")]
    InvalidKey {
        /// The rejected key.
        key: String,
    },

    /// A stored document could not be encoded or decoded.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Description of the malformed document.
        message: String,
    },

    /// Invalid configuration was provided.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration problem.
        message: String,
    },

    /// The compacted data of a share does not contain its own session.
    #[error("Session data missing for {session_id}")]
    SessionDataMissing {
        /// The session the share was created for.
        session_id: SessionId,
    },

    /// An internal error (bug).
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl ShareError {
    /// Create a storage error from a message and source error.
    pub fn storage(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a storage error from a message only.
    pub fn storage_msg(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Create a serialization error for the document at `key`.
    pub fn serialization(key: &str, source: serde_json::Error) -> Self {
        Self::Serialization {
            message: format!("{key}: {source}"),
        }
    }

    /// Whether a caller may retry the operation unchanged.
    ///
    /// Only storage failures are transient; the share-level kinds hold for
    /// as long as the stored state does.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage { .. })
    }

    /// The share id carried by the share-level kinds.
    pub fn share_id(&self) -> Option<&ShareId> {
        match self {
            Self::NotFound { id } | Self::InvalidSecret { id } | Self::AlreadyExists { id } => {
                Some(id)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_share_id() {
        let err = ShareError::InvalidSecret {
            id: ShareId::new("abc12345"),
        };
        assert_eq!(err.to_string(), "Share secret invalid: abc12345");
        assert_eq!(err.share_id().map(ShareId::as_str), Some("abc12345"));
    }

    #[test]
    fn test_only_storage_errors_are_retryable() {
        assert!(ShareError::storage_msg("503").is_retryable());
        assert!(!ShareError::NotFound {
            id: ShareId::new("x")
        }
        .is_retryable());
        assert!(!ShareError::AlreadyExists {
            id: ShareId::new("x")
        }
        .is_retryable());
        assert!(!ShareError::InvalidKey {
            key: "../x.json".to_string()
        }
        .is_retryable());
    }

    #[test]
    fn test_storage_error_keeps_source() {
        use std::error::Error as _;
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow");
        let err = ShareError::storage("read share/x.json", io);
        assert!(err.source().is_some());
        assert_eq!(err.share_id(), None);
    }
}
