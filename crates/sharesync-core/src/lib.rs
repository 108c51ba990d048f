//! sharesync core types, traits, configuration, and errors.
//!
//! This crate provides the building blocks shared by every layer of
//! sharesync: typed identifiers, the [`StorageBackend`] trait and its
//! [`Kv`] JSON façade, the synced [`Data`] model with its merge keys, the
//! sorted-slice [`binary`] search, configuration, and the unified error type.

pub mod binary;
pub mod config;
pub mod data;
pub mod error;
pub mod kv;
pub mod storage;
pub mod types;

pub use config::{Credentials, ShareConfig, StorageConfig};
pub use data::Data;
pub use error::ShareError;
pub use kv::{Kv, ListQuery};
pub use storage::{ListOptions, StorageBackend};
pub use types::*;

/// Convenience Result type using [`ShareError`].
pub type Result<T> = std::result::Result<T, ShareError>;
