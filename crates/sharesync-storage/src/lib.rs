//! Storage backend implementations for sharesync.
//!
//! This crate provides concrete implementations of the
//! [`StorageBackend`](sharesync_core::StorageBackend) trait:
//!
//! - [`S3Backend`]: S3-compatible object storage (AWS S3 or Cloudflare R2)
//! - [`LocalBackend`]: filesystem-backed storage for development
//! - [`MemoryBackend`]: in-process storage for tests and throwaway nodes

pub mod local;
pub mod memory;
pub mod s3;

pub use local::LocalBackend;
pub use memory::MemoryBackend;
pub use s3::S3Backend;
