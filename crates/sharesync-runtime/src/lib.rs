//! sharesync runtime: share lifecycle, event log and compaction.
//!
//! This crate contains the [`ShareService`], which creates shares, appends
//! synced batches to their event logs and serves compacted data, and the
//! [`ShareNode`], which wires the service to the storage backend named by a
//! [`ShareConfig`](sharesync_core::ShareConfig).

pub mod compaction;
pub mod event_log;
pub mod identifier;
pub mod node;
pub mod share;
pub mod view;

pub use compaction::{CompactionLocks, Compactor, Snapshot};
pub use event_log::{EventLog, NewestFirst, OldestFirst, RemovalReport};
pub use identifier::{DescendingIdGenerator, EventIdGenerator, SequentialIdGenerator};
pub use node::ShareNode;
pub use share::{share_id_for, ShareAuth, ShareLink, ShareRecord, ShareService, ShareServiceBuilder};
pub use view::ShareView;
