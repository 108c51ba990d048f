//! Event identifier generation.
//!
//! Event keys must list newest-first: compaction relies on "sorts before the
//! cursor" meaning "appended after the cursor". Generators are injected into
//! the share service through [`EventIdGenerator`] so that contract can be
//! exercised with a deterministic fake.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::Utc;
use uuid::Uuid;

use sharesync_core::EventId;

const BASE62: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Number of random base62 characters after the time component.
const RANDOM_LENGTH: usize = 14;

/// Ids per millisecond. Past this the generator borrows the next millisecond.
const COUNTER_SPAN: u64 = 0x1000;

/// Source of event identifiers.
///
/// Contract: for two ids issued in sequence, the later one compares
/// lexicographically smaller.
pub trait EventIdGenerator: Send + Sync {
    fn next_id(&self) -> EventId;
}

/// Time-based generator producing descending ids.
///
/// An id is `millis * 0x1000 + counter`, bitwise inverted, as 16 hex digits,
/// followed by 14 random base62 characters. The whole `u64` is rendered so
/// the time component never wraps. Within one process ids are strictly
/// descending even if the wall clock steps backwards.
#[derive(Debug, Default)]
pub struct DescendingIdGenerator {
    clock: Mutex<Clock>,
}

#[derive(Debug, Default)]
struct Clock {
    last_millis: u64,
    counter: u64,
}

impl DescendingIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn id_at(&self, millis: u64) -> EventId {
        let value = {
            let mut clock = self.clock.lock().unwrap_or_else(|e| e.into_inner());
            let millis = millis.max(clock.last_millis);
            if millis != clock.last_millis {
                clock.last_millis = millis;
                clock.counter = 0;
            }
            clock.counter += 1;
            if clock.counter == COUNTER_SPAN {
                clock.last_millis = clock.last_millis.saturating_add(1);
                clock.counter = 1;
            }
            clock
                .last_millis
                .saturating_mul(COUNTER_SPAN)
                .saturating_add(clock.counter)
        };
        EventId::new(format!("{:016x}{}", !value, random_base62(RANDOM_LENGTH)))
    }
}

impl EventIdGenerator for DescendingIdGenerator {
    fn next_id(&self) -> EventId {
        let millis = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0);
        self.id_at(millis)
    }
}

/// Deterministic generator counting down from `u64::MAX`.
///
/// Useful wherever reproducible keys matter more than wall-clock order.
#[derive(Debug, Default)]
pub struct SequentialIdGenerator {
    issued: AtomicU64,
}

impl SequentialIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventIdGenerator for SequentialIdGenerator {
    fn next_id(&self) -> EventId {
        let n = self.issued.fetch_add(1, Ordering::SeqCst);
        EventId::new(format!("{:016x}", u64::MAX - n))
    }
}

fn random_base62(length: usize) -> String {
    let mut out = String::with_capacity(length);
    while out.len() < length {
        for byte in Uuid::new_v4().into_bytes() {
            if out.len() == length {
                break;
            }
            out.push(BASE62[usize::from(byte) % BASE62.len()] as char);
        }
    }
    out
}
