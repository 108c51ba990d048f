//! Binary search over slices kept sorted by a derived key.
//!
//! Compaction keeps share data sorted by merge key and viewers keep sessions
//! sorted by id; both look entries up (or find where to insert them) through
//! [`search`] or [`search_by`].

use std::cmp::Ordering;

/// Outcome of a [`search`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Search {
    /// An element with the key exists at this index.
    Found(usize),
    /// No element has the key; inserting at this index keeps the slice sorted.
    Vacant(usize),
}

impl Search {
    /// Whether the key was present.
    pub fn is_found(&self) -> bool {
        matches!(self, Search::Found(_))
    }

    /// The match index, or the insertion point when absent.
    pub fn index(&self) -> usize {
        match *self {
            Search::Found(i) | Search::Vacant(i) => i,
        }
    }
}

/// Find `key` in `items`, which must be sorted ascending by `key_fn`.
pub fn search<T, K, F>(items: &[T], key: &K, key_fn: F) -> Search
where
    K: Ord + ?Sized,
    F: Fn(&T) -> &K,
{
    search_by(items, |item| key_fn(item).cmp(key))
}

/// Find an element using a comparator that reports how an element orders
/// relative to the target.
pub fn search_by<T, F>(items: &[T], cmp: F) -> Search
where
    F: FnMut(&T) -> Ordering,
{
    match items.binary_search_by(cmp) {
        Ok(i) => Search::Found(i),
        Err(i) => Search::Vacant(i),
    }
}

/// Replace the element sharing `item`'s key, or insert it at its sorted
/// position. Returns the index the item ended up at.
pub fn upsert_by<T, F>(items: &mut Vec<T>, item: T, mut cmp: F) -> usize
where
    F: FnMut(&T, &T) -> Ordering,
{
    match search_by(items, |entry| cmp(entry, &item)) {
        Search::Found(i) => {
            items[i] = item;
            i
        }
        Search::Vacant(i) => {
            items.insert(i, item);
            i
        }
    }
}
