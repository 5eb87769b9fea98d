//! Prefix index over live keys.
//!
//! [`RadixKeyIndex`] answers "which keys start with P" in time proportional
//! to the prefix length plus the number of matches. The store keeps it in
//! step with the live (non-tombstoned) keys of its map.

mod arena;
mod compare;
mod radix;

pub use compare::{bytes_equal, common_prefix_len, fnv1a};
pub use radix::RadixTree;

use bytes::Bytes;
use parking_lot::Mutex;

/// Thread-safe radix trie of keys.
///
/// One mutex guards the whole trie. Visitors run while it is held and must
/// not call back into the index.
#[derive(Debug, Default)]
pub struct RadixKeyIndex {
    tree: Mutex<RadixTree>,
}

impl RadixKeyIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `key`; empty keys and duplicates are ignored.
    pub fn add(&self, key: &[u8]) {
        self.tree.lock().insert(key);
    }

    /// Removes `key`, returning whether it was present.
    pub fn remove(&self, key: &[u8]) -> bool {
        self.tree.lock().remove(key)
    }

    /// Returns true if `key` is indexed.
    #[must_use]
    pub fn contains(&self, key: &[u8]) -> bool {
        self.tree.lock().contains(key)
    }

    /// Calls `visitor` for every indexed key starting with `prefix`, in
    /// lexicographic order. An empty prefix visits every key.
    pub fn visit_by_prefix(&self, prefix: &[u8], visitor: impl FnMut(&[u8])) {
        self.tree.lock().visit_prefix(prefix, visitor);
    }

    /// Collects the keys starting with `prefix`.
    #[must_use]
    pub fn keys_with_prefix(&self, prefix: &[u8]) -> Vec<Bytes> {
        let mut keys = Vec::new();
        self.visit_by_prefix(prefix, |k| keys.push(Bytes::copy_from_slice(k)));
        keys
    }

    /// Replaces the contents with `keys`, starting from a fresh arena.
    ///
    /// This is the only way to give back arena space held by removed keys.
    pub fn rebuild<I>(&self, keys: I)
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
    {
        let mut fresh = RadixTree::default();
        for key in keys {
            fresh.insert(key.as_ref());
        }

        let mut tree = self.tree.lock();
        tracing::debug!(
            keys = fresh.len(),
            arena_before = tree.arena_bytes(),
            arena_after = fresh.arena_bytes(),
            "rebuilt radix index"
        );
        *tree = fresh;
    }

    /// Number of indexed keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.lock().len()
    }

    /// Returns true if nothing is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.lock().is_empty()
    }

    /// Arena size in bytes.
    #[must_use]
    pub fn arena_bytes(&self) -> usize {
        self.tree.lock().arena_bytes()
    }
}
