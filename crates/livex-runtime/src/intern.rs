#![forbid(unsafe_code)]

//! Sharded, reference-counted intern tables and the `NodeRef` guard.
//!
//! # Design
//!
//! An [`InternTable`] maps keys to shared values with an explicit reference
//! count per entry. It is split into shards, each behind its own
//! `parking_lot::Mutex`; the node table uses one shard per node kind so that
//! unrelated graphs build concurrently.
//!
//! # Invariants
//!
//! 1. A shard lock is held only while deciding identity and mutating counts.
//!    No user code, evaluation, or teardown ever runs under it.
//! 2. An entry exists exactly while its count is positive.
//! 3. Values handed back by [`InternTable::release`] or left over from a lost
//!    race are dropped by the caller after the shard lock is released.
//!
//! # Failure Modes
//!
//! - **Count imbalance**: every `acquire`/`retain` must be paired with one
//!   `release`. [`NodeRef`] enforces the pairing for nodes through `Clone` and
//!   `Drop`.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::node::ActiveNode;

struct Entry<V> {
    value: Arc<V>,
    refs: usize,
}

/// Reference-counted map from keys to shared values.
pub(crate) struct InternTable<K, V> {
    shards: Box<[Mutex<FxHashMap<K, Entry<V>>>]>,
}

impl<K: Eq + Hash + Clone, V> InternTable<K, V> {
    pub(crate) fn new(shards: usize) -> Self {
        Self {
            shards: (0..shards.max(1))
                .map(|_| Mutex::new(FxHashMap::default()))
                .collect(),
        }
    }

    fn shard(&self, shard: usize) -> &Mutex<FxHashMap<K, Entry<V>>> {
        &self.shards[shard % self.shards.len()]
    }

    /// Take a reference to the entry for `key`, creating it from `init` if
    /// missing.
    ///
    /// Returns the value, whether it was created, and `init` when it was not
    /// consumed. The caller drops the leftover after this returns.
    pub(crate) fn acquire_with<I>(
        &self,
        shard: usize,
        key: &K,
        init: I,
        create: impl FnOnce(I) -> Arc<V>,
    ) -> (Arc<V>, bool, Option<I>) {
        let mut map = self.shard(shard).lock();
        if let Some(entry) = map.get_mut(key) {
            entry.refs += 1;
            return (Arc::clone(&entry.value), false, Some(init));
        }
        let value = create(init);
        map.insert(
            key.clone(),
            Entry {
                value: Arc::clone(&value),
                refs: 1,
            },
        );
        (value, true, None)
    }

    /// Take a reference to an existing entry.
    pub(crate) fn acquire_existing(&self, shard: usize, key: &K) -> Option<Arc<V>> {
        let mut map = self.shard(shard).lock();
        map.get_mut(key).map(|entry| {
            entry.refs += 1;
            Arc::clone(&entry.value)
        })
    }

    /// Insert `value` unless another thread got there first.
    ///
    /// Returns the winning value and whether it is `value`. A losing `value`
    /// is handed back inside the result's `Err` so the caller can drop it
    /// outside the lock.
    pub(crate) fn insert_or_acquire(
        &self,
        shard: usize,
        key: K,
        value: Arc<V>,
    ) -> Result<Arc<V>, (Arc<V>, Arc<V>)> {
        let mut map = self.shard(shard).lock();
        if let Some(entry) = map.get_mut(&key) {
            entry.refs += 1;
            return Err((Arc::clone(&entry.value), value));
        }
        map.insert(
            key,
            Entry {
                value: Arc::clone(&value),
                refs: 1,
            },
        );
        Ok(value)
    }

    /// Add a reference to a live entry. Returns `false` if it is gone.
    pub(crate) fn retain(&self, shard: usize, key: &K) -> bool {
        match self.shard(shard).lock().get_mut(key) {
            Some(entry) => {
                entry.refs += 1;
                true
            }
            None => false,
        }
    }

    /// Drop a reference; returns the value when this was the last one.
    pub(crate) fn release(&self, shard: usize, key: &K) -> Option<Arc<V>> {
        let mut map = self.shard(shard).lock();
        let entry = map.get_mut(key)?;
        entry.refs = entry.refs.saturating_sub(1);
        if entry.refs > 0 {
            return None;
        }
        map.remove(key).map(|entry| entry.value)
    }

    pub(crate) fn ref_count(&self, shard: usize, key: &K) -> usize {
        self.shard(shard).lock().get(key).map_or(0, |entry| entry.refs)
    }

    /// Total number of live entries across shards.
    pub(crate) fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.lock().len()).sum()
    }
}

// ---------------------------------------------------------------------------
// NodeRef
// ---------------------------------------------------------------------------

/// Owning reference to an interned active node.
///
/// Cloning adds a table reference; dropping removes one. Dropping the last
/// reference removes the node from its table and tears it down.
pub(crate) struct NodeRef {
    node: Arc<ActiveNode>,
}

impl NodeRef {
    /// Wrap a node whose table reference was already taken by the caller.
    pub(crate) fn adopt(node: Arc<ActiveNode>) -> Self {
        Self { node }
    }

    pub(crate) fn node(&self) -> &Arc<ActiveNode> {
        &self.node
    }
}

impl Clone for NodeRef {
    fn clone(&self) -> Self {
        let retained = self
            .node
            .tables()
            .nodes
            .retain(self.node.shard(), self.node.key());
        debug_assert!(retained, "NodeRef cloned after its entry was released");
        Self {
            node: Arc::clone(&self.node),
        }
    }
}

impl Drop for NodeRef {
    fn drop(&mut self) {
        let released = self
            .node
            .tables()
            .nodes
            .release(self.node.shard(), self.node.key());
        if let Some(node) = released {
            debug!(kind = ?node.kind(), "node released");
            node.teardown();
        }
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRef")
            .field("kind", &self.node.kind())
            .field("refs", &self.node.ref_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_creates_once_and_counts() {
        let table = InternTable::<&str, u32>::new(2);
        let (a, created, leftover) = table.acquire_with(0, &"k", 1, |v| Arc::new(v));
        assert!(created);
        assert!(leftover.is_none());

        let (b, created, leftover) = table.acquire_with(0, &"k", 2, |v| Arc::new(v));
        assert!(!created);
        assert_eq!(leftover, Some(2));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(table.ref_count(0, &"k"), 2);
    }

    #[test]
    fn release_removes_at_zero() {
        let table = InternTable::<u8, u8>::new(1);
        table.acquire_with(0, &1, 7, Arc::new);
        assert!(table.retain(0, &1));
        assert!(table.release(0, &1).is_none());
        assert_eq!(table.len(), 1);
        assert_eq!(table.release(0, &1).as_deref(), Some(&7));
        assert_eq!(table.len(), 0);
        assert!(!table.retain(0, &1));
        assert!(table.release(0, &1).is_none());
    }

    #[test]
    fn insert_or_acquire_prefers_existing() {
        let table = InternTable::<u8, u8>::new(1);
        let first = table.insert_or_acquire(0, 1, Arc::new(1)).unwrap();
        let (winner, loser) = table.insert_or_acquire(0, 1, Arc::new(2)).unwrap_err();
        assert!(Arc::ptr_eq(&first, &winner));
        assert_eq!(*loser, 2);
        assert_eq!(table.ref_count(0, &1), 2);
        assert!(table.acquire_existing(0, &1).is_some());
        assert!(table.acquire_existing(0, &9).is_none());
    }

    #[test]
    fn shards_are_independent() {
        let table = InternTable::<u8, u8>::new(3);
        table.acquire_with(0, &1, 1, Arc::new);
        table.acquire_with(1, &1, 2, Arc::new);
        assert_eq!(table.len(), 2);
        assert_eq!(table.ref_count(2, &1), 0);
    }
}
