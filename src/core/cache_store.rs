//! Bounded key -> entry map with LRU eviction
//!
//! Thin layer over `lru::LruCache`:
//! - Capacity is fixed at construction (one store per resource kind)
//! - `get`, `set` and `touch` all count as use; `peek` does not
//! - `set` reports which entry (if any) was pushed out
//!
//! Not synchronized. The coordinator keeps the store behind the same mutex
//! as its in-flight table so transitions are applied in one step.

use std::fmt;
use std::hash::Hash;
use std::num::NonZeroUsize;

use log::trace;
use lru::LruCache;

pub struct CacheStore<K: Hash + Eq, E> {
    entries: LruCache<K, E>,
}

impl<K, E> CacheStore<K, E>
where
    K: Hash + Eq + Clone + fmt::Debug,
{
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: LruCache::new(capacity),
        }
    }

    /// Get entry and mark it most recently used.
    pub fn get(&mut self, key: &K) -> Option<&E> {
        self.entries.get(key)
    }

    /// Mutable access, also counts as a touch.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut E> {
        self.entries.get_mut(key)
    }

    /// Read without affecting recency (stats, debugging)
    pub fn peek(&self, key: &K) -> Option<&E> {
        self.entries.peek(key)
    }

    /// Insert or replace. Returns the least recently used pair if the
    /// insert pushed the store over capacity.
    pub fn set(&mut self, key: K, entry: E) -> Option<(K, E)> {
        let inserted = key.clone();
        match self.entries.push(key, entry) {
            // push() hands back the old value when the key was already present
            Some((old_key, _)) if old_key == inserted => None,
            Some((evicted_key, evicted)) => {
                trace!("LRU evicted {:?}", evicted_key);
                Some((evicted_key, evicted))
            }
            None => None,
        }
    }

    /// Mark as most recently used. Returns false if absent.
    pub fn touch(&mut self, key: &K) -> bool {
        if self.entries.contains(key) {
            self.entries.promote(key);
            true
        } else {
            false
        }
    }

    pub fn delete(&mut self, key: &K) -> Option<E> {
        self.entries.pop(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Keys from most to least recently used
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.iter().map(|(k, _)| k)
    }
}

impl<K: Hash + Eq, E> fmt::Debug for CacheStore<K, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStore")
            .field("len", &self.entries.len())
            .field("capacity", &self.entries.cap())
            .finish()
    }
}
