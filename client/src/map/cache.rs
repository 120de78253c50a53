//! Bounded LRU cache shared by chunk data and rendered chunk images

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

/// Cached value with the recency stamp of its latest access
struct Entry<V> {
    value: V,
    stamp: u64,
}

/// LRU cache keyed by `K`.
///
/// Recency is tracked with an access log of `(key, stamp)` pairs; log records
/// whose stamp no longer matches the entry are stale and skipped during
/// eviction. The log is compacted once it grows past twice the capacity, so
/// `get` and `set` stay amortized O(1).
pub struct LruCache<K, V> {
    entries: HashMap<K, Entry<V>>,
    access_log: VecDeque<(K, u64)>,
    capacity: usize,
    clock: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl<K, V> LruCache<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
{
    /// Create a cache holding at most `capacity` entries (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: HashMap::with_capacity(capacity),
            access_log: VecDeque::with_capacity(capacity * 2),
            capacity,
            clock: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    /// Check if key exists in cache (does not touch recency)
    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Get a value, marking it most recently used
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let stamp = self.clock + 1;
        match self.entries.get_mut(key) {
            Some(entry) => entry.stamp = stamp,
            None => {
                self.misses += 1;
                return None;
            }
        }
        self.clock = stamp;
        self.hits += 1;
        self.access_log.push_back((key.clone(), stamp));
        self.compact_if_needed();
        self.entries.get(key).map(|entry| &entry.value)
    }

    /// Get a value without updating recency (for read-only checks)
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.entries.get(key).map(|entry| &entry.value)
    }

    /// Insert or overwrite a value, marking it most recently used.
    /// Returns the evicted entry when a new key pushed the cache over capacity.
    pub fn set(&mut self, key: K, value: V) -> Option<(K, V)> {
        self.clock += 1;
        let stamp = self.clock;
        let mut evicted = None;

        if let Some(entry) = self.entries.get_mut(&key) {
            entry.value = value;
            entry.stamp = stamp;
        } else {
            if self.entries.len() >= self.capacity {
                evicted = self.evict_oldest();
            }
            self.entries.insert(key.clone(), Entry { value, stamp });
        }

        self.access_log.push_back((key, stamp));
        self.compact_if_needed();
        evicted
    }

    /// Remove a specific entry
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|entry| entry.value)
    }

    /// Evict the least recently used entry
    fn evict_oldest(&mut self) -> Option<(K, V)> {
        while let Some((key, stamp)) = self.access_log.pop_front() {
            let live = self
                .entries
                .get(&key)
                .is_some_and(|entry| entry.stamp == stamp);
            if live {
                let entry = self.entries.remove(&key)?;
                self.evictions += 1;
                log::debug!("Evicted cache entry {:?}", key);
                return Some((key, entry.value));
            }
        }
        None
    }

    fn compact_if_needed(&mut self) {
        if self.access_log.len() <= self.capacity * 2 {
            return;
        }
        let entries = &self.entries;
        self.access_log
            .retain(|(key, stamp)| entries.get(key).is_some_and(|entry| entry.stamp == *stamp));
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            capacity: self.capacity,
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over all cached keys (unordered)
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.keys()
    }

    /// Iterate over all cached values without touching recency
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.values().map(|entry| &entry.value)
    }
}

/// Cache statistics for debugging/UI
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    pub fn usage_percent(&self) -> f32 {
        if self.capacity == 0 {
            0.0
        } else {
            (self.entries as f32 / self.capacity as f32) * 100.0
        }
    }

    pub fn hit_rate(&self) -> f32 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f32 / lookups as f32
        }
    }
}
