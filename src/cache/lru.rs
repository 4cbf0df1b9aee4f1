//! LRU (Least Recently Used) cache implementation for block caching.

use super::Cache;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};

/// A unique identifier for a cached block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Table file identifier
    pub file_id: u64,
    /// Block offset in the file
    pub offset: u64,
}

impl CacheKey {
    /// Create a new cache key
    pub fn new(file_id: u64, offset: u64) -> Self {
        Self { file_id, offset }
    }
}

/// Statistics for cache performance monitoring.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Total number of cache lookups
    pub lookups: u64,
    /// Number of cache hits
    pub hits: u64,
    /// Number of cache misses
    pub misses: u64,
    /// Number of insertions
    pub insertions: u64,
    /// Number of evictions
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        if self.lookups == 0 {
            0.0
        } else {
            self.hits as f64 / self.lookups as f64
        }
    }
}

#[derive(Debug, Default)]
struct LruState {
    entries: HashMap<CacheKey, Bytes>,
    /// Most recently used at the back.
    order: VecDeque<CacheKey>,
    size: usize,
}

impl LruState {
    fn touch(&mut self, key: &CacheKey) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
        self.order.push_back(*key);
    }

    fn evict_one(&mut self) -> bool {
        match self.order.pop_front() {
            Some(key) => {
                if let Some(value) = self.entries.remove(&key) {
                    self.size -= value.len();
                }
                true
            }
            None => false,
        }
    }
}

/// Thread-safe LRU cache for decompressed table blocks, bounded by the total
/// number of cached bytes.
///
/// # Examples
///
/// ```
/// use lsm_sstable::cache::{BlockCache, Cache};
/// use bytes::Bytes;
///
/// let cache = BlockCache::new(8 * 1024 * 1024);
/// cache.insert(1, 0, Bytes::from_static(b"block"));
/// assert!(cache.get(1, 0).is_some());
/// ```
#[derive(Debug)]
pub struct BlockCache {
    /// Maximum cache capacity in bytes
    capacity: usize,
    state: Mutex<LruState>,
    stats: RwLock<CacheStats>,
}

impl BlockCache {
    /// Create a new BlockCache holding at most `capacity` bytes. A capacity of
    /// 0 disables caching.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(LruState::default()),
            stats: RwLock::new(CacheStats::default()),
        }
    }

    /// Get current cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.stats.read().clone()
    }

    /// Reset cache statistics to zero.
    pub fn reset_stats(&self) {
        *self.stats.write() = CacheStats::default();
    }

    /// Clear all entries from the cache.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.order.clear();
        state.size = 0;
    }

    /// Get the current size of cached data in bytes.
    pub fn size(&self) -> usize {
        self.state.lock().size
    }

    /// Get the cache capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get the number of entries in the cache.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Cache for BlockCache {
    fn get(&self, file_id: u64, offset: u64) -> Option<Bytes> {
        let key = CacheKey::new(file_id, offset);
        let found = if self.capacity == 0 {
            None
        } else {
            let mut state = self.state.lock();
            let found = state.entries.get(&key).cloned();
            if found.is_some() {
                state.touch(&key);
            }
            found
        };

        let mut stats = self.stats.write();
        stats.lookups += 1;
        if found.is_some() {
            stats.hits += 1;
        } else {
            stats.misses += 1;
        }
        found
    }

    fn insert(&self, file_id: u64, offset: u64, block: Bytes) {
        // Blocks larger than the whole cache are never kept
        if self.capacity == 0 || block.len() > self.capacity {
            return;
        }

        let key = CacheKey::new(file_id, offset);
        let mut evictions = 0;
        {
            let mut state = self.state.lock();
            if let Some(old) = state.entries.remove(&key) {
                state.size -= old.len();
                if let Some(pos) = state.order.iter().position(|k| k == &key) {
                    state.order.remove(pos);
                }
            }
            while state.size + block.len() > self.capacity && state.evict_one() {
                evictions += 1;
            }
            state.size += block.len();
            state.entries.insert(key, block);
            state.order.push_back(key);
        }

        let mut stats = self.stats.write();
        stats.insertions += 1;
        stats.evictions += evictions;
    }
}
