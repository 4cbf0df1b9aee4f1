//! Block cache shared between table readers.
//!
//! Readers only see the [`Cache`] capability: fetch a decompressed block by
//! file and offset, or populate it after a miss. Eviction policy is up to the
//! implementation; [`BlockCache`] is an LRU bounded by bytes.

mod lru;

pub use lru::{BlockCache, CacheKey, CacheStats};

use bytes::Bytes;
use std::fmt;

/// Fetch-or-populate access to decompressed blocks, keyed by file identity
/// and block offset.
///
/// Implementations must be safe for concurrent `get` and `insert`.
pub trait Cache: fmt::Debug + Send + Sync {
    /// Returns the cached block, or `None` on a miss.
    fn get(&self, file_id: u64, offset: u64) -> Option<Bytes>;

    /// Stores a block. The cache may decline to keep it.
    fn insert(&self, file_id: u64, offset: u64, block: Bytes);
}
