//! Whole-table key filters.
//!
//! A table may carry one filter over its user keys, stored in the meta block
//! named `fullfilter.<policy>`. A point lookup whose key the filter rules out
//! skips the index and data blocks.

pub mod bloom;

pub use bloom::{BloomFilter, BloomFilterBuilder};

/// A probabilistic set of user keys as stored in a filter block.
pub trait Filter {
    /// False only if `key` was never added. May return true for keys that
    /// were not added.
    fn may_contain(&self, key: &[u8]) -> bool;

    /// Contents of the filter block.
    fn encode(&self) -> Vec<u8>;

    /// Parse the contents of a filter block.
    fn decode(data: &[u8]) -> crate::Result<Self>
    where
        Self: Sized;
}
