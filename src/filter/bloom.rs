//! Bloom Filter implementation.
//!
//! A space-efficient probabilistic data structure used to test whether an element
//! is a member of a set. False positive matches are possible, but false negatives are not.

use crate::error::{Error, Result};
use crate::filter::Filter;
use xxhash_rust::xxh64::xxh64;

/// Name of the filter policy, recorded in the metaindex and properties.
pub const BLOOM_POLICY_NAME: &str = "lsm_sstable.BuiltinBloomFilter";

/// BloomFilter provides probabilistic set membership testing.
///
/// # Example
/// ```
/// use lsm_sstable::filter::{BloomFilterBuilder, Filter};
///
/// let mut builder = BloomFilterBuilder::new(10);
/// builder.add(b"key1");
/// builder.add(b"key2");
/// let filter = builder.finish();
///
/// assert!(filter.may_contain(b"key1"));
/// assert!(filter.may_contain(b"key2"));
/// ```
#[derive(Debug, Clone)]
pub struct BloomFilter {
    /// Bit array for the bloom filter
    bits: Vec<u8>,
    /// Number of hash functions to use
    num_hashes: u32,
    /// Number of bits in the filter
    num_bits: usize,
}

impl BloomFilter {
    /// Create a BloomFilter with a specific number of bits per key.
    pub fn with_bits_per_key(num_keys: usize, bits_per_key: usize) -> Self {
        let num_bits = (num_keys * bits_per_key).max(64);
        let num_hashes = ((bits_per_key as f64) * 0.69).round() as u32; // 0.69 ~= ln(2)
        let num_hashes = num_hashes.clamp(1, 30);

        Self { bits: vec![0u8; num_bits.div_ceil(8)], num_hashes, num_bits }
    }

    /// Bit positions probed for a key hash, using double hashing:
    /// h_i = h1 + i * h2 (mod m)
    fn probes(&self, hash: u64) -> impl Iterator<Item = usize> + '_ {
        let h1 = hash as u32;
        let h2 = (hash >> 32) as u32 | 1;
        (0..self.num_hashes)
            .map(move |i| (h1.wrapping_add(i.wrapping_mul(h2)) as usize) % self.num_bits)
    }

    fn add_hash(&mut self, hash: u64) {
        let positions: Vec<usize> = self.probes(hash).collect();
        for pos in positions {
            self.bits[pos / 8] |= 1 << (pos % 8);
        }
    }

    /// Get the size of the filter in bytes.
    pub fn size(&self) -> usize {
        self.bits.len()
    }

    /// Get the number of hash functions used.
    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    /// Get the number of bits in the filter.
    pub fn num_bits(&self) -> usize {
        self.num_bits
    }
}

fn key_hash(key: &[u8]) -> u64 {
    xxh64(key, 0xbc9f_1d34)
}

impl Filter for BloomFilter {
    /// Returns `false` only if the key was definitely never added.
    fn may_contain(&self, key: &[u8]) -> bool {
        self.probes(key_hash(key)).all(|pos| self.bits[pos / 8] & (1 << (pos % 8)) != 0)
    }

    /// Encode the filter to bytes for storage.
    ///
    /// Format:
    /// [num_hashes: 4 bytes][num_bits: 8 bytes][bits: variable]
    fn encode(&self) -> Vec<u8> {
        let mut encoded = Vec::with_capacity(12 + self.bits.len());
        encoded.extend_from_slice(&self.num_hashes.to_le_bytes());
        encoded.extend_from_slice(&(self.num_bits as u64).to_le_bytes());
        encoded.extend_from_slice(&self.bits);
        encoded
    }

    /// Decode a filter from bytes.
    fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < 12 {
            return Err(Error::corruption("Bloom filter data too short"));
        }

        let num_hashes = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        let num_bits = u64::from_le_bytes([
            data[4], data[5], data[6], data[7], data[8], data[9], data[10], data[11],
        ]) as usize;

        if num_bits == 0 || num_hashes == 0 || data.len() != 12 + num_bits.div_ceil(8) {
            return Err(Error::corruption("Bloom filter size mismatch"));
        }

        Ok(Self { bits: data[12..].to_vec(), num_hashes, num_bits })
    }
}

/// Collects key hashes while a table is written and sizes the filter once
/// the number of keys is known.
#[derive(Debug, Clone)]
pub struct BloomFilterBuilder {
    bits_per_key: usize,
    hashes: Vec<u64>,
}

impl BloomFilterBuilder {
    /// Create a builder allocating `bits_per_key` bits per added key.
    pub fn new(bits_per_key: usize) -> Self {
        Self { bits_per_key, hashes: Vec::new() }
    }

    /// Add a key to the filter.
    pub fn add(&mut self, key: &[u8]) {
        self.hashes.push(key_hash(key));
    }

    /// Number of keys added so far.
    pub fn num_keys(&self) -> usize {
        self.hashes.len()
    }

    /// Build the filter.
    pub fn finish(self) -> BloomFilter {
        let mut filter = BloomFilter::with_bits_per_key(self.hashes.len(), self.bits_per_key);
        for hash in self.hashes {
            filter.add_hash(hash);
        }
        filter
    }
}
