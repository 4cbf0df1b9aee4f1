//! Configuration options for writing and reading tables.

use crate::cache::Cache;
use crate::comparer::{BytewiseComparer, Comparer};
use crate::error::{Error, Result};
use crate::sstable::block::MAX_BLOCK_FIELD_LEN;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Options shared by [`TableWriter`](crate::sstable::TableWriter) and
/// [`TableReader`](crate::sstable::TableReader).
///
/// The same comparer must be used to write and to read a table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Target uncompressed size of a data block (in bytes). A block is
    /// flushed once it reaches this size.
    /// Default: 4KB
    pub block_size: usize,

    /// Number of entries between restart points in data blocks.
    /// Default: 16
    pub block_restart_interval: usize,

    /// Compression applied to every block.
    /// Default: CompressionType::Snappy (with the `snappy` feature)
    pub compression: CompressionType,

    /// Checksum stored in every block trailer.
    /// Default: ChecksumType::Crc32c
    pub checksum: ChecksumType,

    /// Bits per key of the whole-table bloom filter. `None` writes no filter.
    /// Default: None
    pub filter_bits_per_key: Option<usize>,

    /// When writing, the global sequence number recorded in the table
    /// properties. When reading, an override that replaces the recorded one.
    /// Default: None
    pub global_seq_num: Option<u64>,

    /// User key ordering.
    /// Default: BytewiseComparer
    #[serde(skip, default = "default_comparer")]
    pub comparer: Arc<dyn Comparer>,

    /// Shared cache for data blocks. Index and meta blocks are never cached.
    /// Default: None
    #[serde(skip)]
    pub cache: Option<Arc<dyn Cache>>,
}

fn default_comparer() -> Arc<dyn Comparer> {
    Arc::new(BytewiseComparer::new())
}

impl Default for Options {
    fn default() -> Self {
        Self {
            block_size: 4 * 1024, // 4KB
            block_restart_interval: 16,
            compression: CompressionType::default(),
            checksum: ChecksumType::Crc32c,
            filter_bits_per_key: None,
            global_seq_num: None,
            comparer: default_comparer(),
            cache: None,
        }
    }
}

/// Block compression algorithms. The discriminant is the block-type byte
/// stored in every block trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum CompressionType {
    /// No compression.
    None = 0,

    /// Snappy compression (fast, moderate compression ratio). Requires the
    /// `snappy` feature to write or read.
    Snappy = 1,
}

impl CompressionType {
    /// Convert from the block-type byte
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(CompressionType::None),
            1 => Some(CompressionType::Snappy),
            _ => None,
        }
    }

    /// Name recorded in table properties.
    pub fn name(self) -> &'static str {
        match self {
            CompressionType::None => "NoCompression",
            CompressionType::Snappy => "Snappy",
        }
    }
}

impl Default for CompressionType {
    fn default() -> Self {
        #[cfg(feature = "snappy")]
        return CompressionType::Snappy;

        #[cfg(not(feature = "snappy"))]
        CompressionType::None
    }
}

/// Block checksum algorithms. The discriminant is stored in the footer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ChecksumType {
    /// No checksum. Never valid in a table file.
    None = 0,

    /// Masked CRC-32C.
    Crc32c = 1,

    /// Low 32 bits of xxHash64.
    XxHash64 = 2,
}

impl ChecksumType {
    /// Convert from the footer byte
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(ChecksumType::None),
            1 => Some(ChecksumType::Crc32c),
            2 => Some(ChecksumType::XxHash64),
            _ => None,
        }
    }
}

impl Options {
    /// Creates a new Options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the data block size.
    pub fn block_size(mut self, size: usize) -> Self {
        self.block_size = size;
        self
    }

    /// Sets the data block restart interval.
    pub fn block_restart_interval(mut self, interval: usize) -> Self {
        self.block_restart_interval = interval;
        self
    }

    /// Sets the compression algorithm.
    pub fn compression(mut self, compression: CompressionType) -> Self {
        self.compression = compression;
        self
    }

    /// Sets the checksum algorithm.
    pub fn checksum(mut self, checksum: ChecksumType) -> Self {
        self.checksum = checksum;
        self
    }

    /// Enables the whole-table bloom filter.
    pub fn filter_bits_per_key(mut self, bits_per_key: usize) -> Self {
        self.filter_bits_per_key = Some(bits_per_key);
        self
    }

    /// Sets the global sequence number.
    pub fn global_seq_num(mut self, seq_num: u64) -> Self {
        self.global_seq_num = Some(seq_num);
        self
    }

    /// Sets the user key comparer.
    pub fn comparer(mut self, comparer: Arc<dyn Comparer>) -> Self {
        self.comparer = comparer;
        self
    }

    /// Sets the shared block cache.
    pub fn cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Parses options from JSON. Missing fields take their defaults; the
    /// comparer and cache are always the defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let options: Options = serde_json::from_str(json)
            .map_err(|e| Error::invalid_argument(format!("Invalid options JSON: {}", e)))?;
        options.validate()?;
        Ok(options)
    }

    /// Serializes the options to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::invalid_argument(format!("Cannot serialize options: {}", e)))
    }

    /// Validates the options and returns an error if any are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(Error::invalid_argument("block_size must be > 0"));
        }
        // A block is flushed once it reaches block_size, so every entry
        // starts below it
        if self.block_size > MAX_BLOCK_FIELD_LEN {
            return Err(Error::invalid_argument(format!("block_size must be <= {}", MAX_BLOCK_FIELD_LEN)));
        }
        if self.block_restart_interval == 0 {
            return Err(Error::invalid_argument("block_restart_interval must be > 0"));
        }
        if self.checksum == ChecksumType::None {
            return Err(Error::invalid_argument("checksum must not be None"));
        }
        if self.filter_bits_per_key == Some(0) {
            return Err(Error::invalid_argument("filter_bits_per_key must be > 0"));
        }
        #[cfg(not(feature = "snappy"))]
        if self.compression == CompressionType::Snappy {
            return Err(Error::invalid_argument("snappy compression is not enabled"));
        }
        Ok(())
    }
}
