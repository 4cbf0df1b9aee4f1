//! # lsm-sstable - Sorted Table Files for LSM-Tree Storage Engines
//!
//! This crate implements the immutable, block-structured table files at the
//! bottom of a log-structured merge tree. It encodes sorted key/value records
//! into files and serves point lookups and bidirectional iteration over them.
//!
//! ## Architecture
//!
//! - **Block codec**: prefix-compressed records with restart points
//! - **Block trailer**: per-block checksum (CRC-32C or xxHash64) and optional
//!   Snappy compression
//! - **Index**: one separator key per data block, kept in memory by readers
//! - **Footer**: fixed 53-byte trailer locating the index and metaindex
//! - **Writer / Reader / Iterator**: build a table from a sorted stream, then
//!   read it through a two-level iterator
//! - **Bloom filter** and **block cache**: optional read-path accelerators
//!
//! ## Example Usage
//!
//! ```rust
//! use lsm_sstable::{MemFile, Options, TableReader, TableWriter};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), lsm_sstable::Error> {
//! let file = MemFile::new();
//! let mut writer = TableWriter::new(file.clone(), Options::default())?;
//! writer.set(b"apple", b"red")?;
//! writer.set(b"banana", b"yellow")?;
//! writer.close()?;
//!
//! let reader = TableReader::open(Arc::new(file), 1, &Options::default())?;
//! if let Some(record) = reader.get(b"apple")? {
//!     assert_eq!(record.value, b"red");
//! }
//!
//! let mut iter = reader.iter()?;
//! let mut ok = iter.first();
//! while ok {
//!     println!("{:?} => {:?}", iter.key()?, iter.value()?);
//!     ok = iter.next();
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Module declarations
pub mod cache;
pub mod comparer;
pub mod config;
pub mod error;
pub mod filter;
pub mod internal_key;
pub mod sstable;
pub mod storage;

// Re-exports
pub use cache::{BlockCache, Cache};
pub use comparer::{BytewiseComparer, Comparer};
pub use config::{ChecksumType, CompressionType, Options};
pub use error::{Error, Result};
pub use internal_key::{InternalKey, InternalKeyKind, Record, SEQ_NUM_MAX};
pub use sstable::{TableIterator, TableReader, TableWriter};
pub use storage::{MemFile, ReadableFile, WritableFile};
