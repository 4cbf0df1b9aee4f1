//! Table reader implementation.
//!
//! Opens a table file, keeps its index block and properties in memory and
//! reads data blocks on demand through the optional shared block cache.

use crate::cache::Cache;
use crate::config::Options;
use crate::error::{Error, Result};
use crate::filter::bloom::BLOOM_POLICY_NAME;
use crate::filter::{BloomFilter, Filter};
use crate::internal_key::{InternalKeyComparer, Record};
use crate::sstable::block::{Block, BlockIter};
use crate::sstable::footer::{BlockHandle, Footer};
use crate::sstable::iterator::TableIterator;
use crate::sstable::properties::{Properties, PROPERTIES_BLOCK_NAME};
use crate::sstable::trailer::open_block;
use crate::sstable::{filter_block_name, BLOCK_TRAILER_LEN, FOOTER_LEN};
use crate::storage::ReadableFile;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::cmp::Ordering;
use std::fmt;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

/// TableReader provides read access to a table file.
///
/// Cloning a reader is cheap; clones share the open file. Any number of
/// lookups and iterators may run concurrently.
///
/// Usage:
/// ```no_run
/// use lsm_sstable::{Options, TableReader};
///
/// let reader = TableReader::open_path("table.sst", 1, &Options::default()).unwrap();
/// if let Some(record) = reader.get(b"key1").unwrap() {
///     println!("Found: {:?}", record.value);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct TableReader {
    inner: Arc<TableInner>,
}

/// State shared between a reader and the iterators created from it.
pub(crate) struct TableInner {
    /// `None` once the reader is closed
    file: RwLock<Option<Arc<dyn ReadableFile>>>,
    file_id: u64,
    file_size: u64,
    footer: Footer,
    index: Block,
    properties: Properties,
    filter: Option<BloomFilter>,
    cmp: InternalKeyComparer,
    cache: Option<Arc<dyn Cache>>,
    global_seq_num: Option<u64>,
    /// First corruption or format failure seen by a lookup
    poisoned: Mutex<Option<Error>>,
}

impl fmt::Debug for TableInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableInner")
            .field("file_id", &self.file_id)
            .field("file_size", &self.file_size)
            .field("footer", &self.footer)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Read and verify the block at `handle`.
fn read_block(
    file: &dyn ReadableFile,
    file_size: u64,
    handle: BlockHandle,
    footer: &Footer,
) -> Result<Bytes> {
    let len = handle.length.checked_add(BLOCK_TRAILER_LEN as u64);
    let end = len.and_then(|len| handle.offset.checked_add(len));
    let len = match end {
        Some(end) if end <= file_size - FOOTER_LEN as u64 => (end - handle.offset) as usize,
        _ => {
            return Err(Error::corruption(format!(
                "Block handle {:?} points past the end of a {}-byte file",
                handle, file_size
            )));
        }
    };

    let mut buf = vec![0u8; len];
    file.read_at(handle.offset, &mut buf)?;
    open_block(Bytes::from(buf), handle.offset, footer.checksum)
}

impl TableReader {
    /// Open a table stored in `file`.
    ///
    /// `file_id` identifies the file in the block cache and must be unique
    /// among the readers sharing that cache.
    pub fn open(file: Arc<dyn ReadableFile>, file_id: u64, options: &Options) -> Result<Self> {
        options.validate()?;

        let file_size = file.size()?;
        if file_size < FOOTER_LEN as u64 {
            return Err(Error::format(format!(
                "File of {} bytes is too small to be a table",
                file_size
            )));
        }

        // Read footer from the end of the file
        let mut buf = [0u8; FOOTER_LEN];
        file.read_at(file_size - FOOTER_LEN as u64, &mut buf)?;
        let footer = Footer::decode(&buf)?;

        let metaindex = Block::new(read_block(file.as_ref(), file_size, footer.metaindex_handle, &footer)?)?;
        let filter_name = filter_block_name(BLOOM_POLICY_NAME);
        let mut properties = None;
        let mut filter = None;
        for (name, value) in metaindex.entries()? {
            let handle = BlockHandle::decode_exact(&value)?;
            if name == PROPERTIES_BLOCK_NAME.as_bytes() {
                let block = Block::new(read_block(file.as_ref(), file_size, handle, &footer)?)?;
                properties = Some(Properties::decode(&block)?);
            } else if name == filter_name.as_bytes() {
                let data = read_block(file.as_ref(), file_size, handle, &footer)?;
                filter = Some(BloomFilter::decode(&data)?);
            } else {
                log::debug!("Ignoring meta block {}", String::from_utf8_lossy(&name));
            }
        }
        let properties = properties.ok_or_else(|| Error::corruption("Table has no properties block"))?;

        let comparer_name = options.comparer.name();
        if !properties.comparer_name.is_empty() && properties.comparer_name != comparer_name {
            return Err(Error::usage(format!(
                "Table was written with comparer {}, opened with {}",
                properties.comparer_name, comparer_name
            )));
        }

        let index = Block::new(read_block(file.as_ref(), file_size, footer.index_handle, &footer)?)?;

        let global_seq_num = options
            .global_seq_num
            .or((properties.global_seq_num != 0).then_some(properties.global_seq_num));

        log::debug!(
            "Opened table {}: {} bytes, {} entries in {} data blocks, filter: {}",
            file_id,
            file_size,
            properties.num_entries,
            properties.num_data_blocks,
            filter.is_some()
        );

        Ok(Self {
            inner: Arc::new(TableInner {
                file: RwLock::new(Some(file)),
                file_id,
                file_size,
                footer,
                index,
                properties,
                filter,
                cmp: InternalKeyComparer::new(options.comparer.clone()),
                cache: options.cache.clone(),
                global_seq_num,
                poisoned: Mutex::new(None),
            }),
        })
    }

    /// Open the table file at `path`.
    pub fn open_path<P: AsRef<Path>>(path: P, file_id: u64, options: &Options) -> Result<Self> {
        let file = File::open(path)?;
        Self::open(Arc::new(file), file_id, options)
    }

    /// Look up the newest record for `user_key`.
    ///
    /// Returns the record whatever its kind, including deletions; returns
    /// `None` when the table holds no record for the key.
    pub fn get(&self, user_key: &[u8]) -> Result<Option<Record>> {
        self.inner.check_usable()?;

        if let Some(filter) = &self.inner.filter {
            if !filter.may_contain(user_key) {
                return Ok(None);
            }
        }

        let mut iter = TableIterator::new(Arc::clone(&self.inner));
        if !iter.seek_ge(user_key) {
            return match iter.error() {
                Some(err) => Err(self.inner.poison(err.clone())),
                None => Ok(None),
            };
        }

        let key = iter.key()?;
        if self.inner.cmp.compare_user(key.user_key(), user_key) != Ordering::Equal {
            return Ok(None);
        }
        Ok(Some(Record::new(key.clone(), iter.value()?.to_vec())))
    }

    /// Create an iterator over the table. The iterator starts unpositioned.
    pub fn iter(&self) -> Result<TableIterator> {
        self.inner.check_usable()?;
        Ok(TableIterator::new(Arc::clone(&self.inner)))
    }

    /// Release the file. Later lookups fail with a `Closed` error, as do
    /// live iterators, which become invalid at once. Closing twice is a
    /// no-op.
    pub fn close(&self) {
        if self.inner.file.write().take().is_some() {
            log::debug!("Closed table {}", self.inner.file_id);
        }
    }

    /// Whether [`TableReader::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Properties recorded when the table was written.
    pub fn properties(&self) -> &Properties {
        &self.inner.properties
    }

    /// The decoded footer.
    pub fn footer(&self) -> &Footer {
        &self.inner.footer
    }

    /// Get the file size
    pub fn file_size(&self) -> u64 {
        self.inner.file_size
    }

    /// Get the number of data blocks
    pub fn num_data_blocks(&self) -> u64 {
        self.inner.properties.num_data_blocks
    }

    /// Handles of the data blocks, in key order.
    pub fn data_block_handles(&self) -> Result<Vec<BlockHandle>> {
        self.inner
            .index
            .entries()?
            .iter()
            .map(|(_, value)| BlockHandle::decode_exact(value))
            .collect()
    }

    /// The identifier this reader uses in the block cache.
    pub fn file_id(&self) -> u64 {
        self.inner.file_id
    }

    /// The sequence number forced onto every record read, if any.
    pub fn global_seq_num(&self) -> Option<u64> {
        self.inner.global_seq_num
    }
}

impl TableInner {
    pub(crate) fn is_closed(&self) -> bool {
        self.file.read().is_none()
    }

    /// Fails if the reader is closed or has latched a failure.
    fn check_usable(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::closed(format!("Table {} is closed", self.file_id)));
        }
        match &*self.poisoned.lock() {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// Latch corruption and format errors; other errors pass through.
    fn poison(&self, err: Error) -> Error {
        if err.is_fatal() {
            let mut poisoned = self.poisoned.lock();
            if poisoned.is_none() {
                log::warn!("Table {} failed: {}", self.file_id, err);
                *poisoned = Some(err.clone());
            }
        }
        err
    }

    pub(crate) fn comparer(&self) -> &InternalKeyComparer {
        &self.cmp
    }

    pub(crate) fn global_seq_num(&self) -> Option<u64> {
        self.global_seq_num
    }

    pub(crate) fn index_iter(&self) -> BlockIter {
        self.index.iter(self.cmp.clone())
    }

    /// Load the data block at `handle`, consulting the cache first.
    pub(crate) fn data_block(&self, handle: BlockHandle) -> Result<Block> {
        if let Some(cache) = &self.cache {
            if let Some(contents) = cache.get(self.file_id, handle.offset) {
                return Block::new(contents);
            }
        }

        let file = self
            .file
            .read()
            .clone()
            .ok_or_else(|| Error::closed(format!("Table {} is closed", self.file_id)))?;
        let contents = read_block(file.as_ref(), self.file_size, handle, &self.footer)?;
        let block = Block::new(contents.clone())?;
        if let Some(cache) = &self.cache {
            cache.insert(self.file_id, handle.offset, contents);
        }
        Ok(block)
    }
}
