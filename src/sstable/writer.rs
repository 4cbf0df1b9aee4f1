//! Table writer implementation.
//!
//! Builds a table file from a sequence of sorted records.

use crate::config::{CompressionType, Options};
use crate::error::{Error, Result};
use crate::filter::bloom::BLOOM_POLICY_NAME;
use crate::filter::{BloomFilterBuilder, Filter};
use crate::internal_key::{InternalKey, InternalKeyComparer, InternalKeyKind};
use crate::sstable::block::{BlockBuilder, MAX_BLOCK_FIELD_LEN};
use crate::sstable::footer::{BlockHandle, Footer};
use crate::sstable::properties::{Properties, PROPERTIES_BLOCK_NAME};
use crate::sstable::trailer::seal_block;
use crate::sstable::{filter_block_name, BLOCK_TRAILER_LEN, FOOTER_LEN};
use crate::storage::WritableFile;
use std::cmp::Ordering;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// TableWriter builds a table file.
///
/// Records must be added in strictly increasing internal key order. The
/// writer is consumed by [`TableWriter::close`], which writes the index,
/// meta blocks and footer.
///
/// Usage:
/// ```no_run
/// use lsm_sstable::{Options, TableWriter};
///
/// let mut writer = TableWriter::create("table.sst", Options::default()).unwrap();
/// writer.set(b"key1", b"value1").unwrap();
/// writer.set(b"key2", b"value2").unwrap();
/// writer.close().unwrap();
/// ```
pub struct TableWriter<F: WritableFile = BufWriter<File>> {
    file: F,
    options: Options,
    cmp: InternalKeyComparer,
    data_block: BlockBuilder,
    index_block: BlockBuilder,
    last_key: Option<InternalKey>,
    /// Handle of the last flushed data block, waiting for the next key to
    /// pick its index separator
    pending_handle: Option<BlockHandle>,
    offset: u64,
    filter: Option<BloomFilterBuilder>,
    props: Properties,
    /// First write failure; once set the table can no longer be completed
    err: Option<Error>,
}

impl TableWriter<BufWriter<File>> {
    /// Create a writer for a new file at `path`.
    pub fn create<P: AsRef<Path>>(path: P, options: Options) -> Result<Self> {
        let file = File::create(path)?;
        Self::new(BufWriter::new(file), options)
    }
}

impl<F: WritableFile> TableWriter<F> {
    /// Create a writer that appends the table to `file`.
    pub fn new(file: F, options: Options) -> Result<Self> {
        options.validate()?;

        let props = Properties {
            comparer_name: options.comparer.name().to_string(),
            compression_name: options.compression.name().to_string(),
            filter_policy_name: if options.filter_bits_per_key.is_some() {
                BLOOM_POLICY_NAME.to_string()
            } else {
                String::new()
            },
            global_seq_num: options.global_seq_num.unwrap_or(0),
            ..Properties::default()
        };

        Ok(Self {
            file,
            cmp: InternalKeyComparer::new(options.comparer.clone()),
            data_block: BlockBuilder::new(options.block_restart_interval),
            index_block: BlockBuilder::new(1),
            last_key: None,
            pending_handle: None,
            offset: 0,
            filter: options.filter_bits_per_key.map(BloomFilterBuilder::new),
            props,
            err: None,
            options,
        })
    }

    /// Add a Set record with sequence number 0.
    pub fn set(&mut self, user_key: &[u8], value: &[u8]) -> Result<()> {
        self.add(&InternalKey::new(user_key.to_vec(), 0, InternalKeyKind::Set), value)
    }

    /// Add a Delete record with sequence number 0.
    pub fn delete(&mut self, user_key: &[u8]) -> Result<()> {
        self.add(&InternalKey::new(user_key.to_vec(), 0, InternalKeyKind::Delete), &[])
    }

    /// Add a Merge record with sequence number 0.
    pub fn merge(&mut self, user_key: &[u8], value: &[u8]) -> Result<()> {
        self.add(&InternalKey::new(user_key.to_vec(), 0, InternalKeyKind::Merge), value)
    }

    /// Add a record to the table.
    ///
    /// `key` must sort strictly after the previously added key; otherwise a
    /// `Usage` error is returned and the writer is left unchanged.
    pub fn add(&mut self, key: &InternalKey, value: &[u8]) -> Result<()> {
        if let Some(err) = &self.err {
            return Err(err.clone());
        }
        if !key.is_valid() {
            return Err(Error::usage(format!("Cannot add key of invalid kind: {:?}", key)));
        }
        check_entry_size(key.encoded_size(), value.len())?;

        let mut new_user_key = true;
        if let Some(last) = &self.last_key {
            if self.cmp.compare(key, last) != Ordering::Greater {
                return Err(Error::usage(format!(
                    "Keys must be added in strictly increasing order: {:?} after {:?}",
                    key, last
                )));
            }
            new_user_key = self.cmp.compare_user(key.user_key(), last.user_key()) != Ordering::Equal;

            // The previous block is done; index it under a short separator
            if let Some(handle) = self.pending_handle.take() {
                let separator = self.cmp.separator(last, key);
                self.index_block.add(&separator.encode(), &handle.encode());
            }
        }

        if new_user_key {
            if let Some(filter) = self.filter.as_mut() {
                filter.add(key.user_key());
            }
        }

        let encoded = key.encode();
        self.data_block.add(&encoded, value);

        self.props.num_entries += 1;
        self.props.raw_key_size += encoded.len() as u64;
        self.props.raw_value_size += value.len() as u64;
        match key.kind() {
            InternalKeyKind::Delete | InternalKeyKind::RangeDelete => self.props.num_deletions += 1,
            InternalKeyKind::Merge => self.props.num_merge_operands += 1,
            _ => {}
        }
        self.last_key = Some(key.clone());

        // Flush block if it's large enough
        if self.data_block.estimated_size() >= self.options.block_size {
            self.flush_data_block()?;
        }

        Ok(())
    }

    /// Record the first write failure so later calls report it.
    fn latch<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            log::warn!("Table write failed at offset {}: {}", self.offset, err);
            self.err = Some(err.clone());
        }
        result
    }

    /// Seal a block and append it to the file.
    fn write_block(&mut self, raw: &[u8], compression: CompressionType) -> Result<BlockHandle> {
        let physical = seal_block(raw, compression, self.options.checksum);
        let physical = self.latch(physical)?;
        self.write_sealed(&physical)
    }

    fn write_sealed(&mut self, physical: &[u8]) -> Result<BlockHandle> {
        let appended = self.file.append(physical);
        self.latch(appended)?;

        let handle = BlockHandle::new(self.offset, (physical.len() - BLOCK_TRAILER_LEN) as u64);
        self.offset += physical.len() as u64;
        Ok(handle)
    }

    /// Flush the current data block to the file
    fn flush_data_block(&mut self) -> Result<()> {
        if self.data_block.is_empty() {
            return Ok(());
        }

        let builder = std::mem::replace(
            &mut self.data_block,
            BlockBuilder::new(self.options.block_restart_interval),
        );
        let num_entries = builder.num_entries();
        let raw = builder.finish();
        let handle = self.write_block(&raw, self.options.compression)?;

        log::debug!(
            "Flushed data block at offset {}: {} entries, {} -> {} bytes",
            handle.offset,
            num_entries,
            raw.len(),
            handle.length
        );
        self.props.data_size += handle.length + BLOCK_TRAILER_LEN as u64;
        self.props.num_data_blocks += 1;
        self.pending_handle = Some(handle);
        Ok(())
    }

    /// Finish the table: flush the last data block, then write the filter,
    /// properties, metaindex and index blocks followed by the footer.
    ///
    /// Returns the size of the file. After a failed write no footer is
    /// written and the partial file must be discarded.
    pub fn close(mut self) -> Result<u64> {
        if let Some(err) = self.err.take() {
            return Err(err);
        }

        self.flush_data_block()?;

        // The last block is indexed under a successor of its last key
        if let (Some(handle), Some(last)) = (self.pending_handle.take(), self.last_key.as_ref()) {
            let successor = self.cmp.successor(last);
            self.index_block.add(&successor.encode(), &handle.encode());
        }

        // The index goes last but its size is recorded in the properties
        let index_raw = std::mem::replace(&mut self.index_block, BlockBuilder::new(1)).finish();
        let index_physical = seal_block(&index_raw, self.options.compression, self.options.checksum)?;
        self.props.index_size = index_physical.len() as u64;

        let mut metaindex = BlockBuilder::new(1);
        if let Some(filter) = self.filter.take() {
            let filter = filter.finish();
            let handle = self.write_block(&filter.encode(), CompressionType::None)?;
            self.props.filter_size = handle.length + BLOCK_TRAILER_LEN as u64;
            metaindex.add(filter_block_name(BLOOM_POLICY_NAME).as_bytes(), &handle.encode());
        }

        let props_raw = self.props.encode();
        let props_handle = self.write_block(&props_raw, CompressionType::None)?;
        metaindex.add(PROPERTIES_BLOCK_NAME.as_bytes(), &props_handle.encode());

        let metaindex_handle = self.write_block(&metaindex.finish(), CompressionType::None)?;
        let index_handle = self.write_sealed(&index_physical)?;

        let footer = Footer::new(self.options.checksum, metaindex_handle, index_handle);
        let appended = self.file.append(&footer.encode());
        self.latch(appended)?;
        let flushed = self.file.flush();
        self.latch(flushed)?;
        let synced = self.file.sync();
        self.latch(synced)?;

        let file_size = self.offset + FOOTER_LEN as u64;
        log::info!(
            "Finished table: {} entries, {} data blocks, {} bytes",
            self.props.num_entries,
            self.props.num_data_blocks,
            file_size
        );
        Ok(file_size)
    }

    /// Get the number of records added
    pub fn num_entries(&self) -> u64 {
        self.props.num_entries
    }

    /// Bytes written so far plus the size of the pending data block
    pub fn estimated_size(&self) -> u64 {
        self.offset + self.data_block.estimated_size() as u64
    }
}

/// Block entries record key and value lengths as 32-bit values.
fn check_entry_size(key_len: usize, value_len: usize) -> Result<()> {
    if key_len > MAX_BLOCK_FIELD_LEN || value_len > MAX_BLOCK_FIELD_LEN {
        return Err(Error::usage(format!(
            "Record too large: {} key bytes, {} value bytes, limit {}",
            key_len, value_len, MAX_BLOCK_FIELD_LEN
        )));
    }
    Ok(())
}
