//! Block format implementation for tables.
//!
//! A block contains multiple key-value entries and uses restart points
//! for efficient binary search and prefix compression.

use crate::comparer::shared_prefix_len;
use crate::error::{Error, Result};
use crate::internal_key::InternalKeyComparer;
use bytes::{BufMut, Bytes, BytesMut};
use integer_encoding::VarInt;
use std::cmp::Ordering;
use std::ops::Range;

/// Largest key length, value length or entry offset a block can record.
/// Entry headers and restart points store them as 32-bit values.
pub const MAX_BLOCK_FIELD_LEN: usize = u32::MAX as usize;

/// Block stores key-value pairs with prefix compression.
///
/// Format:
/// ```text
/// [Entry 1]
/// [Entry 2]
/// ...
/// [Entry N]
/// [Restart Point 1: u32]
/// ...
/// [Restart Point M: u32]
/// [Num Restarts: u32]
/// ```
///
/// Each entry format:
/// ```text
/// [shared_key_len: varint]    // Length of shared prefix with previous key
/// [unshared_key_len: varint]  // Length of unshared key suffix
/// [value_len: varint]         // Length of value
/// [unshared_key: bytes]       // Key suffix
/// [value: bytes]              // Value data
/// ```
///
/// Restart entries always have `shared_key_len == 0`.
#[derive(Debug, Clone)]
pub struct Block {
    data: Bytes,
    restarts_offset: usize,
    num_restarts: usize,
}

impl Block {
    /// Create a new Block from decompressed block contents.
    ///
    /// The restart table is validated here; entries are decoded lazily.
    pub fn new(data: Bytes) -> Result<Self> {
        if data.len() < 4 {
            return Err(Error::corruption("Block too small"));
        }

        let num_restarts = read_u32(&data, data.len() - 4) as usize;
        let table_len = num_restarts
            .checked_mul(4)
            .and_then(|n| n.checked_add(4))
            .filter(|&n| n <= data.len())
            .ok_or_else(|| Error::corruption("Invalid restart count"))?;
        if num_restarts == 0 {
            return Err(Error::corruption("Block has no restart points"));
        }

        let block = Self { restarts_offset: data.len() - table_len, data, num_restarts };
        block.validate_restarts()?;
        Ok(block)
    }

    fn validate_restarts(&self) -> Result<()> {
        if self.restart_point(0) != 0 {
            return Err(Error::corruption("First restart point is not at offset 0"));
        }
        for i in 1..self.num_restarts {
            let prev = self.restart_point(i - 1);
            let cur = self.restart_point(i);
            if cur <= prev || cur >= self.restarts_offset {
                return Err(Error::corruption(format!("Malformed restart point {} at index {}", cur, i)));
            }
        }
        Ok(())
    }

    /// Get the number of restart points
    pub fn num_restarts(&self) -> usize {
        self.num_restarts
    }

    fn restart_point(&self, index: usize) -> usize {
        read_u32(&self.data, self.restarts_offset + index * 4) as usize
    }

    /// True if the block holds no entries.
    pub fn is_empty(&self) -> bool {
        self.restarts_offset == 0
    }

    /// Size of the decompressed block contents.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Create an iterator over the block, ordering keys with `cmp`.
    pub fn iter(&self, cmp: InternalKeyComparer) -> BlockIter {
        BlockIter::new(self.clone(), cmp)
    }

    /// Decode every entry in order without comparing keys.
    ///
    /// Meant for the small meta blocks whose keys are plain names.
    pub fn entries(&self) -> Result<Vec<(Vec<u8>, Bytes)>> {
        let mut entries = Vec::new();
        let mut key: Vec<u8> = Vec::new();
        let mut offset = 0;
        while offset < self.restarts_offset {
            let entry = decode_entry(&self.data, offset, self.restarts_offset)?;
            if entry.shared > key.len() {
                return Err(Error::corruption("Shared prefix longer than previous key"));
            }
            key.truncate(entry.shared);
            key.extend_from_slice(&self.data[entry.key.clone()]);
            entries.push((key.clone(), self.data.slice(entry.value.clone())));
            offset = entry.value.end;
        }
        Ok(entries)
    }
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&data[offset..offset + 4]);
    u32::from_le_bytes(buf)
}

/// Byte ranges of one decoded entry.
struct Entry {
    shared: usize,
    key: Range<usize>,
    value: Range<usize>,
}

fn decode_entry(data: &[u8], offset: usize, limit: usize) -> Result<Entry> {
    let mut pos = offset;
    let mut next_varint = || -> Result<usize> {
        let (v, n) = u32::decode_var(&data[pos..limit])
            .ok_or_else(|| Error::corruption(format!("Bad entry header at offset {}", offset)))?;
        pos += n;
        Ok(v as usize)
    };
    let shared = next_varint()?;
    let unshared = next_varint()?;
    let value_len = next_varint()?;

    let key_end = pos.checked_add(unshared);
    let value_end = key_end.and_then(|k| k.checked_add(value_len));
    match (key_end, value_end) {
        (Some(key_end), Some(value_end)) if value_end <= limit => {
            Ok(Entry { shared, key: pos..key_end, value: key_end..value_end })
        }
        _ => Err(Error::corruption(format!("Entry at offset {} overruns block", offset))),
    }
}

/// BlockBuilder builds a block with prefix compression.
///
/// Keys must be added in increasing order; ordering is the caller's
/// responsibility since the builder does not know the comparer.
#[derive(Debug)]
pub struct BlockBuilder {
    buffer: BytesMut,
    restarts: Vec<u32>,
    num_entries: usize,
    last_key: Vec<u8>,
    restart_interval: usize,
}

impl BlockBuilder {
    /// Create a new BlockBuilder with a restart point every
    /// `restart_interval` entries.
    pub fn new(restart_interval: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            restarts: Vec::new(),
            num_entries: 0,
            last_key: Vec::new(),
            restart_interval: restart_interval.max(1),
        }
    }

    /// Add a key-value pair to the block
    ///
    /// The key, the value and the current block length must each be at most
    /// [`MAX_BLOCK_FIELD_LEN`].
    pub fn add(&mut self, key: &[u8], value: &[u8]) {
        debug_assert!(
            self.buffer.len() <= MAX_BLOCK_FIELD_LEN
                && key.len() <= MAX_BLOCK_FIELD_LEN
                && value.len() <= MAX_BLOCK_FIELD_LEN
        );
        let shared = if self.num_entries % self.restart_interval == 0 {
            self.restarts.push(self.buffer.len() as u32);
            0
        } else {
            shared_prefix_len(&self.last_key, key)
        };

        let mut header = [0u8; 15];
        let mut n = (shared as u32).encode_var(&mut header);
        n += ((key.len() - shared) as u32).encode_var(&mut header[n..]);
        n += (value.len() as u32).encode_var(&mut header[n..]);

        self.buffer.put_slice(&header[..n]);
        self.buffer.put_slice(&key[shared..]);
        self.buffer.put_slice(value);

        self.last_key.clear();
        self.last_key.extend_from_slice(key);
        self.num_entries += 1;
    }

    /// Finish building and return the block contents
    pub fn finish(mut self) -> Bytes {
        // Every block has at least one restart point
        if self.restarts.is_empty() {
            self.restarts.push(0);
        }
        for restart in &self.restarts {
            self.buffer.put_u32_le(*restart);
        }
        self.buffer.put_u32_le(self.restarts.len() as u32);
        self.buffer.freeze()
    }

    /// Size the block would have if finished now
    pub fn estimated_size(&self) -> usize {
        self.buffer.len() + self.restarts.len().max(1) * 4 + 4
    }

    /// Number of entries added
    pub fn num_entries(&self) -> usize {
        self.num_entries
    }

    /// The most recently added key
    pub fn last_key(&self) -> &[u8] {
        &self.last_key
    }

    /// Check if the block is empty
    pub fn is_empty(&self) -> bool {
        self.num_entries == 0
    }
}

/// Bidirectional iterator over the entries of one block.
///
/// Positioning methods return whether the iterator ended up on an entry. A
/// malformed entry invalidates the iterator and is reported by
/// [`BlockIter::error`].
#[derive(Debug)]
pub struct BlockIter {
    block: Block,
    cmp: InternalKeyComparer,
    /// Start of the current entry
    offset: usize,
    /// Start of the entry after the current one
    next_offset: usize,
    /// Restart region holding the current entry
    restart_index: usize,
    key: Vec<u8>,
    prev_key: Vec<u8>,
    /// Whether `key` holds the entry just before `next_offset`
    contiguous: bool,
    value: Range<usize>,
    valid: bool,
    err: Option<Error>,
}

impl BlockIter {
    /// Create a new unpositioned iterator.
    pub fn new(block: Block, cmp: InternalKeyComparer) -> Self {
        Self {
            block,
            cmp,
            offset: 0,
            next_offset: 0,
            restart_index: 0,
            key: Vec::new(),
            prev_key: Vec::new(),
            contiguous: false,
            value: 0..0,
            valid: false,
            err: None,
        }
    }

    fn seek_to_restart(&mut self, index: usize) {
        self.key.clear();
        self.contiguous = false;
        self.restart_index = index;
        self.offset = self.block.restart_point(index);
        self.next_offset = self.offset;
        self.valid = false;
    }

    fn invalidate(&mut self, err: Error) -> bool {
        self.err = Some(err);
        self.valid = false;
        false
    }

    /// Decode the entry at `next_offset` and make it current.
    fn parse_next(&mut self) -> bool {
        if self.err.is_some() {
            return false;
        }
        let limit = self.block.restarts_offset;
        if self.next_offset >= limit {
            self.offset = limit;
            self.valid = false;
            return false;
        }

        let entry = match decode_entry(&self.block.data, self.next_offset, limit) {
            Ok(entry) => entry,
            Err(e) => return self.invalidate(e),
        };
        if entry.shared > self.key.len() {
            return self.invalidate(Error::corruption(format!(
                "Shared prefix longer than previous key at offset {}",
                self.next_offset
            )));
        }

        std::mem::swap(&mut self.key, &mut self.prev_key);
        self.key.clear();
        self.key.extend_from_slice(&self.prev_key[..entry.shared]);
        self.key.extend_from_slice(&self.block.data[entry.key]);
        if self.contiguous && self.cmp.compare_encoded(&self.prev_key, &self.key) != Ordering::Less {
            return self.invalidate(Error::corruption(format!(
                "Out of order keys in block at offset {}",
                self.next_offset
            )));
        }

        self.offset = self.next_offset;
        self.next_offset = entry.value.end;
        self.value = entry.value;
        while self.restart_index + 1 < self.block.num_restarts
            && self.block.restart_point(self.restart_index + 1) <= self.offset
        {
            self.restart_index += 1;
        }
        self.contiguous = true;
        self.valid = true;
        true
    }

    /// Key stored at a restart point, which is never prefix compressed.
    fn restart_key(&self, index: usize) -> Result<&[u8]> {
        let offset = self.block.restart_point(index);
        let entry = decode_entry(&self.block.data, offset, self.block.restarts_offset)?;
        if entry.shared != 0 {
            return Err(Error::corruption(format!("Restart entry at offset {} is prefix compressed", offset)));
        }
        Ok(&self.block.data[entry.key])
    }

    /// Seek to the first entry
    pub fn first(&mut self) -> bool {
        self.seek_to_restart(0);
        self.parse_next()
    }

    /// Seek to the last entry
    pub fn last(&mut self) -> bool {
        self.seek_to_restart(self.block.num_restarts - 1);
        if !self.parse_next() {
            return false;
        }
        while self.next_offset < self.block.restarts_offset {
            if !self.parse_next() {
                return false;
            }
        }
        true
    }

    /// Move to the next entry
    pub fn next(&mut self) -> bool {
        if !self.valid {
            return false;
        }
        self.parse_next()
    }

    /// Move to the previous entry
    pub fn prev(&mut self) -> bool {
        if !self.valid {
            return false;
        }
        let target = self.offset;
        if target == 0 {
            self.valid = false;
            return false;
        }

        let mut index = self.restart_index;
        while self.block.restart_point(index) >= target {
            index -= 1;
        }
        self.seek_to_restart(index);
        loop {
            if !self.parse_next() {
                return false;
            }
            if self.next_offset >= target {
                return true;
            }
        }
    }

    /// Binary search for the last restart point whose key is less than
    /// `target`, or restart 0 if there is none.
    fn search_restarts(&self, target: &[u8]) -> Result<usize> {
        let mut left = 0;
        let mut right = self.block.num_restarts - 1;
        while left < right {
            let mid = (left + right).div_ceil(2);
            if self.cmp.compare_encoded(self.restart_key(mid)?, target) == Ordering::Less {
                left = mid;
            } else {
                right = mid - 1;
            }
        }
        Ok(left)
    }

    /// Position at the first entry whose key is `>= target`.
    pub fn seek_ge(&mut self, target: &[u8]) -> bool {
        if self.err.is_some() {
            return false;
        }
        if self.block.is_empty() {
            self.valid = false;
            return false;
        }
        let index = match self.search_restarts(target) {
            Ok(index) => index,
            Err(e) => return self.invalidate(e),
        };
        self.seek_to_restart(index);
        while self.parse_next() {
            if self.cmp.compare_encoded(&self.key, target) != Ordering::Less {
                return true;
            }
        }
        false
    }

    /// Position at the last entry whose key is `< target`.
    pub fn seek_lt(&mut self, target: &[u8]) -> bool {
        if self.seek_ge(target) {
            return self.prev();
        }
        if self.err.is_some() || self.block.is_empty() {
            return false;
        }
        // Every entry is less than the target
        self.last()
    }

    /// Check if the iterator is positioned on an entry
    pub fn valid(&self) -> bool {
        self.valid
    }

    /// The error that invalidated the iterator, if any
    pub fn error(&self) -> Option<&Error> {
        self.err.as_ref()
    }

    /// Get the current key
    pub fn key(&self) -> &[u8] {
        assert!(self.valid, "Iterator not valid");
        &self.key
    }

    /// Get the current value
    pub fn value(&self) -> &[u8] {
        assert!(self.valid, "Iterator not valid");
        &self.block.data[self.value.clone()]
    }

    /// Get the current value without copying
    pub fn value_bytes(&self) -> Bytes {
        assert!(self.valid, "Iterator not valid");
        self.block.data.slice(self.value.clone())
    }
}
