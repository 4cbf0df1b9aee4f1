//! Table footer implementation.
//!
//! The footer is a fixed-size (53 bytes) structure at the end of a table file
//! that records the checksum algorithm and points to the index block and the
//! metaindex block.

use crate::config::ChecksumType;
use crate::error::{Error, Result};
use crate::sstable::{BLOCK_HANDLE_MAX_LEN, FOOTER_LEN, FORMAT_VERSION, MAGIC};
use integer_encoding::VarInt;

/// BlockHandle represents a pointer to a block in the table file.
///
/// The length does not include the 5-byte block trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockHandle {
    /// Offset of the block in the file
    pub offset: u64,
    /// Size of the block payload in bytes
    pub length: u64,
}

impl BlockHandle {
    /// Create a new BlockHandle
    pub fn new(offset: u64, length: u64) -> Self {
        Self { offset, length }
    }

    /// Append the varint encoding of the handle to `buf`.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        let mut tmp = [0u8; BLOCK_HANDLE_MAX_LEN];
        let mut n = self.offset.encode_var(&mut tmp);
        n += self.length.encode_var(&mut tmp[n..]);
        buf.extend_from_slice(&tmp[..n]);
    }

    /// Encode the handle (at most 20 bytes).
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(BLOCK_HANDLE_MAX_LEN);
        self.encode_into(&mut buf);
        buf
    }

    /// Decode a handle from the front of `data`, returning it with the
    /// number of bytes consumed.
    pub fn decode(data: &[u8]) -> Result<(Self, usize)> {
        let (offset, n) =
            u64::decode_var(data).ok_or_else(|| Error::format("Truncated block handle offset"))?;
        let (length, m) = u64::decode_var(&data[n..])
            .ok_or_else(|| Error::format("Truncated block handle length"))?;
        Ok((Self { offset, length }, n + m))
    }

    /// Decode a handle that must occupy all of `data`.
    pub fn decode_exact(data: &[u8]) -> Result<Self> {
        let (handle, n) = Self::decode(data)?;
        if n != data.len() {
            return Err(Error::format(format!(
                "Block handle has {} trailing bytes",
                data.len() - n
            )));
        }
        Ok(handle)
    }

    /// Get the end offset of this block, excluding its trailer
    pub fn end_offset(&self) -> u64 {
        self.offset + self.length
    }
}

/// Footer is the last 53 bytes of a table file.
///
/// Format:
/// ```text
/// [checksum_type: 1 byte]
/// [metaindex_handle: varint, up to 20 bytes]
/// [index_handle: varint, up to 20 bytes]
/// [padding: zeros up to byte 41]
/// [version: u32 LE]
/// [magic: 8 bytes]
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footer {
    /// Checksum algorithm used by every block trailer
    pub checksum: ChecksumType,
    /// Handle to the metaindex block
    pub metaindex_handle: BlockHandle,
    /// Handle to the index block
    pub index_handle: BlockHandle,
}

const VERSION_OFFSET: usize = FOOTER_LEN - 12;
const MAGIC_OFFSET: usize = FOOTER_LEN - 8;

impl Footer {
    /// Create a new Footer
    pub fn new(checksum: ChecksumType, metaindex_handle: BlockHandle, index_handle: BlockHandle) -> Self {
        Self { checksum, metaindex_handle, index_handle }
    }

    /// Encode the footer to bytes (53 bytes)
    pub fn encode(&self) -> [u8; FOOTER_LEN] {
        let mut handles = Vec::with_capacity(2 * BLOCK_HANDLE_MAX_LEN);
        self.metaindex_handle.encode_into(&mut handles);
        self.index_handle.encode_into(&mut handles);

        let mut buf = [0u8; FOOTER_LEN];
        buf[0] = self.checksum as u8;
        buf[1..1 + handles.len()].copy_from_slice(&handles);
        buf[VERSION_OFFSET..MAGIC_OFFSET].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
        buf[MAGIC_OFFSET..].copy_from_slice(&MAGIC);
        buf
    }

    /// Decode a footer from bytes
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() != FOOTER_LEN {
            return Err(Error::format(format!(
                "Footer size mismatch: expected {}, got {}",
                FOOTER_LEN,
                data.len()
            )));
        }

        if data[MAGIC_OFFSET..] != MAGIC {
            return Err(Error::format(format!(
                "Invalid table magic number: {:02x?}",
                &data[MAGIC_OFFSET..]
            )));
        }

        let mut version = [0u8; 4];
        version.copy_from_slice(&data[VERSION_OFFSET..MAGIC_OFFSET]);
        let version = u32::from_le_bytes(version);
        if version != FORMAT_VERSION {
            return Err(Error::format(format!("Unsupported table format version {}", version)));
        }

        let checksum = match ChecksumType::from_u8(data[0]) {
            Some(ChecksumType::None) | None => {
                return Err(Error::format(format!("Unsupported checksum type {}", data[0])));
            }
            Some(checksum) => checksum,
        };

        let handles = &data[1..VERSION_OFFSET];
        let (metaindex_handle, n) = BlockHandle::decode(handles)?;
        let (index_handle, _) = BlockHandle::decode(&handles[n..])?;

        Ok(Self { checksum, metaindex_handle, index_handle })
    }
}
