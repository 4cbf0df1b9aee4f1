//! Per-block checksum and compression.
//!
//! Every block on disk is its (possibly compressed) payload followed by a
//! 5-byte trailer:
//!
//! ```text
//! [payload][block_type: 1 byte][checksum: u32 LE]
//! ```
//!
//! The checksum covers the payload and the block type byte. It is verified
//! before anything inside the payload is interpreted.

use crate::config::{ChecksumType, CompressionType};
use crate::error::{Error, Result};
use crate::sstable::BLOCK_TRAILER_LEN;
use bytes::Bytes;
use xxhash_rust::xxh64::Xxh64;

const CRC_MASK_DELTA: u32 = 0xa282_ead8;

/// Masks a CRC so that checksumming data that embeds checksums stays robust.
pub fn mask_crc(crc: u32) -> u32 {
    crc.rotate_right(15).wrapping_add(CRC_MASK_DELTA)
}

/// Inverse of [`mask_crc`].
pub fn unmask_crc(masked: u32) -> u32 {
    masked.wrapping_sub(CRC_MASK_DELTA).rotate_left(15)
}

/// Checksum of a block payload and its type byte.
pub fn block_checksum(checksum: ChecksumType, payload: &[u8], block_type: u8) -> u32 {
    match checksum {
        ChecksumType::None => 0,
        ChecksumType::Crc32c => {
            let crc = crc32c::crc32c_append(crc32c::crc32c(payload), &[block_type]);
            mask_crc(crc)
        }
        ChecksumType::XxHash64 => {
            let mut hasher = Xxh64::new(0);
            hasher.update(payload);
            hasher.update(&[block_type]);
            hasher.digest() as u32
        }
    }
}

/// Compress `raw` and append the trailer, producing the bytes written to the
/// file. Compressed output that does not save at least 1/8 of the input is
/// discarded in favor of the raw block.
pub fn seal_block(raw: &[u8], compression: CompressionType, checksum: ChecksumType) -> Result<Vec<u8>> {
    let (mut physical, block_type) = match compress(raw, compression)? {
        Some(compressed) if compressed.len() < raw.len() - raw.len() / 8 => {
            (compressed, compression)
        }
        _ => (raw.to_vec(), CompressionType::None),
    };

    let block_type = block_type as u8;
    let crc = block_checksum(checksum, &physical, block_type);
    physical.reserve(BLOCK_TRAILER_LEN);
    physical.push(block_type);
    physical.extend_from_slice(&crc.to_le_bytes());
    Ok(physical)
}

/// Verify and decompress a block read from `offset`. `physical` holds the
/// payload followed by its trailer.
pub fn open_block(physical: Bytes, offset: u64, checksum: ChecksumType) -> Result<Bytes> {
    if physical.len() < BLOCK_TRAILER_LEN {
        return Err(Error::corruption(format!("Block at offset {} is shorter than its trailer", offset)));
    }

    let payload_len = physical.len() - BLOCK_TRAILER_LEN;
    let block_type = physical[payload_len];
    let mut stored = [0u8; 4];
    stored.copy_from_slice(&physical[payload_len + 1..]);
    let expected = u32::from_le_bytes(stored);
    let actual = block_checksum(checksum, &physical[..payload_len], block_type);
    if expected != actual {
        return Err(Error::ChecksumMismatch { offset, expected, actual });
    }

    let payload = physical.slice(..payload_len);
    match CompressionType::from_u8(block_type) {
        Some(CompressionType::None) => Ok(payload),
        Some(CompressionType::Snappy) => decompress_snappy(&payload).map(Bytes::from),
        None => Err(Error::compression(format!(
            "Unknown block type {} at offset {}",
            block_type, offset
        ))),
    }
}

fn compress(raw: &[u8], compression: CompressionType) -> Result<Option<Vec<u8>>> {
    match compression {
        CompressionType::None => Ok(None),
        #[cfg(feature = "snappy")]
        CompressionType::Snappy => snap::raw::Encoder::new()
            .compress_vec(raw)
            .map(Some)
            .map_err(|e| Error::compression(format!("Snappy compression failed: {}", e))),
        #[cfg(not(feature = "snappy"))]
        CompressionType::Snappy => {
            let _ = raw;
            Err(Error::compression("Snappy support is not enabled"))
        }
    }
}

#[cfg(feature = "snappy")]
fn decompress_snappy(payload: &[u8]) -> Result<Vec<u8>> {
    snap::raw::Decoder::new()
        .decompress_vec(payload)
        .map_err(|e| Error::compression(format!("Snappy decompression failed: {}", e)))
}

#[cfg(not(feature = "snappy"))]
fn decompress_snappy(_payload: &[u8]) -> Result<Vec<u8>> {
    Err(Error::compression("Snappy support is not enabled"))
}
