//! Table properties meta block.
//!
//! Properties are stored as a block whose keys are property names in
//! bytewise order. Integer properties are varint encoded, except the global
//! sequence number which is a fixed 8-byte little-endian value.

use crate::error::{Error, Result};
use crate::sstable::block::{Block, BlockBuilder};
use bytes::Bytes;
use integer_encoding::VarInt;
use serde::Serialize;
use std::collections::BTreeMap;

/// Name of the properties block in the metaindex.
pub const PROPERTIES_BLOCK_NAME: &str = "rocksdb.properties";

const COMPARER: &str = "rocksdb.comparator";
const COMPRESSION: &str = "rocksdb.compression";
const DATA_SIZE: &str = "rocksdb.data.size";
const DELETED_KEYS: &str = "rocksdb.deleted.keys";
const FILTER_POLICY: &str = "rocksdb.filter.policy";
const FILTER_SIZE: &str = "rocksdb.filter.size";
const GLOBAL_SEQ_NUM: &str = "rocksdb.external_sst_file.global_seqno";
const INDEX_SIZE: &str = "rocksdb.index.size";
const MERGE_OPERANDS: &str = "rocksdb.merge.operands";
const NUM_DATA_BLOCKS: &str = "rocksdb.num.data.blocks";
const NUM_ENTRIES: &str = "rocksdb.num.entries";
const RAW_KEY_SIZE: &str = "rocksdb.raw.key.size";
const RAW_VALUE_SIZE: &str = "rocksdb.raw.value.size";

/// Statistics and settings recorded when a table was written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Properties {
    /// Name of the user key comparer
    pub comparer_name: String,
    /// Name of the compression algorithm configured for the table
    pub compression_name: String,
    /// Name of the filter policy, empty when the table has no filter
    pub filter_policy_name: String,
    /// Number of records
    pub num_entries: u64,
    /// Number of delete records
    pub num_deletions: u64,
    /// Number of merge records
    pub num_merge_operands: u64,
    /// Total size of the encoded internal keys
    pub raw_key_size: u64,
    /// Total size of the values
    pub raw_value_size: u64,
    /// Total size of the data blocks on disk, trailers included
    pub data_size: u64,
    /// Size of the index block on disk, trailer included
    pub index_size: u64,
    /// Size of the filter block on disk, trailer included
    pub filter_size: u64,
    /// Number of data blocks
    pub num_data_blocks: u64,
    /// Sequence number applied to every record on read; 0 means unset
    pub global_seq_num: u64,
}

impl Properties {
    /// Encode the properties into uncompressed block contents.
    pub fn encode(&self) -> Bytes {
        let mut entries: BTreeMap<&str, Vec<u8>> = BTreeMap::new();
        entries.insert(COMPARER, self.comparer_name.as_bytes().to_vec());
        entries.insert(COMPRESSION, self.compression_name.as_bytes().to_vec());
        if !self.filter_policy_name.is_empty() {
            entries.insert(FILTER_POLICY, self.filter_policy_name.as_bytes().to_vec());
        }
        for (name, value) in [
            (DATA_SIZE, self.data_size),
            (DELETED_KEYS, self.num_deletions),
            (FILTER_SIZE, self.filter_size),
            (INDEX_SIZE, self.index_size),
            (MERGE_OPERANDS, self.num_merge_operands),
            (NUM_DATA_BLOCKS, self.num_data_blocks),
            (NUM_ENTRIES, self.num_entries),
            (RAW_KEY_SIZE, self.raw_key_size),
            (RAW_VALUE_SIZE, self.raw_value_size),
        ] {
            entries.insert(name, value.encode_var_vec());
        }
        entries.insert(GLOBAL_SEQ_NUM, self.global_seq_num.to_le_bytes().to_vec());

        // A single restart point: the block is only ever scanned
        let mut builder = BlockBuilder::new(usize::MAX);
        for (name, value) in &entries {
            builder.add(name.as_bytes(), value);
        }
        builder.finish()
    }

    /// Decode properties from a decompressed properties block. Unknown
    /// names are ignored.
    pub fn decode(block: &Block) -> Result<Self> {
        let mut props = Properties::default();
        for (name, value) in block.entries()? {
            let name = String::from_utf8_lossy(&name);
            match &*name {
                COMPARER => props.comparer_name = decode_string(&name, &value)?,
                COMPRESSION => props.compression_name = decode_string(&name, &value)?,
                FILTER_POLICY => props.filter_policy_name = decode_string(&name, &value)?,
                DATA_SIZE => props.data_size = decode_uvarint(&name, &value)?,
                DELETED_KEYS => props.num_deletions = decode_uvarint(&name, &value)?,
                FILTER_SIZE => props.filter_size = decode_uvarint(&name, &value)?,
                INDEX_SIZE => props.index_size = decode_uvarint(&name, &value)?,
                MERGE_OPERANDS => props.num_merge_operands = decode_uvarint(&name, &value)?,
                NUM_DATA_BLOCKS => props.num_data_blocks = decode_uvarint(&name, &value)?,
                NUM_ENTRIES => props.num_entries = decode_uvarint(&name, &value)?,
                RAW_KEY_SIZE => props.raw_key_size = decode_uvarint(&name, &value)?,
                RAW_VALUE_SIZE => props.raw_value_size = decode_uvarint(&name, &value)?,
                GLOBAL_SEQ_NUM => {
                    let fixed: [u8; 8] = value.as_ref().try_into().map_err(|_| {
                        Error::corruption(format!("Property {} has length {}", name, value.len()))
                    })?;
                    props.global_seq_num = u64::from_le_bytes(fixed);
                }
                _ => log::debug!("Ignoring unknown table property {}", name),
            }
        }
        Ok(props)
    }
}

fn decode_uvarint(name: &str, value: &[u8]) -> Result<u64> {
    match u64::decode_var(value) {
        Some((v, n)) if n == value.len() => Ok(v),
        _ => Err(Error::corruption(format!("Property {} is not a varint", name))),
    }
}

fn decode_string(name: &str, value: &[u8]) -> Result<String> {
    String::from_utf8(value.to_vec())
        .map_err(|_| Error::corruption(format!("Property {} is not valid UTF-8", name)))
}
