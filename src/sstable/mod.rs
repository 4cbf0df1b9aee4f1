//! Sorted table implementation.
//!
//! A table is an immutable, sorted file of internal-key records. The format
//! is designed for sequential writes and random reads.
//!
//! ## File Format
//!
//! ```text
//! [Data Block 1]
//! [Data Block 2]
//! ...
//! [Data Block N]
//! [Filter Block]     // Whole-table bloom filter (optional)
//! [Properties Block] // Table statistics
//! [Metaindex Block]  // Meta block name -> handle
//! [Index Block]      // Separator key -> data block handle
//! [Footer: 53B]      // Points to the metaindex and index blocks
//! ```
//!
//! Every block is followed by a 5-byte trailer holding its compression type
//! and checksum (see [`trailer`]).
//!
//! ## Index Format
//!
//! The index block has one entry per data block. Its key is a separator that
//! is `>=` every key in that block and `<` every key in the next one (a
//! successor of the last key for the final block); its value is the varint
//! encoded [`BlockHandle`].

pub mod block;
pub mod footer;
pub mod iterator;
pub mod properties;
pub mod reader;
pub mod trailer;
pub mod writer;

pub use block::{Block, BlockBuilder, BlockIter};
pub use footer::{BlockHandle, Footer};
pub use iterator::TableIterator;
pub use properties::Properties;
pub use reader::TableReader;
pub use writer::TableWriter;

/// Size of the trailer after every block: 1 type byte and a 4-byte checksum
pub const BLOCK_TRAILER_LEN: usize = 5;

/// Largest varint encoding of a block handle
pub const BLOCK_HANDLE_MAX_LEN: usize = 20;

/// Footer size in bytes (fixed)
pub const FOOTER_LEN: usize = 1 + 2 * BLOCK_HANDLE_MAX_LEN + 4 + 8;

/// Table format version written to and required in the footer
pub const FORMAT_VERSION: u32 = 2;

/// Magic number closing every table file (0xf7cff485b741e288)
pub const MAGIC: [u8; 8] = [0xf7, 0xcf, 0xf4, 0x85, 0xb7, 0x41, 0xe2, 0x88];

/// Metaindex name of the filter block written by `policy`.
pub fn filter_block_name(policy: &str) -> String {
    format!("fullfilter.{}", policy)
}
