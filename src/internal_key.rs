//! # Internal Key Format
//!
//! Every record in a table is keyed by an internal key: the user key followed
//! by an 8-byte trailer.
//!
//! ```text
//! InternalKey:
//!   [user_key: bytes] [trailer: u64 LE = sequence << 8 | kind]
//! ```
//!
//! ## Ordering
//!
//! InternalKeys are ordered by:
//! 1. user_key (ascending, under the table's comparer)
//! 2. sequence (descending - newer first)
//! 3. kind (descending)

use crate::comparer::Comparer;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Largest sequence number representable in a trailer (56 bits).
pub const SEQ_NUM_MAX: u64 = (1 << 56) - 1;

/// Length of the encoded trailer.
pub const TRAILER_LEN: usize = 8;

/// The kind of operation a record represents.
///
/// The numeric values are part of the file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum InternalKeyKind {
    /// A tombstone marking that the key has been deleted.
    Delete = 0,
    /// A normal value.
    Set = 1,
    /// A merge operand.
    Merge = 2,
    /// Opaque log data, never stored in tables by the writer helpers.
    LogData = 3,
    /// A range tombstone.
    RangeDelete = 15,
    /// Not a valid kind; produced when decoding a malformed key.
    Invalid = 255,
}

impl InternalKeyKind {
    /// The largest valid kind; sorts before every other kind at equal
    /// sequence numbers.
    pub const MAX: InternalKeyKind = InternalKeyKind::RangeDelete;

    /// Converts a trailer byte to a kind. Unknown values map to `Invalid`.
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => InternalKeyKind::Delete,
            1 => InternalKeyKind::Set,
            2 => InternalKeyKind::Merge,
            3 => InternalKeyKind::LogData,
            15 => InternalKeyKind::RangeDelete,
            _ => InternalKeyKind::Invalid,
        }
    }

    /// Converts the kind to its trailer byte.
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Internal key used for every record in a table.
///
/// # Example
///
/// ```rust
/// use lsm_sstable::internal_key::{InternalKey, InternalKeyKind};
///
/// let key = InternalKey::new(b"apple".to_vec(), 42, InternalKeyKind::Set);
/// assert_eq!(key.seq_num(), 42);
/// ```
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct InternalKey {
    user_key: Vec<u8>,
    trailer: u64,
}

impl InternalKey {
    /// Creates a new InternalKey.
    ///
    /// The sequence number is truncated to 56 bits.
    pub fn new(user_key: Vec<u8>, seq_num: u64, kind: InternalKeyKind) -> Self {
        Self { user_key, trailer: make_trailer(seq_num, kind) }
    }

    /// The smallest internal key with the given user key: every stored
    /// version of `user_key` sorts at or after it.
    pub fn search_key(user_key: &[u8]) -> Self {
        Self::new(user_key.to_vec(), SEQ_NUM_MAX, InternalKeyKind::MAX)
    }

    /// Returns the user key.
    pub fn user_key(&self) -> &[u8] {
        &self.user_key
    }

    /// Returns the sequence number.
    pub fn seq_num(&self) -> u64 {
        self.trailer >> 8
    }

    /// Returns the operation kind.
    pub fn kind(&self) -> InternalKeyKind {
        InternalKeyKind::from_u8((self.trailer & 0xff) as u8)
    }

    /// Returns the packed trailer.
    pub fn trailer(&self) -> u64 {
        self.trailer
    }

    /// Replaces the sequence number, keeping the kind.
    pub fn set_seq_num(&mut self, seq_num: u64) {
        self.trailer = make_trailer(seq_num, self.kind());
    }

    /// Encodes the key into a new buffer.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_size());
        self.encode_into(&mut buf);
        buf
    }

    /// Appends the encoded key to `buf`.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.user_key);
        buf.extend_from_slice(&self.trailer.to_le_bytes());
    }

    /// Decodes an encoded internal key.
    ///
    /// A buffer too short to hold a trailer decodes to a key of kind
    /// `Invalid` whose user key is the whole buffer.
    pub fn decode(data: &[u8]) -> Self {
        match split_encoded(data) {
            Some((user_key, trailer)) => Self { user_key: user_key.to_vec(), trailer },
            None => Self {
                user_key: data.to_vec(),
                trailer: InternalKeyKind::Invalid.as_u8() as u64,
            },
        }
    }

    /// Returns the total encoded size of this key.
    pub fn encoded_size(&self) -> usize {
        self.user_key.len() + TRAILER_LEN
    }

    /// True unless the key was decoded from a malformed buffer.
    pub fn is_valid(&self) -> bool {
        self.kind() != InternalKeyKind::Invalid
    }
}

impl fmt::Debug for InternalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}#{},{:?}",
            String::from_utf8_lossy(&self.user_key),
            self.seq_num(),
            self.kind()
        )
    }
}

impl PartialOrd for InternalKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Orders by bytewise user key, then trailer descending. Tables written with
/// a custom comparer must be compared through [`InternalKeyComparer`].
impl Ord for InternalKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.user_key.cmp(&other.user_key).then_with(|| other.trailer.cmp(&self.trailer))
    }
}

fn make_trailer(seq_num: u64, kind: InternalKeyKind) -> u64 {
    ((seq_num & SEQ_NUM_MAX) << 8) | kind.as_u8() as u64
}

/// Splits an encoded internal key into its user key and trailer.
pub(crate) fn split_encoded(data: &[u8]) -> Option<(&[u8], u64)> {
    if data.len() < TRAILER_LEN {
        return None;
    }
    let (user_key, trailer) = data.split_at(data.len() - TRAILER_LEN);
    let trailer = u64::from_le_bytes(trailer.try_into().ok()?);
    Some((user_key, trailer))
}

/// A key/value record as stored in a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// The internal key.
    pub key: InternalKey,
    /// The value bytes.
    pub value: Vec<u8>,
}

impl Record {
    /// Create a new record.
    pub fn new(key: InternalKey, value: Vec<u8>) -> Self {
        Self { key, value }
    }
}

/// Orders internal keys using a user [`Comparer`] for the user key part.
#[derive(Debug, Clone)]
pub struct InternalKeyComparer {
    user: Arc<dyn Comparer>,
}

impl InternalKeyComparer {
    /// Wrap a user comparer.
    pub fn new(user: Arc<dyn Comparer>) -> Self {
        Self { user }
    }

    /// The wrapped user comparer.
    pub fn user_comparer(&self) -> &Arc<dyn Comparer> {
        &self.user
    }

    /// Compare two decoded internal keys.
    pub fn compare(&self, a: &InternalKey, b: &InternalKey) -> Ordering {
        self.user
            .compare(&a.user_key, &b.user_key)
            .then_with(|| b.trailer.cmp(&a.trailer))
    }

    /// Compare two encoded internal keys without allocating.
    ///
    /// Malformed keys (shorter than a trailer) compare by their raw bytes
    /// with an `Invalid` trailer.
    pub fn compare_encoded(&self, a: &[u8], b: &[u8]) -> Ordering {
        let invalid = InternalKeyKind::Invalid.as_u8() as u64;
        let (au, at) = split_encoded(a).unwrap_or((a, invalid));
        let (bu, bt) = split_encoded(b).unwrap_or((b, invalid));
        self.user.compare(au, bu).then_with(|| bt.cmp(&at))
    }

    /// Compare two user keys.
    pub fn compare_user(&self, a: &[u8], b: &[u8]) -> Ordering {
        self.user.compare(a, b)
    }

    /// Returns a key `k` with `a <= k < b` for use as an index separator.
    ///
    /// When the comparer produces a user key that is no longer than `a`'s but
    /// sorts after it, the shortened key gets the maximal trailer so it still
    /// sorts before every version stored under that user key.
    pub fn separator(&self, a: &InternalKey, b: &InternalKey) -> InternalKey {
        let sep = self.user.separator(&a.user_key, &b.user_key);
        if sep.len() <= a.user_key.len() && self.user.compare(&a.user_key, &sep) == Ordering::Less {
            return InternalKey::new(sep, SEQ_NUM_MAX, InternalKeyKind::MAX);
        }
        a.clone()
    }

    /// Returns a key `k` with `a <= k`, used for the final index entry.
    pub fn successor(&self, a: &InternalKey) -> InternalKey {
        let succ = self.user.successor(&a.user_key);
        if succ.len() <= a.user_key.len() && self.user.compare(&a.user_key, &succ) == Ordering::Less {
            return InternalKey::new(succ, SEQ_NUM_MAX, InternalKeyKind::MAX);
        }
        a.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparer::BytewiseComparer;

    fn ikey(user_key: &[u8], seq: u64, kind: InternalKeyKind) -> InternalKey {
        InternalKey::new(user_key.to_vec(), seq, kind)
    }

    fn icmp() -> InternalKeyComparer {
        InternalKeyComparer::new(Arc::new(BytewiseComparer::new()))
    }

    #[test]
    fn test_kind_conversion() {
        assert_eq!(InternalKeyKind::Delete.as_u8(), 0);
        assert_eq!(InternalKeyKind::Set.as_u8(), 1);
        assert_eq!(InternalKeyKind::from_u8(2), InternalKeyKind::Merge);
        assert_eq!(InternalKeyKind::from_u8(15), InternalKeyKind::RangeDelete);
        assert_eq!(InternalKeyKind::from_u8(99), InternalKeyKind::Invalid);
    }

    #[test]
    fn test_internal_key_encode_decode() {
        let original = ikey(b"test_key", 12345, InternalKeyKind::Set);
        let encoded = original.encode();
        assert_eq!(encoded.len(), 8 + 8);
        assert_eq!(&encoded[..8], b"test_key");
        assert_eq!(&encoded[8..], &((12345u64 << 8) | 1).to_le_bytes());

        let decoded = InternalKey::decode(&encoded);
        assert_eq!(decoded, original);
        assert_eq!(decoded.seq_num(), 12345);
        assert_eq!(decoded.kind(), InternalKeyKind::Set);
    }

    #[test]
    fn test_decode_short_key_is_invalid() {
        let decoded = InternalKey::decode(b"abc");
        assert_eq!(decoded.kind(), InternalKeyKind::Invalid);
        assert_eq!(decoded.user_key(), b"abc");
        assert!(!decoded.is_valid());
    }

    #[test]
    fn test_seq_num_truncated_to_56_bits() {
        let key = ikey(b"k", u64::MAX, InternalKeyKind::Delete);
        assert_eq!(key.seq_num(), SEQ_NUM_MAX);
        assert_eq!(key.kind(), InternalKeyKind::Delete);
    }

    #[test]
    fn test_set_seq_num_keeps_kind() {
        let mut key = ikey(b"k", 7, InternalKeyKind::Merge);
        key.set_seq_num(100);
        assert_eq!(key.seq_num(), 100);
        assert_eq!(key.kind(), InternalKeyKind::Merge);
    }

    #[test]
    fn test_ordering() {
        let mut keys = [
            ikey(b"key2", 100, InternalKeyKind::Set),
            ikey(b"key1", 50, InternalKeyKind::Set),
            ikey(b"key1", 100, InternalKeyKind::Delete),
            ikey(b"key1", 100, InternalKeyKind::Set),
            ikey(b"key1", 150, InternalKeyKind::Set),
        ];
        keys.sort();

        assert_eq!(keys[0], ikey(b"key1", 150, InternalKeyKind::Set));
        assert_eq!(keys[1], ikey(b"key1", 100, InternalKeyKind::Set));
        assert_eq!(keys[2], ikey(b"key1", 100, InternalKeyKind::Delete));
        assert_eq!(keys[3], ikey(b"key1", 50, InternalKeyKind::Set));
        assert_eq!(keys[4], ikey(b"key2", 100, InternalKeyKind::Set));
    }

    #[test]
    fn test_encoded_compare_matches_decoded() {
        let cmp = icmp();
        let a = ikey(b"apple", 3, InternalKeyKind::Set);
        let b = ikey(b"apple", 1, InternalKeyKind::Set);
        let c = ikey(b"applesauce", 9, InternalKeyKind::Set);
        assert_eq!(cmp.compare_encoded(&a.encode(), &b.encode()), Ordering::Less);
        assert_eq!(cmp.compare_encoded(&b.encode(), &c.encode()), Ordering::Less);
        assert_eq!(cmp.compare_encoded(&c.encode(), &a.encode()), Ordering::Greater);
        assert_eq!(cmp.compare(&a, &b), cmp.compare_encoded(&a.encode(), &b.encode()));
    }

    #[test]
    fn test_search_key_precedes_all_versions() {
        let cmp = icmp();
        let search = InternalKey::search_key(b"banana");
        for kind in [InternalKeyKind::Delete, InternalKeyKind::Set, InternalKeyKind::RangeDelete] {
            let stored = ikey(b"banana", SEQ_NUM_MAX, kind);
            assert_ne!(cmp.compare(&search, &stored), Ordering::Greater);
        }
        assert_eq!(cmp.compare(&ikey(b"b", 0, InternalKeyKind::Set), &search), Ordering::Less);
    }

    #[test]
    fn test_separator() {
        let cmp = icmp();
        let a = ikey(b"apple", 1, InternalKeyKind::Set);
        let b = ikey(b"cherry", 3, InternalKeyKind::Set);
        let sep = cmp.separator(&a, &b);
        assert_eq!(sep.user_key(), b"b");
        assert_eq!(sep.seq_num(), SEQ_NUM_MAX);
        assert_eq!(cmp.compare(&a, &sep), Ordering::Less);
        assert_eq!(cmp.compare(&sep, &b), Ordering::Less);

        // Same user key: nothing shorter exists, keep `a`.
        let a = ikey(b"dup", 9, InternalKeyKind::Set);
        let b = ikey(b"dup", 2, InternalKeyKind::Set);
        assert_eq!(cmp.separator(&a, &b), a);
    }

    #[test]
    fn test_successor() {
        let cmp = icmp();
        let a = ikey(b"cherry", 3, InternalKeyKind::Set);
        let succ = cmp.successor(&a);
        assert_eq!(succ.user_key(), b"d");
        assert_eq!(cmp.compare(&a, &succ), Ordering::Less);

        let a = ikey(b"\xff", 3, InternalKeyKind::Set);
        assert_eq!(cmp.successor(&a), a);
    }
}
