//! User key ordering.
//!
//! A table is written and read under one [`Comparer`]. Besides the total
//! order, the comparer decides how index keys are shortened: the writer asks
//! it for a separator between adjacent data blocks and a successor for the
//! final block, so the shortening policy belongs to the comparer rather than
//! to the table format.

use std::cmp::Ordering;
use std::fmt;

/// A total order over user keys plus the key-shortening policy used for
/// index entries.
pub trait Comparer: fmt::Debug + Send + Sync {
    /// Compare two user keys.
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;

    /// Name recorded in the table properties. A table must be read with a
    /// comparer of the same name.
    fn name(&self) -> &str;

    /// Returns a key `sep` with `a <= sep < b`, preferably short.
    ///
    /// Callers guarantee `a < b`. Returning `a` unchanged is always valid.
    fn separator(&self, a: &[u8], b: &[u8]) -> Vec<u8>;

    /// Returns a key `succ` with `a <= succ`, preferably short.
    ///
    /// Returning `a` unchanged is always valid.
    fn successor(&self, a: &[u8]) -> Vec<u8>;
}

/// Lexicographic byte ordering, the default comparer.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytewiseComparer;

impl BytewiseComparer {
    /// Create a new bytewise comparer.
    pub fn new() -> Self {
        Self
    }
}

impl Comparer for BytewiseComparer {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }

    fn name(&self) -> &str {
        "leveldb.BytewiseComparator"
    }

    fn separator(&self, a: &[u8], b: &[u8]) -> Vec<u8> {
        let shared = shared_prefix_len(a, b);
        if shared < a.len() && shared < b.len() {
            let c = a[shared];
            if c < 0xff && c + 1 < b[shared] {
                let mut sep = a[..=shared].to_vec();
                sep[shared] += 1;
                return sep;
            }
        }
        a.to_vec()
    }

    fn successor(&self, a: &[u8]) -> Vec<u8> {
        for (i, &c) in a.iter().enumerate() {
            if c != 0xff {
                let mut succ = a[..=i].to_vec();
                succ[i] += 1;
                return succ;
            }
        }
        // Every byte is 0xff.
        a.to_vec()
    }
}

/// Length of the common prefix of `a` and `b`.
pub fn shared_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytewise_compare() {
        let cmp = BytewiseComparer::new();
        assert_eq!(cmp.compare(b"apple", b"banana"), Ordering::Less);
        assert_eq!(cmp.compare(b"apple", b"apple"), Ordering::Equal);
        assert_eq!(cmp.compare(b"apple2", b"apple"), Ordering::Greater);
    }

    #[test]
    fn test_separator_shortens() {
        let cmp = BytewiseComparer::new();
        assert_eq!(cmp.separator(b"abcdef", b"abzz"), b"abd".to_vec());
        assert_eq!(cmp.separator(b"apple", b"cherry"), b"b".to_vec());
    }

    #[test]
    fn test_separator_keeps_key_when_adjacent() {
        let cmp = BytewiseComparer::new();
        // 'c' + 1 == 'd', nothing shorter fits between them
        assert_eq!(cmp.separator(b"abc", b"abd"), b"abc".to_vec());
        // prefix relation
        assert_eq!(cmp.separator(b"ab", b"abc"), b"ab".to_vec());
        assert_eq!(cmp.separator(b"a\xff", b"b"), b"a\xff".to_vec());
    }

    #[test]
    fn test_separator_bounds() {
        let cmp = BytewiseComparer::new();
        let pairs: [(&[u8], &[u8]); 4] =
            [(b"key00001", b"key00002"), (b"a", b"zzz"), (b"foo", b"foobar"), (b"m\x00", b"m\x7f")];
        for (a, b) in pairs {
            let sep = cmp.separator(a, b);
            assert!(cmp.compare(a, &sep) != Ordering::Greater);
            assert_eq!(cmp.compare(&sep, b), Ordering::Less);
        }
    }

    #[test]
    fn test_successor() {
        let cmp = BytewiseComparer::new();
        assert_eq!(cmp.successor(b"abc"), b"b".to_vec());
        assert_eq!(cmp.successor(b"\xff\xffx"), b"\xff\xffy".to_vec());
        assert_eq!(cmp.successor(b"\xff\xff"), b"\xff\xff".to_vec());
        assert_eq!(cmp.successor(b""), Vec::<u8>::new());
    }

    #[test]
    fn test_shared_prefix_len() {
        assert_eq!(shared_prefix_len(b"tweedledee", b"tweedledum"), 8);
        assert_eq!(shared_prefix_len(b"", b"abc"), 0);
        assert_eq!(shared_prefix_len(b"abc", b"abc"), 3);
    }
}
