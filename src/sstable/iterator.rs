//! Two-level table iterator.
//!
//! An iterator over the index block selects data blocks; an iterator over
//! the current data block yields records. Crossing a block boundary moves
//! the index iterator and loads the adjacent data block.

use crate::error::{Error, Result};
use crate::internal_key::InternalKey;
use crate::sstable::block::BlockIter;
use crate::sstable::footer::BlockHandle;
use crate::sstable::reader::TableInner;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IterState {
    BeforeFirst,
    Positioned,
    AfterLast,
    Errored,
}

/// Bidirectional iterator over the records of one table.
///
/// Positioning methods return whether the iterator landed on a record.
/// `next` from before the first record behaves like `first`, and `prev`
/// from after the last record behaves like `last`.
///
/// Any failure while loading a block is latched: the iterator stays invalid
/// and [`TableIterator::error`] keeps reporting it. Once the reader is
/// closed the iterator is invalid: `key` and `value` fail with `Closed`, and
/// the next positioning call latches that error.
///
/// # Example
///
/// ```
/// use lsm_sstable::{MemFile, Options, TableReader, TableWriter};
/// use std::sync::Arc;
///
/// let file = MemFile::new();
/// let mut writer = TableWriter::new(file.clone(), Options::default()).unwrap();
/// writer.set(b"apple", b"red").unwrap();
/// writer.set(b"banana", b"yellow").unwrap();
/// writer.close().unwrap();
///
/// let reader = TableReader::open(Arc::new(file), 1, &Options::default()).unwrap();
/// let mut iter = reader.iter().unwrap();
/// assert!(iter.seek_ge(b"b"));
/// assert_eq!(iter.key().unwrap().user_key(), b"banana");
/// assert!(!iter.next());
/// ```
#[derive(Debug)]
pub struct TableIterator {
    table: Arc<TableInner>,
    index_iter: BlockIter,
    data_iter: Option<BlockIter>,
    state: IterState,
    /// Decoded key of the current record, with any sequence override applied
    key: Option<InternalKey>,
    err: Option<Error>,
    closed: bool,
}

impl TableIterator {
    pub(crate) fn new(table: Arc<TableInner>) -> Self {
        Self {
            index_iter: table.index_iter(),
            table,
            data_iter: None,
            state: IterState::BeforeFirst,
            key: None,
            err: None,
            closed: false,
        }
    }

    /// Whether a positioning call may proceed.
    fn begin(&mut self) -> bool {
        if self.closed || self.state == IterState::Errored {
            return false;
        }
        if self.table.is_closed() {
            return self.fail(Error::closed("Table reader is closed"));
        }
        true
    }

    fn fail(&mut self, err: Error) -> bool {
        if !matches!(err, Error::Closed(_)) {
            log::warn!("Table iterator failed: {}", err);
        }
        self.err = Some(err);
        self.state = IterState::Errored;
        self.data_iter = None;
        self.key = None;
        false
    }

    /// The index ran out in one direction.
    fn exhausted(&mut self, state: IterState) -> bool {
        if let Some(err) = self.index_iter.error().cloned() {
            return self.fail(err);
        }
        self.state = state;
        self.data_iter = None;
        self.key = None;
        false
    }

    /// Load the data block the index iterator points at.
    fn load_block(&mut self) -> bool {
        let handle = match BlockHandle::decode_exact(self.index_iter.value()) {
            Ok(handle) => handle,
            Err(err) => return self.fail(err),
        };
        match self.table.data_block(handle) {
            Ok(block) => {
                self.data_iter = Some(block.iter(self.table.comparer().clone()));
                true
            }
            Err(err) => self.fail(err),
        }
    }

    /// Make the data iterator's current entry the iterator's position.
    fn settle(&mut self) -> bool {
        let Some(data_iter) = self.data_iter.as_ref() else {
            return false;
        };
        let mut key = InternalKey::decode(data_iter.key());
        if !key.is_valid() {
            return self.fail(Error::corruption(format!("Malformed internal key {:?}", key)));
        }
        if let Some(seq_num) = self.table.global_seq_num() {
            key.set_seq_num(seq_num);
        }
        self.key = Some(key);
        self.state = IterState::Positioned;
        true
    }

    /// Returns the error that invalidated the data iterator, if any.
    fn data_error(&self) -> Option<Error> {
        self.data_iter.as_ref().and_then(|it| it.error().cloned())
    }

    fn data_valid(&self) -> bool {
        self.data_iter.as_ref().is_some_and(|it| it.valid())
    }

    /// Move forward through the index until a data block yields a record.
    fn skip_forward(&mut self) -> bool {
        loop {
            if self.data_valid() {
                return self.settle();
            }
            if let Some(err) = self.data_error() {
                return self.fail(err);
            }
            if !self.index_iter.next() {
                return self.exhausted(IterState::AfterLast);
            }
            if !self.load_block() {
                return false;
            }
            if let Some(it) = self.data_iter.as_mut() {
                it.first();
            }
        }
    }

    /// Move backward through the index until a data block yields a record.
    fn skip_backward(&mut self) -> bool {
        loop {
            if self.data_valid() {
                return self.settle();
            }
            if let Some(err) = self.data_error() {
                return self.fail(err);
            }
            if !self.index_iter.prev() {
                return self.exhausted(IterState::BeforeFirst);
            }
            if !self.load_block() {
                return false;
            }
            if let Some(it) = self.data_iter.as_mut() {
                it.last();
            }
        }
    }

    /// Position at the first record.
    pub fn first(&mut self) -> bool {
        if !self.begin() {
            return false;
        }
        if !self.index_iter.first() {
            return self.exhausted(IterState::AfterLast);
        }
        if !self.load_block() {
            return false;
        }
        if let Some(it) = self.data_iter.as_mut() {
            it.first();
        }
        self.skip_forward()
    }

    /// Position at the last record.
    pub fn last(&mut self) -> bool {
        if !self.begin() {
            return false;
        }
        if !self.index_iter.last() {
            return self.exhausted(IterState::BeforeFirst);
        }
        if !self.load_block() {
            return false;
        }
        if let Some(it) = self.data_iter.as_mut() {
            it.last();
        }
        self.skip_backward()
    }

    /// Position at the first record whose user key is `>= user_key`. The
    /// newest version of a user key comes first.
    pub fn seek_ge(&mut self, user_key: &[u8]) -> bool {
        if !self.begin() {
            return false;
        }
        let target = InternalKey::search_key(user_key).encode();
        if !self.index_iter.seek_ge(&target) {
            return self.exhausted(IterState::AfterLast);
        }
        if !self.load_block() {
            return false;
        }
        if let Some(it) = self.data_iter.as_mut() {
            it.seek_ge(&target);
        }
        self.skip_forward()
    }

    /// Position at the last record whose user key is `< user_key`.
    pub fn seek_lt(&mut self, user_key: &[u8]) -> bool {
        if !self.begin() {
            return false;
        }
        let target = InternalKey::search_key(user_key).encode();
        // Blocks after the first one whose separator is >= target hold only
        // larger keys
        if !self.index_iter.seek_ge(&target) {
            if let Some(err) = self.index_iter.error().cloned() {
                return self.fail(err);
            }
            if !self.index_iter.last() {
                return self.exhausted(IterState::BeforeFirst);
            }
        }
        if !self.load_block() {
            return false;
        }
        if let Some(it) = self.data_iter.as_mut() {
            it.seek_lt(&target);
        }
        self.skip_backward()
    }

    /// Move to the next record.
    pub fn next(&mut self) -> bool {
        if !self.begin() {
            return false;
        }
        match self.state {
            IterState::Positioned => {
                if let Some(it) = self.data_iter.as_mut() {
                    it.next();
                }
                self.skip_forward()
            }
            IterState::BeforeFirst => self.first(),
            IterState::AfterLast | IterState::Errored => false,
        }
    }

    /// Move to the previous record.
    pub fn prev(&mut self) -> bool {
        if !self.begin() {
            return false;
        }
        match self.state {
            IterState::Positioned => {
                if let Some(it) = self.data_iter.as_mut() {
                    it.prev();
                }
                self.skip_backward()
            }
            IterState::AfterLast => self.last(),
            IterState::BeforeFirst | IterState::Errored => false,
        }
    }

    /// True when positioned on a record.
    pub fn valid(&self) -> bool {
        !self.closed && self.state == IterState::Positioned && !self.table.is_closed()
    }

    fn check_positioned(&self) -> Result<()> {
        if self.closed {
            return Err(Error::closed("Iterator is closed"));
        }
        if self.table.is_closed() {
            return Err(Error::closed("Table reader is closed"));
        }
        match self.state {
            IterState::Positioned => Ok(()),
            IterState::Errored => Err(self
                .err
                .clone()
                .unwrap_or_else(|| Error::usage("Iterator is not positioned"))),
            _ => Err(Error::usage("Iterator is not positioned")),
        }
    }

    /// The current key.
    pub fn key(&self) -> Result<&InternalKey> {
        self.check_positioned()?;
        self.key.as_ref().ok_or_else(|| Error::usage("Iterator is not positioned"))
    }

    /// The current value.
    pub fn value(&self) -> Result<&[u8]> {
        self.check_positioned()?;
        match &self.data_iter {
            Some(it) if it.valid() => Ok(it.value()),
            _ => Err(Error::usage("Iterator is not positioned")),
        }
    }

    /// The failure that invalidated the iterator, if any.
    pub fn error(&self) -> Option<&Error> {
        self.err.as_ref()
    }

    /// Release the current data block. Closing twice is a no-op.
    pub fn close(&mut self) {
        self.closed = true;
        self.data_iter = None;
        self.key = None;
    }
}
