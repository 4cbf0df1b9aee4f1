//! File handles consumed by the table reader and writer.
//!
//! A reader needs positional reads over an immutable file; a writer needs an
//! append-only handle with explicit flush and sync. Implementations are
//! provided for `std::fs::File` and for [`MemFile`], an in-memory file that
//! can be written by one handle and read through a clone of it.

use crate::error::Result;
use parking_lot::RwLock;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::sync::Arc;

/// A byte-addressable, read-only file.
pub trait ReadableFile: Send + Sync {
    /// Fill `buf` with the bytes starting at `offset`.
    ///
    /// Reading past the end of the file is an `UnexpectedEof` I/O error.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Current size of the file in bytes.
    fn size(&self) -> Result<u64>;
}

/// An append-only file.
pub trait WritableFile: Send {
    /// Append `data` at the end of the file.
    fn append(&mut self, data: &[u8]) -> Result<()>;

    /// Push buffered data to the operating system.
    fn flush(&mut self) -> Result<()>;

    /// Flush and make the contents durable.
    fn sync(&mut self) -> Result<()>;
}

impl ReadableFile for File {
    #[cfg(unix)]
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        use std::os::unix::fs::FileExt;
        self.read_exact_at(buf, offset)?;
        Ok(())
    }

    #[cfg(windows)]
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        use std::os::windows::fs::FileExt;
        let mut done = 0;
        while done < buf.len() {
            let n = self.seek_read(&mut buf[done..], offset + done as u64)?;
            if n == 0 {
                return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
            }
            done += n;
        }
        Ok(())
    }

    fn size(&self) -> Result<u64> {
        Ok(self.metadata()?.len())
    }
}

impl WritableFile for BufWriter<File> {
    fn append(&mut self, data: &[u8]) -> Result<()> {
        self.write_all(data)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Write::flush(self)?;
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        Write::flush(self)?;
        self.get_ref().sync_all()?;
        Ok(())
    }
}

/// An in-memory file. Clones share the same contents.
#[derive(Debug, Clone, Default)]
pub struct MemFile {
    data: Arc<RwLock<Vec<u8>>>,
}

impl MemFile {
    /// Create an empty file.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a file holding `data`.
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self { data: Arc::new(RwLock::new(data)) }
    }

    /// Current length in bytes.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// True if the file holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the contents.
    pub fn to_vec(&self) -> Vec<u8> {
        self.data.read().clone()
    }

    /// Mutate the contents in place.
    pub fn update<F: FnOnce(&mut Vec<u8>)>(&self, f: F) {
        f(&mut self.data.write());
    }
}

impl ReadableFile for MemFile {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let data = self.data.read();
        let start = usize::try_from(offset).unwrap_or(usize::MAX);
        let end = start.checked_add(buf.len());
        match end {
            Some(end) if end <= data.len() => {
                buf.copy_from_slice(&data[start..end]);
                Ok(())
            }
            _ => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("read of {} bytes at {} past end of {}-byte file", buf.len(), offset, data.len()),
            )
            .into()),
        }
    }

    fn size(&self) -> Result<u64> {
        Ok(self.len() as u64)
    }
}

impl WritableFile for MemFile {
    fn append(&mut self, data: &[u8]) -> Result<()> {
        self.data.write().extend_from_slice(data);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        Ok(())
    }
}
