//! Error types for sorted table files.

use std::io;
use std::sync::Arc;
use thiserror::Error as ThisError;

/// The result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for table operations.
///
/// Errors are `Clone` so that a reader or iterator which observed a failure
/// can keep reporting the same failure on every later call.
#[derive(Debug, Clone, ThisError)]
pub enum Error {
    /// An I/O error occurred in the underlying file.
    #[error("IO error: {0}")]
    Io(#[source] Arc<io::Error>),

    /// The file is not a table this crate understands (bad magic, unknown
    /// version, truncated footer or block handle).
    #[error("Format error: {0}")]
    Format(String),

    /// Data corruption was detected inside a block.
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// A block checksum did not match its contents.
    #[error("Checksum mismatch in block at offset {offset}: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch {
        /// File offset of the block.
        offset: u64,
        /// The checksum stored in the block trailer.
        expected: u32,
        /// The checksum computed over the stored payload.
        actual: u32,
    },

    /// A block uses an unknown compression codec or failed to (de)compress.
    #[error("Compression error: {0}")]
    Compression(String),

    /// The API was used in a way its contract forbids.
    #[error("Usage error: {0}")]
    Usage(String),

    /// The reader, iterator or writer has been closed.
    #[error("Closed: {0}")]
    Closed(String),

    /// An invalid option value was provided.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    /// Creates a new format error.
    pub fn format(msg: impl Into<String>) -> Self {
        Error::Format(msg.into())
    }

    /// Creates a new corruption error.
    pub fn corruption(msg: impl Into<String>) -> Self {
        Error::Corruption(msg.into())
    }

    /// Creates a new compression error.
    pub fn compression(msg: impl Into<String>) -> Self {
        Error::Compression(msg.into())
    }

    /// Creates a new usage error.
    pub fn usage(msg: impl Into<String>) -> Self {
        Error::Usage(msg.into())
    }

    /// Creates a new closed error.
    pub fn closed(msg: impl Into<String>) -> Self {
        Error::Closed(msg.into())
    }

    /// Creates a new invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// True for checksum mismatches and malformed block contents.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Error::Corruption(_) | Error::ChecksumMismatch { .. })
    }

    /// True for footer and handle level format failures.
    pub fn is_format(&self) -> bool {
        matches!(self, Error::Format(_))
    }

    /// True for contract violations, including use after close.
    pub fn is_usage(&self) -> bool {
        matches!(self, Error::Usage(_) | Error::Closed(_))
    }

    /// True when a reader or iterator must stop serving reads after seeing
    /// this error.
    pub(crate) fn is_fatal(&self) -> bool {
        self.is_corruption() || self.is_format() || matches!(self, Error::Compression(_))
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(Arc::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::corruption("test corruption");
        assert_eq!(err.to_string(), "Data corruption: test corruption");

        let err = Error::ChecksumMismatch { offset: 4096, expected: 0x12345678, actual: 0x87654321 };
        assert!(err.to_string().contains("0x12345678"));
        assert!(err.to_string().contains("0x87654321"));
        assert!(err.to_string().contains("4096"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_error_classification() {
        assert!(Error::ChecksumMismatch { offset: 0, expected: 1, actual: 2 }.is_corruption());
        assert!(Error::format("bad magic").is_format());
        assert!(Error::closed("reader").is_usage());
        assert!(Error::usage("out of order").is_usage());
        assert!(!Error::usage("out of order").is_fatal());
        assert!(Error::compression("unknown codec").is_fatal());
    }

    #[test]
    fn test_error_clone_keeps_io_source() {
        let err: Error = io::Error::new(io::ErrorKind::UnexpectedEof, "short read").into();
        let cloned = err.clone();
        assert_eq!(err.to_string(), cloned.to_string());
    }
}
