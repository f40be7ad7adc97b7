//! Error types and the related `Result<T>`
//!
//! The taxonomy distinguishes errors that are fatal for the whole archive
//! walk from ones scoped to a single entry; see [`ZipError::severity`].

use camino::Utf8PathBuf;
use thiserror::Error;

pub type ZipResult<T> = Result<T, ZipError>;

/// How far an error's damage reaches.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Severity {
    /// Stops the archive walk outright.
    Fatal,
    /// Scoped to the entry that produced it; the walk continues.
    PerEntry,
    /// Recoverable anomaly, accumulated for reporting.
    Warning,
}

#[derive(Debug, Error)]
pub enum ZipError {
    /// An error from underlying I/O
    #[error("I/O Error")]
    Io(#[from] std::io::Error),

    /// The ZIP archive contained invalid data per the spec.
    #[error("Invalid Zip archive: {0}")]
    InvalidArchive(&'static str),

    /// A read ran past the end of the available bytes.
    #[error("Short read: wanted {wanted} bytes, {available} available")]
    ShortRead { wanted: usize, available: usize },

    /// No End Of Central Directory signature was found in the search window.
    #[error("Not a Zip file: no End Of Central Directory record found")]
    NotAZipfile,

    /// The central directory's entry count, or a record signature, didn't
    /// check out.
    #[error("Corrupt central directory: {0}")]
    CorruptDirectory(String),

    /// A local file header was missing, or disagreed with its central
    /// directory entry in a way that can't be reconciled.
    #[error("Corrupt local header for {0}: {1}")]
    CorruptLocalHeader(Utf8PathBuf, String),

    /// Decoding a UTF-8 name or comment failed
    #[error("Invalid UTF-8")]
    Encoding(#[from] std::str::Utf8Error),

    /// The ZIP archive uses an unsupported feature
    #[error("Unsupported Zip archive: {0}")]
    UnsupportedArchive(String),

    /// No decompressor is registered for this entry's method code.
    #[error("Unsupported compression method {0} for {1}")]
    UnsupportedMethod(u16, Utf8PathBuf),

    /// The entry's CRC-32 didn't match the one recorded in the archive.
    #[error("CRC mismatch for {path}: expected {expected:#010x}, got {actual:#010x}")]
    CrcError {
        path: Utf8PathBuf,
        expected: u32,
        actual: u32,
    },

    /// The supplied password (or lack of one) failed the encryption header
    /// check.
    #[error("Bad password for {0}")]
    BadPassword(Utf8PathBuf),

    /// The decompressor ended before, or after, the expected byte count.
    #[error("Truncated entry {path}: expected {expected} bytes, got {actual}")]
    TruncatedEntry {
        path: Utf8PathBuf,
        expected: usize,
        actual: usize,
    },

    /// A path escaped the extraction root, or otherwise can't be trusted.
    #[error("Unsafe path in archive: {0}")]
    UnsafePath(String),

    /// The output sink ran out of room.
    #[error("Disk full writing {0}")]
    DiskFull(Utf8PathBuf),

    /// The caller's cancel flag was set.
    #[error("Extraction cancelled")]
    Cancelled,

    /// The ZIP archive is prepended some unknown bytes.
    /// (Use [`crate::read::ZipArchive::with_prepended_data`] if this is okay.)
    #[error("Archive prepended with {0} unknown bytes")]
    PrependedWithUnknownBytes(usize),

    /// The ZIP archive contained a nonsensical file hierarchy
    /// (duplicate entries, bad paths, etc.)
    #[error("Archive contained a strange file hierarchy: {0}")]
    Hierarchy(String),

    /// A file wasn't found at the provided path
    #[error("No file in the archive with the path {0}")]
    NoSuchFile(Utf8PathBuf),

    /// A user-provided path (not one from a ZIP archive) was invalid.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// A cast from a 64-bit int to a usize failed while mapping the file,
    /// probably on a 32-bit system.
    ///
    /// Future work could include a version of the reader that uses multiple
    /// file streams instead of a memory map to work with large files in 32 bits.
    #[error("Zip archive too large for address space")]
    InsufficientAddressSpace,
}

impl ZipError {
    /// Classifies this error as fatal for the archive walk, scoped to one
    /// entry, or a recoverable warning.
    pub fn severity(&self) -> Severity {
        use ZipError::*;
        match self {
            Io(_) | NotAZipfile | CorruptDirectory(_) | InsufficientAddressSpace
            | Hierarchy(_) | Cancelled => Severity::Fatal,

            CorruptLocalHeader(..)
            | Encoding(_)
            | UnsupportedMethod(..)
            | CrcError { .. }
            | BadPassword(_)
            | TruncatedEntry { .. }
            | UnsafePath(_)
            | DiskFull(_)
            | NoSuchFile(_)
            | InvalidPath(_) => Severity::PerEntry,

            InvalidArchive(_)
            | ShortRead { .. }
            | UnsupportedArchive(_)
            | PrependedWithUnknownBytes(_) => Severity::Warning,
        }
    }
}
