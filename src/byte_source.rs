//! A bounds-checked, seekable view over an archive's bytes.
//!
//! Archives here live behind a `&[u8]` -- either read fully into memory or
//! memory-mapped -- so "seeking" is bounds-checked slicing rather than any
//! actual I/O, and there's no block cache to manage: revisiting the same
//! bytes twice is already free. What this type *does* own is the "logical
//! offset" translation: a Zip archive may be prepended with some number of
//! extra bytes (an SFX stub, or garbage), and every offset a ZIP header
//! stores has to be read as if the archive started at that offset instead
//! of absolute position zero.

use crate::result::*;

/// A read-only, bounds-checked view over an archive's bytes.
#[derive(Clone, Copy)]
pub struct ByteSource<'a> {
    mapping: &'a [u8],
}

impl<'a> ByteSource<'a> {
    pub fn new(mapping: &'a [u8]) -> Self {
        Self { mapping }
    }

    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }

    /// Returns the `len` bytes starting at `offset`, failing with
    /// `ShortRead` if that range runs past the end of the archive.
    pub fn read(&self, offset: usize, len: usize) -> ZipResult<&'a [u8]> {
        let available = self.mapping.len().saturating_sub(offset);
        let end = offset
            .checked_add(len)
            .ok_or(ZipError::ShortRead { wanted: len, available })?;
        self.mapping
            .get(offset..end)
            .ok_or(ZipError::ShortRead { wanted: len, available })
    }

    /// Returns everything from `offset` to the end of the archive.
    pub fn tail(&self, offset: usize) -> ZipResult<&'a [u8]> {
        self.mapping.get(offset..).ok_or(ZipError::ShortRead {
            wanted: 0,
            available: 0,
        })
    }

    /// Peeks at the 4-byte signature at `offset`, without otherwise
    /// interpreting it.
    pub fn peek_signature(&self, offset: usize) -> ZipResult<[u8; 4]> {
        let bytes = self.read(offset, 4)?;
        Ok([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    /// Returns a `ByteSource` that starts `archive_offset` logical bytes
    /// into this one. This is the translation step for SFX/garbage-prefixed
    /// archives: once applied, every offset stored in a header can be used
    /// directly.
    pub fn with_logical_start(&self, archive_offset: usize) -> ZipResult<Self> {
        Ok(Self {
            mapping: self.tail(archive_offset)?,
        })
    }

    pub fn as_slice(&self) -> &'a [u8] {
        self.mapping
    }
}
