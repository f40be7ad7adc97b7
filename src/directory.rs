//! Walks the central directory, one entry at a time.
//!
//! This is deliberately dumb: it knows nothing about extra fields, Unicode
//! names, or reconciliation against local headers. That's `crate::read`'s
//! job, building on top of what this module hands back.

use crate::byte_source::ByteSource;
use crate::result::*;
use crate::spec::CentralDirectoryEntry;

/// Iterates the `count` central directory entries starting at `offset`
/// within `source`.
pub struct DirectoryIterator<'a> {
    source: ByteSource<'a>,
    cursor: &'a [u8],
    remaining: u64,
    seen_early_end: bool,
}

impl<'a> DirectoryIterator<'a> {
    pub fn new(source: ByteSource<'a>, offset: usize, count: u64) -> ZipResult<Self> {
        let cursor = source.tail(offset)?;
        Ok(Self {
            source,
            cursor,
            remaining: count,
            seen_early_end: false,
        })
    }
}

impl<'a> Iterator for DirectoryIterator<'a> {
    type Item = ZipResult<CentralDirectoryEntry<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 || self.seen_early_end {
            return None;
        }
        // A truncated directory (fewer entries than the EOCD claims) is
        // detected by running out of the central-directory-entry
        // signature before the declared count is reached.
        if self.cursor.len() < 4 || self.cursor[..4] != crate::spec::CENTRAL_DIRECTORY_MAGIC {
            self.seen_early_end = true;
            return Some(Err(ZipError::CorruptDirectory(format!(
                "Central directory ended after fewer entries than declared ({} remaining)",
                self.remaining
            ))));
        }
        self.remaining -= 1;
        Some(CentralDirectoryEntry::parse_and_consume(&mut self.cursor))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.remaining.min(usize::MAX as u64) as usize;
        (remaining, Some(remaining))
    }
}

impl<'a> DirectoryIterator<'a> {
    /// The underlying byte source, for callers that need to go read a
    /// local header once they've resolved an entry's offset.
    pub fn source(&self) -> ByteSource<'a> {
        self.source
    }
}
