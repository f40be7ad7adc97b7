//! Finds the End Of Central Directory record (and its Zip64 friends), and
//! works out how many bytes of unrelated data (an SFX stub, or garbage)
//! were prepended to the archive.
//!
//! Grounded in Info-ZIP's `unzip`: the "extra bytes" arithmetic and the
//! one-shot retry-with-zero-compensation dance below follow the
//! `process_cdir_strm()`/`end_central` logic in `process.c` almost line
//! for line, translated from C globals into return values.

use log::*;
use memchr::memmem;

use crate::arch::usize;
use crate::byte_source::ByteSource;
use crate::result::*;
use crate::spec::{self, EOCDR_SEARCH_WINDOW};

/// Everything `ZipArchive::new` needs to start walking the central
/// directory: where it actually starts, how many entries it holds, and how
/// far the whole archive is logically shifted from byte zero.
#[derive(Debug)]
pub struct LocatedDirectory<'a> {
    /// Number of bytes of unrelated data prepended to the archive (0 for a
    /// "clean" file).
    pub archive_offset: usize,
    /// Offset of the first central directory entry, relative to the
    /// logical start of the archive (i.e. after `archive_offset` has
    /// already been subtracted).
    pub central_directory_offset: usize,
    pub entry_count: u64,
    pub comment: &'a [u8],
    pub is_zip64: bool,
}

/// Scans `source` for the End Of Central Directory record, resolves any
/// Zip64 extension, and returns enough information to start walking the
/// central directory. `search_whole_file` widens the backward scan past
/// the usual 66 KiB window, for listing modes willing to pay the cost.
pub fn locate<'a>(source: &ByteSource<'a>, search_whole_file: bool) -> ZipResult<LocatedDirectory<'a>> {
    let whole = source.as_slice();
    let window_start = if search_whole_file {
        0
    } else {
        whole.len().saturating_sub(EOCDR_SEARCH_WINDOW)
    };
    let search_space = &whole[window_start..];

    let eocdr_posit_in_window = memmem::rfind(search_space, &spec::EOCDR_MAGIC).ok_or(ZipError::NotAZipfile)?;
    let real_eocdr_offset = window_start + eocdr_posit_in_window;
    let eocdr = spec::EndOfCentralDirectory::parse(&whole[real_eocdr_offset..])?;
    trace!("{:?}", eocdr);

    if eocdr.disk_number != eocdr.disk_with_central_directory {
        return Err(ZipError::UnsupportedArchive(format!(
            "No support for multi-disk archives: disk ({}) != disk with central directory ({})",
            eocdr.disk_number, eocdr.disk_with_central_directory
        )));
    }
    if eocdr.entries != eocdr.entries_on_this_disk {
        return Err(ZipError::UnsupportedArchive(format!(
            "No support for multi-disk archives: entries ({}) != entries this disk ({})",
            eocdr.entries, eocdr.entries_on_this_disk
        )));
    }

    let mut is_zip64 = false;
    let nominal_central_directory_offset: usize;
    let mut entry_count: u64 = eocdr.entries as u64;
    let mut central_directory_size: u64 = eocdr.central_directory_size as u64;
    let mut central_directory_offset: u64 = eocdr.central_directory_offset as u64;

    // Step 5: look for a Zip64 locator immediately before the EOCD.
    let zip64_locator_posit = real_eocdr_offset.checked_sub(spec::Zip64EndOfCentralDirectoryLocator::size_in_file());
    let zip64_locator = zip64_locator_posit.and_then(|posit| {
        spec::Zip64EndOfCentralDirectoryLocator::parse(&whole[posit..])
    });

    if let Some(locator) = zip64_locator {
        trace!("{:?}", locator);
        if locator.disks != 1 {
            return Err(ZipError::UnsupportedArchive(format!(
                "No support for multi-disk archives: Zip64 EOCDR locator reports {} disks",
                locator.disks
            )));
        }

        let zip64_eocdr_nominal_offset = usize(locator.zip64_eocdr_offset)?;
        // Try the nominal position; if that's not a Zip64 EOCDR signature,
        // compensate by 56 bytes (the locator's own fixed size, minus the
        // signature+size fields already walked past) -- this handles
        // archives whose prefix arithmetic the locator didn't account for.
        let candidate_offsets = [zip64_eocdr_nominal_offset, zip64_eocdr_nominal_offset.wrapping_sub(56)];

        let mut found = None;
        for &candidate in &candidate_offsets {
            if candidate >= whole.len() {
                continue;
            }
            if whole[candidate..].len() >= 4 && whole[candidate..candidate + 4] == spec::ZIP64_EOCDR_MAGIC {
                found = Some(candidate);
                break;
            }
        }

        let zip64_eocdr_offset = found.ok_or(ZipError::InvalidArchive(
            "Zip64 End Of Central Directory Locator points to no Zip64 EOCDR",
        ))?;
        let zip64_eocdr = spec::Zip64EndOfCentralDirectory::parse(&whole[zip64_eocdr_offset..])?;
        trace!("{:?}", zip64_eocdr);

        is_zip64 = true;
        entry_count = zip64_eocdr.entries;
        central_directory_size = zip64_eocdr.central_directory_size;
        central_directory_offset = zip64_eocdr.central_directory_offset;

        // The archive is logically shifted by however far the Zip64 EOCDR
        // actually sits from where the locator nominally claims it is.
        let archive_offset = zip64_eocdr_offset
            .checked_sub(zip64_eocdr_nominal_offset.min(zip64_eocdr_offset))
            .unwrap_or(0);
        nominal_central_directory_offset = usize(central_directory_offset)?;
        return Ok(LocatedDirectory {
            archive_offset,
            central_directory_offset: nominal_central_directory_offset,
            entry_count,
            comment: eocdr.file_comment,
            is_zip64,
        });
    }

    // No Zip64: work out the prefix length N per step 6-7.
    nominal_central_directory_offset = usize(central_directory_offset)?;
    let central_directory_size = usize(central_directory_size)?;

    // Step 7: cd-offset == 0 but cd-size > 0 is a known third-party bug
    // (process.c's "zip 1.5 -go bug" / NullCentDirOffset compensation).
    // NullCentDirOffset sets extra_bytes (our archive_offset) to 0 and only
    // compensates the central directory's own offset -- `locate()`'s caller
    // seeks to `archive_offset + central_directory_offset`, so setting both
    // to the same value would double it.
    if nominal_central_directory_offset == 0 && central_directory_size != 0 {
        return Ok(LocatedDirectory {
            archive_offset: 0,
            central_directory_offset: real_eocdr_offset.saturating_sub(central_directory_size),
            entry_count,
            comment: eocdr.file_comment,
            is_zip64,
        });
    }

    let expected_eocdr_offset = nominal_central_directory_offset as i64 + central_directory_size as i64;
    let extra_bytes = real_eocdr_offset as i64 - expected_eocdr_offset;

    if extra_bytes < 0 {
        return Err(ZipError::InvalidArchive(
            "Missing bytes: central directory claims to extend past the End Of Central Directory record",
        ));
    }

    if extra_bytes > 0 {
        warn!("{} extra byte(s) at the beginning of the archive", extra_bytes);
    }

    let archive_offset = extra_bytes as usize;

    // Verify: does the central directory actually start with its
    // signature once we apply the offset? If not, this may be one of the
    // STZip/ZIPSPLIT archives the Info-ZIP source retries for: force the
    // prefix to zero and try the nominal offset directly. An archive with
    // no entries has no signature to find at all -- the offset points
    // straight at the EOCDR -- so there's nothing to verify.
    let check = |offset: usize| -> bool {
        let start = offset + nominal_central_directory_offset;
        whole.len() >= start + 4 && whole[start..start + 4] == spec::CENTRAL_DIRECTORY_MAGIC
    };

    let resolved_offset = if entry_count == 0 {
        archive_offset
    } else if check(archive_offset) {
        archive_offset
    } else if check(0) {
        warn!("Central directory length looked wrong; retrying with no prefix compensation");
        0
    } else {
        return Err(ZipError::CorruptDirectory(
            "Could not find central directory start signature".into(),
        ));
    };

    Ok(LocatedDirectory {
        archive_offset: resolved_offset,
        central_directory_offset: nominal_central_directory_offset,
        entry_count,
        comment: eocdr.file_comment,
        is_zip64,
    })
}
