//! The top-level extraction pipeline: select entries, decompress them,
//! and hand the bytes to a [`Sink`] -- or just report on them, for list
//! and test modes.
//!
//! A caller could assemble `select` + `read_to_vec` + `Sink` calls by
//! hand, but pulling it into its own type gets consistent selection,
//! error-severity, and cancellation handling without having to
//! reassemble it every time.

use std::sync::atomic::{AtomicBool, Ordering};

use camino::Utf8PathBuf;
use log::*;

use crate::read::{FileMetadata, FileTree, ZipArchive};
use crate::result::*;
use crate::selector::EntrySelector;
use crate::sink::Sink;

/// What to do with a password-protected entry when no password (or the
/// wrong one) was supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptedEntryPolicy {
    /// Fail the whole walk.
    Fatal,
    /// Skip the entry, recording a [`ZipError::BadPassword`] warning.
    Skip,
}

/// Configuration for a single archive walk. Constructed once and reused
/// across `list`/`extract`/`test`.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub selector: EntrySelector,
    pub password: Option<Vec<u8>>,
    pub encrypted_entry_policy: EncryptedEntryPolicy,
    /// Stop at the first per-entry error instead of collecting it and
    /// continuing, the way `unzip`'s default (non-`-q`) behavior does.
    pub stop_on_first_error: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            selector: EntrySelector::new(),
            password: None,
            encrypted_entry_policy: EncryptedEntryPolicy::Skip,
            stop_on_first_error: false,
        }
    }
}

/// One entry's outcome from a walk: either it succeeded, or it failed
/// with an error whose severity was [`Severity::PerEntry`] or
/// [`Severity::Warning`] and the walk kept going.
#[derive(Debug)]
pub struct EntryOutcome {
    pub path: Utf8PathBuf,
    pub result: Result<(), ZipError>,
}

/// Lets a caller interrupt a long-running extraction between entries.
/// Checked once per entry; an archive mid-entry is always finished.
#[derive(Default)]
pub struct CancelToken(AtomicBool);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Runs `options.selector` against an archive's entries and returns the
/// metadata for every entry that was selected, sorted by path (directory
/// creation order falls naturally out of this for any reasonable tree).
///
/// The archive's DOS volume-label entry, if it has one, never appears
/// here -- it isn't a file or directory, so `extract`/`test` have nothing
/// sensible to do with it. Use [`volume_label`] to get at it separately.
pub fn select<'a>(archive: &'a ZipArchive<'a>, options: &ExtractOptions) -> ZipResult<Vec<&'a FileMetadata<'a>>> {
    let tree = crate::read::as_tree(archive.entries())?;
    let mut selected: Vec<&FileMetadata> = tree
        .traverse()
        .map(|e| e.metadata())
        .filter(|m| !m.host.is_volume_label())
        .filter(|m| options.selector.selects(m.path.as_str()))
        .collect();
    selected.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(selected)
}

/// The archive's DOS volume-label entry, if it has one. This is a
/// holdover from floppy-disk-era archivers recording the disk's label
/// alongside its files (APPNOTE 4.4.2.2's host byte and external
/// attribute bit `0x08`); it's reported on its own rather than flowing
/// through `select`/`extract`/`test` like an ordinary entry.
pub fn volume_label<'a>(archive: &'a ZipArchive<'a>) -> Option<&'a FileMetadata<'a>> {
    archive.entries().iter().find(|m| m.host.is_volume_label())
}

/// Extracts every selected entry in `archive` into `sink`.
///
/// Entries are processed in path order; directories are created before
/// any file beneath them is written (a side effect of sorting by path
/// and `Sink::create_directory` being idempotent for already-existing
/// directories). Per-entry errors are recorded in the returned
/// `Vec<EntryOutcome>` rather than aborting the walk, unless
/// `options.stop_on_first_error` is set or the error's
/// [`ZipError::severity`] is [`Severity::Fatal`].
pub fn extract<'a>(
    archive: &'a ZipArchive<'a>,
    options: &ExtractOptions,
    sink: &mut dyn Sink,
    cancel: Option<&CancelToken>,
) -> ZipResult<Vec<EntryOutcome>> {
    let entries = select(archive, options)?;
    let mut outcomes = Vec::with_capacity(entries.len());

    for metadata in entries {
        if cancel.map_or(false, CancelToken::is_cancelled) {
            return Err(ZipError::Cancelled);
        }

        let path = Utf8PathBuf::from(metadata.path.as_ref());
        match extract_one(archive, metadata, options, sink) {
            Ok(()) => outcomes.push(EntryOutcome { path, result: Ok(()) }),
            Err(err) if err.severity() == Severity::Fatal => return Err(err),
            Err(err) => {
                warn!("{}: {}", path, err);
                let stop = options.stop_on_first_error;
                outcomes.push(EntryOutcome { path, result: Err(err) });
                if stop {
                    return Ok(outcomes);
                }
            }
        }
    }

    Ok(outcomes)
}

fn extract_one(archive: &ZipArchive, metadata: &FileMetadata, options: &ExtractOptions, sink: &mut dyn Sink) -> ZipResult<()> {
    if metadata.is_dir() {
        return sink.create_directory(&metadata.path);
    }

    if metadata.encrypted && options.password.is_none() && options.encrypted_entry_policy == EncryptedEntryPolicy::Skip {
        return Err(ZipError::BadPassword(Utf8PathBuf::from(metadata.path.as_ref())));
    }

    let data = archive.read_to_vec(metadata, options.password.as_deref())?;
    sink.write_entry(&metadata.path, &data)
}

/// Test mode: decompresses and CRC-checks every selected entry without
/// keeping the bytes, returning the same per-entry outcomes `extract`
/// would for a [`crate::sink::DiscardSink`].
pub fn test<'a>(archive: &'a ZipArchive<'a>, options: &ExtractOptions, cancel: Option<&CancelToken>) -> ZipResult<Vec<EntryOutcome>> {
    let mut sink = crate::sink::DiscardSink;
    extract(archive, options, &mut sink, cancel)
}
