//! Tools for reading a ZIP archive.
//!
//! To start reading an archive, first create a [`ZipArchive`] from the file.
//!
//! This library doesn't do any writing, but it's arranged to resemble the
//! structure of the [Zip crate] and leave room for one.
//!
//! [Zip crate]: https://crates.io/crates/zip
//! [`ZipArchive`]: struct.ZipArchive.html

use std::borrow::Cow;
use std::collections::{btree_map, BTreeMap};
use std::io;

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use chrono::NaiveDateTime;
use log::*;

use crate::arch::usize;
use crate::byte_source::ByteSource;
use crate::crc_reader;
pub use crate::decompress::CompressionMethod;
use crate::extra;
use crate::host_attr::HostAttr;
use crate::locator;
use crate::result::*;
use crate::spec::{self, System};
use crate::text_transform;

/// Metadata for a file or directory in the archive,
/// retrieved from its central directory
#[derive(Debug, Clone)]
pub struct FileMetadata<'a> {
    /// Uncompressed size of the file in bytes
    pub size: usize,

    /// Compressed size of the file in bytes
    pub compressed_size: usize,

    /// Compression algorithm used to store the file
    pub compression_method: CompressionMethod,

    /// The CRC-32 of the decompressed file
    pub crc32: u32,

    /// True if the file is encrypted with traditional ZipCrypto.
    pub encrypted: bool,

    /// The provided path of the file.
    pub path: Cow<'a, Utf8Path>,

    /// The last-modified date/time, decoded from the archive's DOS
    /// timestamp (or overridden by a Unix extended timestamp extra
    /// field). `None` if the stored DOS timestamp was out of range.
    pub last_modified: Option<NaiveDateTime>,

    /// The entry's host-specific file attributes (permission bits,
    /// DOS attribute flags, or neither if the host wasn't recognized).
    pub host: HostAttr,

    /// Unix owner id, from a `0x7875` extra field, if present.
    pub uid: Option<u32>,
    /// Unix group id, from a `0x7875` extra field, if present.
    pub gid: Option<u32>,

    /// The entry's comment, if any.
    pub comment: Option<String>,

    /// The offset to the local file header in the archive
    pub(crate) header_offset: usize,
}

impl FileMetadata<'_> {
    /// Returns true if the given entry is a directory
    pub fn is_dir(&self) -> bool {
        // Path::ends_with() doesn't consider separators,
        // so we need a different approach.
        self.host.is_directory() || self.path.as_str().ends_with('/')
    }

    /// Returns true if the given entry is a file
    pub fn is_file(&self) -> bool {
        !self.is_dir() && !self.host.is_symlink()
    }

    /// Returns true if the given entry is a symbolic link (Unix-made
    /// archives only).
    pub fn is_symlink(&self) -> bool {
        self.host.is_symlink()
    }

    pub fn into_owned(self) -> FileMetadata<'static> {
        FileMetadata {
            path: Cow::Owned(self.path.into_owned()),
            ..self
        }
    }

    fn from_cde(cde: &spec::CentralDirectoryEntry) -> ZipResult<Self> {
        let is_utf8 = spec::is_utf8(cde.flags);
        let system = System::from_version_made_by(cde.version_made_by);

        let path_text = text_transform::decode(cde.path, is_utf8)?;
        let path_text = text_transform::normalize_separators(&path_text);
        // APPNOTE 4.4.2.2: archives made on hosts whose native filesystem
        // doesn't preserve case (FAT/VFAT and friends) store names folded
        // to lowercase by convention. A name already carrying the UTF-8
        // flag is an explicit, case-correct name and is never folded.
        let path_text = if !is_utf8 && system.lowercases_names_by_default() {
            path_text.to_lowercase()
        } else {
            path_text
        };

        let overflow = extra::cde_overflow(cde.compressed_size, cde.uncompressed_size, cde.header_offset, cde.disk_number);
        let fields = extra::parse(cde.extra_field, overflow);

        let path_text = resolve_unicode_path(&fields, cde.path, path_text);
        let path = Utf8PathBuf::from(path_text);

        let size = usize(extra::resolved_u64(fields.zip64.and_then(|z| z.uncompressed_size), cde.uncompressed_size))?;
        let compressed_size = usize(extra::resolved_u64(fields.zip64.and_then(|z| z.compressed_size), cde.compressed_size))?;
        let header_offset = usize(extra::resolved_u64(fields.zip64.and_then(|z| z.header_offset), cde.header_offset))?;

        let host = HostAttr::decode(system, cde.external_file_attributes);

        let mut last_modified = spec::parse_msdos(cde.last_modified_time, cde.last_modified_date);
        if let Some(times) = fields.unix_times.and_then(|t| t.modified) {
            last_modified = chrono::DateTime::from_timestamp(times, 0).map(|dt| dt.naive_utc());
        }

        let comment = if !cde.file_comment.is_empty() {
            let decoded = text_transform::decode(cde.file_comment, is_utf8).ok();
            Some(match (fields.unicode_comment.as_ref(), decoded) {
                (Some(field), _) if extra::crc_matches(field, cde.file_comment) => field.text.clone(),
                (_, Some(decoded)) => decoded,
                (_, None) => String::from_utf8_lossy(cde.file_comment).into_owned(),
            })
        } else {
            None
        };

        Ok(Self {
            size,
            compressed_size,
            compression_method: CompressionMethod::from_code(cde.compression_method),
            crc32: cde.crc32,
            encrypted: spec::is_encrypted(cde.flags),
            path: Cow::Owned(path),
            last_modified,
            host,
            uid: fields.unix_ownership.and_then(|o| o.uid),
            gid: fields.unix_ownership.and_then(|o| o.gid),
            comment,
            header_offset,
        })
    }
}

fn resolve_unicode_path(fields: &extra::ExtraFields, original_path: &[u8], fallback: String) -> String {
    match &fields.unicode_path {
        Some(field) if extra::crc_matches(field, original_path) => field.text.clone(),
        Some(_) => {
            warn!("Unicode path extra field's CRC didn't match; falling back to the legacy name");
            fallback
        }
        None => fallback,
    }
}

/// A ZIP archive to be read
#[derive(Debug)]
pub struct ZipArchive<'a> {
    /// The contents of the ZIP archive, as a byte slice, with any SFX/junk
    /// prefix already stripped.
    mapping: &'a [u8],
    /// A list of entries from the ZIP's central directory
    entries: Vec<FileMetadata<'a>>,
    /// The archive's top-level comment.
    pub comment: Vec<u8>,
}

impl<'a> ZipArchive<'a> {
    /// Reads a ZIP archive from a byte slice.
    /// Smaller files can be read into a buffer.
    ///
    /// ```no_run
    /// # use std::fs;
    /// # use zipcore::*;
    /// let bytes = fs::read("foo.zip")?;
    /// let archive = ZipArchive::new(&bytes)?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    ///
    /// For larger ones, memory map!
    /// ```no_run
    /// # use std::fs::File;
    /// # use memmap2::Mmap;
    /// # use zipcore::*;
    /// let zip_file = File::open("foo.zip")?;
    /// let mapping = unsafe { Mmap::map(&zip_file)? };
    /// let archive = ZipArchive::new(&mapping)?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn new(mapping: &'a [u8]) -> ZipResult<Self> {
        let (new_archive, archive_offset) = Self::with_prepended_data(mapping)?;
        if archive_offset != 0 {
            return Err(ZipError::PrependedWithUnknownBytes(archive_offset));
        }
        Ok(new_archive)
    }

    /// Like `ZipArchive::new()`, but allows arbitrary data (an SFX stub,
    /// or garbage) to prepend the archive. Returns the archive and the
    /// number of bytes prepended.
    pub fn with_prepended_data(mapping: &'a [u8]) -> ZipResult<(Self, usize)> {
        Self::locate(mapping, false)
    }

    /// Like [`Self::with_prepended_data`], but widens the End Of Central
    /// Directory search past the usual trailing-comment-sized window.
    /// Costs more for large/garbage-heavy archives; only worth it for
    /// listing tools that want to be maximally permissive.
    pub fn with_prepended_data_searching_whole_file(mapping: &'a [u8]) -> ZipResult<(Self, usize)> {
        Self::locate(mapping, true)
    }

    fn locate(mapping: &'a [u8], search_whole_file: bool) -> ZipResult<(Self, usize)> {
        let source = ByteSource::new(mapping);
        let located = locator::locate(&source, search_whole_file)?;
        let archive_offset = located.archive_offset;
        let logical_source = source.with_logical_start(archive_offset)?;

        let directory = crate::directory::DirectoryIterator::new(
            logical_source,
            located.central_directory_offset,
            located.entry_count,
        )?;

        let mut entries = Vec::with_capacity(usize(located.entry_count)?);
        for dir_entry in directory {
            let dir_entry = dir_entry?;
            trace!("{:?}", dir_entry);
            let file_metadata = FileMetadata::from_cde(&dir_entry)?;
            debug!("{:?}", file_metadata);
            entries.push(file_metadata);
        }

        Ok((
            ZipArchive {
                mapping: logical_source.as_slice(),
                entries,
                comment: located.comment.to_vec(),
            },
            archive_offset,
        ))
    }

    /// Returns the entries found in the ZIP archive's central directory.
    ///
    /// No effort is made to deduplicate or otherwise validate these entries.
    /// To do that, create a [`FileTree`].
    pub fn entries(&self) -> &[FileMetadata] {
        &self.entries
    }

    /// Reads and fully decompresses the given file from the ZIP archive,
    /// reconciling its local header against the central directory entry
    /// and verifying its CRC-32. `password` is required if and only if
    /// `metadata.encrypted` is set.
    ///
    /// Since each file in a ZIP archive is compressed independently,
    /// multiple files can be read in parallel.
    pub fn read(&self, metadata: &FileMetadata, password: Option<&[u8]>) -> ZipResult<Box<dyn io::Read + Send + 'static>> {
        let data = self.read_to_vec(metadata, password)?;
        Ok(Box::new(io::Cursor::new(data)))
    }

    /// Like [`Self::read`], but returns the decompressed bytes directly
    /// rather than wrapping them in a `Read`.
    pub fn read_to_vec(&self, metadata: &FileMetadata, password: Option<&[u8]>) -> ZipResult<Vec<u8>> {
        let path = Utf8PathBuf::from(metadata.path.as_ref());
        let header_bytes = self
            .mapping
            .get(metadata.header_offset..)
            .ok_or_else(|| ZipError::CorruptLocalHeader(path.clone(), "Local header offset past end of archive".into()))?;
        let local_header = spec::LocalFileHeader::parse(header_bytes)?;
        trace!("{:?}", local_header);

        if cfg!(feature = "check-local-metadata") {
            reconcile(metadata, &local_header, &path)?;
        }

        let payload_start = metadata.header_offset + local_header.header_size;
        let payload = self
            .mapping
            .get(payload_start..payload_start + metadata.compressed_size)
            .ok_or_else(|| ZipError::TruncatedEntry {
                path: path.clone(),
                expected: metadata.compressed_size,
                actual: self.mapping.len().saturating_sub(payload_start),
            })?;

        let compressed = if metadata.encrypted {
            let password = password.ok_or_else(|| ZipError::BadPassword(path.clone()))?;
            // APPNOTE 6.1.6: the 12-byte encryption header's last byte is
            // normally checked against the high byte of the CRC-32, but
            // archives that defer sizes/CRC to a trailing data descriptor
            // (bit 3) check against the high byte of the last-modified
            // time instead, since the real CRC isn't known yet.
            let check_byte = if spec::has_data_descriptor(local_header.flags) {
                (local_header.last_modified_time >> 8) as u8
            } else {
                (metadata.crc32 >> 24) as u8
            };
            let reader = crate::crypto::ZipCryptoReader::new(password);
            let valid = reader.validate(payload, check_byte)?;
            let mut out = vec![0u8; valid.len()];
            valid.decrypt_remaining(&mut out)?;
            Cow::Owned(out)
        } else {
            Cow::Borrowed(payload)
        };

        let decompressed = crate::decompress::decompress(metadata.compression_method, &compressed, metadata.size, &path)?;
        crc_reader::verify_slice(&decompressed, metadata.crc32, metadata.size, &path)?;
        Ok(decompressed)
    }
}

fn reconcile(metadata: &FileMetadata, local: &spec::LocalFileHeader, path: &Utf8PathBuf) -> ZipResult<()> {
    // The local header's own size fields may still carry the Zip64
    // sentinel even when the central directory entry resolved it, so
    // only compare them when neither side reports the overflow marker.
    let overflow = extra::lfh_overflow(local.compressed_size, local.uncompressed_size);
    if !overflow.any() {
        if local.compressed_size as usize != metadata.compressed_size {
            warn!(
                "{}: local header compressed size ({}) disagrees with central directory ({}); trusting central directory",
                path, local.compressed_size, metadata.compressed_size
            );
        }
        if local.uncompressed_size as usize != metadata.size && !spec::has_data_descriptor(local.flags) {
            warn!(
                "{}: local header uncompressed size ({}) disagrees with central directory ({}); trusting central directory",
                path, local.uncompressed_size, metadata.size
            );
        }
    }
    if local.compression_method != metadata.compression_method.code() {
        return Err(ZipError::CorruptLocalHeader(
            path.clone(),
            format!(
                "Local header compression method ({}) disagrees with central directory ({})",
                local.compression_method,
                metadata.compression_method.code()
            ),
        ));
    }
    Ok(())
}

/// Maps a directory's child paths to the respective entries.
pub type DirectoryContents<'a> = BTreeMap<&'a str, DirectoryEntry<'a>>;

/// A directory in a ZipArchive, including its metadata and its contents.
#[derive(Debug)]
pub struct Directory<'a> {
    pub metadata: &'a FileMetadata<'a>,
    pub children: DirectoryContents<'a>,
}

impl<'a> Directory<'a> {
    fn new(metadata: &'a FileMetadata<'a>) -> Self {
        Self {
            metadata,
            children: DirectoryContents::new(),
        }
    }
}

/// A file or directory in a [`FileTree`]
#[derive(Debug)]
pub enum DirectoryEntry<'a> {
    File(&'a FileMetadata<'a>),
    Directory(Directory<'a>),
}

impl<'a> DirectoryEntry<'a> {
    /// Returns the metadata of the entry.
    pub fn metadata(&self) -> &'a FileMetadata<'a> {
        match &self {
            DirectoryEntry::File(metadata) => metadata,
            DirectoryEntry::Directory(dir) => dir.metadata,
        }
    }

    fn name(&self) -> &'a str {
        let path = &self.metadata().path;
        path.file_name().expect("Path ended in ..")
    }
}

/// Given metadata from [`ZipArchive::entries()`],
/// organize them into a tree of nested directories and files.
///
/// This does two things:
///
/// 1. It makes files easier to look up by path
///
/// 2. It validates the archive, making sure each `FileMetadata` has a valid path,
///    no duplicates, etc. (The ZIP file format makes no promises here.)
pub fn as_tree<'a>(entries: &'a [FileMetadata<'a>]) -> ZipResult<DirectoryContents<'a>> {
    let mut contents = DirectoryContents::new();

    for entry in entries {
        entree_entry(entry, &mut contents)?;
    }

    Ok(contents)
}

pub trait FileTree<'a> {
    /// Looks up a file or directory by its path.
    fn lookup<P: AsRef<Utf8Path>>(&self, path: P) -> ZipResult<&'a FileMetadata<'a>>;

    /// Returns an iterator over the entries in the tree, sorted by path.
    fn traverse<'b>(&'b self) -> TreeIterator<'a, 'b>;

    /// Returns an iterator over the files in the tree, sorted by path.
    fn files<'b>(&'b self) -> FileTreeIterator<'a, 'b>;

    /// Returns an iterator over the directories in the tree, sorted by path.
    fn directories<'b>(&'b self) -> DirectoryTreeIterator<'a, 'b>;
}

impl<'a> FileTree<'a> for DirectoryContents<'a> {
    fn lookup<P: AsRef<Utf8Path>>(&self, path: P) -> ZipResult<&'a FileMetadata<'a>> {
        let path = path.as_ref();
        let parent_dir = if let Some(parent) = path.parent() {
            match walk_parent_directories(parent, self) {
                Err(ZipError::NoSuchFile(_)) => Err(ZipError::NoSuchFile(path.to_owned())),
                other_result => other_result,
            }?
        } else {
            self
        };

        let base = path
            .file_name()
            .ok_or_else(|| ZipError::InvalidPath(format!("Path {} ended in ..", path)))?;

        parent_dir
            .get(base)
            .ok_or_else(|| ZipError::NoSuchFile(path.to_owned()))
            .map(|dir_entry| dir_entry.metadata())
    }

    fn traverse<'b>(&'b self) -> TreeIterator<'a, 'b> {
        TreeIterator::new(self)
    }

    fn files<'b>(&'b self) -> FileTreeIterator<'a, 'b> {
        FileTreeIterator::new(self)
    }

    fn directories<'b>(&'b self) -> DirectoryTreeIterator<'a, 'b> {
        DirectoryTreeIterator::new(self)
    }
}

/// Places the given entry in the given directory tree.
fn entree_entry<'a>(entry: &'a FileMetadata<'a>, tree: &mut DirectoryContents<'a>) -> ZipResult<()> {
    let path = &entry.path;

    let parent_dir = if let Some(parent) = path.parent() {
        walk_parent_directories_mut(parent, tree)?
    } else {
        tree
    };

    // Check: Path doesn't end in something weird.
    let _base = path
        .file_name()
        .ok_or_else(|| ZipError::Hierarchy(format!("Path {path} ended in ..")))?;

    let to_insert: DirectoryEntry = if entry.is_dir() {
        DirectoryEntry::Directory(Directory::new(entry))
    } else {
        DirectoryEntry::File(entry)
    };

    if parent_dir.insert(to_insert.name(), to_insert).is_some() {
        return Err(ZipError::Hierarchy(format!("Duplicate entry for {path}",)));
    }

    Ok(())
}

/// Used by `entree_entry()` to reach the directory where we'll insert a new entry.
fn walk_parent_directories_mut<'a, 'b>(
    path: &Utf8Path,
    tree: &'b mut DirectoryContents<'a>,
) -> ZipResult<&'b mut DirectoryContents<'a>> {
    let mut current = tree;

    for component in path.components() {
        match component {
            Utf8Component::Prefix(prefix) => {
                let prefix = prefix.as_os_str();
                return Err(ZipError::Hierarchy(format!(
                    "Prefix {} found in path {path}",
                    prefix.to_string_lossy(),
                )));
            }
            Utf8Component::RootDir => {
                warn!("Root directory found in path {path}");
            }
            Utf8Component::CurDir => {
                warn!("Current dir (.) found in path {path}");
            }
            Utf8Component::ParentDir => {
                return Err(ZipError::Hierarchy(format!("Parent dir (..) found in path {path}",)));
            }

            Utf8Component::Normal(component) => {
                if let Some(child) = current.get_mut(component) {
                    match child {
                        DirectoryEntry::Directory(dir) => {
                            current = &mut dir.children;
                        }
                        _ => {
                            return Err(ZipError::Hierarchy(format!("{path} is a file, expected a directory",)));
                        }
                    }
                } else {
                    return Err(ZipError::Hierarchy(format!("{path} found before parent directories",)));
                }
            }
        }
    }
    Ok(current)
}

/// Used by `FileTree::get()` to walk the tree to the parent directory
/// where the desired file lives.
///
/// Consequently, this assumes that `path` is provided by the user,
/// and emits errors accordingly.
fn walk_parent_directories<'a, 'b>(path: &Utf8Path, tree: &'b DirectoryContents<'a>) -> ZipResult<&'b DirectoryContents<'a>> {
    let mut current = tree;

    for component in path.components() {
        match component {
            Utf8Component::Prefix(prefix) => {
                return Err(ZipError::InvalidPath(format!("Prefix {prefix} found in path {path}",)));
            }
            Utf8Component::RootDir => {
                return Err(ZipError::InvalidPath(format!("Root directory found in path {path}",)));
            }
            Utf8Component::CurDir => {
                return Err(ZipError::InvalidPath(format!("Current dir (.) found in path {path}",)));
            }
            Utf8Component::ParentDir => {
                return Err(ZipError::InvalidPath(format!("Parent dir (..) found in path {path}",)));
            }

            Utf8Component::Normal(component) => {
                if let Some(child) = current.get(component) {
                    match child {
                        DirectoryEntry::Directory(dir) => {
                            current = &dir.children;
                        }
                        _ => {
                            return Err(ZipError::InvalidPath(format!("{path} is a file, expected a directory",)));
                        }
                    }
                } else {
                    return Err(ZipError::NoSuchFile(path.to_owned()));
                }
            }
        }
    }
    Ok(current)
}

/// Iterates over all files and directories in a [`FileTree`]
pub struct TreeIterator<'a, 'b> {
    stack: Vec<btree_map::Values<'b, &'a str, DirectoryEntry<'a>>>,
}

impl<'a, 'b> TreeIterator<'a, 'b> {
    fn new(tree: &'b DirectoryContents<'a>) -> Self {
        let stack = vec![tree.values()];
        Self { stack }
    }
}

impl<'a, 'b> Iterator for TreeIterator<'a, 'b> {
    type Item = &'b DirectoryEntry<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.stack.is_empty() {
            return None;
        }
        let next = self.stack.last_mut().unwrap().next();
        match next {
            Some(entry) => {
                if let DirectoryEntry::Directory(d) = entry {
                    self.stack.push(d.children.values());
                }
                return Some(entry);
            }
            None => {
                self.stack.pop();
            }
        };
        self.next()
    }
}

/// Iterates over all files in a [`FileTree`]
pub struct FileTreeIterator<'a, 'b> {
    inner: TreeIterator<'a, 'b>,
}

impl<'a, 'b> FileTreeIterator<'a, 'b> {
    fn new(tree: &'b DirectoryContents<'a>) -> Self {
        Self {
            inner: TreeIterator::new(tree),
        }
    }
}

impl<'a> Iterator for FileTreeIterator<'a, '_> {
    type Item = &'a FileMetadata<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.inner.stack.is_empty() {
            return None;
        }
        let next = self.inner.stack.last_mut().unwrap().next();
        match next {
            Some(DirectoryEntry::File(f)) => {
                return Some(f);
            }
            Some(DirectoryEntry::Directory(d)) => {
                self.inner.stack.push(d.children.values());
            }
            None => {
                self.inner.stack.pop();
            }
        };
        self.next()
    }
}

/// Iterates over all directories in a [`FileTree`]
pub struct DirectoryTreeIterator<'a, 'b> {
    inner: TreeIterator<'a, 'b>,
}

impl<'a, 'b> DirectoryTreeIterator<'a, 'b> {
    fn new(tree: &'b DirectoryContents<'a>) -> Self {
        Self {
            inner: TreeIterator::new(tree),
        }
    }
}

impl<'a, 'b> Iterator for DirectoryTreeIterator<'a, 'b> {
    type Item = &'b Directory<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.inner.stack.is_empty() {
            return None;
        }
        let next = self.inner.stack.last_mut().unwrap().next();
        match next {
            Some(DirectoryEntry::Directory(d)) => {
                self.inner.stack.push(d.children.values());
                return Some(d);
            }
            Some(DirectoryEntry::File(_f)) => {}
            None => {
                self.inner.stack.pop();
            }
        };
        self.next()
    }
}
