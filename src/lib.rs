//! zipcore is a Zip archive reader and extraction engine designed to
//! decompress any number of files concurrently using a simple API:
//!
//! ```no_run
//! # use std::fs;
//! # use zipcore::*;
//! // For smaller files,
//! let bytes = fs::read("foo.zip")?;
//! let archive = ZipArchive::new(&bytes)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//! works just fine. Memory map larger files!
//! ```no_run
//! # use std::fs::File;
//! # use std::io;
//! # use memmap2::Mmap;
//! # use zipcore::*;
//! # use zipcore::read::*;
//! # use zipcore::sink::{FileSink, FixedAnswer, OverwritePolicy, Sink};
//! #
//! let zip_file = File::open("foo.zip")?;
//! let mapping = unsafe { Mmap::map(&zip_file)? };
//! let archive = ZipArchive::new(&mapping)?;
//!
//! // We can iterate through the entries in the archive directly...
//! //
//! //     for entry in archive.entries() {
//! //         let data = archive.read_to_vec(entry, None)?;
//! //         // Do something with the bytes!
//! //     }
//! //
//! // ...but ZIP doesn't guarantee that entries are in any particular order,
//! // that there aren't duplicates, that an entry has a valid file path, etc.
//! // Let's do some validation and organize them into a tree of files and folders.
//! let tree = as_tree(archive.entries())?;
//!
//! // With that done, we can get a file (or directory)'s metadata from its path.
//! let metadata = tree.lookup("some/specific/file")?;
//! // And read the file out, if we'd like:
//! let mut prompt = FixedAnswer(true);
//! let mut sink = FileSink::new(".", OverwritePolicy::Always, &mut prompt);
//! let data = archive.read_to_vec(metadata, None)?;
//! sink.write_entry(&metadata.path, &data)?;
//!
//! // Or extract the whole archive at once, respecting a glob selection:
//! let options = driver::ExtractOptions::default();
//! driver::extract(&archive, &options, &mut sink, None)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Zip is an interesting archive format: unlike compressed tarballs often seen
//! in Linux land (`*.tar.gz`, `*.tar.zst`, ...),
//! each file in a Zip archive is compressed independently,
//! with a central directory telling us where to find each file.
//! This allows us to extract multiple files simultaneously so long as we can
//! read from multiple places at once.
//!
//! Users can either read the entire archive into memory, or, for larger archives,
//! [memory-map](https://docs.rs/memmap2) the file.
//! (On 64-bit systems, this allows us to treat archives as a contiguous byte range
//! even if the file is _much_ larger than physical RAM. 32-bit systems are limited
//! by address space to archives under 4 GB, but zipcore _should_ be well-behaved
//! if the archive is small enough.)
//!
//! # Scope
//!
//! This crate only reads and extracts archives in the PKZIP 2.x /
//! APPNOTE family, with Zip64 and traditional ("ZipCrypto") decryption
//! support. It does not write or update archives, does not support
//! archives split across multiple disks/volumes (these are detected and
//! rejected outright), and does not implement AES encryption or the
//! legacy Shrink/Reduce/Implode compression methods -- entries using
//! those report [`result::ZipError::UnsupportedMethod`] rather than
//! silently producing garbage.

pub mod byte_source;
pub mod crypto;
pub mod decompress;
pub mod directory;
pub mod driver;
pub mod extra;
pub mod host_attr;
pub mod locator;
pub mod read;
pub mod result;
pub mod selector;
pub mod sink;
pub mod text_transform;

pub use read::{as_tree, CompressionMethod, ZipArchive};
pub use result::{ZipError, ZipResult};

mod arch;
mod crc_reader;
mod spec;
