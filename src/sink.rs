//! Output sinks: where an extracted entry's bytes actually go.
//!
//! The driver doesn't know or care whether it's writing to disk, a pipe,
//! or an in-memory buffer -- it just calls [`Sink::write_entry`]. Writing
//! straight to disk with `fs::create_dir_all` + `File::create` +
//! `io::copy` is really just one of several possible sinks; this makes
//! that an explicit seam instead of the only option.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use camino::Utf8Path;

use crate::result::*;

/// What to do when the destination for an entry already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverwritePolicy {
    /// Replace the existing file unconditionally.
    Always,
    /// Leave the existing file alone and skip the entry.
    Never,
    /// Ask the caller via [`InputPrompt`], once per conflicting entry.
    Prompt,
}

/// Callback used to ask the caller a yes/no question -- almost always
/// "overwrite this file?" -- without this crate touching a terminal
/// itself. CLI front-ends wire this to stdin; library users can wire it
/// to whatever makes sense for them (always-yes, a GUI dialog, etc).
pub trait InputPrompt {
    fn confirm_overwrite(&mut self, path: &Utf8Path) -> bool;
}

/// An `InputPrompt` that always answers the same way, for headless use
/// (`-o`/`-n` style flags instead of an interactive prompt).
pub struct FixedAnswer(pub bool);

impl InputPrompt for FixedAnswer {
    fn confirm_overwrite(&mut self, _path: &Utf8Path) -> bool {
        self.0
    }
}

/// Where extracted bytes are written.
pub trait Sink {
    /// Writes one entry's already-decompressed bytes out.
    fn write_entry(&mut self, path: &Utf8Path, data: &[u8]) -> ZipResult<()>;

    /// Ensures a directory entry exists, without writing any bytes.
    fn create_directory(&mut self, path: &Utf8Path) -> ZipResult<()>;
}

/// Extracts entries to real files under a root directory, refusing to
/// write outside it (the caller is expected to have already rejected
/// unsafe paths; this is a last-ditch belt-and-suspenders check).
pub struct FileSink<'p, P: InputPrompt> {
    root: PathBuf,
    overwrite: OverwritePolicy,
    prompt: &'p mut P,
}

impl<'p, P: InputPrompt> FileSink<'p, P> {
    pub fn new(root: impl Into<PathBuf>, overwrite: OverwritePolicy, prompt: &'p mut P) -> Self {
        Self {
            root: root.into(),
            overwrite,
            prompt,
        }
    }

    fn resolve(&self, path: &Utf8Path) -> ZipResult<PathBuf> {
        if path.is_absolute() || path.components().any(|c| c.as_str() == "..") {
            return Err(ZipError::UnsafePath(path.to_string()));
        }
        Ok(self.root.join(path.as_std_path()))
    }

    fn should_write(&mut self, dest: &Path, archive_path: &Utf8Path) -> ZipResult<bool> {
        if !dest.exists() {
            return Ok(true);
        }
        match self.overwrite {
            OverwritePolicy::Always => Ok(true),
            OverwritePolicy::Never => Ok(false),
            OverwritePolicy::Prompt => Ok(self.prompt.confirm_overwrite(archive_path)),
        }
    }
}

impl<'p, P: InputPrompt> Sink for FileSink<'p, P> {
    fn write_entry(&mut self, path: &Utf8Path, data: &[u8]) -> ZipResult<()> {
        let dest = self.resolve(path)?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        if !self.should_write(&dest, path)? {
            return Ok(());
        }
        let mut file = fs::File::create(&dest)?;
        file.write_all(data).map_err(|e| {
            // ENOSPC, the one `errno` this crate bothers distinguishing
            // from a generic I/O error: callers generally want to stop
            // the whole extraction and tell the user to free up space,
            // rather than treat it like a per-entry fluke.
            if e.raw_os_error() == Some(28) {
                ZipError::DiskFull(camino::Utf8PathBuf::from_path_buf(dest.clone()).unwrap_or_default())
            } else {
                ZipError::Io(e)
            }
        })?;
        Ok(())
    }

    fn create_directory(&mut self, path: &Utf8Path) -> ZipResult<()> {
        let dest = self.resolve(path)?;
        fs::create_dir_all(dest)?;
        Ok(())
    }
}

/// Collects extracted entries into memory instead of the filesystem,
/// for embedding use cases (extracting into a sandbox, a test fixture,
/// etc.) where touching disk isn't wanted.
#[derive(Default)]
pub struct MemorySink {
    pub files: BTreeMap<String, Vec<u8>>,
    pub directories: Vec<String>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Sink for MemorySink {
    fn write_entry(&mut self, path: &Utf8Path, data: &[u8]) -> ZipResult<()> {
        self.files.insert(path.to_string(), data.to_vec());
        Ok(())
    }

    fn create_directory(&mut self, path: &Utf8Path) -> ZipResult<()> {
        self.directories.push(path.to_string());
        Ok(())
    }
}

/// Writes every entry's bytes to a single `io::Write`, one after another,
/// for "unzip -p"-style piping. Directory entries are no-ops.
pub struct PipeSink<W: Write> {
    writer: W,
}

impl<W: Write> PipeSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: Write> Sink for PipeSink<W> {
    fn write_entry(&mut self, _path: &Utf8Path, data: &[u8]) -> ZipResult<()> {
        self.writer.write_all(data)?;
        Ok(())
    }

    fn create_directory(&mut self, _path: &Utf8Path) -> ZipResult<()> {
        Ok(())
    }
}

/// Discards everything written to it. Used for `unzip -t` (test mode):
/// the driver still decompresses and CRC-checks every entry, it just
/// never needs to keep the bytes around afterward.
#[derive(Default)]
pub struct DiscardSink;

impl Sink for DiscardSink {
    fn write_entry(&mut self, _path: &Utf8Path, _data: &[u8]) -> ZipResult<()> {
        Ok(())
    }

    fn create_directory(&mut self, _path: &Utf8Path) -> ZipResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_records_files_and_directories() {
        let mut sink = MemorySink::new();
        sink.write_entry(Utf8Path::new("a/b.txt"), b"hi").unwrap();
        sink.create_directory(Utf8Path::new("a/c")).unwrap();
        assert_eq!(sink.files.get("a/b.txt").map(Vec::as_slice), Some(&b"hi"[..]));
        assert_eq!(sink.directories, vec!["a/c".to_string()]);
    }

    #[test]
    fn discard_sink_accepts_anything() {
        let mut sink = DiscardSink;
        sink.write_entry(Utf8Path::new("whatever"), b"data").unwrap();
    }

    #[test]
    fn pipe_sink_concatenates_entries() {
        let mut buf = Vec::new();
        {
            let mut sink = PipeSink::new(&mut buf);
            sink.write_entry(Utf8Path::new("a"), b"one").unwrap();
            sink.write_entry(Utf8Path::new("b"), b"two").unwrap();
        }
        assert_eq!(buf, b"onetwo");
    }

    #[test]
    fn file_sink_rejects_path_escaping_root() {
        let mut prompt = FixedAnswer(true);
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FileSink::new(dir.path(), OverwritePolicy::Always, &mut prompt);
        let err = sink.write_entry(Utf8Path::new("../escape.txt"), b"x").unwrap_err();
        assert!(matches!(err, ZipError::UnsafePath(_)));
    }
}
