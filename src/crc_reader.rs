//! Helper module to compute a CRC32 checksum
//!
//! Borrowed from zip-rs:
//! <https://github.com/mvdnes/zip-rs/commit/b3c836d9c32efa120cdd5366280f940d3c3b985c>

use std::io;
use std::io::prelude::*;

use camino::Utf8PathBuf;
use crc32fast::Hasher;

use crate::result::*;

/// Checks a fully-decompressed entry's bytes against its recorded CRC-32
/// and size in one shot, for the common case where the whole entry is
/// already in memory rather than being streamed through a `Read`.
pub fn verify_slice(data: &[u8], expected_crc: u32, expected_size: usize, path: &Utf8PathBuf) -> ZipResult<()> {
    if data.len() != expected_size {
        return Err(ZipError::TruncatedEntry {
            path: path.clone(),
            expected: expected_size,
            actual: data.len(),
        });
    }
    let mut hasher = Hasher::new();
    hasher.update(data);
    let actual = hasher.finalize();
    if actual != expected_crc {
        return Err(ZipError::CrcError {
            path: path.clone(),
            expected: expected_crc,
            actual,
        });
    }
    Ok(())
}

/// Reader that validates the CRC32 when it reaches the EOF.
pub struct Crc32Reader<R> {
    inner: R,
    hasher: Hasher,
    provided_checksum: u32,
}

impl<R> Crc32Reader<R> {
    pub fn new(inner: R, provided_checksum: u32) -> Crc32Reader<R> {
        Crc32Reader {
            inner,
            hasher: Hasher::new(),
            provided_checksum,
        }
    }

    /// Returns true if the final checksum matches the one provided by `new()`
    fn check_matches(&self) -> bool {
        self.provided_checksum == self.hasher.clone().finalize()
    }
}

impl<R: Read> Read for Crc32Reader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let count = match self.inner.read(buf) {
            Ok(0) if !buf.is_empty() && !self.check_matches() => {
                return Err(io::Error::new(io::ErrorKind::Other, "Invalid checksum"))
            }
            Ok(n) => n,
            Err(e) => return Err(e),
        };
        self.hasher.update(&buf[0..count]);
        Ok(count)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Read;

    #[test]
    fn verify_slice_accepts_matching_data() {
        let data = b"1234";
        let mut hasher = Hasher::new();
        hasher.update(data);
        let crc = hasher.finalize();
        verify_slice(data, crc, data.len(), &Utf8PathBuf::from("f.txt")).unwrap();
    }

    #[test]
    fn verify_slice_rejects_wrong_size() {
        let err = verify_slice(b"1234", 0, 5, &Utf8PathBuf::from("f.txt")).unwrap_err();
        assert!(matches!(err, ZipError::TruncatedEntry { .. }));
    }

    #[test]
    fn verify_slice_rejects_wrong_crc() {
        let err = verify_slice(b"1234", 0xdeadbeef, 4, &Utf8PathBuf::from("f.txt")).unwrap_err();
        assert!(matches!(err, ZipError::CrcError { .. }));
    }

    #[test]
    fn test_empty_reader() {
        let data: &[u8] = b"";
        let mut buf = [0; 1];

        let mut reader = Crc32Reader::new(data, 0);
        assert_eq!(reader.read(&mut buf).unwrap(), 0);

        let mut reader = Crc32Reader::new(data, 1);
        assert!(reader
            .read(&mut buf)
            .unwrap_err()
            .to_string()
            .contains("Invalid checksum"));
    }

    #[test]
    fn test_byte_by_byte() {
        let data: &[u8] = b"1234";
        let mut buf = [0; 1];

        let mut reader = Crc32Reader::new(data, 0x9be3e0a3);
        assert_eq!(reader.read(&mut buf).unwrap(), 1);
        assert_eq!(reader.read(&mut buf).unwrap(), 1);
        assert_eq!(reader.read(&mut buf).unwrap(), 1);
        assert_eq!(reader.read(&mut buf).unwrap(), 1);
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
        // Can keep reading 0 bytes after the end
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_zero_read() {
        let data: &[u8] = b"1234";
        let mut buf = [0; 5];

        let mut reader = Crc32Reader::new(data, 0x9be3e0a3);
        assert_eq!(reader.read(&mut buf[..0]).unwrap(), 0);
        assert_eq!(reader.read(&mut buf).unwrap(), 4);
    }
}
