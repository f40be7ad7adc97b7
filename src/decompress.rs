//! Dispatches an entry's compressed bytes to the decompressor its method
//! code names.
//!
//! Covers APPNOTE 4.4.5's full method table. Shrink, Reduce, and Implode
//! are registered as recognized-but-unsupported: no maintained Rust
//! crate implements them, and reimplementing 1989-vintage compression
//! algorithms from scratch is out of scope here.

use std::io::Read;

use camino::Utf8PathBuf;

use crate::result::*;

/// The compression method stored in a local/central header, per APPNOTE
/// 4.4.5. Only the methods this crate can actually decode carry payload
/// variants; everything else is `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Shrink,
    Reduce(u8),
    Implode,
    Deflate,
    Deflate64,
    BZip2,
    Other(u16),
}

impl CompressionMethod {
    pub fn from_code(code: u16) -> Self {
        match code {
            0 => CompressionMethod::Stored,
            1 => CompressionMethod::Shrink,
            2..=5 => CompressionMethod::Reduce((code - 1) as u8),
            6 => CompressionMethod::Implode,
            8 => CompressionMethod::Deflate,
            9 => CompressionMethod::Deflate64,
            12 => CompressionMethod::BZip2,
            other => CompressionMethod::Other(other),
        }
    }

    pub fn code(self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Shrink => 1,
            CompressionMethod::Reduce(factor) => factor as u16 + 1,
            CompressionMethod::Implode => 6,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Deflate64 => 9,
            CompressionMethod::BZip2 => 12,
            CompressionMethod::Other(code) => code,
        }
    }

    pub fn is_supported(self) -> bool {
        !matches!(
            self,
            CompressionMethod::Shrink | CompressionMethod::Reduce(_) | CompressionMethod::Implode | CompressionMethod::Other(_)
        )
    }
}

/// Decompresses `compressed` (the method-specific bytes for one entry,
/// already excluding the encryption header if any) into a freshly
/// allocated buffer of exactly `uncompressed_size` bytes.
pub fn decompress(method: CompressionMethod, compressed: &[u8], uncompressed_size: usize, path: &Utf8PathBuf) -> ZipResult<Vec<u8>> {
    match method {
        CompressionMethod::Stored => Ok(compressed.to_vec()),
        CompressionMethod::Deflate => inflate_with(flate2::read::DeflateDecoder::new(compressed), uncompressed_size, path),
        CompressionMethod::Deflate64 => {
            let mut decoder = deflate64::Deflate64Decoder::new(compressed);
            let mut out = Vec::with_capacity(uncompressed_size);
            decoder
                .read_to_end(&mut out)
                .map_err(|_| ZipError::CorruptLocalHeader(path.clone(), "Deflate64 stream ended early or was malformed".into()))?;
            Ok(out)
        }
        CompressionMethod::BZip2 => {
            let mut decoder = bzip2_rs::DecoderReader::new(compressed);
            let mut out = Vec::with_capacity(uncompressed_size);
            decoder
                .read_to_end(&mut out)
                .map_err(|_| ZipError::CorruptLocalHeader(path.clone(), "BZip2 stream ended early or was malformed".into()))?;
            Ok(out)
        }
        CompressionMethod::Shrink | CompressionMethod::Reduce(_) | CompressionMethod::Implode | CompressionMethod::Other(_) => {
            Err(ZipError::UnsupportedMethod(method.code(), path.clone()))
        }
    }
}

fn inflate_with<R: Read>(mut decoder: R, uncompressed_size: usize, path: &Utf8PathBuf) -> ZipResult<Vec<u8>> {
    let mut out = Vec::with_capacity(uncompressed_size);
    decoder
        .read_to_end(&mut out)
        .map_err(|_| ZipError::CorruptLocalHeader(path.clone(), "Deflate stream ended early or was malformed".into()))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_stored() {
        let data = b"hello, world!";
        let out = decompress(CompressionMethod::Stored, data, data.len(), &Utf8PathBuf::from("hi.txt")).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn round_trips_deflate() {
        use std::io::Write;
        let plain = b"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
        let mut encoder = flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(plain).unwrap();
        let compressed = encoder.finish().unwrap();

        let out = decompress(CompressionMethod::Deflate, &compressed, plain.len(), &Utf8PathBuf::from("a.txt")).unwrap();
        assert_eq!(out, plain);
    }

    #[test]
    fn shrink_is_unsupported() {
        let err = decompress(CompressionMethod::Shrink, &[], 0, &Utf8PathBuf::from("old.txt")).unwrap_err();
        assert!(matches!(err, ZipError::UnsupportedMethod(1, _)));
    }

    #[test]
    fn method_round_trips_through_code() {
        for code in [0u16, 1, 2, 3, 4, 5, 6, 8, 9, 12, 99] {
            let method = CompressionMethod::from_code(code);
            assert_eq!(method.code(), code);
        }
    }
}
