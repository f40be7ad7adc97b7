//! Integration tests built entirely from hand-assembled archive bytes.
//!
//! There's no writer in this crate (and no external `zip`/`unzip` binary
//! to shell out to for fixtures), so every scenario below builds its own
//! minimal, spec-correct byte sequence instead of relying on a sample
//! file checked into the repo.

use std::io::Write;

use camino::Utf8PathBuf;
use crc32fast::Hasher;
use zipcore::read::{as_tree, FileTree, ZipArchive};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn crc32(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

fn le16(v: u16) -> [u8; 2] {
    v.to_le_bytes()
}
fn le32(v: u32) -> [u8; 4] {
    v.to_le_bytes()
}
fn le64(v: u64) -> [u8; 8] {
    v.to_le_bytes()
}

struct Entry {
    name: &'static str,
    method: u16,
    flags: u16,
    crc: u32,
    compressed: Vec<u8>,
    uncompressed_size: u32,
    compressed_size: u32,
    extra: Vec<u8>,
    force_zip64_sizes: bool,
}

impl Entry {
    fn stored(name: &'static str, data: &[u8]) -> Self {
        Self {
            name,
            method: 0,
            flags: 0,
            crc: crc32(data),
            compressed: data.to_vec(),
            uncompressed_size: data.len() as u32,
            compressed_size: data.len() as u32,
            extra: Vec::new(),
            force_zip64_sizes: false,
        }
    }

    fn deflated(name: &'static str, data: &[u8]) -> Self {
        let mut encoder = flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(data).unwrap();
        let compressed = encoder.finish().unwrap();
        Self {
            name,
            method: 8,
            flags: 0,
            crc: crc32(data),
            compressed_size: compressed.len() as u32,
            compressed,
            uncompressed_size: data.len() as u32,
            extra: Vec::new(),
            force_zip64_sizes: false,
        }
    }

    /// A directory entry, stored the way real archivers do: a trailing
    /// slash on the name, zero size.
    fn directory(name: &'static str) -> Self {
        Self {
            name,
            method: 0,
            flags: 0,
            crc: 0,
            compressed: Vec::new(),
            uncompressed_size: 0,
            compressed_size: 0,
            extra: Vec::new(),
            force_zip64_sizes: false,
        }
    }
}

/// Assembles a complete, single-disk archive out of `entries`, returning
/// its bytes. Every entry is given a real (non-sentinel) header offset;
/// `force_zip64_sizes` entries get their fixed-width size fields pinned
/// to the 0xFFFFFFFF sentinel and the real sizes moved into a `0x0001`
/// extra field, to exercise the Zip64 path without needing a multi-GB
/// fixture.
fn build_archive(entries: &[Entry]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut central_directory = Vec::new();
    let mut count: u16 = 0;

    for entry in entries {
        let offset = out.len() as u32;

        let mut zip64_extra = Vec::new();
        let (lfh_csize, lfh_usize) = if entry.force_zip64_sizes {
            zip64_extra.extend_from_slice(&le16(0x0001));
            zip64_extra.extend_from_slice(&le16(16));
            zip64_extra.extend_from_slice(&le64(entry.uncompressed_size as u64));
            zip64_extra.extend_from_slice(&le64(entry.compressed_size as u64));
            (0xFFFFFFFFu32, 0xFFFFFFFFu32)
        } else {
            (entry.compressed_size, entry.uncompressed_size)
        };
        let mut local_extra = entry.extra.clone();
        local_extra.extend_from_slice(&zip64_extra);
        let central_extra = local_extra.clone();

        // Local file header
        out.extend_from_slice(b"PK\x03\x04");
        out.extend_from_slice(&le16(20)); // version needed
        out.extend_from_slice(&le16(entry.flags));
        out.extend_from_slice(&le16(entry.method));
        out.extend_from_slice(&le16(0)); // time
        out.extend_from_slice(&le16(0x21)); // date: 1980-01-01
        out.extend_from_slice(&le32(entry.crc));
        out.extend_from_slice(&le32(lfh_csize));
        out.extend_from_slice(&le32(lfh_usize));
        out.extend_from_slice(&le16(entry.name.len() as u16));
        out.extend_from_slice(&le16(local_extra.len() as u16));
        out.extend_from_slice(entry.name.as_bytes());
        out.extend_from_slice(&local_extra);
        out.extend_from_slice(&entry.compressed);

        // Central directory entry
        central_directory.extend_from_slice(b"PK\x01\x02");
        central_directory.extend_from_slice(&le16(20)); // version made by (DOS)
        central_directory.extend_from_slice(&le16(20)); // version needed
        central_directory.extend_from_slice(&le16(entry.flags));
        central_directory.extend_from_slice(&le16(entry.method));
        central_directory.extend_from_slice(&le16(0));
        central_directory.extend_from_slice(&le16(0x21));
        central_directory.extend_from_slice(&le32(entry.crc));
        central_directory.extend_from_slice(&le32(lfh_csize));
        central_directory.extend_from_slice(&le32(lfh_usize));
        central_directory.extend_from_slice(&le16(entry.name.len() as u16));
        central_directory.extend_from_slice(&le16(central_extra.len() as u16));
        central_directory.extend_from_slice(&le16(0)); // comment length
        central_directory.extend_from_slice(&le16(0)); // disk number
        central_directory.extend_from_slice(&le16(0)); // internal attrs
        central_directory.extend_from_slice(&le32(0)); // external attrs
        central_directory.extend_from_slice(&le32(offset));
        central_directory.extend_from_slice(entry.name.as_bytes());
        central_directory.extend_from_slice(&central_extra);

        count += 1;
    }

    let cd_offset = out.len() as u32;
    out.extend_from_slice(&central_directory);
    let cd_size = central_directory.len() as u32;

    out.extend_from_slice(b"PK\x05\x06");
    out.extend_from_slice(&le16(0));
    out.extend_from_slice(&le16(0));
    out.extend_from_slice(&le16(count));
    out.extend_from_slice(&le16(count));
    out.extend_from_slice(&le32(cd_size));
    out.extend_from_slice(&le32(cd_offset));
    out.extend_from_slice(&le16(0));

    out
}

#[test]
fn empty_archive_has_no_entries() {
    init();
    let bytes = build_archive(&[]);
    let archive = ZipArchive::new(&bytes).unwrap();
    assert!(archive.entries().is_empty());
}

#[test]
fn stored_entry_round_trips() {
    init();
    let data = b"hello, world!";
    let bytes = build_archive(&[Entry::stored("hello.txt", data)]);
    let archive = ZipArchive::new(&bytes).unwrap();
    let entry = &archive.entries()[0];
    assert_eq!(entry.path.as_str(), "hello.txt");
    assert_eq!(archive.read_to_vec(entry, None).unwrap(), data);
}

#[test]
fn deflate_entry_round_trips() {
    init();
    let data = vec![b'a'; 200];
    let bytes = build_archive(&[Entry::deflated("a.txt", &data)]);
    let archive = ZipArchive::new(&bytes).unwrap();
    let entry = &archive.entries()[0];
    assert_eq!(archive.read_to_vec(entry, None).unwrap(), data);
}

#[test]
fn tree_lookup_and_traversal_work() {
    init();
    let bytes = build_archive(&[Entry::directory("dir/"), Entry::stored("dir/file.txt", b"x")]);
    let archive = ZipArchive::new(&bytes).unwrap();
    let tree = as_tree(archive.entries()).unwrap();
    let found = tree.lookup("dir/file.txt").unwrap();
    assert_eq!(found.path.as_str(), "dir/file.txt");
    assert_eq!(tree.files().count(), 1);
    assert_eq!(tree.directories().count(), 1);
}

#[test]
fn sfx_prefix_is_detected_and_skipped() {
    init();
    let inner = build_archive(&[Entry::stored("payload.bin", b"data")]);
    let mut prefixed = vec![0x90u8; 1024]; // stand-in for an executable stub
    prefixed.extend_from_slice(&inner);

    let err = ZipArchive::new(&prefixed).unwrap_err();
    assert!(matches!(err, zipcore::ZipError::PrependedWithUnknownBytes(1024)));

    let (archive, offset) = ZipArchive::with_prepended_data(&prefixed).unwrap();
    assert_eq!(offset, 1024);
    assert_eq!(archive.entries().len(), 1);
    assert_eq!(archive.entries()[0].path.as_str(), "payload.bin");
}

#[test]
fn zip64_sizes_are_resolved_from_extra_field() {
    init();
    let data = b"not actually huge, just marked as if it were";
    let mut entry = Entry::stored("big.bin", data);
    entry.force_zip64_sizes = true;
    let bytes = build_archive(&[entry]);

    let archive = ZipArchive::new(&bytes).unwrap();
    let metadata = &archive.entries()[0];
    assert_eq!(metadata.size, data.len());
    assert_eq!(metadata.compressed_size, data.len());
    assert_eq!(archive.read_to_vec(metadata, None).unwrap(), data);
}

#[test]
fn unicode_path_extra_field_with_bad_crc_falls_back() {
    init();
    // 0x7075 Unicode Path: version 1, a CRC that does NOT match the raw
    // name bytes, and a path that would otherwise be preferred.
    let mut extra = Vec::new();
    extra.extend_from_slice(&le16(0x7075));
    let unicode_text = b"should-not-be-used.txt";
    extra.extend_from_slice(&le16((1 + 4 + unicode_text.len()) as u16));
    extra.push(1); // version
    extra.extend_from_slice(&le32(0xDEADBEEF)); // wrong CRC on purpose
    extra.extend_from_slice(unicode_text);

    let mut entry = Entry::stored("plain.txt", b"contents");
    entry.extra = extra;
    let bytes = build_archive(&[entry]);

    let archive = ZipArchive::new(&bytes).unwrap();
    assert_eq!(archive.entries()[0].path.as_str(), "plain.txt");
}

#[test]
fn traditional_encryption_round_trips_with_correct_password() {
    init();
    let plaintext = b"top secret payload";
    let password = b"hunter2";
    let crc = crc32(plaintext);

    let (mut keys0, mut keys1, mut keys2) = (0x12345678u32, 0x23456789u32, 0x34567890u32);
    let update = |k0: &mut u32, k1: &mut u32, k2: &mut u32, byte: u8| {
        *k0 = crc32_update_byte(*k0, byte);
        *k1 = k1.wrapping_add(*k0 & 0xff);
        *k1 = k1.wrapping_mul(134775813).wrapping_add(1);
        *k2 = crc32_update_byte(*k2, (*k1 >> 24) as u8);
    };
    let keystream = |k2: u32| -> u8 {
        let temp = (k2 | 2) as u16;
        (((temp as u32).wrapping_mul(temp as u32 ^ 1)) >> 8) as u8
    };
    for &byte in password {
        update(&mut keys0, &mut keys1, &mut keys2, byte);
    }

    let mut header = [0x55u8; 12];
    header[11] = (crc >> 24) as u8;
    let mut ciphertext = Vec::with_capacity(12 + plaintext.len());
    for &byte in &header {
        let cipher = byte ^ keystream(keys2);
        update(&mut keys0, &mut keys1, &mut keys2, byte);
        ciphertext.push(cipher);
    }
    for &byte in plaintext {
        let cipher = byte ^ keystream(keys2);
        update(&mut keys0, &mut keys1, &mut keys2, byte);
        ciphertext.push(cipher);
    }

    let mut entry = Entry::stored("secret.txt", plaintext);
    entry.flags = 1; // encrypted
    entry.crc = crc;
    entry.compressed = ciphertext;
    entry.compressed_size = entry.compressed.len() as u32;
    let bytes = build_archive(&[entry]);

    let archive = ZipArchive::new(&bytes).unwrap();
    let metadata = &archive.entries()[0];
    assert!(metadata.encrypted);

    let out = archive.read_to_vec(metadata, Some(password)).unwrap();
    assert_eq!(out, plaintext);

    let err = archive.read_to_vec(metadata, Some(b"wrong password")).unwrap_err();
    assert!(matches!(err, zipcore::ZipError::BadPassword(_)));

    let err = archive.read_to_vec(metadata, None).unwrap_err();
    assert!(matches!(err, zipcore::ZipError::BadPassword(_)));
}

fn crc32_update_byte(crc: u32, byte: u8) -> u32 {
    let mut c = crc ^ byte as u32;
    for _ in 0..8 {
        if c & 1 != 0 {
            c = (c >> 1) ^ 0xedb88320;
        } else {
            c >>= 1;
        }
    }
    c
}

#[test]
fn unsupported_method_is_reported_per_entry_not_fatally() {
    init();
    let mut entry = Entry::stored("old.zoo", b"whatever");
    entry.method = 1; // Shrink
    let bytes = build_archive(&[entry]);

    let archive = ZipArchive::new(&bytes).unwrap();
    let metadata = &archive.entries()[0];
    let err = archive.read_to_vec(metadata, None).unwrap_err();
    assert!(matches!(err, zipcore::ZipError::UnsupportedMethod(1, ref p) if p == &Utf8PathBuf::from("old.zoo")));
}
