//! Parses the extra field blocks attached to local file headers and
//! central directory entries.
//!
//! Each block is a tag/length/payload triple; unrecognized tags are
//! skipped. Grounded in Info-ZIP's `process.c` (`getUnicodeData()` for the
//! Unicode path/comment tags, `ef_scan_for_izux()` for the Unix extra field
//! family) and APPNOTE 4.5 for the tag layout and Zip64 field order.

use crc32fast::Hasher;
use log::*;

use crate::spec::{read_u16, read_u32, read_u64};

/// Zip64 extended information: present when one or more of the four fixed
/// LFH/CDE size fields is the 0xFFFF(FFFF) sentinel.
pub const ZIP64_TAG: u16 = 0x0001;
/// Unix timestamps (mtime/atime/ctime), "UT" in the extra field zoo.
pub const UNIX_TIME_TAG: u16 = 0x5455;
/// Unicode path ("up"), a UTF-8 shadow of the main path field with a CRC
/// guard against the path it was derived from going stale.
pub const UNICODE_PATH_TAG: u16 = 0x7075;
/// Unicode comment ("uc"), same shape as the Unicode path field.
pub const UNICODE_COMMENT_TAG: u16 = 0x6375;
/// Unix UID/GID, "ux"/"Ux" depending on version.
pub const UNIX_UID_GID_TAG: u16 = 0x7875;
/// "Info-ZIP Unix (type 1)" / IZUNIX, the original pre-"ux" Unix extra
/// field: atime/mtime, plus uid/gid in the local header copy only.
pub const LEGACY_UNIX_TIME_TAG: u16 = 0x5855;
/// "Info-ZIP Unix (type 2)": just a 16-bit uid/gid pair, nothing else.
pub const LEGACY_UNIX_UID_GID_TAG: u16 = 0x7855;

/// Resolved Zip64 sizes/offset/disk, any subset of which may be absent:
/// only the fields whose 32-bit counterpart was the sentinel value are
/// actually stored in the extra field, in the fixed order
/// uncompressed/compressed/offset/disk (APPNOTE 4.5.3).
#[derive(Debug, Default, Clone, Copy)]
pub struct Zip64Fields {
    pub uncompressed_size: Option<u64>,
    pub compressed_size: Option<u64>,
    pub header_offset: Option<u64>,
    pub disk_number: Option<u32>,
}

/// Unix-style modification/access/creation times from a `UT` block.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnixTimes {
    pub modified: Option<i64>,
    pub accessed: Option<i64>,
    pub created: Option<i64>,
}

/// Unix owner/group ids, from whichever of `0x7875` (preferred), the
/// legacy `0x5855` IZUNIX block, or the legacy `0x7855` 16-bit block an
/// entry carries.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnixOwnership {
    pub uid: Option<u32>,
    pub gid: Option<u32>,
}

/// A Unicode shadow of a path or comment field, plus the CRC-32 of the
/// original (non-Unicode) bytes it was computed against.
#[derive(Debug, Clone)]
pub struct UnicodeField {
    pub crc_of_original: u32,
    pub text: String,
}

/// Everything this crate knows how to pull out of an extra field blob.
/// Unrecognized tags are silently skipped, per APPNOTE 4.5.1 ("this
/// library MUST support the ability to ignore unknown data").
#[derive(Debug, Default)]
pub struct ExtraFields {
    pub zip64: Option<Zip64Fields>,
    pub unix_times: Option<UnixTimes>,
    pub unicode_path: Option<UnicodeField>,
    pub unicode_comment: Option<UnicodeField>,
    pub unix_ownership: Option<UnixOwnership>,
}

/// Which of the four Zip64 fields a particular header claims are
/// "overflowed" (== 0xFFFF or 0xFFFFFFFF), in the fixed order the Zip64
/// block stores its actual values in.
#[derive(Debug, Default, Clone, Copy)]
pub struct Zip64Overflow {
    pub uncompressed_size: bool,
    pub compressed_size: bool,
    pub header_offset: bool,
    pub disk_number: bool,
}

impl Zip64Overflow {
    pub fn any(self) -> bool {
        self.uncompressed_size || self.compressed_size || self.header_offset || self.disk_number
    }
}

/// Parses every tag/length/payload triple in `data`, filling in whichever
/// of `ExtraFields`' members it recognizes. `overflow` says which Zip64
/// fields to actually read out of the `0x0001` block -- APPNOTE says only
/// the overflowed fields are present, in order, so we can't just assume
/// all four are there.
pub fn parse(mut data: &[u8], overflow: Zip64Overflow) -> ExtraFields {
    let mut fields = ExtraFields::default();

    while data.len() >= 4 {
        let tag = read_u16(&mut data);
        let len = read_u16(&mut data) as usize;
        if data.len() < len {
            warn!(
                "Extra field tag {:#06x} claims {} bytes but only {} remain; ignoring the rest",
                tag,
                len,
                data.len()
            );
            break;
        }
        let (payload, rest) = data.split_at(len);
        data = rest;

        match tag {
            ZIP64_TAG if overflow.any() => {
                fields.zip64 = parse_zip64(payload, overflow);
            }
            UNIX_TIME_TAG => {
                if let Some(times) = parse_unix_time(payload) {
                    fields.unix_times = Some(times);
                }
            }
            UNICODE_PATH_TAG => {
                fields.unicode_path = parse_unicode_field(payload);
            }
            UNICODE_COMMENT_TAG => {
                fields.unicode_comment = parse_unicode_field(payload);
            }
            UNIX_UID_GID_TAG => {
                // Takes priority over the legacy tags below regardless of
                // which order they appear in, but an unparseable 0x7875
                // block shouldn't clobber ownership a legacy tag already
                // supplied.
                if let Some(ownership) = parse_unix_ownership(payload) {
                    fields.unix_ownership = Some(ownership);
                }
            }
            LEGACY_UNIX_TIME_TAG => {
                // Only fills in what a later (or earlier, order isn't
                // guaranteed) 0x5455/0x7875 block hasn't already provided --
                // those are the newer, more specific tags and take priority.
                let (times, ownership) = parse_legacy_unix_time_and_ownership(payload);
                if fields.unix_times.is_none() {
                    fields.unix_times = times;
                }
                if fields.unix_ownership.is_none() {
                    fields.unix_ownership = ownership;
                }
            }
            LEGACY_UNIX_UID_GID_TAG => {
                if fields.unix_ownership.is_none() {
                    fields.unix_ownership = parse_legacy_unix_ownership16(payload);
                }
            }
            _ => {
                trace!("Ignoring unrecognized extra field tag {:#06x}", tag);
            }
        }
    }

    fields
}

fn parse_zip64(mut payload: &[u8], overflow: Zip64Overflow) -> Option<Zip64Fields> {
    let mut out = Zip64Fields::default();
    if overflow.uncompressed_size {
        if payload.len() < 8 {
            warn!("Zip64 extra field too short for uncompressed size");
            return Some(out);
        }
        out.uncompressed_size = Some(read_u64(&mut payload));
    }
    if overflow.compressed_size {
        if payload.len() < 8 {
            warn!("Zip64 extra field too short for compressed size");
            return Some(out);
        }
        out.compressed_size = Some(read_u64(&mut payload));
    }
    if overflow.header_offset {
        if payload.len() < 8 {
            warn!("Zip64 extra field too short for local header offset");
            return Some(out);
        }
        out.header_offset = Some(read_u64(&mut payload));
    }
    if overflow.disk_number {
        if payload.len() < 4 {
            warn!("Zip64 extra field too short for disk number");
            return Some(out);
        }
        out.disk_number = Some(read_u32(&mut payload));
    }
    Some(out)
}

fn parse_unix_time(mut payload: &[u8]) -> Option<UnixTimes> {
    // 0x5455, "UT": 1-byte flag, then mtime/atime/ctime (each i32, each
    // present only if its bit is set), in that order. The flag byte's
    // meaning differs slightly between the local header copy (all present
    // times are stored) and the central directory copy (only mtime), but
    // we just read however many are actually there.
    if payload.is_empty() {
        return None;
    }
    let flags = payload[0];
    payload = &payload[1..];

    let mut times = UnixTimes::default();
    if flags & 0b001 != 0 && payload.len() >= 4 {
        times.modified = Some(read_i32(&mut payload));
    }
    if flags & 0b010 != 0 && payload.len() >= 4 {
        times.accessed = Some(read_i32(&mut payload));
    }
    if flags & 0b100 != 0 && payload.len() >= 4 {
        times.created = Some(read_i32(&mut payload));
    }
    Some(times)
}

fn read_i32(input: &mut &[u8]) -> i64 {
    read_u32(input) as i32 as i64
}

fn parse_unicode_field(mut payload: &[u8]) -> Option<UnicodeField> {
    // 0x7075/0x6375: 1-byte version (must be 1), 4-byte CRC-32 of the
    // original (non-Unicode) field, then UTF-8 bytes for the rest.
    if payload.len() < 5 {
        return None;
    }
    let version = payload[0];
    payload = &payload[1..];
    if version != 1 {
        debug!("Unrecognized Unicode extra field version {}", version);
        return None;
    }
    let crc_of_original = read_u32(&mut payload);
    let text = match std::str::from_utf8(payload) {
        Ok(s) => s.to_owned(),
        Err(e) => {
            debug!("Unicode extra field was not valid UTF-8: {}", e);
            return None;
        }
    };
    Some(UnicodeField { crc_of_original, text })
}

fn parse_legacy_unix_time_and_ownership(mut payload: &[u8]) -> (Option<UnixTimes>, Option<UnixOwnership>) {
    // 0x5855, "UX" (IZUNIX type 1): atime(4), mtime(4), then, local-header
    // copies only, uid(2) and gid(2). The central directory copy is always
    // just the 8 bytes of times.
    if payload.len() < 8 {
        return (None, None);
    }
    let accessed = read_i32(&mut payload);
    let modified = read_i32(&mut payload);
    let times = UnixTimes {
        modified: Some(modified),
        accessed: Some(accessed),
        created: None,
    };
    let ownership = if payload.len() >= 4 {
        let uid = read_u16(&mut payload) as u32;
        let gid = read_u16(&mut payload) as u32;
        Some(UnixOwnership { uid: Some(uid), gid: Some(gid) })
    } else {
        None
    };
    (Some(times), ownership)
}

fn parse_legacy_unix_ownership16(mut payload: &[u8]) -> Option<UnixOwnership> {
    // 0x7855, "Ux" (IZUNIX type 2): just a 16-bit uid/gid pair. The
    // central directory copy is typically zero-length.
    if payload.len() < 4 {
        return None;
    }
    let uid = read_u16(&mut payload) as u32;
    let gid = read_u16(&mut payload) as u32;
    Some(UnixOwnership { uid: Some(uid), gid: Some(gid) })
}

fn parse_unix_ownership(mut payload: &[u8]) -> Option<UnixOwnership> {
    // 0x7875, "ux": 1-byte version, then uid/gid each stored as a 1-byte
    // size prefix followed by that many little-endian bytes. Version 1 is
    // the only one anybody writes; anything else we can't safely size.
    if payload.is_empty() {
        return None;
    }
    let version = payload[0];
    payload = &payload[1..];
    if version != 1 {
        debug!("Unrecognized Unix UID/GID extra field version {}", version);
        return None;
    }

    let uid = read_variable_width_int(&mut payload)?;
    let gid = read_variable_width_int(&mut payload)?;
    Some(UnixOwnership {
        uid: Some(uid),
        gid: Some(gid),
    })
}

fn read_variable_width_int(payload: &mut &[u8]) -> Option<u32> {
    let (&size, rest) = payload.split_first()?;
    let size = size as usize;
    if rest.len() < size {
        return None;
    }
    let (bytes, rest) = rest.split_at(size);
    *payload = rest;
    let mut value: u64 = 0;
    for (i, &b) in bytes.iter().enumerate().take(8) {
        value |= (b as u64) << (8 * i);
    }
    Some(value as u32)
}

/// Checks whether `candidate`'s CRC-32 matches the one the Unicode extra
/// field recorded for its source. A mismatch means the archive's name
/// field and its Unicode shadow have drifted apart (e.g. re-encoded by a
/// tool that didn't understand the extra field) and the Unicode copy
/// should not be trusted.
pub fn crc_matches(field: &UnicodeField, original_bytes: &[u8]) -> bool {
    let mut hasher = Hasher::new();
    hasher.update(original_bytes);
    hasher.finalize() == field.crc_of_original
}

/// Computes which of the four Zip64 fields a central directory entry's
/// fixed-width fields claim have overflowed.
pub fn cde_overflow(compressed_size: u32, uncompressed_size: u32, header_offset: u32, disk_number: u16) -> Zip64Overflow {
    Zip64Overflow {
        uncompressed_size: uncompressed_size == u32::MAX,
        compressed_size: compressed_size == u32::MAX,
        header_offset: header_offset == u32::MAX,
        disk_number: disk_number == u16::MAX,
    }
}

/// Computes which of the Zip64 fields a local file header's fixed-width
/// fields claim have overflowed. The local header has no offset/disk
/// field of its own, so only the two size fields are ever relevant here.
pub fn lfh_overflow(compressed_size: u32, uncompressed_size: u32) -> Zip64Overflow {
    Zip64Overflow {
        uncompressed_size: uncompressed_size == u32::MAX,
        compressed_size: compressed_size == u32::MAX,
        header_offset: false,
        disk_number: false,
    }
}

/// Resolves a fixed-width field against its Zip64 override, if any.
pub(crate) fn resolved_u64(overridden: Option<u64>, fallback: u32) -> u64 {
    overridden.unwrap_or(fallback as u64)
}
