//! Interprets a central directory entry's "version made by" host byte and
//! external file attributes into something a caller can actually act on,
//! instead of leaving two raw, host-dependent integers for every caller to
//! re-decode.
//!
//! Grounded in APPNOTE 4.4.2.2 (host byte values) and 4.4.15 (external
//! attribute layout per host); the Unix bit layout itself mirrors how
//! `unix2_mode`/`getfileattrs` in `process.c` reconstruct a `mode_t` from
//! the high 16 bits of a Unix-made archive's external attributes.

use crate::spec::System;

/// The host filesystem semantics an entry's metadata came from, decoded
/// into the concrete fields a caller is likely to want rather than left
/// as an opaque host byte, the way [`crate::spec::System`] is.
#[derive(Debug, Clone, Copy)]
pub enum HostAttr {
    Dos {
        readonly: bool,
        hidden: bool,
        system: bool,
        directory: bool,
        archive: bool,
        /// Set on the archive's DOS volume-label entry, a holdover from
        /// floppy-disk-era archivers recording the disk's label rather
        /// than a real file or directory.
        volume_label: bool,
    },
    Unix {
        mode: u32,
    },
    Unknown {
        host: u8,
        raw_external_attributes: u32,
    },
}

const DOS_READONLY: u32 = 0x01;
const DOS_HIDDEN: u32 = 0x02;
const DOS_SYSTEM: u32 = 0x04;
const DOS_VOLUME_LABEL: u32 = 0x08;
const DOS_DIRECTORY: u32 = 0x10;
const DOS_ARCHIVE: u32 = 0x20;

impl HostAttr {
    /// Decodes a central directory entry's external attributes using the
    /// host indicated by its "version made by" field.
    pub fn decode(system: System, external_file_attributes: u32) -> Self {
        match system {
            System::Dos => HostAttr::Dos {
                readonly: external_file_attributes & DOS_READONLY != 0,
                hidden: external_file_attributes & DOS_HIDDEN != 0,
                system: external_file_attributes & DOS_SYSTEM != 0,
                directory: external_file_attributes & DOS_DIRECTORY != 0,
                archive: external_file_attributes & DOS_ARCHIVE != 0,
                volume_label: external_file_attributes & DOS_VOLUME_LABEL != 0,
            },
            System::Unix => {
                // 4.4.15: external attrs hold, high-to-low, the Unix mode
                // bits in the upper 16 bits, and DOS-compatible attribute
                // bits in the low 8. Only the Unix mode is generally
                // trustworthy -- the DOS bits are usually zeroed by
                // Unix-made archives.
                let mode = external_file_attributes >> 16;
                if mode == 0 {
                    HostAttr::Unknown {
                        host: 3,
                        raw_external_attributes: external_file_attributes,
                    }
                } else {
                    HostAttr::Unix { mode }
                }
            }
            System::Unknown(host) => HostAttr::Unknown {
                host,
                raw_external_attributes: external_file_attributes,
            },
        }
    }

    /// Whether this entry names a directory, so far as the host's
    /// attribute bits can tell us (a trailing `/` on the path is still
    /// the authoritative signal per APPNOTE; this is a secondary check).
    pub fn is_directory(&self) -> bool {
        match self {
            HostAttr::Dos { directory, .. } => *directory,
            HostAttr::Unix { mode } => mode & 0o170000 == 0o040000,
            HostAttr::Unknown { .. } => false,
        }
    }

    /// Whether this entry is a Unix symbolic link, per the S_IFLNK bits
    /// of a Unix-made archive's mode. Always false for non-Unix hosts.
    pub fn is_symlink(&self) -> bool {
        matches!(self, HostAttr::Unix { mode } if mode & 0o170000 == 0o120000)
    }

    /// Whether this is the archive's DOS volume-label entry rather than a
    /// real file or directory. These come from the same DOS-compatible
    /// attribute byte on any host, so this isn't restricted to the `Dos`
    /// variant.
    pub fn is_volume_label(&self) -> bool {
        matches!(self, HostAttr::Dos { volume_label, .. } if *volume_label)
    }

    /// The Unix permission bits (the low 12 bits of the mode), if this
    /// entry came from a Unix host.
    pub fn unix_permissions(&self) -> Option<u32> {
        match self {
            HostAttr::Unix { mode } => Some(mode & 0o7777),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_dos_readonly_hidden() {
        let attr = HostAttr::decode(System::Dos, DOS_READONLY | DOS_HIDDEN);
        match attr {
            HostAttr::Dos {
                readonly, hidden, directory, volume_label, ..
            } => {
                assert!(readonly);
                assert!(hidden);
                assert!(!directory);
                assert!(!volume_label);
            }
            _ => panic!("expected Dos variant"),
        }
    }

    #[test]
    fn decodes_dos_volume_label() {
        let attr = HostAttr::decode(System::Dos, DOS_VOLUME_LABEL);
        assert!(attr.is_volume_label());
        assert!(!attr.is_directory());
    }

    #[test]
    fn decodes_unix_regular_file_mode() {
        let raw = (0o100644u32) << 16;
        let attr = HostAttr::decode(System::Unix, raw);
        assert_eq!(attr.unix_permissions(), Some(0o644));
        assert!(!attr.is_directory());
        assert!(!attr.is_symlink());
    }

    #[test]
    fn decodes_unix_symlink() {
        let raw = (0o120777u32) << 16;
        let attr = HostAttr::decode(System::Unix, raw);
        assert!(attr.is_symlink());
    }

    #[test]
    fn unix_with_zero_mode_falls_back_to_unknown() {
        let attr = HostAttr::decode(System::Unix, 0);
        assert!(matches!(attr, HostAttr::Unknown { .. }));
    }
}
