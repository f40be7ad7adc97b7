//! Decodes a raw path or comment byte string into text, honoring the
//! UTF-8 language-encoding flag (APPNOTE bit 11) and falling back to
//! CP437 -- the code page the original PKZIP used and that most
//! unmarked archives still assume -- otherwise.

use std::borrow::Cow;

use codepage_437::{BorrowFromCp437, CP437_CONTROL};

use crate::result::*;

/// Decodes `raw` according to whether the entry's general-purpose bit 11
/// (language encoding flag) was set.
pub fn decode(raw: &[u8], is_utf8: bool) -> ZipResult<String> {
    if is_utf8 {
        std::str::from_utf8(raw).map(str::to_owned).map_err(ZipError::from)
    } else {
        let str_cow: Cow<str> = Cow::borrow_from_cp437(raw, &CP437_CONTROL);
        Ok(str_cow.into_owned())
    }
}

/// Normalizes path separators from the handful of non-`/` conventions
/// seen in the wild (mostly `\` from DOS/Windows-made archives) into the
/// `/` APPNOTE mandates for storage. Real-world archives occasionally get
/// this wrong; treating both as equivalent on read is far more useful
/// than rejecting them.
pub fn normalize_separators(path: &str) -> String {
    path.replace('\\', "/")
}

/// Translation of text between host character sets other than the
/// UTF-8/CP437 pair above (e.g. EBCDIC, used by some mainframe-origin
/// archives) has no plausible target on the platforms this crate
/// extracts to, so it's left as a no-op hook rather than implemented.
pub fn transform_text_hint(text: &str) -> &str {
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_ascii_as_cp437() {
        assert_eq!(decode(b"hello.txt", false).unwrap(), "hello.txt");
    }

    #[test]
    fn decodes_utf8_when_flagged() {
        let bytes = "héllo.txt".as_bytes();
        assert_eq!(decode(bytes, true).unwrap(), "héllo.txt");
    }

    #[test]
    fn normalizes_backslashes() {
        assert_eq!(normalize_separators("foo\\bar\\baz.txt"), "foo/bar/baz.txt");
    }
}
