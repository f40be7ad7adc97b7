//! Traditional PKWARE ("ZipCrypto") decryption.
//!
//! This is the original, cryptographically weak stream cipher from
//! APPNOTE 6.1.4-6.1.6 -- not AES. It's kept around because a large
//! fraction of encrypted ZIPs in the wild still use it, and because
//! nothing stronger is in scope here (see the module's Non-goals).
//!
//! Shaped after the `ZipCryptoReader`/`ZipCryptoReaderValid` split in
//! other Rust ZIP readers: a keystream generator that decrypts bytes one
//! at a time is easy to get wrong around the 12-byte header check, so the
//! "has this password been validated" state is its own type rather than
//! a bool field that could be forgotten.

use crate::result::*;

/// The three 32-bit registers APPNOTE's traditional encryption keeps, one
/// update per plaintext byte.
#[derive(Clone, Copy, Debug)]
struct Keys(u32, u32, u32);

const CRC_TABLE_POLY: u32 = 0xedb88320;

fn crc32_update(crc: u32, byte: u8) -> u32 {
    // The traditional cipher mixes bytes into its registers with the
    // same CRC-32 update as entry verification, but one byte at a time
    // and without the all-ones initial/final XOR -- so we can't just
    // reuse `crc32fast`'s all-at-once hasher here.
    let mut c = crc ^ byte as u32;
    for _ in 0..8 {
        if c & 1 != 0 {
            c = (c >> 1) ^ CRC_TABLE_POLY;
        } else {
            c >>= 1;
        }
    }
    c
}

impl Keys {
    fn new(password: &[u8]) -> Self {
        let mut keys = Keys(0x12345678, 0x23456789, 0x34567890);
        for &byte in password {
            keys.update(byte);
        }
        keys
    }

    fn update(&mut self, byte: u8) {
        self.0 = crc32_update(self.0, byte);
        self.1 = self.1.wrapping_add(self.0 & 0xff);
        self.1 = self.1.wrapping_mul(134775813).wrapping_add(1);
        self.2 = crc32_update(self.2, (self.1 >> 24) as u8);
    }

    /// The next keystream byte, derived from key2 without consuming it.
    fn keystream_byte(&self) -> u8 {
        let temp = (self.2 | 2) as u16;
        (((temp as u32).wrapping_mul(temp as u32 ^ 1)) >> 8) as u8
    }

    /// Decrypts one byte in place and rolls the keys forward.
    fn decrypt_byte(&mut self, cipher_byte: u8) -> u8 {
        let plain_byte = cipher_byte ^ self.keystream_byte();
        self.update(plain_byte);
        plain_byte
    }
}

/// A traditionally-encrypted entry's 12-byte header, decrypted and
/// checked against the entry's CRC-32/last-modified-time, per APPNOTE
/// 6.1.6. Holding a validated `Keys` behind this type (rather than a
/// bare `Keys`) makes "decrypt before checking the password" a type
/// error instead of a runtime bug.
pub struct ZipCryptoReader {
    keys: Keys,
}

/// A `ZipCryptoReader` whose password has already passed the header
/// check -- the only type this module will hand plaintext out of.
#[derive(Debug)]
pub struct ZipCryptoReaderValid<'a> {
    keys: Keys,
    ciphertext: &'a [u8],
    position: usize,
}

impl ZipCryptoReader {
    pub fn new(password: &[u8]) -> Self {
        Self { keys: Keys::new(password) }
    }

    /// Decrypts the 12-byte encryption header and checks it against the
    /// last byte of either the entry's CRC-32 (the common case) or its
    /// last-modified time (when bit 3 -- data descriptor -- is set, per
    /// APPNOTE 6.1.6's note about streamed entries).
    ///
    /// On success, returns a reader positioned at the start of the
    /// entry's actual (still-compressed) plaintext.
    pub fn validate<'a>(mut self, header_and_data: &'a [u8], check_byte: u8) -> ZipResult<ZipCryptoReaderValid<'a>> {
        if header_and_data.len() < 12 {
            return Err(ZipError::InvalidArchive("Encrypted entry shorter than its encryption header"));
        }
        let mut last = 0u8;
        for &byte in &header_and_data[..12] {
            last = self.keys.decrypt_byte(byte);
        }
        if last != check_byte {
            return Err(ZipError::BadPassword(Default::default()));
        }
        Ok(ZipCryptoReaderValid {
            keys: self.keys,
            ciphertext: &header_and_data[12..],
            position: 0,
        })
    }
}

impl<'a> ZipCryptoReaderValid<'a> {
    /// Decrypts the remainder of the entry's bytes into `out`, which must
    /// be at least as long as the ciphertext remaining.
    pub fn decrypt_remaining(mut self, out: &mut [u8]) -> ZipResult<usize> {
        let remaining = &self.ciphertext[self.position..];
        if out.len() < remaining.len() {
            return Err(ZipError::ShortRead {
                wanted: remaining.len(),
                available: out.len(),
            });
        }
        for (i, &byte) in remaining.iter().enumerate() {
            out[i] = self.keys.decrypt_byte(byte);
        }
        self.position = self.ciphertext.len();
        Ok(remaining.len())
    }

    pub fn len(&self) -> usize {
        self.ciphertext.len() - self.position
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Encrypts `plaintext` the way a ZipCrypto-aware writer would, for
    /// use as test fixture data. Not part of the crate's public surface;
    /// this crate only ever decrypts.
    fn encrypt(password: &[u8], check_byte: u8, header_random: [u8; 12], plaintext: &[u8]) -> Vec<u8> {
        let mut keys = Keys::new(password);
        let mut out = Vec::with_capacity(12 + plaintext.len());
        let mut header = header_random;
        header[11] = check_byte;
        for &byte in &header {
            let cipher = byte ^ keys.keystream_byte();
            keys.update(byte);
            out.push(cipher);
        }
        for &byte in plaintext {
            let cipher = byte ^ keys.keystream_byte();
            keys.update(byte);
            out.push(cipher);
        }
        out
    }

    #[test]
    fn round_trips_with_correct_password() {
        let password = b"hunter2";
        let plaintext = b"the quick brown fox";
        let check_byte = 0x42;
        let ciphertext = encrypt(password, check_byte, [0xAB; 12], plaintext);

        let reader = ZipCryptoReader::new(password);
        let valid = reader.validate(&ciphertext, check_byte).expect("password should validate");
        let mut out = vec![0u8; valid.len()];
        let n = valid.decrypt_remaining(&mut out).unwrap();
        assert_eq!(&out[..n], plaintext);
    }

    #[test]
    fn rejects_wrong_password() {
        let plaintext = b"secret contents";
        let check_byte = 0x99;
        let ciphertext = encrypt(b"correct horse", check_byte, [0x11; 12], plaintext);

        let reader = ZipCryptoReader::new(b"wrong password");
        let err = reader.validate(&ciphertext, check_byte).unwrap_err();
        assert!(matches!(err, ZipError::BadPassword(_)));
    }
}
