//! Compact integers and length-prefixed strings.
//!
//! # Compact int layout
//! A signed 32-bit value is stored in 1 to 5 bytes, magnitude first:
//!
//! | Byte | Bits                                              |
//! |------|---------------------------------------------------|
//! | 0    | bit7 sign, bit6 more follows, bits5-0 magnitude   |
//! | 1..3 | bit7 more follows, bits6-0 magnitude              |
//! | 4    | bits4-0 magnitude, never a continuation bit       |
//!
//! Zero always encodes as the single byte `0x00`.
//!
//! # Strings
//! A string is a compact length followed by its bytes.  A positive length
//! counts single-byte characters in the package charset, a negative length
//! counts UTF-16LE code units.  Both forms include a trailing NUL; a length
//! of zero is the empty string with no terminator at all.

use std::io::{self, Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt};
use encoding_rs::{Encoding, UTF_16LE};
use log::warn;

/// Upper bound on the encoded size of a compact int.
pub const MAX_COMPACT_INT_LEN: usize = 5;

// ── CompactBytes ─────────────────────────────────────────────────────────────

/// An encoded compact int held on the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactBytes {
    buf: [u8; MAX_COMPACT_INT_LEN],
    len: u8,
}

impl CompactBytes {
    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.len as usize]
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl AsRef<[u8]> for CompactBytes {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

// ── Codec ────────────────────────────────────────────────────────────────────

pub fn encode_compact_int(value: i32) -> CompactBytes {
    let mag = value.unsigned_abs();
    let mut buf = [
        (mag & 0x3F) as u8,
        ((mag >> 6) & 0x7F) as u8,
        ((mag >> 13) & 0x7F) as u8,
        ((mag >> 20) & 0x7F) as u8,
        ((mag >> 27) & 0x1F) as u8,
    ];

    let mut len = MAX_COMPACT_INT_LEN;
    while len > 1 && buf[len - 1] == 0 {
        len -= 1;
    }

    if len > 1 {
        buf[0] |= 0x40;
    }
    for b in buf.iter_mut().take(len - 1).skip(1) {
        *b |= 0x80;
    }
    if value < 0 {
        buf[0] |= 0x80;
    }

    CompactBytes { buf, len: len as u8 }
}

/// Number of bytes `value` occupies once encoded.
pub fn compact_int_len(value: i32) -> usize {
    encode_compact_int(value).len()
}

pub fn decode_compact_int(bytes: &[u8]) -> io::Result<i32> {
    let mut slice = bytes;
    slice.read_compact_int()
}

// ── Extension traits ─────────────────────────────────────────────────────────

/// Unreal-specific reads layered over [`byteorder::ReadBytesExt`].
pub trait ReadUnrealExt: Read {
    /// Reads exactly `len` bytes.  The buffer grows with the data that
    /// actually arrives, so a corrupt length fails with `UnexpectedEof`
    /// instead of reserving `len` bytes up front.
    fn read_byte_vec(&mut self, len: usize) -> io::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(len.min(0x1_0000));
        Read::take(&mut *self, len as u64).read_to_end(&mut buf)?;
        if buf.len() < len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("expected {len} bytes, got {}", buf.len()),
            ));
        }
        Ok(buf)
    }

    fn read_compact_int(&mut self) -> io::Result<i32> {
        let b0 = self.read_u8()?;
        let negative = b0 & 0x80 != 0;
        let mut mag = (b0 & 0x3F) as u32;

        if b0 & 0x40 != 0 {
            let mut shift = 6;
            for i in 1..MAX_COMPACT_INT_LEN {
                let b = self.read_u8()?;
                if i == MAX_COMPACT_INT_LEN - 1 {
                    mag |= ((b & 0x1F) as u32) << shift;
                    break;
                }
                mag |= ((b & 0x7F) as u32) << shift;
                if b & 0x80 == 0 {
                    break;
                }
                shift += 7;
            }
        }

        let value = mag as i32;
        Ok(if negative { value.wrapping_neg() } else { value })
    }

    fn read_string(&mut self, encoding: &'static Encoding) -> io::Result<String> {
        let len = self.read_compact_int()?;
        if len == 0 {
            return Ok(String::new());
        }

        let byte_len = if len > 0 {
            len as usize
        } else {
            (len.unsigned_abs() as usize) * 2
        };
        let bytes = self.read_byte_vec(byte_len)?;

        let (text, had_errors) = if len > 0 {
            encoding.decode_without_bom_handling(&bytes[..byte_len - 1])
        } else {
            UTF_16LE.decode_without_bom_handling(&bytes[..byte_len - 2])
        };
        if had_errors {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "malformed string bytes"));
        }
        Ok(text.into_owned())
    }

    /// NUL-terminated single-byte string, as used by script constants.
    fn read_cstring(&mut self, encoding: &'static Encoding) -> io::Result<String> {
        let mut bytes = Vec::new();
        loop {
            match self.read_u8()? {
                0 => break,
                b => bytes.push(b),
            }
        }
        let (text, had_errors) = encoding.decode_without_bom_handling(&bytes);
        if had_errors {
            warn!("replaced undecodable bytes in {} string {:02x?}", encoding.name(), bytes);
        }
        Ok(text.into_owned())
    }

    /// NUL-terminated UTF-16LE string.
    fn read_wide_cstring(&mut self) -> io::Result<String> {
        let mut units = Vec::new();
        loop {
            match self.read_u16::<byteorder::LittleEndian>()? {
                0 => break,
                u => units.push(u),
            }
        }
        String::from_utf16(&units)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

impl<R: Read + ?Sized> ReadUnrealExt for R {}

/// Unreal-specific writes layered over [`byteorder::WriteBytesExt`].
pub trait WriteUnrealExt: Write {
    fn write_compact_int(&mut self, value: i32) -> io::Result<()> {
        self.write_all(encode_compact_int(value).as_slice())
    }

    fn write_string(&mut self, s: &str, encoding: &'static Encoding) -> io::Result<()> {
        let (bytes, _, unmappable) = encoding.encode(s);
        if !unmappable && encoding.is_single_byte() {
            self.write_compact_int(bytes.len() as i32 + 1)?;
            self.write_all(&bytes)?;
            self.write_u8(0)
        } else {
            let units: Vec<u16> = s.encode_utf16().collect();
            self.write_compact_int(-(units.len() as i32 + 1))?;
            for u in units {
                self.write_u16::<byteorder::LittleEndian>(u)?;
            }
            self.write_u16::<byteorder::LittleEndian>(0)
        }
    }

    fn write_cstring(&mut self, s: &str, encoding: &'static Encoding) -> io::Result<()> {
        let (bytes, _, _) = encoding.encode(s);
        self.write_all(&bytes)?;
        self.write_u8(0)
    }

    fn write_wide_cstring(&mut self, s: &str) -> io::Result<()> {
        for u in s.encode_utf16() {
            self.write_u16::<byteorder::LittleEndian>(u)?;
        }
        self.write_u16::<byteorder::LittleEndian>(0)
    }
}

impl<W: Write + ?Sized> WriteUnrealExt for W {}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::WINDOWS_1252;

    #[test]
    fn zero_is_one_byte() {
        assert_eq!(encode_compact_int(0).as_slice(), &[0x00]);
        assert_eq!(decode_compact_int(&[0x00]).unwrap(), 0);
    }

    #[test]
    fn known_encodings() {
        assert_eq!(encode_compact_int(63).as_slice(), &[0x3F]);
        assert_eq!(encode_compact_int(-63).as_slice(), &[0xBF]);
        assert_eq!(encode_compact_int(64).as_slice(), &[0x40, 0x01]);
        assert_eq!(encode_compact_int(8191).as_slice(), &[0x7F, 0x7F]);
        assert_eq!(encode_compact_int(8192).as_slice(), &[0x40, 0x80, 0x01]);
        assert_eq!(encode_compact_int(i32::MAX).len(), 5);
    }

    #[test]
    fn boundaries_roundtrip() {
        for v in [
            0, 1, -1, 63, 64, 8191, 8192, 1_048_575, 1_048_576,
            134_217_727, 134_217_728, i32::MAX, i32::MIN + 1, i32::MIN,
        ] {
            let enc = encode_compact_int(v);
            assert_eq!(decode_compact_int(enc.as_slice()).unwrap(), v, "value {v}");
        }
    }

    #[test]
    fn truncated_input_fails() {
        let err = decode_compact_int(&[0x40]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn single_byte_string() {
        let mut buf = Vec::new();
        buf.write_string("None", WINDOWS_1252).unwrap();
        assert_eq!(buf, [0x05, b'N', b'o', b'n', b'e', 0]);
        assert_eq!(buf.as_slice().read_string(WINDOWS_1252).unwrap(), "None");
    }

    #[test]
    fn wide_string_fallback() {
        let mut buf = Vec::new();
        buf.write_string("Привет", WINDOWS_1252).unwrap();
        assert_eq!(buf[0], encode_compact_int(-7).as_slice()[0]);
        assert_eq!(buf.len(), 1 + 7 * 2);
        assert_eq!(buf.as_slice().read_string(WINDOWS_1252).unwrap(), "Привет");
    }

    #[test]
    fn oversized_length_prefix_fails() {
        // claims 0x0FFF_FFFF bytes, carries three
        let mut buf = encode_compact_int(0x0FFF_FFFF).as_slice().to_vec();
        buf.extend_from_slice(b"abc");
        let err = buf.as_slice().read_string(WINDOWS_1252).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);

        let err = [1u8, 2].as_slice().read_byte_vec(usize::MAX / 2).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert_eq!([1u8, 2, 3].as_slice().read_byte_vec(2).unwrap(), [1, 2]);
    }

    #[test]
    fn cstring_replaces_undecodable_bytes() {
        // lone Shift_JIS lead byte
        let text = [b'a', 0x82, 0x00].as_slice().read_cstring(encoding_rs::SHIFT_JIS).unwrap();
        assert_eq!(text, "a\u{FFFD}");
    }

    #[test]
    fn empty_length_prefix() {
        assert_eq!([0u8].as_slice().read_string(WINDOWS_1252).unwrap(), "");
    }
}
