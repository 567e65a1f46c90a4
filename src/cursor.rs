//! Positioned, charset-aware access to a package byte source.

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use encoding_rs::Encoding;

use crate::compact::{ReadUnrealExt, WriteUnrealExt};

/// A seekable byte source that can also be resized.
///
/// The mutation protocol truncates the file after the rewritten export
/// table, so plain `Read + Write + Seek` is not enough.
pub trait Storage: Read + Write + Seek {
    fn set_len(&mut self, len: u64) -> io::Result<()>;
}

impl Storage for File {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        File::set_len(self, len)
    }
}

impl Storage for Cursor<Vec<u8>> {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        self.get_mut().resize(len as usize, 0);
        if self.position() > len {
            self.set_position(len);
        }
        Ok(())
    }
}

impl<S: Storage + ?Sized> Storage for &mut S {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        (**self).set_len(len)
    }
}

// ── DataCursor ───────────────────────────────────────────────────────────────

/// Owns a [`Storage`] handle and remembers the charset used for
/// single-byte strings.
pub struct DataCursor<S> {
    inner:    S,
    encoding: &'static Encoding,
}

impl<S: Storage> DataCursor<S> {
    pub fn new(inner: S, encoding: &'static Encoding) -> Self {
        Self { inner, encoding }
    }

    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    // ── Position ────────────────────────────────────────────────────────────

    pub fn position(&mut self) -> io::Result<u64> {
        self.inner.stream_position()
    }

    pub fn seek_to(&mut self, pos: u64) -> io::Result<()> {
        self.inner.seek(SeekFrom::Start(pos))?;
        Ok(())
    }

    pub fn len(&mut self) -> io::Result<u64> {
        let pos = self.inner.stream_position()?;
        let end = self.inner.seek(SeekFrom::End(0))?;
        self.inner.seek(SeekFrom::Start(pos))?;
        Ok(end)
    }

    pub fn set_len(&mut self, len: u64) -> io::Result<()> {
        self.inner.set_len(len)
    }

    // ── Reads ───────────────────────────────────────────────────────────────

    pub fn read_u8(&mut self) -> io::Result<u8> {
        self.inner.read_u8()
    }

    pub fn read_u16(&mut self) -> io::Result<u16> {
        self.inner.read_u16::<LittleEndian>()
    }

    pub fn read_u32(&mut self) -> io::Result<u32> {
        self.inner.read_u32::<LittleEndian>()
    }

    pub fn read_i32(&mut self) -> io::Result<i32> {
        self.inner.read_i32::<LittleEndian>()
    }

    pub fn read_u64(&mut self) -> io::Result<u64> {
        self.inner.read_u64::<LittleEndian>()
    }

    pub fn read_f32(&mut self) -> io::Result<f32> {
        self.inner.read_f32::<LittleEndian>()
    }

    pub fn read_compact_int(&mut self) -> io::Result<i32> {
        self.inner.read_compact_int()
    }

    pub fn read_string(&mut self) -> io::Result<String> {
        self.inner.read_string(self.encoding)
    }

    pub fn read_bytes(&mut self, len: usize) -> io::Result<Vec<u8>> {
        self.inner.read_byte_vec(len)
    }

    // ── Writes ──────────────────────────────────────────────────────────────

    pub fn write_u8(&mut self, v: u8) -> io::Result<()> {
        self.inner.write_u8(v)
    }

    pub fn write_u16(&mut self, v: u16) -> io::Result<()> {
        self.inner.write_u16::<LittleEndian>(v)
    }

    pub fn write_u32(&mut self, v: u32) -> io::Result<()> {
        self.inner.write_u32::<LittleEndian>(v)
    }

    pub fn write_i32(&mut self, v: i32) -> io::Result<()> {
        self.inner.write_i32::<LittleEndian>(v)
    }

    pub fn write_compact_int(&mut self, v: i32) -> io::Result<()> {
        self.inner.write_compact_int(v)
    }

    pub fn write_string(&mut self, s: &str) -> io::Result<()> {
        self.inner.write_string(s, self.encoding)
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.inner.write_all(bytes)
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::WINDOWS_1252;

    #[test]
    fn cursor_set_len_clamps_position() {
        let mut cur = DataCursor::new(Cursor::new(vec![0u8; 16]), WINDOWS_1252);
        cur.seek_to(12).unwrap();
        cur.set_len(8).unwrap();
        assert_eq!(cur.len().unwrap(), 8);
        assert_eq!(cur.position().unwrap(), 8);
    }

    #[test]
    fn mixed_primitives() {
        let mut cur = DataCursor::new(Cursor::new(Vec::new()), WINDOWS_1252);
        cur.write_u16(0x1234).unwrap();
        cur.write_compact_int(-100).unwrap();
        cur.write_string("Core").unwrap();
        cur.write_i32(-2).unwrap();
        cur.seek_to(0).unwrap();
        assert_eq!(cur.read_u16().unwrap(), 0x1234);
        assert_eq!(cur.read_compact_int().unwrap(), -100);
        assert_eq!(cur.read_string().unwrap(), "Core");
        assert_eq!(cur.read_i32().unwrap(), -2);
        assert!(matches!(cur.read_u8(), Err(e) if e.kind() == io::ErrorKind::UnexpectedEof));
    }
}
