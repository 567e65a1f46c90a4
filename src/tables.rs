//! Name, import and export table records.
//!
//! Record layouts (compact ints unless noted):
//!
//! | Table  | Fields                                                              |
//! |--------|---------------------------------------------------------------------|
//! | Name   | string, flags (u32)                                                 |
//! | Import | class package, class name, outer (i32), object name                 |
//! | Export | class, super, outer (i32), object name, flags (u32), size, offset   |

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};

use crate::compact::{ReadUnrealExt, WriteUnrealExt};
use crate::error::Result;
use crate::resolve::ObjectRef;

// ── Records ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NameEntry {
    pub name:  String,
    pub flags: u32,
}

impl NameEntry {
    pub fn new(name: impl Into<String>, flags: u32) -> Self {
        Self { name: name.into(), flags }
    }

    pub fn read<R: Read>(mut reader: R, encoding: &'static Encoding) -> Result<Self> {
        let name  = reader.read_string(encoding)?;
        let flags = reader.read_u32::<LittleEndian>()?;
        Ok(Self { name, flags })
    }

    pub fn write<W: Write>(&self, mut writer: W, encoding: &'static Encoding) -> Result<()> {
        writer.write_string(&self.name, encoding)?;
        writer.write_u32::<LittleEndian>(self.flags)?;
        Ok(())
    }
}

/// Names are matched without regard to ASCII case.
impl PartialEq for NameEntry {
    fn eq(&self, other: &Self) -> bool {
        self.name.eq_ignore_ascii_case(&other.name)
    }
}

impl Eq for NameEntry {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportEntry {
    /// Name index of the package defining the class, usually `Core`.
    pub class_package: i32,
    /// Name index of the class.
    pub class_name:    i32,
    pub outer:         ObjectRef,
    pub object_name:   i32,
}

impl ImportEntry {
    pub fn read<R: Read>(mut reader: R) -> Result<Self> {
        Ok(Self {
            class_package: reader.read_compact_int()?,
            class_name:    reader.read_compact_int()?,
            outer:         ObjectRef(reader.read_i32::<LittleEndian>()?),
            object_name:   reader.read_compact_int()?,
        })
    }

    pub fn write<W: Write>(&self, mut writer: W) -> Result<()> {
        writer.write_compact_int(self.class_package)?;
        writer.write_compact_int(self.class_name)?;
        writer.write_i32::<LittleEndian>(self.outer.0)?;
        writer.write_compact_int(self.object_name)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportEntry {
    pub class:       ObjectRef,
    pub super_ref:   ObjectRef,
    pub outer:       ObjectRef,
    pub object_name: i32,
    pub flags:       u32,
    pub size:        i32,
    pub offset:      i32,
}

impl ExportEntry {
    pub fn read<R: Read>(mut reader: R) -> Result<Self> {
        Ok(Self {
            class:       ObjectRef(reader.read_compact_int()?),
            super_ref:   ObjectRef(reader.read_compact_int()?),
            outer:       ObjectRef(reader.read_i32::<LittleEndian>()?),
            object_name: reader.read_compact_int()?,
            flags:       reader.read_u32::<LittleEndian>()?,
            size:        reader.read_compact_int()?,
            offset:      reader.read_compact_int()?,
        })
    }

    pub fn write<W: Write>(&self, mut writer: W) -> Result<()> {
        writer.write_compact_int(self.class.0)?;
        writer.write_compact_int(self.super_ref.0)?;
        writer.write_i32::<LittleEndian>(self.outer.0)?;
        writer.write_compact_int(self.object_name)?;
        writer.write_u32::<LittleEndian>(self.flags)?;
        writer.write_compact_int(self.size)?;
        writer.write_compact_int(self.offset)?;
        Ok(())
    }

    /// Byte range of the payload, if the export carries one.
    pub fn data_range(&self) -> Option<(u64, u64)> {
        if self.size > 0 {
            let start = self.offset as u32 as u64;
            Some((start, start + self.size as u64))
        } else {
            None
        }
    }
}

// ── PackageTables ────────────────────────────────────────────────────────────

/// In-memory copy of the three tables plus the package's own name.
///
/// Every decoder borrows this instead of the package so that the storage
/// handle stays exclusively owned by [`crate::package::Package`].
#[derive(Debug, Default)]
pub struct PackageTables {
    pub(crate) package_name: String,
    pub(crate) names:        Vec<NameEntry>,
    pub(crate) imports:      Vec<ImportEntry>,
    pub(crate) exports:      Vec<ExportEntry>,
    pub(crate) full_names:   RefCell<HashMap<ObjectRef, String>>,
}

impl PackageTables {
    pub fn new(
        package_name: impl Into<String>,
        names:        Vec<NameEntry>,
        imports:      Vec<ImportEntry>,
        exports:      Vec<ExportEntry>,
    ) -> Self {
        Self {
            package_name: package_name.into(),
            names,
            imports,
            exports,
            full_names: RefCell::new(HashMap::new()),
        }
    }

    pub fn package_name(&self) -> &str {
        &self.package_name
    }

    pub fn names(&self) -> &[NameEntry] {
        &self.names
    }

    pub fn imports(&self) -> &[ImportEntry] {
        &self.imports
    }

    pub fn exports(&self) -> &[ExportEntry] {
        &self.exports
    }

    /// Drops memoised full names.
    pub fn invalidate_caches(&self) {
        self.full_names.borrow_mut().clear();
    }
}

impl Clone for PackageTables {
    fn clone(&self) -> Self {
        Self::new(
            self.package_name.clone(),
            self.names.clone(),
            self.imports.clone(),
            self.exports.clone(),
        )
    }
}

// ── Table codecs ─────────────────────────────────────────────────────────────

pub fn write_name_table<W: Write>(
    mut writer: W,
    names:      &[NameEntry],
    encoding:   &'static Encoding,
) -> Result<()> {
    for n in names {
        n.write(&mut writer, encoding)?;
    }
    Ok(())
}

pub fn write_import_table<W: Write>(mut writer: W, imports: &[ImportEntry]) -> Result<()> {
    for i in imports {
        i.write(&mut writer)?;
    }
    Ok(())
}

pub fn write_export_table<W: Write>(mut writer: W, exports: &[ExportEntry]) -> Result<()> {
    for e in exports {
        e.write(&mut writer)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::WINDOWS_1252;

    #[test]
    fn name_equality_ignores_case() {
        assert_eq!(NameEntry::new("Core", 0), NameEntry::new("CORE", 7));
        assert_ne!(NameEntry::new("Core", 0), NameEntry::new("Engine", 0));
    }

    #[test]
    fn export_record_roundtrip() {
        let e = ExportEntry {
            class:       ObjectRef(-3),
            super_ref:   ObjectRef::NONE,
            outer:       ObjectRef(1),
            object_name: 70,
            flags:       0x0007_0004,
            size:        300,
            offset:      0x1234,
        };
        let mut buf = Vec::new();
        e.write(&mut buf).unwrap();
        assert_eq!(ExportEntry::read(buf.as_slice()).unwrap(), e);
    }

    #[test]
    fn name_record_layout() {
        let mut buf = Vec::new();
        NameEntry::new("None", 0x0407_0010).write(&mut buf, WINDOWS_1252).unwrap();
        assert_eq!(buf, [5, b'N', b'o', b'n', b'e', 0, 0x10, 0x00, 0x07, 0x04]);
    }
}
