//! Package container: header, tables and the relocation protocol.
//!
//! # Layout
//! Export payloads sit in one contiguous region.  The name, import and
//! export tables follow it back to back, in that order.  The header at
//! offset 0 holds the count and offset of each table.
//!
//! # Mutation
//! Tables are never edited where they lie.  Every change:
//!
//! 1. computes the new tables in memory,
//! 2. seeks to the data-end offset,
//! 3. writes any new or relocated payloads there,
//! 4. writes the name, import and export tables, recording each offset,
//! 5. truncates the file after the export table,
//! 6. patches every count and offset in the header,
//! 7. reloads the tables from storage.
//!
//! A payload that shrinks or keeps its size is overwritten in place; if
//! its size changed only the export table is rewritten, at its current
//! offset.

mod writer;

pub use writer::PackageWriter;

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use encoding_rs::{Encoding, WINDOWS_1252};
use log::{debug, warn};
use uuid::Uuid;

use crate::bytecode::ScriptFormat;
use crate::compact::encode_compact_int;
use crate::cursor::{DataCursor, Storage};
use crate::error::{format_err, Error, Result};
use crate::flags::PACKAGE_OBJECT_FLAGS;
use crate::header::{
    write_generations, Generation, PackageHeader, EXPORT_COUNT_OFFSET, EXPORT_TABLE_OFFSET,
    GENERATIONS_OFFSET, GUID_OFFSET, IMPORT_COUNT_OFFSET, IMPORT_TABLE_OFFSET, LICENSEE_OFFSET,
    NAME_COUNT_OFFSET, NAME_TABLE_OFFSET, PACKAGE_FLAGS_OFFSET, VERSION_OFFSET,
};
use crate::resolve::{ObjectRef, NONE_NAME};
use crate::tables::{
    write_export_table, write_import_table, write_name_table, ExportEntry, ImportEntry, NameEntry,
    PackageTables,
};

// ── PackageOptions ───────────────────────────────────────────────────────────

/// Configuration for [`Package::open_with`] and [`Package::from_storage`].
#[derive(Debug, Clone, Copy)]
pub struct PackageOptions {
    /// Mutations fail with [`Error::ReadOnly`] unless set.
    pub writable:      bool,
    /// Charset of positive-length strings.
    pub encoding:      &'static Encoding,
    pub script_format: ScriptFormat,
}

impl Default for PackageOptions {
    fn default() -> Self {
        Self {
            writable:      false,
            encoding:      WINDOWS_1252,
            script_format: ScriptFormat::default(),
        }
    }
}

impl PackageOptions {
    pub fn writable() -> Self {
        Self { writable: true, ..Self::default() }
    }
}

/// Package name derived from a file name: everything before the first `.`.
pub fn package_name_from_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.split('.').next().unwrap_or(n).to_string())
        .unwrap_or_default()
}

// ── Relocation ───────────────────────────────────────────────────────────────

/// New table contents plus payloads to place at the data end.
struct Relocation {
    names:    Vec<NameEntry>,
    imports:  Vec<ImportEntry>,
    exports:  Vec<ExportEntry>,
    /// `(export index, bytes)`; offset and size of that export are filled
    /// in as the bytes are written.
    payloads: Vec<(usize, Vec<u8>)>,
}

/// Offsets recorded while writing the three tables.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TableOffsets {
    pub name:   u32,
    pub import: u32,
    pub export: u32,
    pub end:    u64,
}

pub(crate) fn write_tables<S: Storage>(
    cursor:  &mut DataCursor<S>,
    names:   &[NameEntry],
    imports: &[ImportEntry],
    exports: &[ExportEntry],
) -> Result<TableOffsets> {
    let encoding = cursor.encoding();
    let name = cursor.position()? as u32;
    write_name_table(cursor.get_mut(), names, encoding)?;
    let import = cursor.position()? as u32;
    write_import_table(cursor.get_mut(), imports)?;
    let export = cursor.position()? as u32;
    write_export_table(cursor.get_mut(), exports)?;
    let end = cursor.position()?;
    Ok(TableOffsets { name, import, export, end })
}

pub(crate) fn patch_table_fields<S: Storage>(
    cursor:  &mut DataCursor<S>,
    counts:  (usize, usize, usize),
    offsets: &TableOffsets,
) -> Result<()> {
    let (names, imports, exports) = counts;
    cursor.seek_to(NAME_COUNT_OFFSET)?;
    cursor.write_u32(names as u32)?;
    cursor.seek_to(NAME_TABLE_OFFSET)?;
    cursor.write_u32(offsets.name)?;
    cursor.seek_to(EXPORT_COUNT_OFFSET)?;
    cursor.write_u32(exports as u32)?;
    cursor.seek_to(EXPORT_TABLE_OFFSET)?;
    cursor.write_u32(offsets.export)?;
    cursor.seek_to(IMPORT_COUNT_OFFSET)?;
    cursor.write_u32(imports as u32)?;
    cursor.seek_to(IMPORT_TABLE_OFFSET)?;
    cursor.write_u32(offsets.import)?;
    Ok(())
}

// ── Package ──────────────────────────────────────────────────────────────────

pub struct Package<S> {
    cursor:  DataCursor<S>,
    header:  PackageHeader,
    tables:  PackageTables,
    options: PackageOptions,
}

impl Package<File> {
    /// Opens `path` read-only.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, PackageOptions::default())
    }

    pub fn open_with<P: AsRef<Path>>(path: P, options: PackageOptions) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new().read(true).write(options.writable).open(path)?;
        Self::from_storage(file, package_name_from_path(path), options)
    }
}

impl<S: Storage> Package<S> {
    pub fn from_storage(storage: S, name: impl Into<String>, options: PackageOptions) -> Result<Self> {
        let mut package = Self {
            cursor:  DataCursor::new(storage, options.encoding),
            header:  PackageHeader::new(0, 0),
            tables:  PackageTables::new(name, Vec::new(), Vec::new(), Vec::new()),
            options,
        };
        package.reload()?;
        Ok(package)
    }

    // ── Accessors ───────────────────────────────────────────────────────────

    pub fn name(&self) -> &str {
        self.tables.package_name()
    }

    pub fn header(&self) -> &PackageHeader {
        &self.header
    }

    pub fn tables(&self) -> &PackageTables {
        &self.tables
    }

    pub fn options(&self) -> &PackageOptions {
        &self.options
    }

    pub fn into_inner(self) -> S {
        self.cursor.into_inner()
    }

    /// Lowest payload offset over exports that carry data.
    pub fn data_start_offset(&self) -> Result<u64> {
        self.tables
            .exports()
            .iter()
            .filter_map(ExportEntry::data_range)
            .map(|(start, _)| start)
            .min()
            .ok_or(Error::EmptyDataBlock)
    }

    /// First position after every export payload.
    pub fn data_end_offset(&self) -> Result<u64> {
        self.tables
            .exports()
            .iter()
            .filter_map(ExportEntry::data_range)
            .map(|(_, end)| end)
            .max()
            .ok_or(Error::EmptyDataBlock)
    }

    pub fn export_data(&mut self, index: usize) -> Result<Vec<u8>> {
        let entry = *self.tables.export(index)?;
        match entry.data_range() {
            None => Ok(Vec::new()),
            Some((start, end)) => {
                self.cursor.seek_to(start)?;
                Ok(self.cursor.read_bytes((end - start) as usize)?)
            }
        }
    }

    // ── Loading ─────────────────────────────────────────────────────────────

    /// Re-reads the header and all three tables from storage.
    pub fn reload(&mut self) -> Result<()> {
        self.cursor.seek_to(0)?;
        let header = PackageHeader::read(self.cursor.get_mut())?;
        let encoding = self.cursor.encoding();

        self.cursor.seek_to(header.name_offset as u64)?;
        let mut names = Vec::with_capacity((header.name_count as usize).min(0x1_0000));
        for _ in 0..header.name_count {
            names.push(NameEntry::read(self.cursor.get_mut(), encoding)?);
        }

        self.cursor.seek_to(header.import_offset as u64)?;
        let mut imports = Vec::with_capacity((header.import_count as usize).min(0x1_0000));
        for _ in 0..header.import_count {
            imports.push(ImportEntry::read(self.cursor.get_mut())?);
        }

        self.cursor.seek_to(header.export_offset as u64)?;
        let mut exports = Vec::with_capacity((header.export_count as usize).min(0x1_0000));
        for _ in 0..header.export_count {
            exports.push(ExportEntry::read(self.cursor.get_mut())?);
        }

        debug!(
            "loaded package {}: v{}/{} names={} imports={} exports={}",
            self.tables.package_name(),
            header.version,
            header.licensee,
            names.len(),
            imports.len(),
            exports.len(),
        );

        let package_name = std::mem::take(&mut self.tables.package_name);
        self.tables = PackageTables::new(package_name, names, imports, exports);
        self.header = header;
        Ok(())
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.options.writable {
            Ok(())
        } else {
            Err(Error::ReadOnly)
        }
    }

    // ── Header setters ──────────────────────────────────────────────────────

    pub fn set_version(&mut self, version: u16) -> Result<()> {
        self.ensure_writable()?;
        self.cursor.seek_to(VERSION_OFFSET)?;
        self.cursor.write_u16(version)?;
        self.header.version = version;
        Ok(())
    }

    pub fn set_licensee(&mut self, licensee: u16) -> Result<()> {
        self.ensure_writable()?;
        self.cursor.seek_to(LICENSEE_OFFSET)?;
        self.cursor.write_u16(licensee)?;
        self.header.licensee = licensee;
        Ok(())
    }

    pub fn set_package_flags(&mut self, flags: u32) -> Result<()> {
        self.ensure_writable()?;
        self.cursor.seek_to(PACKAGE_FLAGS_OFFSET)?;
        self.cursor.write_u32(flags)?;
        self.header.package_flags = flags;
        Ok(())
    }

    pub fn set_guid(&mut self, guid: Uuid) -> Result<()> {
        self.ensure_writable()?;
        self.cursor.seek_to(GUID_OFFSET)?;
        self.cursor.write_bytes(guid.as_bytes())?;
        self.header.guid = guid;
        Ok(())
    }

    /// Rewrites the generation list in place.  The number of generations
    /// is fixed by the bytes that follow the header.
    pub fn set_generations(&mut self, generations: Vec<Generation>) -> Result<()> {
        self.ensure_writable()?;
        if generations.len() != self.header.generations.len() {
            return Err(format_err(format!(
                "generation count is fixed at {}, got {}",
                self.header.generations.len(),
                generations.len()
            )));
        }
        self.cursor.seek_to(GENERATIONS_OFFSET)?;
        write_generations(self.cursor.get_mut(), &generations)?;
        self.header.generations = generations;
        Ok(())
    }

    // ── Table mutations ─────────────────────────────────────────────────────

    fn relocate(&mut self, plan: Relocation) -> Result<()> {
        self.ensure_writable()?;
        let Relocation { names, imports, mut exports, payloads } = plan;

        let data_end = self.data_end_offset()?;
        self.cursor.seek_to(data_end)?;
        for (index, bytes) in &payloads {
            let pos = self.cursor.position()?;
            self.cursor.write_bytes(bytes)?;
            let exports_len = exports.len();
            let entry = exports.get_mut(*index).ok_or(Error::OutOfRange {
                table: "export",
                index: *index as i64,
                len:   exports_len,
            })?;
            entry.offset = pos as i32;
            entry.size   = bytes.len() as i32;
        }

        let offsets = write_tables(&mut self.cursor, &names, &imports, &exports)?;
        self.cursor.set_len(offsets.end)?;
        patch_table_fields(&mut self.cursor, (names.len(), imports.len(), exports.len()), &offsets)?;
        self.cursor.flush()?;

        debug!(
            "relocated tables of {}: data_end={:#x} names@{:#x} imports@{:#x} exports@{:#x} end={:#x}",
            self.name(),
            data_end,
            offsets.name,
            offsets.import,
            offsets.export,
            offsets.end,
        );

        self.tables.invalidate_caches();
        self.reload()
    }

    fn relocate_tables(
        &mut self,
        names:   Vec<NameEntry>,
        imports: Vec<ImportEntry>,
        exports: Vec<ExportEntry>,
    ) -> Result<()> {
        self.relocate(Relocation { names, imports, exports, payloads: Vec::new() })
    }

    pub fn update_name_table<F: FnOnce(&mut Vec<NameEntry>)>(&mut self, edit: F) -> Result<()> {
        let mut names = self.tables.names().to_vec();
        edit(&mut names);
        self.relocate_tables(names, self.tables.imports().to_vec(), self.tables.exports().to_vec())
    }

    pub fn update_import_table<F: FnOnce(&mut Vec<ImportEntry>)>(&mut self, edit: F) -> Result<()> {
        let mut imports = self.tables.imports().to_vec();
        edit(&mut imports);
        self.relocate_tables(self.tables.names().to_vec(), imports, self.tables.exports().to_vec())
    }

    pub fn update_export_table<F: FnOnce(&mut Vec<ExportEntry>)>(&mut self, edit: F) -> Result<()> {
        let mut exports = self.tables.exports().to_vec();
        edit(&mut exports);
        self.relocate_tables(self.tables.names().to_vec(), self.tables.imports().to_vec(), exports)
    }

    /// Appends names not yet present.  Returns how many were added.
    pub fn add_name_entries(&mut self, entries: &[(&str, u32)]) -> Result<usize> {
        let mut names = self.tables.names().to_vec();
        let before = names.len();
        for &(name, flags) in entries {
            let entry = NameEntry::new(name, flags);
            if !names.contains(&entry) {
                names.push(entry);
            }
        }
        let added = names.len() - before;
        if added > 0 {
            self.relocate_tables(names, self.tables.imports().to_vec(), self.tables.exports().to_vec())?;
        }
        Ok(added)
    }

    pub fn update_name_entry(&mut self, index: usize, name: &str, flags: u32) -> Result<()> {
        let len = self.tables.names().len();
        if index >= len {
            return Err(Error::OutOfRange { table: "name", index: index as i64, len });
        }
        self.update_name_table(|names| names[index] = NameEntry::new(name, flags))
    }

    fn ensure_names<'n, I: IntoIterator<Item = &'n str>>(&mut self, names: I) -> Result<()> {
        let missing: Vec<(&str, u32)> = names
            .into_iter()
            .filter(|n| self.tables.name_index(n).is_none())
            .map(|n| (n, PACKAGE_OBJECT_FLAGS))
            .collect();
        if !missing.is_empty() {
            self.add_name_entries(&missing)?;
        }
        Ok(())
    }

    fn require_name(&self, name: &str) -> Result<i32> {
        self.tables.require_name_index(name)
    }

    /// Walks `parts` as nested `Core.Package` imports, adding any that are
    /// missing, and returns the reference of the innermost one.
    fn package_import_chain(&self, imports: &mut Vec<ImportEntry>, parts: &[&str]) -> Result<ObjectRef> {
        let core    = self.require_name("Core")?;
        let package = self.require_name("Package")?;
        let mut outer = ObjectRef::NONE;
        for part in parts {
            let entry = ImportEntry {
                class_package: core,
                class_name:    package,
                outer,
                object_name:   self.require_name(part)?,
            };
            let index = match imports.iter().position(|i| *i == entry) {
                Some(i) => i,
                None => {
                    imports.push(entry);
                    imports.len() - 1
                }
            };
            outer = ObjectRef::from_import(index);
        }
        Ok(outer)
    }

    /// Adds imports given as `("Package.Object", "ClassPackage.Class")`.
    ///
    /// Missing names are added first.  Every element of the object path but
    /// the last becomes a `Core.Package` import.  Without `force`, an import
    /// identical to an existing one is skipped.
    pub fn add_import_entries(&mut self, entries: &[(&str, &str)], force: bool) -> Result<()> {
        let mut wanted = vec!["Core", "Package"];
        for (object, class) in entries {
            let (class_package, class_name) = split_class(class)?;
            wanted.extend(object.split('.'));
            wanted.push(class_package);
            wanted.push(class_name);
        }
        self.ensure_names(wanted)?;

        let mut imports = self.tables.imports().to_vec();
        for (object, class) in entries {
            let (class_package, class_name) = split_class(class)?;
            let parts: Vec<&str> = object.split('.').collect();
            let (last, path) = parts.split_last().ok_or_else(|| format_err("empty import name"))?;
            let outer = self.package_import_chain(&mut imports, path)?;
            let entry = ImportEntry {
                class_package: self.require_name(class_package)?,
                class_name:    self.require_name(class_name)?,
                outer,
                object_name:   self.require_name(last)?,
            };
            if force || !imports.contains(&entry) {
                imports.push(entry);
            }
        }

        if imports.as_slice() != self.tables.imports() {
            self.relocate_tables(self.tables.names().to_vec(), imports, self.tables.exports().to_vec())?;
        }
        Ok(())
    }

    /// Renames an import to the dotted `new_name`, re-parenting it under
    /// package imports for the path.
    pub fn rename_import(&mut self, index: usize, new_name: &str) -> Result<()> {
        self.tables.import(index)?;
        let parts: Vec<&str> = new_name.split('.').collect();
        let mut wanted = vec!["Core", "Package"];
        wanted.extend(parts.iter().copied());
        self.ensure_names(wanted)?;

        let (last, path) = parts.split_last().ok_or_else(|| format_err("empty import name"))?;
        let mut imports = self.tables.imports().to_vec();
        let outer = self.package_import_chain(&mut imports, path)?;
        let object_name = self.require_name(last)?;
        imports[index].outer = outer;
        imports[index].object_name = object_name;
        self.relocate_tables(self.tables.names().to_vec(), imports, self.tables.exports().to_vec())
    }

    /// Points an import at another class, given as `ClassPackage.Class`.
    pub fn change_import_class(&mut self, index: usize, class: &str) -> Result<()> {
        self.tables.import(index)?;
        let (class_package, class_name) = split_class(class)?;
        self.ensure_names([class_package, class_name])?;

        let mut imports = self.tables.imports().to_vec();
        imports[index].class_package = self.require_name(class_package)?;
        imports[index].class_name    = self.require_name(class_name)?;
        self.relocate_tables(self.tables.names().to_vec(), imports, self.tables.exports().to_vec())
    }

    fn class_reference(&mut self, full_name: &str) -> Result<ObjectRef> {
        if full_name.is_empty() {
            return Ok(ObjectRef::NONE);
        }
        let existing = self.tables.object_reference(full_name);
        if !existing.is_none() {
            return Ok(existing);
        }
        self.add_import_entries(&[(full_name, "Core.Class")], false)?;
        match self.tables.find_import(full_name) {
            Some(i) => Ok(ObjectRef::from_import(i)),
            None    => Err(Error::ObjectNotFound(full_name.to_string())),
        }
    }

    /// Adds an export named `name` (dotted for nested packages) of class
    /// `class` with payload `data`, and returns its index.
    ///
    /// `class` and `super_class` are full names; missing ones are added as
    /// `Core.Class` imports.  Missing path elements become `Core.Package`
    /// exports whose payload is an empty property list.
    pub fn add_export_entry(
        &mut self,
        name:        &str,
        class:       &str,
        super_class: &str,
        data:        &[u8],
        flags:       u32,
    ) -> Result<usize> {
        let parts: Vec<&str> = name.split('.').collect();
        let mut wanted = vec![NONE_NAME, "Core", "Package"];
        wanted.extend(parts.iter().copied());
        self.ensure_names(wanted)?;

        let class_ref = self.class_reference(class)?;
        let super_ref = self.class_reference(super_class)?;
        let package_class = if parts.len() > 1 {
            self.class_reference("Core.Package")?
        } else {
            ObjectRef::NONE
        };

        let (last, path) = parts.split_last().ok_or_else(|| format_err("empty export name"))?;
        let package_data = encode_compact_int(self.require_name(NONE_NAME)?).as_slice().to_vec();

        let mut exports  = self.tables.exports().to_vec();
        let mut payloads = Vec::new();
        let mut outer    = ObjectRef::NONE;
        for part in path {
            let object_name = self.require_name(part)?;
            let existing = exports.iter().position(|e| {
                e.class == package_class && e.outer == outer && e.object_name == object_name
            });
            let index = match existing {
                Some(i) => i,
                None => {
                    exports.push(ExportEntry {
                        class:     package_class,
                        super_ref: ObjectRef::NONE,
                        outer,
                        object_name,
                        flags:     PACKAGE_OBJECT_FLAGS,
                        size:      0,
                        offset:    0,
                    });
                    payloads.push((exports.len() - 1, package_data.clone()));
                    exports.len() - 1
                }
            };
            outer = ObjectRef::from_export(index);
        }

        let object_name = self.require_name(last)?;
        if let Some(i) = exports
            .iter()
            .position(|e| e.class == class_ref && e.outer == outer && e.object_name == object_name)
        {
            warn!("export {name} already exists at index {i}");
            return Ok(i);
        }
        exports.push(ExportEntry {
            class: class_ref,
            super_ref,
            outer,
            object_name,
            flags,
            size: 0,
            offset: 0,
        });
        let index = exports.len() - 1;
        payloads.push((index, data.to_vec()));

        self.relocate(Relocation {
            names:   self.tables.names().to_vec(),
            imports: self.tables.imports().to_vec(),
            exports,
            payloads,
        })?;
        Ok(index)
    }

    /// Replaces an export's payload.
    ///
    /// Fits in place when no larger than the current allocation; otherwise
    /// the payload moves to the data end and the tables follow it.
    pub fn set_export_data(&mut self, index: usize, data: &[u8]) -> Result<()> {
        self.ensure_writable()?;
        let entry = *self.tables.export(index)?;

        if data.len() as i64 > entry.size.max(0) as i64 {
            let plan = Relocation {
                names:    self.tables.names().to_vec(),
                imports:  self.tables.imports().to_vec(),
                exports:  self.tables.exports().to_vec(),
                payloads: vec![(index, data.to_vec())],
            };
            return self.relocate(plan);
        }

        if !data.is_empty() {
            self.cursor.seek_to(entry.offset as u32 as u64)?;
            self.cursor.write_bytes(data)?;
        }
        if data.len() as i32 != entry.size {
            let mut exports = self.tables.exports().to_vec();
            exports[index].size = data.len() as i32;

            let export_offset = self.header.export_offset as u64;
            self.cursor.seek_to(export_offset)?;
            write_export_table(self.cursor.get_mut(), &exports)?;
            let end = self.cursor.position()?;
            let export_is_last = self.header.export_offset >= self.header.name_offset
                && self.header.export_offset >= self.header.import_offset;
            if export_is_last {
                self.cursor.set_len(end)?;
            } else {
                warn!("export table of {} is not the last table; leaving file length as is", self.name());
            }
            debug!("shrunk export {index} of {} to {} bytes in place", self.name(), data.len());
            self.cursor.flush()?;
            self.tables.invalidate_caches();
            self.reload()?;
        } else {
            self.cursor.flush()?;
        }
        Ok(())
    }

    /// Raw write access for callers that patch payload bytes directly.
    pub fn write_at(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        self.ensure_writable()?;
        self.cursor.seek_to(offset)?;
        self.cursor.write_bytes(bytes)?;
        self.cursor.get_mut().flush()?;
        Ok(())
    }
}

fn split_class(class: &str) -> Result<(&str, &str)> {
    class
        .split_once('.')
        .filter(|(p, c)| !p.is_empty() && !c.is_empty() && !c.contains('.'))
        .ok_or_else(|| format_err(format!("class name {class:?} is not Package.Class")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_name_stops_at_first_dot() {
        assert_eq!(package_name_from_path(Path::new("/tmp/Engine.u")), "Engine");
        assert_eq!(package_name_from_path(Path::new("LineageNPCs.ukx.bak")), "LineageNPCs");
    }

    #[test]
    fn class_name_shape() {
        assert_eq!(split_class("Core.Class").unwrap(), ("Core", "Class"));
        assert!(split_class("Class").is_err());
        assert!(split_class("A.B.C").is_err());
    }
}
