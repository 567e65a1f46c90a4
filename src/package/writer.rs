use log::debug;

use crate::cursor::{DataCursor, Storage};
use crate::error::{Error, Result};
use crate::header::{Generation, PackageHeader};
use crate::package::{patch_table_fields, write_tables, PackageOptions};
use crate::resolve::ObjectRef;
use crate::tables::{ExportEntry, ImportEntry, NameEntry};

/// Builds a new package image from scratch.
///
/// Payloads are laid out in insertion order right after the header, the
/// three tables follow, and the header is written last with the final
/// counts and offsets.
pub struct PackageWriter {
    pub header: PackageHeader,
    names:      Vec<NameEntry>,
    imports:    Vec<ImportEntry>,
    exports:    Vec<(ExportEntry, Vec<u8>)>,
}

impl PackageWriter {
    pub fn new(version: u16, licensee: u16) -> Self {
        Self {
            header:  PackageHeader::new(version, licensee),
            names:   Vec::new(),
            imports: Vec::new(),
            exports: Vec::new(),
        }
    }

    /// Returns the index of `name`, adding it when absent.
    pub fn name(&mut self, name: &str, flags: u32) -> i32 {
        let entry = NameEntry::new(name, flags);
        match self.names.iter().position(|n| *n == entry) {
            Some(i) => i as i32,
            None => {
                self.names.push(entry);
                self.names.len() as i32 - 1
            }
        }
    }

    pub fn add_import(&mut self, entry: ImportEntry) -> ObjectRef {
        self.imports.push(entry);
        ObjectRef::from_import(self.imports.len() - 1)
    }

    /// Adds an export; its size and offset are assigned in [`finish`].
    ///
    /// [`finish`]: PackageWriter::finish
    pub fn add_export(&mut self, entry: ExportEntry, data: Vec<u8>) -> ObjectRef {
        self.exports.push((entry, data));
        ObjectRef::from_export(self.exports.len() - 1)
    }

    pub fn finish<S: Storage>(mut self, storage: S, options: &PackageOptions) -> Result<S> {
        let mut cursor = DataCursor::new(storage, options.encoding);
        if self.header.generations.is_empty() {
            self.header.generations.push(Generation {
                export_count: self.exports.len() as u32,
                name_count:   self.names.len() as u32,
            });
        }

        let header_len = self.header.encoded_len();
        cursor.seek_to(0)?;
        cursor.write_bytes(&vec![0u8; header_len as usize])?; // reserved; overwritten below

        let mut exports = Vec::with_capacity(self.exports.len());
        for (mut entry, data) in self.exports {
            let pos = cursor.position()?;
            cursor.write_bytes(&data)?;
            entry.offset = i32::try_from(pos).map_err(|_| Error::Format("package exceeds 2 GiB".into()))?;
            entry.size   = data.len() as i32;
            exports.push(entry);
        }

        let offsets = write_tables(&mut cursor, &self.names, &self.imports, &exports)?;
        cursor.set_len(offsets.end)?;

        cursor.seek_to(0)?;
        self.header.write(cursor.get_mut())?;
        patch_table_fields(&mut cursor, (self.names.len(), self.imports.len(), exports.len()), &offsets)?;
        cursor.flush()?;

        debug!(
            "wrote package: names={} imports={} exports={} size={}",
            self.names.len(),
            self.imports.len(),
            exports.len(),
            offsets.end
        );
        Ok(cursor.into_inner())
    }
}
