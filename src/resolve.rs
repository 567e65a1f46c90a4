//! Object reference resolution and name lookups.
//!
//! Every cross reference in a package is one signed integer:
//! `0` is none, `n > 0` is export `n - 1`, `n < 0` is import `-n - 1`.
//!
//! Full names differ by side.  An export's full name starts with the name
//! of the package it lives in; an import's full name is only its own outer
//! chain, because the chain already starts at the foreign package.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::tables::{ExportEntry, ImportEntry, PackageTables};

pub const NONE_NAME: &str = "None";

// ── ObjectRef ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectRef(pub i32);

impl ObjectRef {
    pub const NONE: ObjectRef = ObjectRef(0);

    pub fn from_export(index: usize) -> Self {
        ObjectRef(index as i32 + 1)
    }

    pub fn from_import(index: usize) -> Self {
        ObjectRef(-(index as i32) - 1)
    }

    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    pub fn target(self) -> RefTarget {
        match self.0 {
            0 => RefTarget::None,
            n if n > 0 => RefTarget::Export((n - 1) as usize),
            n => RefTarget::Import((-(n as i64) - 1) as usize),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefTarget {
    None,
    Export(usize),
    Import(usize),
}

/// A resolved table entry together with its table index.
#[derive(Debug, Clone, Copy)]
pub enum Entry<'a> {
    Export(usize, &'a ExportEntry),
    Import(usize, &'a ImportEntry),
}

impl Entry<'_> {
    pub fn reference(&self) -> ObjectRef {
        match *self {
            Entry::Export(i, _) => ObjectRef::from_export(i),
            Entry::Import(i, _) => ObjectRef::from_import(i),
        }
    }

    pub fn object_name(&self) -> i32 {
        match self {
            Entry::Export(_, e) => e.object_name,
            Entry::Import(_, i) => i.object_name,
        }
    }

    pub fn outer(&self) -> ObjectRef {
        match self {
            Entry::Export(_, e) => e.outer,
            Entry::Import(_, i) => i.outer,
        }
    }
}

// ── Resolution ───────────────────────────────────────────────────────────────

impl PackageTables {
    pub fn name(&self, index: i32) -> Result<&str> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.names.get(i))
            .map(|n| n.name.as_str())
            .ok_or(Error::OutOfRange { table: "name", index: index as i64, len: self.names.len() })
    }

    /// First name matching `name` without regard to ASCII case.
    pub fn name_index(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n.name.eq_ignore_ascii_case(name))
    }

    pub fn require_name_index(&self, name: &str) -> Result<i32> {
        self.name_index(name)
            .map(|i| i as i32)
            .ok_or_else(|| Error::NameNotFound(name.to_string()))
    }

    pub fn export(&self, index: usize) -> Result<&ExportEntry> {
        self.exports.get(index).ok_or(Error::OutOfRange {
            table: "export",
            index: index as i64,
            len:   self.exports.len(),
        })
    }

    pub fn import(&self, index: usize) -> Result<&ImportEntry> {
        self.imports.get(index).ok_or(Error::OutOfRange {
            table: "import",
            index: index as i64,
            len:   self.imports.len(),
        })
    }

    pub fn object(&self, reference: ObjectRef) -> Result<Option<Entry<'_>>> {
        Ok(match reference.target() {
            RefTarget::None      => None,
            RefTarget::Export(i) => Some(Entry::Export(i, self.export(i)?)),
            RefTarget::Import(i) => Some(Entry::Import(i, self.import(i)?)),
        })
    }

    pub fn object_name(&self, reference: ObjectRef) -> Result<&str> {
        match self.object(reference)? {
            None        => Ok(NONE_NAME),
            Some(entry) => self.name(entry.object_name()),
        }
    }

    /// Outer chain joined with `.`, without a package prefix.
    pub fn inner_full_name(&self, reference: ObjectRef) -> Result<String> {
        if reference.is_none() {
            return Ok(NONE_NAME.to_string());
        }
        if let Some(cached) = self.full_names.borrow().get(&reference) {
            return Ok(cached.clone());
        }

        let mut parts = Vec::new();
        let mut current = reference;
        let limit = self.exports.len() + self.imports.len();
        while let Some(entry) = self.object(current)? {
            if parts.len() > limit {
                return Err(Error::Format(format!("outer chain of {reference} loops")));
            }
            parts.push(self.name(entry.object_name())?);
            current = entry.outer();
        }
        parts.reverse();
        let full = parts.join(".");

        self.full_names.borrow_mut().insert(reference, full.clone());
        Ok(full)
    }

    pub fn export_full_name(&self, index: usize) -> Result<String> {
        self.export(index)?;
        let inner = self.inner_full_name(ObjectRef::from_export(index))?;
        Ok(format!("{}.{}", self.package_name, inner))
    }

    pub fn import_full_name(&self, index: usize) -> Result<String> {
        self.import(index)?;
        self.inner_full_name(ObjectRef::from_import(index))
    }

    pub fn object_full_name(&self, reference: ObjectRef) -> Result<String> {
        match reference.target() {
            RefTarget::None      => Ok(NONE_NAME.to_string()),
            RefTarget::Export(i) => self.export_full_name(i),
            RefTarget::Import(i) => self.import_full_name(i),
        }
    }

    /// `ClassPackage.ClassName` of an import, e.g. `Core.Function`.
    pub fn import_class_full_name(&self, index: usize) -> Result<String> {
        let import = self.import(index)?;
        Ok(format!("{}.{}", self.name(import.class_package)?, self.name(import.class_name)?))
    }

    /// Short class name of any object.  An export without a class is itself
    /// a class.
    pub fn object_class_name(&self, reference: ObjectRef) -> Result<String> {
        match self.object(reference)? {
            None                       => Ok(NONE_NAME.to_string()),
            Some(Entry::Import(_, imp)) => Ok(self.name(imp.class_name)?.to_string()),
            Some(Entry::Export(_, exp)) if exp.class.is_none() => Ok("Class".to_string()),
            Some(Entry::Export(_, exp)) => Ok(self.object_name(exp.class)?.to_string()),
        }
    }

    /// Full class name of any object, e.g. `Core.Function` or `Engine.Actor`.
    pub fn object_class_full_name(&self, reference: ObjectRef) -> Result<String> {
        match self.object(reference)? {
            None                       => Ok(NONE_NAME.to_string()),
            Some(Entry::Import(i, _))  => self.import_class_full_name(i),
            Some(Entry::Export(_, exp)) if exp.class.is_none() => Ok("Core.Class".to_string()),
            Some(Entry::Export(_, exp)) => self.object_full_name(exp.class),
        }
    }

    /// Export matching `name`, given either as the inner full name or with
    /// this package's name in front.
    pub fn find_export(&self, name: &str) -> Option<usize> {
        let inner = self.strip_package_prefix(name);
        (0..self.exports.len()).find(|&i| {
            self.inner_full_name(ObjectRef::from_export(i))
                .map(|n| n.eq_ignore_ascii_case(name) || inner.is_some_and(|s| n.eq_ignore_ascii_case(s)))
                .unwrap_or(false)
        })
    }

    pub fn find_import(&self, full_name: &str) -> Option<usize> {
        (0..self.imports.len()).find(|&i| {
            self.import_full_name(i)
                .map(|n| n.eq_ignore_ascii_case(full_name))
                .unwrap_or(false)
        })
    }

    /// Imports first, then exports; [`ObjectRef::NONE`] when neither matches.
    pub fn object_reference(&self, full_name: &str) -> ObjectRef {
        if let Some(i) = self.find_import(full_name) {
            return ObjectRef::from_import(i);
        }
        self.find_export(full_name).map(ObjectRef::from_export).unwrap_or(ObjectRef::NONE)
    }

    fn strip_package_prefix<'n>(&self, name: &'n str) -> Option<&'n str> {
        let (head, rest) = name.split_once('.')?;
        head.eq_ignore_ascii_case(&self.package_name).then_some(rest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::NameEntry;

    fn sample() -> PackageTables {
        let names = ["None", "Core", "Package", "Class", "Engine", "Actor", "Lineage", "Pawn"]
            .into_iter()
            .map(|n| NameEntry::new(n, 0))
            .collect();
        let imports = vec![
            // Core.Engine (package)
            ImportEntry { class_package: 1, class_name: 2, outer: ObjectRef::NONE, object_name: 4 },
            // Engine.Actor
            ImportEntry { class_package: 1, class_name: 3, outer: ObjectRef(-1), object_name: 5 },
        ];
        let exports = vec![
            ExportEntry {
                class: ObjectRef::NONE, super_ref: ObjectRef(-2), outer: ObjectRef::NONE,
                object_name: 7, flags: 0, size: 4, offset: 100,
            },
        ];
        PackageTables::new("Lineage", names, imports, exports)
    }

    #[test]
    fn sign_convention() {
        assert_eq!(ObjectRef(0).target(), RefTarget::None);
        assert_eq!(ObjectRef(1).target(), RefTarget::Export(0));
        assert_eq!(ObjectRef(-1).target(), RefTarget::Import(0));
        assert_eq!(ObjectRef::from_import(4), ObjectRef(-5));
        assert_eq!(ObjectRef::from_export(4), ObjectRef(5));
        assert_eq!(ObjectRef(i32::MIN).target(), RefTarget::Import(i32::MAX as usize));
    }

    #[test]
    fn full_name_asymmetry() {
        let t = sample();
        assert_eq!(t.export_full_name(0).unwrap(), "Lineage.Pawn");
        assert_eq!(t.import_full_name(1).unwrap(), "Engine.Actor");
        assert_eq!(t.import_class_full_name(1).unwrap(), "Core.Class");
        assert_eq!(t.object_class_name(ObjectRef(1)).unwrap(), "Class");
    }

    #[test]
    fn lookups() {
        let t = sample();
        assert_eq!(t.name_index("ACTOR"), Some(5));
        assert_eq!(t.name_index("Missing"), None);
        assert_eq!(t.find_export("Pawn"), Some(0));
        assert_eq!(t.find_export("lineage.pawn"), Some(0));
        assert_eq!(t.object_reference("Engine.Actor"), ObjectRef(-2));
        assert_eq!(t.object_reference("Engine.Nothing"), ObjectRef::NONE);
    }

    #[test]
    fn bad_index_is_out_of_range() {
        let t = sample();
        assert!(matches!(t.name(99), Err(Error::OutOfRange { table: "name", .. })));
        assert!(matches!(t.object(ObjectRef(-9)), Err(Error::OutOfRange { table: "import", .. })));
    }

    #[test]
    fn cache_cleared_on_invalidate() {
        let t = sample();
        t.inner_full_name(ObjectRef(-2)).unwrap();
        assert!(!t.full_names.borrow().is_empty());
        t.invalidate_caches();
        assert!(t.full_names.borrow().is_empty());
    }
}
