//! Script metadata decoded from real script packages.
//!
//! The loader opens packages by name on demand, follows imports into the
//! packages that define them, and memoises every decoded field record and
//! every flattened field list.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use log::{debug, warn};

use crate::bytecode::{render_tokens, HardcodedNatives, NativeFunction, NativeMap, NativeTable, ScriptReader};
use crate::cursor::Storage;
use crate::error::{Error, Result};
use crate::flags::function;
use crate::package::{Package, PackageOptions};
use crate::properties::{Property, PropertyCodec};
use crate::resolve::{ObjectRef, RefTarget};
use crate::schema::{FieldBody, FieldClass, FieldRecord, FieldTemplate, PropertyExtra, PropertyKind, SchemaResolver};
use crate::tables::PackageTables;

// ── Sources ──────────────────────────────────────────────────────────────────

/// Opens script packages by package name.
pub trait PackageSource {
    type Storage: Storage;

    /// `Ok(None)` when no package of that name exists.
    fn open_package(&self, name: &str) -> Result<Option<Package<Self::Storage>>>;
}

/// `<dir>/<name>.u`, matched without regard to case.
pub struct DirectorySource {
    dir:       PathBuf,
    extension: String,
    options:   PackageOptions,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), extension: "u".to_string(), options: PackageOptions::default() }
    }

    pub fn with_options(mut self, options: PackageOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    fn find(&self, name: &str) -> Result<Option<PathBuf>> {
        let wanted = format!("{name}.{}", self.extension);
        let exact = self.dir.join(&wanted);
        if exact.is_file() {
            return Ok(Some(exact));
        }
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let matches = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.eq_ignore_ascii_case(&wanted));
            if matches && path.is_file() {
                return Ok(Some(path));
            }
        }
        Ok(None)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl PackageSource for DirectorySource {
    type Storage = File;

    fn open_package(&self, name: &str) -> Result<Option<Package<File>>> {
        match self.find(name)? {
            Some(path) => Package::open_with(path, self.options).map(Some),
            None => Ok(None),
        }
    }
}

/// Package images held in memory.
#[derive(Default)]
pub struct MemorySource {
    images:  HashMap<String, (String, Vec<u8>)>,
    options: PackageOptions,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(mut self, options: PackageOptions) -> Self {
        self.options = options;
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, image: Vec<u8>) {
        let name = name.into();
        self.images.insert(name.to_ascii_lowercase(), (name, image));
    }
}

impl PackageSource for MemorySource {
    type Storage = Cursor<Vec<u8>>;

    fn open_package(&self, name: &str) -> Result<Option<Package<Cursor<Vec<u8>>>>> {
        match self.images.get(&name.to_ascii_lowercase()) {
            Some((name, image)) => {
                Package::from_storage(Cursor::new(image.clone()), name.as_str(), self.options).map(Some)
            }
            None => Ok(None),
        }
    }
}

// ── ClassLoader ──────────────────────────────────────────────────────────────

struct LoadedPackage<S> {
    package: RefCell<Package<S>>,
    /// Snapshot of the tables, so decoding never holds the package borrow.
    tables:  PackageTables,
    options: PackageOptions,
}

/// One export inside a loaded package.
struct Located<S> {
    package: Rc<LoadedPackage<S>>,
    index:   usize,
}

impl<S> Clone for Located<S> {
    fn clone(&self) -> Self {
        Self { package: Rc::clone(&self.package), index: self.index }
    }
}

impl<S> Located<S> {
    fn key(&self) -> (String, usize) {
        (self.package.tables.package_name().to_ascii_lowercase(), self.index)
    }

    fn full_name(&self) -> Result<String> {
        self.package.tables.export_full_name(self.index)
    }
}

/// Resolves script classes, structs and natives from script packages.
pub struct ClassLoader<P: PackageSource> {
    source:          P,
    native_packages: Vec<String>,
    packages:        RefCell<HashMap<String, Rc<LoadedPackage<P::Storage>>>>,
    records:         RefCell<HashMap<(String, usize), Rc<FieldRecord>>>,
    structs:         RefCell<HashMap<String, Rc<[FieldTemplate]>>>,
    natives:         RefCell<Option<Rc<NativeMap>>>,
}

impl<P: PackageSource> ClassLoader<P> {
    pub fn new(source: P) -> Self {
        Self {
            source,
            native_packages: vec!["Core".to_string(), "Engine".to_string()],
            packages:        RefCell::new(HashMap::new()),
            records:         RefCell::new(HashMap::new()),
            structs:         RefCell::new(HashMap::new()),
            natives:         RefCell::new(None),
        }
    }

    /// Packages scanned for native function declarations.
    pub fn with_native_packages<I, N>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        self.native_packages = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn source(&self) -> &P {
        &self.source
    }

    fn package(&self, name: &str) -> Result<Rc<LoadedPackage<P::Storage>>> {
        let key = name.to_ascii_lowercase();
        if let Some(loaded) = self.packages.borrow().get(&key) {
            return Ok(Rc::clone(loaded));
        }

        let package = self
            .source
            .open_package(name)?
            .ok_or_else(|| Error::ObjectNotFound(format!("package {name}")))?;
        debug!("class loader opened {} ({} exports)", package.name(), package.tables().exports().len());
        let loaded = Rc::new(LoadedPackage {
            tables:  package.tables().clone(),
            options: *package.options(),
            package: RefCell::new(package),
        });
        self.packages.borrow_mut().insert(key, Rc::clone(&loaded));
        Ok(loaded)
    }

    /// Export named by a full name whose first segment is its package.
    fn locate(&self, full_name: &str) -> Result<Located<P::Storage>> {
        let package_name = full_name.split('.').next().unwrap_or(full_name);
        let package = self.package(package_name)?;
        let index = package
            .tables
            .find_export(full_name)
            .ok_or_else(|| Error::ObjectNotFound(full_name.to_string()))?;
        Ok(Located { package, index })
    }

    /// Follows `reference` from inside `from`, crossing into other packages
    /// for imports.
    fn resolve(&self, from: &Located<P::Storage>, reference: ObjectRef) -> Result<Option<Located<P::Storage>>> {
        match reference.target() {
            RefTarget::None      => Ok(None),
            RefTarget::Export(i) => Ok(Some(Located { package: Rc::clone(&from.package), index: i })),
            RefTarget::Import(i) => {
                let full_name = from.package.tables.import_full_name(i)?;
                self.locate(&full_name).map(Some)
            }
        }
    }

    fn export_data(&self, at: &Located<P::Storage>) -> Result<Vec<u8>> {
        at.package.package.borrow_mut().export_data(at.index)
    }

    fn record_at(&self, at: &Located<P::Storage>) -> Result<Rc<FieldRecord>> {
        let key = at.key();
        if let Some(record) = self.records.borrow().get(&key) {
            return Ok(Rc::clone(record));
        }

        let data = self.export_data(at)?;
        let options = at.package.options;
        let record = Rc::new(FieldRecord::decode(
            &at.package.tables,
            at.index,
            &data,
            self,
            options.encoding,
            options.script_format,
        )?);
        self.records.borrow_mut().insert(key, Rc::clone(&record));
        Ok(record)
    }

    /// Decoded field record of the export named `full_name`.
    pub fn field(&self, full_name: &str) -> Result<Rc<FieldRecord>> {
        self.record_at(&self.locate(full_name)?)
    }

    /// Full name of the super struct or class, if any.
    pub fn super_class(&self, full_name: &str) -> Result<Option<String>> {
        let at = self.locate(full_name)?;
        let record = self.record_at(&at)?;
        match self.resolve(&at, record.super_field)? {
            Some(parent) => parent.full_name().map(Some),
            None => Ok(None),
        }
    }

    /// Whether `class` is `parent` or derives from it.
    pub fn is_subclass(&self, class: &str, parent: &str) -> Result<bool> {
        let mut current = Some(class.to_string());
        let mut depth = 0;
        while let Some(name) = current {
            if name.eq_ignore_ascii_case(parent) {
                return Ok(true);
            }
            depth += 1;
            if depth > 256 {
                return Err(Error::Format(format!("super chain of {class} loops")));
            }
            current = self.super_class(&name)?;
        }
        Ok(false)
    }

    /// Super chain of the struct at `at`, root first.
    fn struct_chain(&self, at: Located<P::Storage>) -> Result<Vec<Located<P::Storage>>> {
        let mut chain = Vec::new();
        let mut current = Some(at);
        while let Some(at) = current {
            if chain.len() > 256 {
                return Err(Error::Format(format!("super chain of {} loops", at.full_name()?)));
            }
            let record = self.record_at(&at)?;
            current = self.resolve(&at, record.super_field)?;
            chain.push(at);
        }
        chain.reverse();
        Ok(chain)
    }

    fn template(&self, at: &Located<P::Storage>, record: &FieldRecord) -> Result<FieldTemplate> {
        let Some(info) = record.property_info() else {
            return Err(Error::Format(format!("{} is not a property", record.name)));
        };
        let full_name_of = |reference: ObjectRef| -> Result<String> {
            match reference.target() {
                RefTarget::Import(i) => at.package.tables.import_full_name(i),
                _ => at.package.tables.object_full_name(reference),
            }
        };

        let kind = match (record.class, &info.extra) {
            (FieldClass::ByteProperty, _) => PropertyKind::Byte,
            (FieldClass::IntProperty, _) => PropertyKind::Int,
            (FieldClass::BoolProperty, _) => PropertyKind::Bool,
            (FieldClass::FloatProperty, _) => PropertyKind::Float,
            (FieldClass::ObjectProperty, PropertyExtra::Object { object_type }) => {
                PropertyKind::Object { class: full_name_of(*object_type)? }
            }
            (FieldClass::ClassProperty, _) => PropertyKind::Class,
            (FieldClass::NameProperty, _) => PropertyKind::Name,
            (FieldClass::StrProperty | FieldClass::StringProperty, _) => PropertyKind::Str,
            (FieldClass::ArrayProperty, PropertyExtra::Array { inner }) => {
                let inner_at = self
                    .resolve(at, *inner)?
                    .ok_or_else(|| Error::Format(format!("array {} has no inner property", record.name)))?;
                let inner_record = self.record_at(&inner_at)?;
                PropertyKind::array_of(self.template(&inner_at, &inner_record)?)
            }
            (FieldClass::StructProperty, PropertyExtra::Struct { struct_type }) => {
                PropertyKind::struct_of(full_name_of(*struct_type)?)
            }
            (FieldClass::DelegateProperty, _) => PropertyKind::Delegate,
            (FieldClass::MapProperty, _) => PropertyKind::Map,
            (FieldClass::FixedArrayProperty, _) => PropertyKind::FixedArray,
            (FieldClass::PointerProperty, _) => PropertyKind::Pointer,
            (class, extra) => {
                return Err(Error::Format(format!("{}: {class:?} with {extra:?}", record.name)));
            }
        };
        Ok(FieldTemplate::new(record.name.clone(), kind).with_dim(u32::from(info.array_dim)))
    }

    fn flatten(&self, full_name: &str) -> Result<Vec<FieldTemplate>> {
        let mut fields = Vec::new();
        for owner in self.struct_chain(self.locate(full_name)?)? {
            let record = self.record_at(&owner)?;
            let Some(info) = record.struct_info() else {
                return Err(Error::Format(format!("{} is not a struct", record.name)));
            };

            let limit = owner.package.tables.exports().len();
            let mut seen = 0;
            let mut child = self.resolve(&owner, info.child)?;
            while let Some(at) = child {
                seen += 1;
                if seen > limit {
                    return Err(Error::Format(format!("field list of {full_name} loops")));
                }
                let field = self.record_at(&at)?;
                if field.class.is_property() {
                    fields.push(self.template(&at, &field)?);
                }
                child = self.resolve(&at, field.next)?;
            }
        }
        Ok(fields)
    }

    /// Default property values of a class.
    pub fn class_defaults(&self, class_full_name: &str) -> Result<Vec<Property>> {
        let at = self.locate(class_full_name)?;
        let record = self.record_at(&at)?;
        let FieldBody::Class(_, _, class) = &record.body else {
            return Err(Error::Format(format!("{class_full_name} is not a class")));
        };
        let data = self.export_data(&at)?;
        let defaults = data
            .get(class.defaults_offset..)
            .ok_or(Error::TruncatedStream)?;
        PropertyCodec::new(&at.package.tables, self)
            .with_encoding(at.package.options.encoding)
            .read_properties(&mut &defaults[..], class_full_name)
    }

    /// Renders the script of a function, state or class, one line per
    /// statement.
    pub fn disassemble(&self, full_name: &str) -> Result<Vec<String>> {
        let at = self.locate(full_name)?;
        let record = self.record_at(&at)?;
        let Some(info) = record.struct_info() else {
            return Err(Error::Format(format!("{full_name} has no script")));
        };
        let data = self.export_data(&at)?;
        let script = data.get(info.script_range.clone()).ok_or(Error::TruncatedStream)?;

        let tables = &at.package.tables;
        let tokens = ScriptReader::new(tables, self, at.package.options.script_format)
            .with_encoding(at.package.options.encoding)
            .read_script(&mut &script[..], info.script_size.max(0) as u32)?;
        render_tokens(tables, &tokens)
    }

    fn scan_natives(&self) -> NativeMap {
        let mut natives = NativeMap::default();
        for name in &self.native_packages {
            let package = match self.package(name) {
                Ok(p) => p,
                Err(e) => {
                    warn!("no natives from {name}: {e}");
                    continue;
                }
            };
            for index in 0..package.tables.exports().len() {
                let reference = ObjectRef::from_export(index);
                if !matches!(package.tables.object_class_name(reference).as_deref(), Ok("Function")) {
                    continue;
                }
                let at = Located { package: Rc::clone(&package), index };
                let record = match self.record_at(&at) {
                    Ok(r) => r,
                    Err(e) => {
                        warn!("skipping {}: {e}", at.full_name().unwrap_or_default());
                        continue;
                    }
                };
                let (Some(s), Some(f)) = (record.struct_info(), record.function_info()) else { continue };
                if !f.is_native() || f.native_index == 0 {
                    continue;
                }
                let name = match package.tables.name(s.friendly_name) {
                    Ok(n) => n.to_string(),
                    Err(_) => record.name.clone(),
                };
                natives.insert(NativeFunction {
                    index:        u32::from(f.native_index),
                    name,
                    pre_operator: f.function_flags & function::PRE_OPERATOR != 0,
                    precedence:   f.operator_precedence,
                    operator:     f.function_flags & function::OPERATOR != 0,
                });
            }
        }
        debug!("class loader found {} native functions", natives.len());
        natives.with_fallback(HardcodedNatives)
    }
}

impl<P: PackageSource> SchemaResolver for ClassLoader<P> {
    fn fields(&self, struct_full_name: &str) -> Result<Rc<[FieldTemplate]>> {
        let key = struct_full_name.to_ascii_lowercase();
        if let Some(fields) = self.structs.borrow().get(&key) {
            return Ok(Rc::clone(fields));
        }
        let fields: Rc<[FieldTemplate]> = self.flatten(struct_full_name)?.into();
        self.structs.borrow_mut().insert(key, Rc::clone(&fields));
        Ok(fields)
    }
}

impl<P: PackageSource> NativeTable for ClassLoader<P> {
    fn native(&self, index: u32) -> Result<NativeFunction> {
        let cached = self.natives.borrow().clone();
        let natives = match cached {
            Some(n) => n,
            None => {
                let scanned = Rc::new(self.scan_natives());
                *self.natives.borrow_mut() = Some(Rc::clone(&scanned));
                scanned
            }
        };
        natives.native(index)
    }
}
