use std::fs;
use std::io::Cursor;

use tempfile::NamedTempFile;
use upkg::flags::PACKAGE_OBJECT_FLAGS;
use upkg::{Error, ExportEntry, ImportEntry, ObjectRef, Package, PackageOptions, PackageWriter};

const ACTOR_DATA: &[u8] = &[0x00]; // empty property list: "None"
const BLOB_DATA:  &[u8] = b"raw payload bytes";

/// `Test` package with an `Engine.Actor` import and two exports.
fn build_package() -> Vec<u8> {
    let mut w = PackageWriter::new(123, 29);
    let none    = w.name("None", PACKAGE_OBJECT_FLAGS);
    let core    = w.name("Core", PACKAGE_OBJECT_FLAGS);
    let package = w.name("Package", PACKAGE_OBJECT_FLAGS);
    let class   = w.name("Class", PACKAGE_OBJECT_FLAGS);
    let engine  = w.name("Engine", PACKAGE_OBJECT_FLAGS);
    let actor   = w.name("Actor", PACKAGE_OBJECT_FLAGS);
    let mine    = w.name("MyActor", PACKAGE_OBJECT_FLAGS);
    let blob    = w.name("Blob", PACKAGE_OBJECT_FLAGS);
    assert_eq!(none, 0);

    let engine_ref = w.add_import(ImportEntry {
        class_package: core,
        class_name:    package,
        outer:         ObjectRef::NONE,
        object_name:   engine,
    });
    let actor_ref = w.add_import(ImportEntry {
        class_package: core,
        class_name:    class,
        outer:         engine_ref,
        object_name:   actor,
    });

    let export = |object_name| ExportEntry {
        class: actor_ref,
        super_ref: ObjectRef::NONE,
        outer: ObjectRef::NONE,
        object_name,
        flags: PACKAGE_OBJECT_FLAGS,
        size: 0,
        offset: 0,
    };
    w.add_export(export(mine), ACTOR_DATA.to_vec());
    w.add_export(export(blob), BLOB_DATA.to_vec());

    w.finish(Cursor::new(Vec::new()), &PackageOptions::default()).unwrap().into_inner()
}

fn open_memory(writable: bool) -> Package<Cursor<Vec<u8>>> {
    let options = PackageOptions { writable, ..PackageOptions::default() };
    Package::from_storage(Cursor::new(build_package()), "Test", options).unwrap()
}

#[test]
fn test_written_package_loads() {
    let mut pkg = open_memory(false);

    assert_eq!(pkg.header().version, 123);
    assert_eq!(pkg.header().licensee, 29);
    assert_eq!(pkg.header().generations.len(), 1);
    assert_eq!(pkg.tables().names().len(), 8);
    assert_eq!(pkg.tables().imports().len(), 2);
    assert_eq!(pkg.tables().exports().len(), 2);

    let t = pkg.tables();
    assert_eq!(t.import_full_name(1).unwrap(), "Engine.Actor");
    assert_eq!(t.import_class_full_name(0).unwrap(), "Core.Package");
    assert_eq!(t.export_full_name(0).unwrap(), "Test.MyActor");
    assert_eq!(t.object_class_full_name(ObjectRef::from_export(1)).unwrap(), "Engine.Actor");
    assert_eq!(t.find_export("Test.Blob"), Some(1));
    assert_eq!(t.find_export("blob"), Some(1));
    assert_eq!(t.object_reference("Engine.Actor"), ObjectRef(-2));

    assert_eq!(pkg.export_data(0).unwrap(), ACTOR_DATA);
    assert_eq!(pkg.export_data(1).unwrap(), BLOB_DATA);
}

#[test]
fn test_file_roundtrip() {
    let temp_file = NamedTempFile::new().unwrap();
    fs::write(temp_file.path(), build_package()).unwrap();

    let mut pkg = Package::open_with(temp_file.path(), PackageOptions::writable()).unwrap();
    assert_eq!(pkg.export_data(1).unwrap(), BLOB_DATA);

    pkg.set_export_data(1, b"a much longer payload than the original one").unwrap();
    drop(pkg);

    let mut pkg = Package::open(temp_file.path()).unwrap();
    assert_eq!(pkg.export_data(1).unwrap(), b"a much longer payload than the original one");
    assert_eq!(pkg.export_data(0).unwrap(), ACTOR_DATA);
}

#[test]
fn test_add_name_relocates_tables() {
    let mut pkg = open_memory(true);
    let data_end = pkg.data_end_offset().unwrap();
    let offsets: Vec<i32> = pkg.tables().exports().iter().map(|e| e.offset).collect();

    let added = pkg.add_name_entries(&[("Health", 0), ("None", 0)]).unwrap();
    assert_eq!(added, 1);
    assert_eq!(pkg.tables().names().len(), 9);
    assert_eq!(pkg.tables().name(8).unwrap(), "Health");
    assert_eq!(pkg.header().name_offset as u64, data_end);

    // payloads stay where they were
    let after: Vec<i32> = pkg.tables().exports().iter().map(|e| e.offset).collect();
    assert_eq!(after, offsets);
    assert_eq!(pkg.export_data(1).unwrap(), BLOB_DATA);

    // existing names are not duplicated
    assert_eq!(pkg.add_name_entries(&[("Health", 0)]).unwrap(), 0);
}

#[test]
fn test_grow_export_moves_payload_to_data_end() {
    let mut pkg = open_memory(true);
    let data_end = pkg.data_end_offset().unwrap();
    let grown = vec![0xAB; 64];

    pkg.set_export_data(0, &grown).unwrap();

    let entry = pkg.tables().exports()[0];
    assert_eq!(entry.offset as u64, data_end);
    assert_eq!(entry.size, 64);
    assert_eq!(pkg.data_end_offset().unwrap(), data_end + 64);
    assert_eq!(pkg.export_data(0).unwrap(), grown);
    assert_eq!(pkg.export_data(1).unwrap(), BLOB_DATA);
}

#[test]
fn test_shrink_export_in_place() {
    let mut pkg = open_memory(true);
    let before = pkg.tables().exports()[1];

    pkg.set_export_data(1, b"raw").unwrap();

    let after = pkg.tables().exports()[1];
    assert_eq!(after.offset, before.offset);
    assert_eq!(after.size, 3);
    assert_eq!(pkg.export_data(1).unwrap(), b"raw");
}

#[test]
fn test_add_imports_and_exports() {
    let mut pkg = open_memory(true);

    pkg.add_import_entries(&[("Engine.Pawn", "Core.Class")], false).unwrap();
    let pawn = pkg.tables().find_import("Engine.Pawn").unwrap();
    assert_eq!(pkg.tables().import_class_full_name(pawn).unwrap(), "Core.Class");
    // the Engine package import is reused
    assert_eq!(pkg.tables().imports().len(), 3);

    // adding the same import again is a no-op unless forced
    pkg.add_import_entries(&[("Engine.Pawn", "Core.Class")], false).unwrap();
    assert_eq!(pkg.tables().imports().len(), 3);
    pkg.add_import_entries(&[("Engine.Pawn", "Core.Class")], true).unwrap();
    assert_eq!(pkg.tables().imports().len(), 4);

    let index = pkg
        .add_export_entry("Group.NewPawn", "Engine.Pawn", "", &[0x00], PACKAGE_OBJECT_FLAGS)
        .unwrap();
    let t = pkg.tables();
    assert_eq!(t.export_full_name(index).unwrap(), "Test.Group.NewPawn");
    assert_eq!(t.object_class_full_name(ObjectRef::from_export(index)).unwrap(), "Engine.Pawn");
    let group = t.find_export("Group").unwrap();
    assert_eq!(t.object_class_name(ObjectRef::from_export(group)).unwrap(), "Package");
    assert_eq!(pkg.export_data(index).unwrap(), [0x00]);
}

#[test]
fn test_rename_and_reclass_import() {
    let mut pkg = open_memory(true);

    pkg.rename_import(1, "Lineage.Npc.Actor").unwrap();
    assert_eq!(pkg.tables().import_full_name(1).unwrap(), "Lineage.Npc.Actor");

    pkg.change_import_class(1, "Engine.Texture").unwrap();
    assert_eq!(pkg.tables().import_class_full_name(1).unwrap(), "Engine.Texture");
}

#[test]
fn test_header_setters() {
    let mut pkg = open_memory(true);
    pkg.set_version(128).unwrap();
    pkg.set_package_flags(0x0001).unwrap();
    pkg.reload().unwrap();
    assert_eq!(pkg.header().version, 128);
    assert_eq!(pkg.header().package_flags, 0x0001);
}

#[test]
fn test_read_only_rejects_mutation() {
    let mut pkg = open_memory(false);
    assert!(matches!(pkg.add_name_entries(&[("Health", 0)]), Err(Error::ReadOnly)));
    assert!(matches!(pkg.set_export_data(0, b"x"), Err(Error::ReadOnly)));
    assert!(matches!(pkg.set_version(1), Err(Error::ReadOnly)));
    assert_eq!(pkg.tables().names().len(), 8);
}

#[test]
fn test_bad_magic() {
    let mut image = build_package();
    image[0] ^= 0xFF;
    let result = Package::from_storage(Cursor::new(image), "Test", PackageOptions::default());
    assert!(matches!(result, Err(Error::Format(_))));
}
