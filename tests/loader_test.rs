use std::io::Cursor;

use byteorder::{LittleEndian, WriteBytesExt};
use upkg::bytecode::NativeTable;
use upkg::flags::function;
use upkg::schema::{ClassLoader, FieldClass, MemorySource, PropertyKind, SchemaResolver};
use upkg::{Error, ExportEntry, ImportEntry, ObjectRef, PackageOptions, PackageWriter, PropertyValue, WriteUnrealExt};

// name indices
const NONE:    i32 = 0;
const HEALTH:  i32 = 8;
const SPEED:   i32 = 9;
const TOUCH:   i32 = 11;

// export references
const BASE_REF:   i32 = 1;
const HEALTH_REF: i32 = 2;
const SPEED_REF:  i32 = 4;
const TOUCH_REF:  i32 = 5;

const TOUCH_NATIVE: u16 = 512;

/// `None` terminated property list followed by super and next.
fn field_head(out: &mut Vec<u8>, super_field: i32, next: i32) {
    out.write_compact_int(NONE).unwrap();
    out.write_compact_int(super_field).unwrap();
    out.write_compact_int(next).unwrap();
}

fn struct_body(out: &mut Vec<u8>, child: i32, friendly_name: i32, script: &[u8], script_size: i32) {
    out.write_compact_int(0).unwrap(); // script text
    out.write_compact_int(child).unwrap();
    out.write_compact_int(friendly_name).unwrap();
    out.write_compact_int(0).unwrap(); // cpp text
    out.write_i32::<LittleEndian>(0).unwrap(); // line
    out.write_i32::<LittleEndian>(0).unwrap(); // text pos
    out.write_i32::<LittleEndian>(script_size).unwrap();
    out.extend_from_slice(script);
}

fn class_payload(super_field: i32, child: i32, friendly_name: i32, defaults: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    // classes carry no property list before super/next
    out.write_compact_int(super_field).unwrap();
    out.write_compact_int(0).unwrap();
    struct_body(&mut out, child, friendly_name, &[], 0);
    out.write_u64::<LittleEndian>(0).unwrap(); // probe mask
    out.write_u64::<LittleEndian>(0).unwrap(); // ignore mask
    out.write_u16::<LittleEndian>(0).unwrap(); // label table
    out.write_u32::<LittleEndian>(0).unwrap(); // state flags
    out.write_u32::<LittleEndian>(0).unwrap(); // class flags
    out.extend_from_slice(&[0u8; 16]); // guid
    out.write_compact_int(0).unwrap(); // dependencies
    out.write_compact_int(0).unwrap(); // package imports
    out.write_compact_int(0).unwrap(); // class within
    out.write_compact_int(NONE).unwrap(); // config name
    out.write_compact_int(0).unwrap(); // hide categories
    out.extend_from_slice(defaults);
    out
}

fn property_payload(next: i32) -> Vec<u8> {
    let mut out = Vec::new();
    field_head(&mut out, 0, next);
    out.write_u16::<LittleEndian>(1).unwrap(); // array dim
    out.write_u16::<LittleEndian>(4).unwrap(); // element size
    out.write_u32::<LittleEndian>(0).unwrap(); // flags
    out.write_compact_int(NONE).unwrap(); // category
    out
}

/// Touch(); Enable(); return
const TOUCH_SCRIPT: &[u8] = &[0x62, 0x00, 0x16, 0x75, 0x16, 0x04, 0x0B];

fn function_payload() -> Vec<u8> {
    let mut out = Vec::new();
    field_head(&mut out, 0, 0);
    struct_body(&mut out, 0, TOUCH, TOUCH_SCRIPT, TOUCH_SCRIPT.len() as i32);
    out.write_u16::<LittleEndian>(TOUCH_NATIVE).unwrap();
    out.write_u8(0).unwrap(); // precedence
    out.write_u32::<LittleEndian>(function::NATIVE | function::FINAL).unwrap();
    out
}

/// `Game` script package: `Base` with an int `Health`, and `Thing`
/// extending it with a float `Speed` and a native `Touch`.
fn game_package() -> Vec<u8> {
    let mut w = PackageWriter::new(123, 0);
    for name in [
        "None", "Core", "Class", "IntProperty", "Function", "Game", "Base", "Thing", "Health", "Speed",
        "FloatProperty", "Touch", "Package",
    ] {
        w.name(name, 0);
    }

    let core = w.add_import(ImportEntry { class_package: 1, class_name: 12, outer: ObjectRef::NONE, object_name: 1 });
    let class_import = |object_name| ImportEntry { class_package: 1, class_name: 2, outer: core, object_name };
    let int_property   = w.add_import(class_import(3));
    let float_property = w.add_import(class_import(10));
    let function_class = w.add_import(class_import(4));

    let export = |class, super_ref, outer, object_name| ExportEntry {
        class,
        super_ref,
        outer,
        object_name,
        flags: 0,
        size: 0,
        offset: 0,
    };

    let mut base_defaults = Vec::new();
    base_defaults.write_compact_int(HEALTH).unwrap();
    base_defaults.extend_from_slice(&[0x22, 100, 0, 0, 0]);
    base_defaults.write_compact_int(NONE).unwrap();

    let mut thing_defaults = Vec::new();
    thing_defaults.write_compact_int(HEALTH).unwrap();
    thing_defaults.extend_from_slice(&[0x22, 5, 0, 0, 0]);
    thing_defaults.write_compact_int(SPEED).unwrap();
    thing_defaults.write_u8(0x24).unwrap();
    thing_defaults.write_f32::<LittleEndian>(1.5).unwrap();
    thing_defaults.write_compact_int(NONE).unwrap();

    let base = ObjectRef(BASE_REF);
    let thing = ObjectRef(3);
    w.add_export(export(ObjectRef::NONE, ObjectRef::NONE, ObjectRef::NONE, 6), class_payload(0, HEALTH_REF, 6, &base_defaults));
    w.add_export(export(int_property, ObjectRef::NONE, base, HEALTH), property_payload(0));
    w.add_export(export(ObjectRef::NONE, base, ObjectRef::NONE, 7), class_payload(BASE_REF, SPEED_REF, 7, &thing_defaults));
    w.add_export(export(float_property, ObjectRef::NONE, thing, SPEED), property_payload(TOUCH_REF));
    w.add_export(export(function_class, ObjectRef::NONE, thing, TOUCH), function_payload());

    w.finish(Cursor::new(Vec::new()), &PackageOptions::default()).unwrap().into_inner()
}

fn loader() -> ClassLoader<MemorySource> {
    let mut source = MemorySource::new();
    source.insert("Game", game_package());
    ClassLoader::new(source).with_native_packages(["Game"])
}

#[test]
fn test_field_records() {
    let loader = loader();
    let thing = loader.field("Game.Thing").unwrap();
    assert_eq!(thing.class, FieldClass::Class);
    assert_eq!(thing.name, "Thing");

    let speed = loader.field("game.thing.speed").unwrap();
    assert_eq!(speed.class, FieldClass::FloatProperty);
    assert_eq!(speed.property_info().unwrap().element_size, 4);

    let touch = loader.field("Game.Thing.Touch").unwrap();
    let info = touch.function_info().unwrap();
    assert!(info.is_native());
    assert_eq!(info.native_index, TOUCH_NATIVE);
}

#[test]
fn test_class_hierarchy() {
    let loader = loader();
    assert_eq!(loader.super_class("Game.Thing").unwrap().as_deref(), Some("Game.Base"));
    assert_eq!(loader.super_class("Game.Base").unwrap(), None);
    assert!(loader.is_subclass("Game.Thing", "Game.Base").unwrap());
    assert!(!loader.is_subclass("Game.Base", "Game.Thing").unwrap());
}

#[test]
fn test_flattened_fields_skip_functions() {
    let loader = loader();
    let fields = loader.fields("Game.Thing").unwrap();
    let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, ["Health", "Speed"]);
    assert_eq!(fields[0].kind, PropertyKind::Int);
    assert_eq!(fields[1].kind, PropertyKind::Float);
}

#[test]
fn test_class_defaults() {
    let loader = loader();

    let base = loader.class_defaults("Game.Base").unwrap();
    assert_eq!(base.len(), 1);
    assert_eq!(base[0].get(0), Some(&PropertyValue::Int(100)));

    let thing = loader.class_defaults("Game.Thing").unwrap();
    assert_eq!(thing.len(), 2);
    assert_eq!(thing[0].name, "Health");
    assert_eq!(thing[0].get(0), Some(&PropertyValue::Int(5)));
    assert_eq!(thing[1].get(0), Some(&PropertyValue::Float(1.5)));
}

#[test]
fn test_natives_and_disassembly() {
    let loader = loader();
    assert_eq!(loader.native(u32::from(TOUCH_NATIVE)).unwrap().name, "Touch");
    // misses fall back to the built-in table
    assert_eq!(loader.native(0x75).unwrap().name, "Enable");

    let lines = loader.disassemble("Game.Thing.Touch").unwrap();
    assert_eq!(lines, ["Touch()", "Enable()", "return"]);
}

#[test]
fn test_missing_objects() {
    let loader = loader();
    assert!(matches!(loader.field("Engine.Actor"), Err(Error::ObjectNotFound(_))));
    assert!(matches!(loader.field("Game.Nothing"), Err(Error::ObjectNotFound(_))));
    assert!(loader.class_defaults("Game.Thing.Speed").is_err());
}
