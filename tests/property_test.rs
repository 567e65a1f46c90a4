use upkg::schema::{FieldTemplate, PropertyKind, StaticSchema};
use upkg::{encode_compact_int, Error, NameEntry, ObjectRef, PackageTables, Property, PropertyCodec, PropertyValue};

fn tables() -> PackageTables {
    let names = ["None", "Health", "Bytes", "Location", "Vector", "Inner", "Label", "Tint", "Color", "Target", "Slots", "Node"]
        .into_iter()
        .map(|n| NameEntry::new(n, 0))
        .collect();
    PackageTables::new("Test", names, Vec::new(), Vec::new())
}

fn schema() -> StaticSchema {
    let mut schema = StaticSchema::default();
    schema.insert("Test.Inner", None, vec![
        FieldTemplate::new("Label", PropertyKind::Str),
    ]);
    schema.insert("Test.Base", None, vec![
        FieldTemplate::new("Health", PropertyKind::Int),
    ]);
    schema.insert("Test.Thing", Some("Test.Base"), vec![
        FieldTemplate::new("Bytes", PropertyKind::array_of(FieldTemplate::new("Bytes", PropertyKind::Byte))),
        FieldTemplate::new("Location", PropertyKind::struct_of("Core.Object.Vector")),
        FieldTemplate::new("Inner", PropertyKind::struct_of("Test.Inner")),
        FieldTemplate::new("Tint", PropertyKind::struct_of("Core.Object.Color")),
        FieldTemplate::new("Target", PropertyKind::Object { class: "Engine.Actor".into() }),
        FieldTemplate::new("Slots", PropertyKind::Int).with_dim(3),
    ]);
    schema.insert("Test.Node", None, vec![
        FieldTemplate::new("Inner", PropertyKind::struct_of("Test.Node")),
    ]);
    schema
}

fn template(schema: &StaticSchema, name: &str) -> FieldTemplate {
    use upkg::schema::SchemaResolver;
    schema
        .fields("Test.Thing")
        .unwrap()
        .iter()
        .find(|f| f.name == name)
        .unwrap()
        .clone()
}

#[test]
fn test_int_array_and_vector() {
    let t = tables();
    let schema = schema();
    let codec = PropertyCodec::new(&t, &schema);

    let props = vec![
        Property::with_value(template(&schema, "Health"), PropertyValue::Int(100)),
        Property::with_value(
            template(&schema, "Bytes"),
            PropertyValue::Array(vec![PropertyValue::Byte(1), PropertyValue::Byte(2), PropertyValue::Byte(3)]),
        ),
        Property::with_value(
            template(&schema, "Location"),
            PropertyValue::Vector { x: 1.0, y: -2.5, z: 64.0 },
        ),
    ];

    let mut bytes = Vec::new();
    codec.write_properties(&mut bytes, &props).unwrap();

    // Health: name 1, INT with size class 2 (4 bytes)
    assert_eq!(&bytes[..6], &[0x01, 0x22, 100, 0, 0, 0]);
    // Bytes: name 2, ARRAY whose 4-byte payload (count + 3 elements) fits class 2
    assert_eq!(&bytes[6..12], &[0x02, 0x29, 0x03, 1, 2, 3]);
    // Location: name 3, STRUCT with size class 3 (12 bytes), struct name "Vector"
    assert_eq!(&bytes[12..15], &[0x03, 0x3A, 0x04]);
    assert_eq!(bytes.len(), 15 + 12 + 1);
    assert_eq!(*bytes.last().unwrap(), 0x00);

    let back = codec.read_properties(&mut bytes.as_slice(), "Test.Thing").unwrap();
    assert_eq!(back, props);
}

#[test]
fn test_nested_struct_color_and_object() {
    let t = tables();
    let schema = schema();
    let codec = PropertyCodec::new(&t, &schema);

    let inner_template = FieldTemplate::new("Label", PropertyKind::Str);
    let props = vec![
        Property::with_value(
            template(&schema, "Inner"),
            PropertyValue::Struct(vec![Property::with_value(inner_template, PropertyValue::Str("boss".into()))]),
        ),
        Property::with_value(
            template(&schema, "Tint"),
            PropertyValue::Color { b: 10, g: 20, r: 30, a: 255 },
        ),
        Property::with_value(template(&schema, "Target"), PropertyValue::Object(ObjectRef(-3))),
    ];

    let mut bytes = Vec::new();
    codec.write_properties(&mut bytes, &props).unwrap();
    let back = codec.read_properties(&mut bytes.as_slice(), "Test.Thing").unwrap();
    assert_eq!(back, props);
}

#[test]
fn test_missing_name_fails_write() {
    let t = PackageTables::new("Test", vec![NameEntry::new("None", 0)], Vec::new(), Vec::new());
    let schema = schema();
    let codec = PropertyCodec::new(&t, &schema);
    let props = [Property::with_value(template(&schema, "Health"), PropertyValue::Int(1))];
    let mut bytes = Vec::new();
    assert!(matches!(
        codec.write_properties(&mut bytes, &props),
        Err(Error::NameNotFound(n)) if n == "Health"
    ));
}

#[test]
fn test_truncated_payload() {
    let t = tables();
    let schema = schema();
    let codec = PropertyCodec::new(&t, &schema);
    // INT record that claims 4 bytes but has 2
    let bytes = [0x01, 0x22, 0x10, 0x00];
    assert!(codec.read_properties(&mut &bytes[..], "Test.Thing").is_err());
}

#[test]
fn test_static_array_slots() {
    let t = tables();
    let schema = schema();
    let codec = PropertyCodec::new(&t, &schema);

    let mut slots = Property::new(template(&schema, "Slots"));
    assert_eq!(slots.values.len(), 3);
    slots.set(0, PropertyValue::Int(7)).unwrap();
    slots.set(2, PropertyValue::Int(9)).unwrap();

    let mut bytes = Vec::new();
    codec.write_properties(&mut bytes, std::slice::from_ref(&slots)).unwrap();
    // slot 0 has no index; slot 2 sets the array flag and carries one
    assert_eq!(bytes, [10, 0x22, 7, 0, 0, 0, 10, 0xA2, 0x02, 9, 0, 0, 0, 0x00]);

    let back = codec.read_properties(&mut bytes.as_slice(), "Test.Thing").unwrap();
    assert_eq!(back, vec![slots]);
    assert_eq!(back[0].get(1), None);
}

#[test]
fn test_slot_beyond_array_dim() {
    let t = tables();
    let schema = schema();
    let codec = PropertyCodec::new(&t, &schema);

    for slot in [3, 200_000_000, -1] {
        let mut bytes = vec![10, 0xA2];
        bytes.extend_from_slice(encode_compact_int(slot).as_slice());
        bytes.extend_from_slice(&[7, 0, 0, 0, 0x00]);
        assert!(
            matches!(
                codec.read_properties(&mut bytes.as_slice(), "Test.Thing"),
                Err(Error::OutOfRange { table: "slot", len: 3, .. })
            ),
            "slot {slot}"
        );
    }

    // a scalar property only has slot 0
    let bytes = [0x01, 0xA2, 0x01, 7, 0, 0, 0, 0x00];
    assert!(matches!(
        codec.read_properties(&mut &bytes[..], "Test.Thing"),
        Err(Error::OutOfRange { len: 1, .. })
    ));
}

#[test]
fn test_record_type_must_match_template() {
    let t = tables();
    let schema = schema();
    let codec = PropertyCodec::new(&t, &schema);

    // FLOAT record for the INT property Health
    let mut bytes = vec![0x01, 0x24];
    bytes.extend_from_slice(&1.5f32.to_le_bytes());
    bytes.push(0x00);
    assert!(matches!(
        codec.read_properties(&mut bytes.as_slice(), "Test.Thing"),
        Err(Error::SchemaMismatch { property, .. }) if property == "Health"
    ));

    // INT record for the Vector struct Location
    let bytes = [0x03, 0x22, 7, 0, 0, 0, 0x00];
    assert!(matches!(
        codec.read_properties(&mut &bytes[..], "Test.Thing"),
        Err(Error::SchemaMismatch { .. })
    ));

    // class references are stored as objects either way
    let bytes = [9, 0x08, 0x83, 0x00];
    let back = codec.read_properties(&mut &bytes[..], "Test.Thing").unwrap();
    assert_eq!(back[0].get(0), Some(&PropertyValue::Object(ObjectRef(-3))));
}

#[test]
fn test_oversized_payload_length() {
    let t = tables();
    let schema = schema();
    let codec = PropertyCodec::new(&t, &schema);
    // STRUCT record claiming i32::MAX payload bytes
    let mut bytes = vec![0x05, 0x7A, 0x05];
    bytes.extend_from_slice(&i32::MAX.to_le_bytes());
    bytes.push(0x00);
    assert!(matches!(
        codec.read_properties(&mut bytes.as_slice(), "Test.Thing"),
        Err(Error::TruncatedStream)
    ));
}

#[test]
fn test_deeply_nested_structs() {
    let t = tables();
    let schema = schema();
    let codec = PropertyCodec::new(&t, &schema);

    // Node { Inner: Node { Inner: ... } }, each level a size class 7 record
    let nest = |levels: usize| {
        let mut list = vec![0x00];
        for _ in 0..levels {
            let mut outer = vec![0x05, 0x7A, 0x0B];
            outer.extend_from_slice(&(list.len() as i32).to_le_bytes());
            outer.extend_from_slice(&list);
            outer.push(0x00);
            list = outer;
        }
        list
    };

    let shallow = nest(8);
    let mut props = codec.read_properties(&mut shallow.as_slice(), "Test.Node").unwrap();
    for _ in 0..7 {
        let Some(PropertyValue::Struct(inner)) = props[0].get(0).cloned() else {
            panic!("expected nested struct");
        };
        props = inner;
    }

    let deep = nest(1000);
    assert!(matches!(
        codec.read_properties(&mut deep.as_slice(), "Test.Node"),
        Err(Error::Format(_))
    ));
}
