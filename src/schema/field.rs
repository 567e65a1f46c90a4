//! Decoded field records.
//!
//! A script type is stored as a chain of exports: each struct points at its
//! first child field, each field at its next sibling, and each struct at its
//! super struct.  Records here keep those links as plain [`ObjectRef`]s; a
//! loader follows them through the export table.
//!
//! On-disk order, per class of field:
//!
//! ```text
//! object   [stack frame if HasStack] [property list unless a Class]
//! Field    super next
//! Struct   script_text child friendly_name cpp_text line text_pos script_size <script>
//! Function native_index:u16 precedence:u8 flags:u32 [replication_offset:u16 if Net]
//! State    probe_mask:u64 ignore_mask:u64 label_table_offset:u16 state_flags:u32
//! Class    flags:u32 guid:16 deps imports within config hide_categories <defaults>
//! Property array_dim:u16 element_size:u16 flags:u32 category [rep_offset:u16 if Net] <extras>
//! Enum     count names...
//! Const    string
//! ```

use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt};
use encoding_rs::Encoding;
use uuid::Uuid;

use crate::bytecode::{AnyNative, ScriptFormat, ScriptReader};
use crate::compact::ReadUnrealExt;
use crate::error::{Error, Result};
use crate::flags::{function, object, property};
use crate::properties::PropertyCodec;
use crate::resolve::ObjectRef;
use crate::schema::SchemaResolver;
use crate::tables::PackageTables;

/// Export class of a field, taken from the class's short name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldClass {
    ByteProperty,
    IntProperty,
    BoolProperty,
    FloatProperty,
    ObjectProperty,
    ClassProperty,
    NameProperty,
    StrProperty,
    StringProperty,
    ArrayProperty,
    StructProperty,
    DelegateProperty,
    MapProperty,
    FixedArrayProperty,
    PointerProperty,
    Struct,
    Function,
    State,
    Class,
    Enum,
    Const,
}

impl FieldClass {
    pub fn from_class_name(name: &str) -> Result<Self> {
        use FieldClass::*;
        let class = match name {
            "ByteProperty"       => ByteProperty,
            "IntProperty"        => IntProperty,
            "BoolProperty"       => BoolProperty,
            "FloatProperty"      => FloatProperty,
            "ObjectProperty"     => ObjectProperty,
            "ClassProperty"      => ClassProperty,
            "NameProperty"       => NameProperty,
            "StrProperty"        => StrProperty,
            "StringProperty"     => StringProperty,
            "ArrayProperty"      => ArrayProperty,
            "StructProperty"     => StructProperty,
            "DelegateProperty"   => DelegateProperty,
            "MapProperty"        => MapProperty,
            "FixedArrayProperty" => FixedArrayProperty,
            "PointerProperty"    => PointerProperty,
            "Struct"             => Struct,
            "Function"           => Function,
            "State"              => State,
            "Class"              => Class,
            "Enum"               => Enum,
            "Const"              => Const,
            other => return Err(Error::UnknownFieldClass(other.to_string())),
        };
        Ok(class)
    }

    pub fn is_property(self) -> bool {
        !matches!(
            self,
            FieldClass::Struct
                | FieldClass::Function
                | FieldClass::State
                | FieldClass::Class
                | FieldClass::Enum
                | FieldClass::Const
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyExtra {
    None,
    Byte { enum_type: ObjectRef },
    Object { object_type: ObjectRef },
    Class { object_type: ObjectRef, meta_class: ObjectRef },
    Array { inner: ObjectRef },
    Struct { struct_type: ObjectRef },
    Delegate { function: ObjectRef },
    Map { key: ObjectRef, value: ObjectRef },
    FixedArray { inner: ObjectRef, count: i32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyInfo {
    pub array_dim:          u16,
    pub element_size:       u16,
    pub flags:              u32,
    pub category:           i32,
    pub replication_offset: Option<u16>,
    pub extra:              PropertyExtra,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructInfo {
    pub script_text:   ObjectRef,
    pub child:         ObjectRef,
    pub friendly_name: i32,
    pub cpp_text:      ObjectRef,
    pub line:          i32,
    pub text_pos:      i32,
    /// In-memory size of the script, the budget for the bytecode decoder.
    pub script_size:   i32,
    /// Byte range of the serialized script inside the export payload.
    pub script_range:  std::ops::Range<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionInfo {
    pub native_index:        u16,
    pub operator_precedence: u8,
    pub function_flags:      u32,
    pub replication_offset:  Option<u16>,
}

impl FunctionInfo {
    pub fn is_native(&self) -> bool {
        self.function_flags & function::NATIVE != 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateInfo {
    pub probe_mask:         u64,
    pub ignore_mask:        u64,
    pub label_table_offset: u16,
    pub state_flags:        u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub class:           ObjectRef,
    pub deep:            i32,
    pub script_text_crc: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassInfo {
    pub class_flags:     u32,
    pub guid:            Uuid,
    pub dependencies:    Vec<Dependency>,
    pub package_imports: Vec<i32>,
    pub class_within:    ObjectRef,
    pub config_name:     i32,
    pub hide_categories: Vec<i32>,
    /// Start of the default property list inside the export payload.
    pub defaults_offset: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldBody {
    Property(PropertyInfo),
    Struct(StructInfo),
    Function(StructInfo, FunctionInfo),
    State(StructInfo, StateInfo),
    Class(StructInfo, StateInfo, ClassInfo),
    Enum(Vec<i32>),
    Const(String),
}

/// One decoded field export.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRecord {
    pub export:      usize,
    pub name:        String,
    pub class:       FieldClass,
    pub super_field: ObjectRef,
    pub next:        ObjectRef,
    pub body:        FieldBody,
}

impl FieldRecord {
    pub fn struct_info(&self) -> Option<&StructInfo> {
        match &self.body {
            FieldBody::Struct(s)
            | FieldBody::Function(s, _)
            | FieldBody::State(s, _)
            | FieldBody::Class(s, _, _) => Some(s),
            _ => None,
        }
    }

    pub fn property_info(&self) -> Option<&PropertyInfo> {
        match &self.body {
            FieldBody::Property(p) => Some(p),
            _ => None,
        }
    }

    pub fn function_info(&self) -> Option<&FunctionInfo> {
        match &self.body {
            FieldBody::Function(_, f) => Some(f),
            _ => None,
        }
    }

    /// Decodes export `index` of `tables` from its payload `data`.
    pub fn decode(
        tables:   &PackageTables,
        index:    usize,
        data:     &[u8],
        schema:   &dyn SchemaResolver,
        encoding: &'static Encoding,
        format:   ScriptFormat,
    ) -> Result<Self> {
        let export = *tables.export(index)?;
        let reference = ObjectRef::from_export(index);
        let class = FieldClass::from_class_name(&tables.object_class_name(reference)?)?;
        let name = tables.name(export.object_name)?.to_string();

        let mut input = Cursor::new(data);

        if export.flags & object::HAS_STACK != 0 {
            skip_state_frame(&mut input)?;
        }
        if class != FieldClass::Class {
            let scope = tables.object_class_full_name(reference)?;
            PropertyCodec::new(tables, schema)
                .with_encoding(encoding)
                .read_properties(&mut input, &scope)?;
        }

        let super_field = ObjectRef(input.read_compact_int()?);
        let next        = ObjectRef(input.read_compact_int()?);

        let body = match class {
            FieldClass::Enum => {
                let count = input.read_compact_int()?;
                let mut names = Vec::with_capacity(count.clamp(0, 256) as usize);
                for _ in 0..count {
                    names.push(input.read_compact_int()?);
                }
                FieldBody::Enum(names)
            }
            FieldClass::Const => FieldBody::Const(input.read_string(encoding)?),
            FieldClass::Struct => {
                FieldBody::Struct(read_struct(&mut input, tables, encoding, format)?)
            }
            FieldClass::Function => {
                let s = read_struct(&mut input, tables, encoding, format)?;
                let native_index        = input.read_u16::<LittleEndian>()?;
                let operator_precedence = input.read_u8()?;
                let function_flags      = input.read_u32::<LittleEndian>()?;
                let replication_offset  = if function_flags & function::NET != 0 {
                    Some(input.read_u16::<LittleEndian>()?)
                } else {
                    None
                };
                FieldBody::Function(s, FunctionInfo {
                    native_index,
                    operator_precedence,
                    function_flags,
                    replication_offset,
                })
            }
            FieldClass::State => {
                let s = read_struct(&mut input, tables, encoding, format)?;
                FieldBody::State(s, read_state(&mut input)?)
            }
            FieldClass::Class => {
                let s  = read_struct(&mut input, tables, encoding, format)?;
                let st = read_state(&mut input)?;
                FieldBody::Class(s, st, read_class(&mut input)?)
            }
            _ => FieldBody::Property(read_property(&mut input, class)?),
        };

        Ok(Self { export: index, name, class, super_field, next, body })
    }
}

/// Skips the state frame that precedes the properties of objects flagged
/// `HAS_STACK`.
pub fn skip_state_frame<R: Read>(input: &mut R) -> Result<()> {
    input.read_compact_int()?; // node
    input.read_compact_int()?; // state node
    input.read_u64::<LittleEndian>()?; // probe mask
    input.read_i32::<LittleEndian>()?; // latent action
    input.read_compact_int()?; // offset
    Ok(())
}

fn read_struct(
    input:    &mut Cursor<&[u8]>,
    tables:   &PackageTables,
    encoding: &'static Encoding,
    format:   ScriptFormat,
) -> Result<StructInfo> {
    let script_text   = ObjectRef(input.read_compact_int()?);
    let child         = ObjectRef(input.read_compact_int()?);
    let friendly_name = input.read_compact_int()?;
    let cpp_text      = ObjectRef(input.read_compact_int()?);
    let line          = input.read_i32::<LittleEndian>()?;
    let text_pos      = input.read_i32::<LittleEndian>()?;
    let script_size   = input.read_i32::<LittleEndian>()?;

    // The serialized length differs from `script_size`; walk the tokens to
    // find where the script ends.
    let start = input.position() as usize;
    if script_size > 0 {
        ScriptReader::new(tables, &AnyNative, format)
            .with_encoding(encoding)
            .read_script(input, script_size as u32)?;
    }
    let end = input.position() as usize;

    Ok(StructInfo {
        script_text,
        child,
        friendly_name,
        cpp_text,
        line,
        text_pos,
        script_size,
        script_range: start..end,
    })
}

fn read_state<R: Read>(input: &mut R) -> Result<StateInfo> {
    Ok(StateInfo {
        probe_mask:         input.read_u64::<LittleEndian>()?,
        ignore_mask:        input.read_u64::<LittleEndian>()?,
        label_table_offset: input.read_u16::<LittleEndian>()?,
        state_flags:        input.read_u32::<LittleEndian>()?,
    })
}

fn read_compact_list<R: Read>(input: &mut R) -> Result<Vec<i32>> {
    let count = input.read_compact_int()?;
    let mut items = Vec::with_capacity(count.clamp(0, 256) as usize);
    for _ in 0..count {
        items.push(input.read_compact_int()?);
    }
    Ok(items)
}

fn read_class(input: &mut Cursor<&[u8]>) -> Result<ClassInfo> {
    let class_flags = input.read_u32::<LittleEndian>()?;
    let mut guid = [0u8; 16];
    input.read_exact(&mut guid)?;

    let dep_count = input.read_compact_int()?;
    let mut dependencies = Vec::with_capacity(dep_count.clamp(0, 256) as usize);
    for _ in 0..dep_count {
        dependencies.push(Dependency {
            class:           ObjectRef(input.read_compact_int()?),
            deep:            input.read_i32::<LittleEndian>()?,
            script_text_crc: input.read_i32::<LittleEndian>()?,
        });
    }

    let package_imports = read_compact_list(input)?;
    let class_within    = ObjectRef(input.read_compact_int()?);
    let config_name     = input.read_compact_int()?;
    let hide_categories = read_compact_list(input)?;

    Ok(ClassInfo {
        class_flags,
        guid: Uuid::from_bytes(guid),
        dependencies,
        package_imports,
        class_within,
        config_name,
        hide_categories,
        defaults_offset: input.position() as usize,
    })
}

fn read_property<R: Read>(input: &mut R, class: FieldClass) -> Result<PropertyInfo> {
    let array_dim    = input.read_u16::<LittleEndian>()?;
    let element_size = input.read_u16::<LittleEndian>()?;
    let flags        = input.read_u32::<LittleEndian>()?;
    let category     = input.read_compact_int()?;
    let replication_offset = if flags & property::NET != 0 {
        Some(input.read_u16::<LittleEndian>()?)
    } else {
        None
    };

    let mut next_ref = || -> Result<ObjectRef> { Ok(ObjectRef(input.read_compact_int()?)) };
    let extra = match class {
        FieldClass::ByteProperty     => PropertyExtra::Byte { enum_type: next_ref()? },
        FieldClass::ObjectProperty   => PropertyExtra::Object { object_type: next_ref()? },
        FieldClass::ClassProperty    => PropertyExtra::Class {
            object_type: next_ref()?,
            meta_class:  next_ref()?,
        },
        FieldClass::ArrayProperty    => PropertyExtra::Array { inner: next_ref()? },
        FieldClass::StructProperty   => PropertyExtra::Struct { struct_type: next_ref()? },
        FieldClass::DelegateProperty => PropertyExtra::Delegate { function: next_ref()? },
        FieldClass::MapProperty      => PropertyExtra::Map { key: next_ref()?, value: next_ref()? },
        FieldClass::FixedArrayProperty => {
            let inner = next_ref()?;
            PropertyExtra::FixedArray { inner, count: next_ref()?.0 }
        }
        _ => PropertyExtra::None,
    };

    Ok(PropertyInfo { array_dim, element_size, flags, category, replication_offset, extra })
}
