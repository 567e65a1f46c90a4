//! Tagged property lists.
//!
//! # Record layout
//! ```text
//! name        compact name index; "None" ends the list
//! info        u8: type (bits 0-3) | size class (bits 4-6) | array flag (bit 7)
//! struct      compact name index, STRUCT records only
//! size        u8/u16/i32 for size classes 5/6/7; classes 0-4 are 1/2/4/12/16
//! index       compact slot index, when the array flag is set on a non-BOOL
//! payload     `size` bytes
//! ```
//!
//! A BOOL record has no payload and no slot index: its array flag is the
//! value.  Arrays carry no element type; elements are decoded by the
//! property's template from the [`SchemaResolver`].

use std::io::{Read, Write};
use std::rc::Rc;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use encoding_rs::{Encoding, WINDOWS_1252};
use log::trace;
use serde::Serialize;

use crate::compact::{ReadUnrealExt, WriteUnrealExt};
use crate::error::{Error, Result};
use crate::resolve::{ObjectRef, NONE_NAME};
use crate::schema::{FieldTemplate, PropertyKind, SchemaResolver};
use crate::tables::PackageTables;

const ARRAY_FLAG: u8 = 0x80;
const FIXED_SIZES: [usize; 5] = [1, 2, 4, 12, 16];
/// Deepest struct or array nesting accepted while reading.
const MAX_NESTING: usize = 64;

// ── PropertyType ─────────────────────────────────────────────────────────────

/// Type tag in the low four bits of the info byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum PropertyType {
    None       = 0,
    Byte       = 1,
    Int        = 2,
    Bool       = 3,
    Float      = 4,
    Object     = 5,
    Name       = 6,
    String     = 7,
    Class      = 8,
    Array      = 9,
    Struct     = 10,
    Vector     = 11,
    Rotator    = 12,
    Str        = 13,
    Map        = 14,
    FixedArray = 15,
}

impl PropertyType {
    pub fn from_tag(tag: u8) -> Self {
        use PropertyType::*;
        match tag & 0x0F {
            0  => None,
            1  => Byte,
            2  => Int,
            3  => Bool,
            4  => Float,
            5  => Object,
            6  => Name,
            7  => String,
            8  => Class,
            9  => Array,
            10 => Struct,
            11 => Vector,
            12 => Rotator,
            13 => Str,
            14 => Map,
            _  => FixedArray,
        }
    }

    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Whether a record tagged `self` can fill a template written as
    /// `expected`.  Class references are objects on disk.
    pub fn accepts(self, expected: PropertyType) -> bool {
        match (self, expected) {
            (PropertyType::Object | PropertyType::Class, PropertyType::Object | PropertyType::Class) => true,
            (a, b) => a == b,
        }
    }

    /// Tag written for a template kind.  Class references are stored as
    /// objects.
    pub fn for_kind(kind: &PropertyKind) -> Result<Self> {
        Ok(match kind {
            PropertyKind::Byte          => PropertyType::Byte,
            PropertyKind::Int           => PropertyType::Int,
            PropertyKind::Bool          => PropertyType::Bool,
            PropertyKind::Float         => PropertyType::Float,
            PropertyKind::Object { .. } => PropertyType::Object,
            PropertyKind::Class         => PropertyType::Object,
            PropertyKind::Name          => PropertyType::Name,
            PropertyKind::Str           => PropertyType::Str,
            PropertyKind::Array { .. }  => PropertyType::Array,
            PropertyKind::Struct { .. } => PropertyType::Struct,
            PropertyKind::Map           => PropertyType::Map,
            PropertyKind::FixedArray    => PropertyType::FixedArray,
            PropertyKind::Delegate | PropertyKind::Pointer => {
                return Err(Error::Format(format!("{kind:?} properties are not serialised")))
            }
        })
    }
}

fn size_class(len: usize) -> u8 {
    match FIXED_SIZES.iter().position(|&s| s == len) {
        Some(class) => class as u8,
        None if len <= 0xFF => 5,
        None if len <= 0xFFFF => 6,
        None => 7,
    }
}

// ── Values ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value")]
pub enum PropertyValue {
    Byte(u8),
    Int(i32),
    Bool(bool),
    Float(f32),
    Object(ObjectRef),
    Name(i32),
    Str(String),
    Array(Vec<PropertyValue>),
    Vector { x: f32, y: f32, z: f32 },
    Rotator { pitch: i32, yaw: i32, roll: i32 },
    /// Stored as B, G, R, A.
    Color { b: u8, g: u8, r: u8, a: u8 },
    Struct(Vec<Property>),
}

/// One named property with a value per static array slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Property {
    pub name:     String,
    pub template: FieldTemplate,
    pub values:   Vec<Option<PropertyValue>>,
}

impl Property {
    pub fn new(template: FieldTemplate) -> Self {
        let slots = template.array_dim.max(1) as usize;
        Self { name: template.name.clone(), template, values: vec![None; slots] }
    }

    pub fn with_value(template: FieldTemplate, value: PropertyValue) -> Self {
        let mut property = Self::new(template);
        property.values[0] = Some(value);
        property
    }

    pub fn get(&self, slot: usize) -> Option<&PropertyValue> {
        self.values.get(slot).and_then(Option::as_ref)
    }

    /// Sets `slot`, which must lie within the template's array dimension.
    pub fn set(&mut self, slot: usize, value: PropertyValue) -> Result<()> {
        let len = self.values.len();
        let entry = self.values.get_mut(slot).ok_or(Error::OutOfRange {
            table: "slot",
            index: slot as i64,
            len,
        })?;
        *entry = Some(value);
        Ok(())
    }
}

/// Short struct names with a fixed binary layout.
fn builtin_struct(name: &str) -> Option<&'static str> {
    let short = name.rsplit('.').next().unwrap_or(name);
    ["Vector", "Rotator", "Color"].into_iter().find(|b| *b == short)
}

// ── PropertyCodec ────────────────────────────────────────────────────────────

/// Reads and writes property lists of one package.
pub struct PropertyCodec<'a> {
    tables:   &'a PackageTables,
    schema:   &'a dyn SchemaResolver,
    encoding: &'static Encoding,
}

impl<'a> PropertyCodec<'a> {
    pub fn new(tables: &'a PackageTables, schema: &'a dyn SchemaResolver) -> Self {
        Self { tables, schema, encoding: WINDOWS_1252 }
    }

    pub fn with_encoding(mut self, encoding: &'static Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Reads records until `None`.  `scope` is the full name of the struct
    /// or class that owns the list; its fields are only looked up once a
    /// record needs them.
    pub fn read_properties<R: Read>(&self, input: &mut R, scope: &str) -> Result<Vec<Property>> {
        self.read_list(input, scope, 0)
    }

    fn read_list<R: Read>(&self, input: &mut R, scope: &str, depth: usize) -> Result<Vec<Property>> {
        if depth > MAX_NESTING {
            return Err(Error::Format(format!("properties of {scope} nested too deep")));
        }
        let mut fields: Option<Rc<[FieldTemplate]>> = None;
        let mut properties: Vec<Property> = Vec::new();

        loop {
            let name = self.tables.name(input.read_compact_int()?)?.to_string();
            if name.eq_ignore_ascii_case(NONE_NAME) {
                return Ok(properties);
            }

            let info = input.read_u8()?;
            let ty = PropertyType::from_tag(info);
            let array = info & ARRAY_FLAG != 0;
            let struct_name = if ty == PropertyType::Struct {
                Some(self.tables.name(input.read_compact_int()?)?.to_string())
            } else {
                None
            };
            let size = match (info >> 4) & 0x07 {
                class @ 0..=4 => FIXED_SIZES[class as usize],
                5 => input.read_u8()? as usize,
                6 => input.read_u16::<LittleEndian>()? as usize,
                _ => input.read_i32::<LittleEndian>()?.max(0) as usize,
            };
            let slot = if array && ty != PropertyType::Bool {
                i64::from(input.read_compact_int()?)
            } else {
                0
            };
            let payload = input.read_byte_vec(size)?;
            trace!("{scope}.{name}: {ty:?} size={size} slot={slot}");

            let position = match properties.iter().position(|p| p.name.eq_ignore_ascii_case(&name)) {
                Some(i) => i,
                None => {
                    if fields.is_none() {
                        fields = Some(self.schema.fields(scope)?);
                    }
                    let template = fields
                        .iter()
                        .flat_map(|f| f.iter())
                        .find(|f| f.name.eq_ignore_ascii_case(&name))
                        .ok_or_else(|| Error::SchemaMismatch { property: name.clone(), scope: scope.to_string() })?;
                    properties.push(Property::new(template.clone()));
                    properties.len() - 1
                }
            };

            let property = &mut properties[position];
            if !ty.accepts(PropertyType::for_kind(&property.template.kind)?) {
                return Err(self.mismatch(&property.template, scope));
            }
            let slots = property.values.len();
            let slot = usize::try_from(slot)
                .ok()
                .filter(|&s| s < slots)
                .ok_or(Error::OutOfRange { table: "slot", index: slot, len: slots })?;

            let value = self.read_value(
                &mut payload.as_slice(),
                ty,
                array,
                struct_name.as_deref(),
                &property.template,
                scope,
                depth,
            )?;
            property.set(slot, value)?;
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn read_value(
        &self,
        payload:     &mut &[u8],
        ty:          PropertyType,
        array:       bool,
        struct_name: Option<&str>,
        template:    &FieldTemplate,
        scope:       &str,
        depth:       usize,
    ) -> Result<PropertyValue> {
        let value = match ty {
            PropertyType::Byte   => PropertyValue::Byte(payload.read_u8()?),
            PropertyType::Int    => PropertyValue::Int(payload.read_i32::<LittleEndian>()?),
            PropertyType::Bool   => PropertyValue::Bool(array),
            PropertyType::Float  => PropertyValue::Float(payload.read_f32::<LittleEndian>()?),
            PropertyType::Object | PropertyType::Class => {
                PropertyValue::Object(ObjectRef(payload.read_compact_int()?))
            }
            PropertyType::Name   => PropertyValue::Name(payload.read_compact_int()?),
            PropertyType::Str    => PropertyValue::Str(payload.read_string(self.encoding)?),
            PropertyType::Array => {
                let PropertyKind::Array { inner } = &template.kind else {
                    return Err(self.mismatch(template, scope));
                };
                let count = payload.read_compact_int()?;
                let mut elements = Vec::with_capacity(count.clamp(0, 1024) as usize);
                for _ in 0..count {
                    elements.push(self.read_element(payload, &inner.kind, depth + 1)?);
                }
                PropertyValue::Array(elements)
            }
            PropertyType::Struct => {
                let tagged = struct_name.unwrap_or_default();
                if builtin_struct(tagged) == Some(tagged) {
                    self.read_builtin_struct(payload, tagged)?
                } else {
                    let PropertyKind::Struct { struct_name } = &template.kind else {
                        return Err(self.mismatch(template, scope));
                    };
                    PropertyValue::Struct(self.read_list(payload, struct_name, depth + 1)?)
                }
            }
            other => return Err(Error::UnknownPropertyType(other.tag())),
        };
        Ok(value)
    }

    /// One array element, typed by the array's inner template.
    fn read_element(&self, input: &mut &[u8], kind: &PropertyKind, depth: usize) -> Result<PropertyValue> {
        if depth > MAX_NESTING {
            return Err(Error::Format("array elements nested too deep".into()));
        }
        let value = match kind {
            PropertyKind::Byte => PropertyValue::Byte(input.read_u8()?),
            PropertyKind::Int => PropertyValue::Int(input.read_i32::<LittleEndian>()?),
            PropertyKind::Bool => PropertyValue::Bool(input.read_u8()? != 0),
            PropertyKind::Float => PropertyValue::Float(input.read_f32::<LittleEndian>()?),
            PropertyKind::Object { .. } | PropertyKind::Class => {
                PropertyValue::Object(ObjectRef(input.read_compact_int()?))
            }
            PropertyKind::Name => PropertyValue::Name(input.read_compact_int()?),
            PropertyKind::Str => PropertyValue::Str(input.read_string(self.encoding)?),
            PropertyKind::Array { inner } => {
                let count = input.read_compact_int()?;
                let mut elements = Vec::with_capacity(count.clamp(0, 1024) as usize);
                for _ in 0..count {
                    elements.push(self.read_element(input, &inner.kind, depth + 1)?);
                }
                PropertyValue::Array(elements)
            }
            PropertyKind::Struct { struct_name } => match builtin_struct(struct_name) {
                Some(builtin) => self.read_builtin_struct(input, builtin)?,
                None => PropertyValue::Struct(self.read_list(input, struct_name, depth + 1)?),
            },
            other => return Err(Error::UnknownPropertyType(PropertyType::for_kind(other)?.tag())),
        };
        Ok(value)
    }

    fn read_builtin_struct(&self, input: &mut &[u8], name: &str) -> Result<PropertyValue> {
        Ok(match name {
            "Vector" => PropertyValue::Vector {
                x: input.read_f32::<LittleEndian>()?,
                y: input.read_f32::<LittleEndian>()?,
                z: input.read_f32::<LittleEndian>()?,
            },
            "Rotator" => PropertyValue::Rotator {
                pitch: input.read_i32::<LittleEndian>()?,
                yaw:   input.read_i32::<LittleEndian>()?,
                roll:  input.read_i32::<LittleEndian>()?,
            },
            _ => PropertyValue::Color {
                b: input.read_u8()?,
                g: input.read_u8()?,
                r: input.read_u8()?,
                a: input.read_u8()?,
            },
        })
    }

    fn mismatch(&self, template: &FieldTemplate, scope: &str) -> Error {
        Error::SchemaMismatch { property: template.name.clone(), scope: scope.to_string() }
    }

    // ── Writing ──────────────────────────────────────────────────────────────

    /// Writes every set slot of `properties`, then the `None` terminator.
    /// All property and struct names must already be in the name table.
    pub fn write_properties<W: Write>(&self, output: &mut W, properties: &[Property]) -> Result<()> {
        for property in properties {
            let ty = PropertyType::for_kind(&property.template.kind)?;
            let name = self.tables.require_name_index(&property.name)?;

            for (slot, value) in property.values.iter().enumerate() {
                let Some(value) = value else { continue };

                let mut payload = Vec::new();
                self.write_value(&mut payload, &property.template.kind, value)?;

                let array = match (ty, value) {
                    (PropertyType::Bool, PropertyValue::Bool(b)) => *b,
                    _ => slot > 0,
                };
                let class = size_class(payload.len());
                let info = ty.tag() | (class << 4) | if array { ARRAY_FLAG } else { 0 };

                output.write_compact_int(name)?;
                output.write_u8(info)?;
                if let PropertyKind::Struct { struct_name } = &property.template.kind {
                    let short = struct_name.rsplit('.').next().unwrap_or(struct_name);
                    output.write_compact_int(self.tables.require_name_index(short)?)?;
                }
                match class {
                    5 => output.write_u8(payload.len() as u8)?,
                    6 => output.write_u16::<LittleEndian>(payload.len() as u16)?,
                    7 => output.write_i32::<LittleEndian>(payload.len() as i32)?,
                    _ => {}
                }
                if ty != PropertyType::Bool && slot > 0 {
                    output.write_compact_int(slot as i32)?;
                }
                output.write_all(&payload)?;
            }
        }
        output.write_compact_int(self.tables.require_name_index(NONE_NAME)?)?;
        Ok(())
    }

    fn write_value<W: Write>(&self, out: &mut W, kind: &PropertyKind, value: &PropertyValue) -> Result<()> {
        match (kind, value) {
            (PropertyKind::Byte, PropertyValue::Byte(v))  => out.write_u8(*v)?,
            (PropertyKind::Int, PropertyValue::Int(v))    => out.write_i32::<LittleEndian>(*v)?,
            (PropertyKind::Bool, PropertyValue::Bool(_))  => {}
            (PropertyKind::Float, PropertyValue::Float(v)) => out.write_f32::<LittleEndian>(*v)?,
            (PropertyKind::Object { .. } | PropertyKind::Class, PropertyValue::Object(r)) => {
                out.write_compact_int(r.0)?
            }
            (PropertyKind::Name, PropertyValue::Name(n)) => out.write_compact_int(*n)?,
            (PropertyKind::Str, PropertyValue::Str(s))   => out.write_string(s, self.encoding)?,
            (PropertyKind::Array { inner }, PropertyValue::Array(elements)) => {
                out.write_compact_int(elements.len() as i32)?;
                for element in elements {
                    self.write_element(out, &inner.kind, element)?;
                }
            }
            (PropertyKind::Struct { .. }, PropertyValue::Vector { x, y, z }) => {
                out.write_f32::<LittleEndian>(*x)?;
                out.write_f32::<LittleEndian>(*y)?;
                out.write_f32::<LittleEndian>(*z)?;
            }
            (PropertyKind::Struct { .. }, PropertyValue::Rotator { pitch, yaw, roll }) => {
                out.write_i32::<LittleEndian>(*pitch)?;
                out.write_i32::<LittleEndian>(*yaw)?;
                out.write_i32::<LittleEndian>(*roll)?;
            }
            (PropertyKind::Struct { .. }, PropertyValue::Color { b, g, r, a }) => {
                out.write_all(&[*b, *g, *r, *a])?;
            }
            (PropertyKind::Struct { .. }, PropertyValue::Struct(fields)) => {
                self.write_properties(out, fields)?;
            }
            (PropertyKind::Map, _) | (PropertyKind::FixedArray, _) => {
                return Err(Error::UnknownPropertyType(PropertyType::for_kind(kind)?.tag()));
            }
            (kind, value) => {
                return Err(Error::Format(format!("{value:?} does not fit a {kind:?} property")));
            }
        }
        Ok(())
    }

    fn write_element<W: Write>(&self, out: &mut W, kind: &PropertyKind, value: &PropertyValue) -> Result<()> {
        match (kind, value) {
            (PropertyKind::Bool, PropertyValue::Bool(b)) => Ok(out.write_u8(u8::from(*b))?),
            _ => self.write_value(out, kind, value),
        }
    }
}
