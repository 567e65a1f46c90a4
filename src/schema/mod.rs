//! Field templates: what a struct's serialized properties look like.
//!
//! The property codec never inspects script classes itself.  It asks a
//! [`SchemaResolver`] for the flattened field list of the owning struct,
//! root-most super first.  Two resolvers ship with the crate:
//!
//! * [`StaticSchema`], hand-built or loaded from JSON;
//! * [`ClassLoader`], decoded from the `Struct`/`Class` exports of real
//!   script packages.

mod field;
mod loader;

pub use field::{
    ClassInfo, Dependency, FieldBody, FieldClass, FieldRecord, FunctionInfo, PropertyExtra,
    PropertyInfo, StateInfo, StructInfo, skip_state_frame,
};
pub use loader::{ClassLoader, DirectorySource, MemorySource, PackageSource};

use std::collections::HashMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

fn one() -> u32 {
    1
}

/// One serialisable field of a struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldTemplate {
    pub name:      String,
    pub kind:      PropertyKind,
    #[serde(default = "one")]
    pub array_dim: u32,
}

impl FieldTemplate {
    pub fn new(name: impl Into<String>, kind: PropertyKind) -> Self {
        Self { name: name.into(), kind, array_dim: 1 }
    }

    pub fn with_dim(mut self, array_dim: u32) -> Self {
        self.array_dim = array_dim.max(1);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PropertyKind {
    Byte,
    Int,
    Bool,
    Float,
    Object {
        #[serde(default)]
        class: String,
    },
    Class,
    Name,
    Str,
    Array {
        inner: Box<FieldTemplate>,
    },
    /// `struct_name` is the full dotted name, e.g. `Core.Object.Vector`.
    Struct {
        struct_name: String,
    },
    Delegate,
    Map,
    FixedArray,
    Pointer,
}

impl PropertyKind {
    pub fn array_of(inner: FieldTemplate) -> Self {
        PropertyKind::Array { inner: Box::new(inner) }
    }

    pub fn struct_of(struct_name: impl Into<String>) -> Self {
        PropertyKind::Struct { struct_name: struct_name.into() }
    }
}

/// Source of flattened field lists, keyed by struct full name.
pub trait SchemaResolver {
    fn fields(&self, struct_full_name: &str) -> Result<Rc<[FieldTemplate]>>;
}

// ── StaticSchema ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StructSchema {
    #[serde(default, rename = "super")]
    pub super_name: Option<String>,
    #[serde(default)]
    pub fields:     Vec<FieldTemplate>,
}

/// Field lists declared up front.
///
/// ```
/// use upkg::schema::{FieldTemplate, PropertyKind, SchemaResolver, StaticSchema};
///
/// let mut schema = StaticSchema::default();
/// schema.insert("Engine.Actor", None, vec![FieldTemplate::new("Health", PropertyKind::Int)]);
/// schema.insert("Engine.Pawn", Some("Engine.Actor"), vec![FieldTemplate::new("Speed", PropertyKind::Float)]);
/// let fields = schema.fields("engine.pawn")?;
/// assert_eq!(fields[0].name, "Health");
/// # Ok::<(), upkg::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticSchema {
    structs: HashMap<String, StructSchema>,
}

impl StaticSchema {
    pub fn insert(&mut self, name: &str, super_name: Option<&str>, fields: Vec<FieldTemplate>) {
        self.structs.insert(
            name.to_ascii_lowercase(),
            StructSchema { super_name: super_name.map(str::to_string), fields },
        );
    }

    /// Parses `{"Pkg.Struct": {"super": "...", "fields": [...]}, ...}`.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: HashMap<String, StructSchema> =
            serde_json::from_str(json).map_err(|e| Error::Format(format!("schema json: {e}")))?;
        Ok(Self {
            structs: raw.into_iter().map(|(k, v)| (k.to_ascii_lowercase(), v)).collect(),
        })
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.structs).map_err(|e| Error::Format(e.to_string()))
    }
}

impl SchemaResolver for StaticSchema {
    fn fields(&self, struct_full_name: &str) -> Result<Rc<[FieldTemplate]>> {
        let mut chain = Vec::new();
        let mut current = Some(struct_full_name.to_string());
        while let Some(name) = current {
            let schema = self
                .structs
                .get(&name.to_ascii_lowercase())
                .ok_or_else(|| Error::ObjectNotFound(name.clone()))?;
            if chain.len() > self.structs.len() {
                return Err(Error::Format(format!("super chain of {struct_full_name} loops")));
            }
            chain.push(schema);
            current = schema.super_name.clone();
        }

        Ok(chain.iter().rev().flat_map(|s| s.fields.iter().cloned()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_schema_flattens_super_first() {
        let json = r#"{
            "Core.Object.Vector": {
                "fields": [
                    {"name": "X", "kind": {"type": "Float"}},
                    {"name": "Y", "kind": {"type": "Float"}},
                    {"name": "Z", "kind": {"type": "Float"}}
                ]
            },
            "Engine.Actor": {
                "fields": [
                    {"name": "Location", "kind": {"type": "Struct", "struct_name": "Core.Object.Vector"}},
                    {"name": "Tags", "kind": {"type": "Array", "inner": {"name": "Tags", "kind": {"type": "Name"}}}}
                ]
            },
            "Engine.Pawn": {
                "super": "Engine.Actor",
                "fields": [{"name": "Slots", "kind": {"type": "Int"}, "array_dim": 4}]
            }
        }"#;
        let schema = StaticSchema::from_json(json).unwrap();
        let fields = schema.fields("Engine.Pawn").unwrap();
        let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["Location", "Tags", "Slots"]);
        assert_eq!(fields[2].array_dim, 4);
        assert_eq!(fields[0].array_dim, 1);
    }

    #[test]
    fn missing_struct_is_reported() {
        let schema = StaticSchema::default();
        assert!(matches!(schema.fields("Engine.Nothing"), Err(Error::ObjectNotFound(_))));
    }
}
