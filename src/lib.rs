pub mod bytecode;
pub mod compact;
pub mod cursor;
pub mod error;
pub mod flags;
pub mod header;
pub mod package;
pub mod properties;
pub mod resolve;
pub mod schema;
pub mod tables;

pub use compact::{decode_compact_int, encode_compact_int, ReadUnrealExt, WriteUnrealExt};
pub use cursor::{DataCursor, Storage};
pub use error::{Error, Result};
pub use header::{Generation, PackageHeader};
pub use package::{Package, PackageOptions, PackageWriter};
pub use properties::{Property, PropertyCodec, PropertyType, PropertyValue};
pub use resolve::{ObjectRef, RefTarget};
pub use tables::{ExportEntry, ImportEntry, NameEntry, PackageTables};
