use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Format error: {0}")]
    Format(String),
    #[error("Unexpected end of stream")]
    TruncatedStream,
    #[error("Unknown opcode {opcode:#04x} in {table} table")]
    UnknownOpcode { opcode: u8, table: &'static str },
    #[error("Unknown native function {0}")]
    UnknownNative(u32),
    #[error("Unknown property type {0}")]
    UnknownPropertyType(u8),
    #[error("Unknown field class {0}")]
    UnknownFieldClass(String),
    #[error("Property {property} has no template in {scope}")]
    SchemaMismatch { property: String, scope: String },
    #[error("{table} index {index} out of range (len {len})")]
    OutOfRange { table: &'static str, index: i64, len: usize },
    #[error("Name not found: {0}")]
    NameNotFound(String),
    #[error("Object not found: {0}")]
    ObjectNotFound(String),
    #[error("No export carries data")]
    EmptyDataBlock,
    #[error("Package is opened read-only")]
    ReadOnly,
    #[error("IO error: {0}")]
    Io(io::Error),
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::UnexpectedEof => Error::TruncatedStream,
            _ => Error::Io(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

pub(crate) fn format_err(msg: impl Into<String>) -> Error {
    Error::Format(msg.into())
}
