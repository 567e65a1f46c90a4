//! UnrealScript bytecode: token model, decoder, encoder and text rendering.
//!
//! # Stream shape
//! A script is a flat run of expression tokens.  Each token starts with one
//! opcode byte and then carries its own operands, which may be nested
//! tokens.  Opcodes at or above `0x60` that the active table does not claim
//! are native function calls:
//!
//! ```text
//! 0x6N xx      native (N << 8) + xx
//! 0x70..=0xFF  native with the opcode as its index
//! ```
//!
//! Every call shape ends with an `EndFunctionParams` (`0x16`) token.
//!
//! # Tables
//! Two opcode tables exist per [`ScriptFormat`].  `0x39` switches to the
//! conversion table while the token right after it is decoded, then the
//! main table is active again.

mod native;
mod opcode;
mod reader;
mod render;
mod token;
mod writer;

pub use native::{AnyNative, CallShape, HardcodedNatives, NativeFunction, NativeMap, NativeTable};
pub use opcode::{cast_name, OpcodeTable, CONVERSION, END_FUNCTION_PARAMS, EXTENDED_NATIVE, FIRST_NATIVE};
pub use reader::ScriptReader;
pub use render::render_tokens;
pub use token::{Label, Token};
pub use writer::ScriptWriter;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Opcode table revision used by a package's scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptFormat {
    /// Older client builds: fewer casts, `0x39` only re-maps `0x41`.
    Legacy,
    /// Builds with struct comparison and 64-bit integer conversions.
    #[default]
    Extended,
}

impl fmt::Display for ScriptFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ScriptFormat::Legacy   => "legacy",
            ScriptFormat::Extended => "extended",
        })
    }
}

impl FromStr for ScriptFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "legacy"   => Ok(ScriptFormat::Legacy),
            "extended" => Ok(ScriptFormat::Extended),
            other      => Err(format!("unknown script format '{other}'")),
        }
    }
}
