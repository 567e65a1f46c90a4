use crate::bytecode::ScriptFormat;

pub const END_FUNCTION_PARAMS: u8 = 0x16;
pub const CONVERSION:          u8 = 0x39;
pub const REMOVE:              u8 = 0x41;
pub const EXTENDED_NATIVE:     u8 = 0x60;
pub const FIRST_NATIVE:        u32 = 0x70;

/// Which of the two tables an opcode is looked up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpcodeTable {
    Main,
    Conversion,
}

impl OpcodeTable {
    pub fn label(self) -> &'static str {
        match self {
            OpcodeTable::Main       => "main",
            OpcodeTable::Conversion => "conversion",
        }
    }
}

/// Decoding rule selected by an opcode byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Op {
    LocalVariable,
    InstanceVariable,
    DefaultVariable,
    Return,
    Switch,
    Jump,
    JumpIfNot,
    Stop,
    Assert,
    Case,
    Nothing,
    LabelTable,
    GotoLabel,
    EatString,
    Let,
    DynArrayElement,
    New,
    ClassContext,
    Metacast,
    LetBool,
    EndFunctionParams,
    SelfObject,
    Skip,
    Context,
    ArrayElement,
    VirtualFunction,
    FinalFunction,
    IntConst,
    FloatConst,
    StringConst,
    ObjectConst,
    NameConst,
    RotatorConst,
    VectorConst,
    ByteConst,
    IntZero,
    IntOne,
    True,
    False,
    NativeParam,
    NoObject,
    IntConstByte,
    BoolVariable,
    DynamicCast,
    Iterator,
    IteratorPop,
    IteratorNext,
    StructCmpEq,
    StructCmpNe,
    UnicodeStringConst,
    StructMember,
    Length,
    GlobalFunction,
    Conversion,
    Remove,
    Cast,
}

// ── Casts ────────────────────────────────────────────────────────────────────

const MAIN_CASTS: &[(u8, &str)] = &[
    (0x3A, "ByteToInt"),
    (0x3B, "ByteToBool"),
    (0x3C, "ByteToFloat"),
    (0x3D, "IntToByte"),
    (0x3E, "IntToBool"),
    (0x3F, "IntToFloat"),
    (0x40, "BoolToByte"),
    (0x42, "BoolToFloat"),
    (0x43, "FloatToByte"),
    (0x44, "FloatToInt"),
    (0x45, "FloatToBool"),
    (0x4A, "StringToInt"),
    (0x4B, "StringToBool"),
    (0x4C, "StringToFloat"),
    (0x4D, "StringToVector"),
    (0x4E, "StringToRotator"),
    (0x4F, "VectorToBool"),
    (0x50, "VectorToRotator"),
    (0x51, "RotatorToBool"),
    (0x52, "ByteToString"),
    (0x53, "IntToString"),
    (0x54, "BoolToString"),
    (0x55, "FloatToString"),
    (0x56, "ObjectToString"),
    (0x57, "NameToString"),
    (0x58, "VectorToString"),
    (0x59, "RotatorToString"),
];

/// Main-table casts the legacy revision does not know.
const EXTENDED_ONLY_CASTS: &[u8] = &[0x3B, 0x42, 0x45, 0x4D, 0x4E, 0x4F, 0x51];

const LEGACY_CONVERSIONS: &[(u8, &str)] = &[(0x41, "BoolToInt")];

const EXTENDED_CONVERSIONS: &[(u8, &str)] = &[
    (0x41, "BoolToInt"),
    (0x5B, "IntToINT64"),
    (0x5C, "BoolToINT64"),
    (0x5E, "StringToINT64"),
    (0x60, "INT64ToInt"),
    (0x62, "INT64ToFloat"),
    (0x63, "INT64ToString"),
];

fn conversions(format: ScriptFormat) -> &'static [(u8, &'static str)] {
    match format {
        ScriptFormat::Legacy   => LEGACY_CONVERSIONS,
        ScriptFormat::Extended => EXTENDED_CONVERSIONS,
    }
}

fn main_cast(format: ScriptFormat, opcode: u8) -> Option<&'static str> {
    if format == ScriptFormat::Legacy && EXTENDED_ONLY_CASTS.contains(&opcode) {
        return None;
    }
    MAIN_CASTS.iter().find(|(op, _)| *op == opcode).map(|(_, name)| *name)
}

/// Name of a one-operand cast opcode in `table`, e.g. `IntToString`.
pub fn cast_name(format: ScriptFormat, table: OpcodeTable, opcode: u8) -> Option<&'static str> {
    if table == OpcodeTable::Conversion {
        if let Some((_, name)) = conversions(format).iter().find(|(op, _)| *op == opcode) {
            return Some(name);
        }
    }
    main_cast(format, opcode)
}

// ── Lookup ───────────────────────────────────────────────────────────────────

/// Resolves `opcode` in `table`.  The conversion table is the main table
/// with a few opcodes re-mapped to casts.
pub(crate) fn lookup(format: ScriptFormat, table: OpcodeTable, opcode: u8) -> Option<Op> {
    if table == OpcodeTable::Conversion && conversions(format).iter().any(|(op, _)| *op == opcode) {
        return Some(Op::Cast);
    }

    let legacy = format == ScriptFormat::Legacy;
    let op = match opcode {
        0x00 => Op::LocalVariable,
        0x01 => Op::InstanceVariable,
        0x02 => Op::DefaultVariable,
        0x04 => Op::Return,
        0x05 => Op::Switch,
        0x06 => Op::Jump,
        0x07 => Op::JumpIfNot,
        0x08 => Op::Stop,
        0x09 => Op::Assert,
        0x0A => Op::Case,
        0x0B => Op::Nothing,
        0x0C => Op::LabelTable,
        0x0D => Op::GotoLabel,
        0x0E => Op::EatString,
        0x0F => Op::Let,
        0x10 => Op::DynArrayElement,
        0x11 => Op::New,
        0x12 => Op::ClassContext,
        0x13 => Op::Metacast,
        0x14 => Op::LetBool,
        0x16 => Op::EndFunctionParams,
        0x17 => Op::SelfObject,
        0x18 => Op::Skip,
        0x19 => Op::Context,
        0x1A => Op::ArrayElement,
        0x1B => Op::VirtualFunction,
        0x1C => Op::FinalFunction,
        0x1D => Op::IntConst,
        0x1E => Op::FloatConst,
        0x1F => Op::StringConst,
        0x20 => Op::ObjectConst,
        0x21 => Op::NameConst,
        0x22 => Op::RotatorConst,
        0x23 => Op::VectorConst,
        0x24 => Op::ByteConst,
        0x25 => Op::IntZero,
        0x26 => Op::IntOne,
        0x27 => Op::True,
        0x28 => Op::False,
        0x29 => Op::NativeParam,
        0x2A => Op::NoObject,
        0x2C => Op::IntConstByte,
        0x2D => Op::BoolVariable,
        0x2E => Op::DynamicCast,
        0x2F => Op::Iterator,
        0x30 => Op::IteratorPop,
        0x31 => Op::IteratorNext,
        0x32 if !legacy => Op::StructCmpEq,
        0x33 if !legacy => Op::StructCmpNe,
        0x34 if !legacy => Op::UnicodeStringConst,
        0x36 => Op::StructMember,
        0x37 => Op::Length,
        0x38 => Op::GlobalFunction,
        CONVERSION => Op::Conversion,
        REMOVE => Op::Remove,
        other => return main_cast(format, other).map(|_| Op::Cast),
    };
    Some(op)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversion_only_opcodes() {
        let f = ScriptFormat::Extended;
        assert_eq!(lookup(f, OpcodeTable::Main, 0x5B), None);
        assert_eq!(lookup(f, OpcodeTable::Conversion, 0x5B), Some(Op::Cast));
        assert_eq!(lookup(f, OpcodeTable::Main, 0x41), Some(Op::Remove));
        assert_eq!(lookup(f, OpcodeTable::Conversion, 0x41), Some(Op::Cast));
        // the conversion table falls through to the main one
        assert_eq!(lookup(f, OpcodeTable::Conversion, 0x0F), Some(Op::Let));
        assert_eq!(cast_name(f, OpcodeTable::Conversion, 0x63), Some("INT64ToString"));
    }

    #[test]
    fn legacy_lacks_newer_opcodes() {
        let f = ScriptFormat::Legacy;
        for op in [0x32, 0x33, 0x34, 0x3B, 0x42, 0x45, 0x4D, 0x4E, 0x4F, 0x51] {
            assert_eq!(lookup(f, OpcodeTable::Main, op), None, "opcode {op:#04x}");
        }
        assert_eq!(lookup(f, OpcodeTable::Conversion, 0x5B), None);
        assert_eq!(lookup(f, OpcodeTable::Main, 0x3A), Some(Op::Cast));
        assert_eq!(cast_name(f, OpcodeTable::Conversion, 0x41), Some("BoolToInt"));
    }

    #[test]
    fn gaps_are_unassigned() {
        for op in [0x03, 0x15, 0x2B, 0x35, 0x46, 0x47, 0x48, 0x49, 0x5A] {
            assert_eq!(lookup(ScriptFormat::Extended, OpcodeTable::Main, op), None);
        }
    }
}
