use crate::bytecode::NativeFunction;
use crate::resolve::ObjectRef;

/// One `LabelTable` entry.  The table ends with an entry named `None`,
/// which is kept so the table re-encodes unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label {
    pub name:   i32,
    pub offset: i32,
}

/// A decoded bytecode expression.
///
/// Object operands stay raw [`ObjectRef`]s and names stay raw name
/// indices; [`render_tokens`](crate::bytecode::render_tokens) resolves
/// them against the owning package.  Offsets (`Jump`, `Case`, `Iterator`,
/// labels) are byte positions inside the same script.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    LocalVariable(ObjectRef),
    InstanceVariable(ObjectRef),
    DefaultVariable(ObjectRef),
    Return(Box<Token>),
    Switch { size: u8, value: Box<Token> },
    Jump { offset: u16 },
    JumpIfNot { offset: u16, condition: Box<Token> },
    Stop,
    Assert { line: u16, debug: u8, condition: Box<Token> },
    /// `offset` of `0xFFFF` marks the `default:` case, which has no value.
    Case { offset: u16, value: Option<Box<Token>> },
    Nothing,
    LabelTable(Vec<Label>),
    GotoLabel(Box<Token>),
    EatString(Box<Token>),
    Let { target: Box<Token>, value: Box<Token> },
    DynArrayElement { index: Box<Token>, array: Box<Token> },
    New { outer: Box<Token>, name: Box<Token>, flags: Box<Token>, class: Box<Token> },
    ClassContext { object: Box<Token>, skip: u16, size: u8, member: Box<Token> },
    Metacast { class: ObjectRef, value: Box<Token> },
    LetBool { target: Box<Token>, value: Box<Token> },
    EndFunctionParams,
    SelfObject,
    Skip { size: u16, expr: Box<Token> },
    Context { object: Box<Token>, skip: u16, size: u8, member: Box<Token> },
    ArrayElement { index: Box<Token>, array: Box<Token> },
    VirtualFunction { name: i32, params: Vec<Token> },
    FinalFunction { function: ObjectRef, params: Vec<Token> },
    IntConst(i32),
    FloatConst(f32),
    StringConst(String),
    ObjectConst(ObjectRef),
    NameConst(i32),
    RotatorConst { pitch: i32, yaw: i32, roll: i32 },
    VectorConst { x: f32, y: f32, z: f32 },
    ByteConst(u8),
    IntZero,
    IntOne,
    True,
    False,
    NativeParam(ObjectRef),
    NoObject,
    IntConstByte(u8),
    BoolVariable(Box<Token>),
    DynamicCast { class: ObjectRef, value: Box<Token> },
    Iterator { expr: Box<Token>, end: u16 },
    IteratorPop,
    IteratorNext,
    StructCmpEq { struct_ref: ObjectRef, lhs: Box<Token>, rhs: Box<Token> },
    StructCmpNe { struct_ref: ObjectRef, lhs: Box<Token>, rhs: Box<Token> },
    UnicodeStringConst(String),
    StructMember { property: ObjectRef, expr: Box<Token> },
    Length(Box<Token>),
    GlobalFunction { name: i32, params: Vec<Token> },
    /// `0x39`: the wrapped token was decoded with the conversion table.
    Conversion(Box<Token>),
    Cast { opcode: u8, name: &'static str, operand: Box<Token> },
    Remove { array: Box<Token>, index: Box<Token>, count: Box<Token> },
    NativeCall { function: NativeFunction, params: Vec<Token> },
}

impl Token {
    /// Script offsets this token may transfer control to.
    pub fn branch_offsets(&self) -> Vec<u32> {
        match self {
            Token::Jump { offset } | Token::JumpIfNot { offset, .. } => vec![u32::from(*offset)],
            Token::Case { offset, .. } if *offset != 0xFFFF => vec![u32::from(*offset)],
            Token::Iterator { end, .. } => vec![u32::from(*end)],
            Token::LabelTable(labels) => labels
                .iter()
                .filter(|l| l.offset >= 0)
                .map(|l| l.offset as u32)
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn is_nothing(&self) -> bool {
        matches!(self, Token::Nothing)
    }
}
