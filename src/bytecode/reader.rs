use std::io::Read;

use byteorder::{LittleEndian, ReadBytesExt};
use encoding_rs::{Encoding, WINDOWS_1252};
use log::{trace, warn};

use crate::bytecode::opcode::{self, lookup, Op, OpcodeTable};
use crate::bytecode::{CallShape, Label, NativeTable, ScriptFormat, Token};
use crate::compact::ReadUnrealExt;
use crate::error::{Error, Result};
use crate::resolve::{ObjectRef, NONE_NAME};
use crate::tables::PackageTables;

/// Deepest expression nesting accepted in one statement.
const MAX_NESTING: usize = 128;

/// Reader that tracks the in-memory size of everything it consumed.
///
/// Script sizes count loaded sizes, not serialized ones: a compact index
/// takes four bytes in memory whatever its encoded length.
struct Budget<'r, R> {
    inner: &'r mut R,
    used:  u32,
    depth: usize,
}

impl<R: Read> Budget<'_, R> {
    fn u8(&mut self) -> Result<u8> {
        self.used += 1;
        Ok(self.inner.read_u8()?)
    }

    fn u16(&mut self) -> Result<u16> {
        self.used += 2;
        Ok(self.inner.read_u16::<LittleEndian>()?)
    }

    fn i32(&mut self) -> Result<i32> {
        self.used += 4;
        Ok(self.inner.read_i32::<LittleEndian>()?)
    }

    fn f32(&mut self) -> Result<f32> {
        self.used += 4;
        Ok(self.inner.read_f32::<LittleEndian>()?)
    }

    fn compact(&mut self) -> Result<i32> {
        self.used += 4;
        Ok(self.inner.read_compact_int()?)
    }

    fn object(&mut self) -> Result<ObjectRef> {
        self.compact().map(ObjectRef)
    }

    fn cstring(&mut self, encoding: &'static Encoding) -> Result<String> {
        let mut bytes = Vec::new();
        loop {
            match self.u8()? {
                0 => break,
                b => bytes.push(b),
            }
        }
        let (text, had_errors) = encoding.decode_without_bom_handling(&bytes);
        if had_errors {
            warn!("replaced undecodable bytes in string constant {:02x?}", bytes);
        }
        Ok(text.into_owned())
    }

    fn wide_cstring(&mut self) -> Result<String> {
        let mut units = Vec::new();
        loop {
            match self.u16()? {
                0 => break,
                u => units.push(u),
            }
        }
        String::from_utf16(&units).map_err(|e| Error::Format(format!("unicode string constant: {e}")))
    }
}

/// Decodes script bytecode into [`Token`]s.
///
/// `tables` supplies the index of `None`, which ends a label table.
pub struct ScriptReader<'a> {
    tables:   &'a PackageTables,
    natives:  &'a dyn NativeTable,
    format:   ScriptFormat,
    encoding: &'static Encoding,
}

impl<'a> ScriptReader<'a> {
    pub fn new(tables: &'a PackageTables, natives: &'a dyn NativeTable, format: ScriptFormat) -> Self {
        Self { tables, natives, format, encoding: WINDOWS_1252 }
    }

    pub fn with_encoding(mut self, encoding: &'static Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Reads tokens until `script_size` bytes of in-memory script are used.
    pub fn read_script<R: Read>(&self, input: &mut R, script_size: u32) -> Result<Vec<Token>> {
        let mut budget = Budget { inner: input, used: 0, depth: 0 };
        let mut tokens = Vec::new();
        while budget.used < script_size {
            let token = self.read_token(&mut budget, OpcodeTable::Main)?;
            trace!("{:>5}/{} {:?}", budget.used, script_size, token);
            tokens.push(token);
        }
        Ok(tokens)
    }

    fn read_token<R: Read>(&self, input: &mut Budget<'_, R>, table: OpcodeTable) -> Result<Token> {
        if input.depth >= MAX_NESTING {
            return Err(Error::Format(format!("expression nesting deeper than {MAX_NESTING}")));
        }
        input.depth += 1;
        let token = self.read_opcode(input, table);
        input.depth -= 1;
        token
    }

    fn read_opcode<R: Read>(&self, input: &mut Budget<'_, R>, table: OpcodeTable) -> Result<Token> {
        let opcode = input.u8()?;
        let op = match lookup(self.format, table, opcode) {
            Some(op) => op,
            None if opcode >= opcode::EXTENDED_NATIVE => return self.read_native(input, table, opcode),
            None => return Err(Error::UnknownOpcode { opcode, table: table.label() }),
        };

        let mut next = |input: &mut Budget<'_, R>| self.read_token(input, table).map(Box::new);

        let token = match op {
            Op::LocalVariable    => Token::LocalVariable(input.object()?),
            Op::InstanceVariable => Token::InstanceVariable(input.object()?),
            Op::DefaultVariable  => Token::DefaultVariable(input.object()?),
            Op::Return           => Token::Return(next(input)?),
            Op::Switch => {
                let size = input.u8()?;
                Token::Switch { size, value: next(input)? }
            }
            Op::Jump => Token::Jump { offset: input.u16()? },
            Op::JumpIfNot => {
                let offset = input.u16()?;
                Token::JumpIfNot { offset, condition: next(input)? }
            }
            Op::Stop => Token::Stop,
            Op::Assert => {
                let line  = input.u16()?;
                let debug = input.u8()?;
                Token::Assert { line, debug, condition: next(input)? }
            }
            Op::Case => {
                let offset = input.u16()?;
                let value = if offset != 0xFFFF { Some(next(input)?) } else { None };
                Token::Case { offset, value }
            }
            Op::Nothing    => Token::Nothing,
            Op::LabelTable => Token::LabelTable(self.read_labels(input)?),
            Op::GotoLabel  => Token::GotoLabel(next(input)?),
            Op::EatString  => Token::EatString(next(input)?),
            Op::Let => {
                let target = next(input)?;
                Token::Let { target, value: next(input)? }
            }
            Op::LetBool => {
                let target = next(input)?;
                Token::LetBool { target, value: next(input)? }
            }
            Op::DynArrayElement => {
                let index = next(input)?;
                Token::DynArrayElement { index, array: next(input)? }
            }
            Op::ArrayElement => {
                let index = next(input)?;
                Token::ArrayElement { index, array: next(input)? }
            }
            Op::New => {
                let outer = next(input)?;
                let name  = next(input)?;
                let flags = next(input)?;
                Token::New { outer, name, flags, class: next(input)? }
            }
            Op::ClassContext | Op::Context => {
                let object = next(input)?;
                let skip   = input.u16()?;
                let size   = input.u8()?;
                let member = next(input)?;
                if op == Op::Context {
                    Token::Context { object, skip, size, member }
                } else {
                    Token::ClassContext { object, skip, size, member }
                }
            }
            Op::Metacast => {
                let class = input.object()?;
                Token::Metacast { class, value: next(input)? }
            }
            Op::EndFunctionParams => Token::EndFunctionParams,
            Op::SelfObject        => Token::SelfObject,
            Op::Skip => {
                let size = input.u16()?;
                Token::Skip { size, expr: next(input)? }
            }
            Op::VirtualFunction => {
                let name = input.compact()?;
                Token::VirtualFunction { name, params: self.read_params(input, table)? }
            }
            Op::FinalFunction => {
                let function = input.object()?;
                Token::FinalFunction { function, params: self.read_params(input, table)? }
            }
            Op::GlobalFunction => {
                let name = input.compact()?;
                Token::GlobalFunction { name, params: self.read_params(input, table)? }
            }
            Op::IntConst     => Token::IntConst(input.i32()?),
            Op::FloatConst   => Token::FloatConst(input.f32()?),
            Op::StringConst  => Token::StringConst(input.cstring(self.encoding)?),
            Op::ObjectConst  => Token::ObjectConst(input.object()?),
            Op::NameConst    => Token::NameConst(input.compact()?),
            Op::RotatorConst => Token::RotatorConst {
                pitch: input.i32()?,
                yaw:   input.i32()?,
                roll:  input.i32()?,
            },
            Op::VectorConst => Token::VectorConst {
                x: input.f32()?,
                y: input.f32()?,
                z: input.f32()?,
            },
            Op::ByteConst    => Token::ByteConst(input.u8()?),
            Op::IntZero      => Token::IntZero,
            Op::IntOne       => Token::IntOne,
            Op::True         => Token::True,
            Op::False        => Token::False,
            Op::NativeParam  => Token::NativeParam(input.object()?),
            Op::NoObject     => Token::NoObject,
            Op::IntConstByte => Token::IntConstByte(input.u8()?),
            Op::BoolVariable => Token::BoolVariable(next(input)?),
            Op::DynamicCast => {
                let class = input.object()?;
                Token::DynamicCast { class, value: next(input)? }
            }
            Op::Iterator => {
                let expr = next(input)?;
                Token::Iterator { expr, end: input.u16()? }
            }
            Op::IteratorPop  => Token::IteratorPop,
            Op::IteratorNext => Token::IteratorNext,
            Op::StructCmpEq | Op::StructCmpNe => {
                let struct_ref = input.object()?;
                let lhs = next(input)?;
                let rhs = next(input)?;
                if op == Op::StructCmpEq {
                    Token::StructCmpEq { struct_ref, lhs, rhs }
                } else {
                    Token::StructCmpNe { struct_ref, lhs, rhs }
                }
            }
            Op::UnicodeStringConst => Token::UnicodeStringConst(input.wide_cstring()?),
            Op::StructMember => {
                let property = input.object()?;
                Token::StructMember { property, expr: next(input)? }
            }
            Op::Length => Token::Length(next(input)?),
            Op::Conversion => {
                Token::Conversion(Box::new(self.read_token(input, OpcodeTable::Conversion)?))
            }
            Op::Remove => {
                let array = next(input)?;
                let index = next(input)?;
                Token::Remove { array, index, count: next(input)? }
            }
            Op::Cast => {
                let name = opcode::cast_name(self.format, table, opcode)
                    .ok_or(Error::UnknownOpcode { opcode, table: table.label() })?;
                Token::Cast { opcode, name, operand: next(input)? }
            }
        };
        Ok(token)
    }

    fn read_native<R: Read>(&self, input: &mut Budget<'_, R>, table: OpcodeTable, first: u8) -> Result<Token> {
        let index = if first & 0xF0 == opcode::EXTENDED_NATIVE {
            (u32::from(first - opcode::EXTENDED_NATIVE) << 8) + u32::from(input.u8()?)
        } else {
            u32::from(first)
        };
        if index < opcode::FIRST_NATIVE {
            return Err(Error::Format(format!("invalid native index {index} (opcode {first:#04x})")));
        }

        let function = self.natives.native(index)?;
        let params = match function.shape() {
            CallShape::Prefix | CallShape::Postfix => {
                let operand = self.read_token(input, table)?;
                self.expect_end(input, table, &function.name)?;
                vec![operand]
            }
            CallShape::Binary => {
                let lhs = self.read_token(input, table)?;
                let rhs = self.read_token(input, table)?;
                self.expect_end(input, table, &function.name)?;
                vec![lhs, rhs]
            }
            CallShape::Call => self.read_params(input, table)?,
        };
        Ok(Token::NativeCall { function, params })
    }

    fn expect_end<R: Read>(&self, input: &mut Budget<'_, R>, table: OpcodeTable, name: &str) -> Result<()> {
        match self.read_token(input, table)? {
            Token::EndFunctionParams => Ok(()),
            other => Err(Error::Format(format!(
                "native {name}: expected end of function params, found {other:?}"
            ))),
        }
    }

    /// Arguments up to and excluding `EndFunctionParams`.
    fn read_params<R: Read>(&self, input: &mut Budget<'_, R>, table: OpcodeTable) -> Result<Vec<Token>> {
        let mut params = Vec::new();
        loop {
            match self.read_token(input, table)? {
                Token::EndFunctionParams => return Ok(params),
                token => params.push(token),
            }
        }
    }

    fn read_labels<R: Read>(&self, input: &mut Budget<'_, R>) -> Result<Vec<Label>> {
        let none = self.tables.name_index(NONE_NAME).map(|i| i as i32);
        let mut labels = Vec::new();
        loop {
            let name   = input.compact()?;
            let offset = input.i32()?;
            labels.push(Label { name, offset });
            if Some(name) == none {
                return Ok(labels);
            }
            if none.is_none() {
                return Err(Error::NameNotFound(NONE_NAME.to_string()));
            }
        }
    }
}
