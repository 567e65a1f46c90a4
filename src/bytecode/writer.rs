use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};
use encoding_rs::{Encoding, WINDOWS_1252};

use crate::bytecode::opcode::{CONVERSION, END_FUNCTION_PARAMS, EXTENDED_NATIVE, FIRST_NATIVE, REMOVE};
use crate::bytecode::{Label, Token};
use crate::compact::WriteUnrealExt;
use crate::error::{Error, Result};
use crate::resolve::ObjectRef;

/// Counterpart of the reader's budget: writes and counts in-memory size.
struct Counted<'w, W> {
    inner: &'w mut W,
    size:  u32,
}

impl<W: Write> Counted<'_, W> {
    fn u8(&mut self, v: u8) -> Result<()> {
        self.size += 1;
        Ok(self.inner.write_u8(v)?)
    }

    fn u16(&mut self, v: u16) -> Result<()> {
        self.size += 2;
        Ok(self.inner.write_u16::<LittleEndian>(v)?)
    }

    fn i32(&mut self, v: i32) -> Result<()> {
        self.size += 4;
        Ok(self.inner.write_i32::<LittleEndian>(v)?)
    }

    fn f32(&mut self, v: f32) -> Result<()> {
        self.size += 4;
        Ok(self.inner.write_f32::<LittleEndian>(v)?)
    }

    fn compact(&mut self, v: i32) -> Result<()> {
        self.size += 4;
        Ok(self.inner.write_compact_int(v)?)
    }

    fn object(&mut self, r: ObjectRef) -> Result<()> {
        self.compact(r.0)
    }
}

/// Encodes [`Token`]s back to bytecode.
pub struct ScriptWriter {
    encoding: &'static Encoding,
}

impl Default for ScriptWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptWriter {
    pub fn new() -> Self {
        Self { encoding: WINDOWS_1252 }
    }

    pub fn with_encoding(mut self, encoding: &'static Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Writes `tokens` and returns the script size to store in the struct.
    pub fn write_script<W: Write>(&self, output: &mut W, tokens: &[Token]) -> Result<u32> {
        let mut out = Counted { inner: output, size: 0 };
        for token in tokens {
            self.write_token(&mut out, token)?;
        }
        Ok(out.size)
    }

    fn write_token<W: Write>(&self, out: &mut Counted<'_, W>, token: &Token) -> Result<()> {
        match token {
            Token::LocalVariable(r)    => { out.u8(0x00)?; out.object(*r) }
            Token::InstanceVariable(r) => { out.u8(0x01)?; out.object(*r) }
            Token::DefaultVariable(r)  => { out.u8(0x02)?; out.object(*r) }
            Token::Return(t) => {
                out.u8(0x04)?;
                self.write_token(out, t)
            }
            Token::Switch { size, value } => {
                out.u8(0x05)?;
                out.u8(*size)?;
                self.write_token(out, value)
            }
            Token::Jump { offset } => { out.u8(0x06)?; out.u16(*offset) }
            Token::JumpIfNot { offset, condition } => {
                out.u8(0x07)?;
                out.u16(*offset)?;
                self.write_token(out, condition)
            }
            Token::Stop => out.u8(0x08),
            Token::Assert { line, debug, condition } => {
                out.u8(0x09)?;
                out.u16(*line)?;
                out.u8(*debug)?;
                self.write_token(out, condition)
            }
            Token::Case { offset, value } => {
                out.u8(0x0A)?;
                out.u16(*offset)?;
                match (offset, value) {
                    (0xFFFF, None)   => Ok(()),
                    (0xFFFF, Some(_)) => Err(Error::Format("default case carries a value".into())),
                    (_, Some(v))     => self.write_token(out, v),
                    (_, None)        => Err(Error::Format(format!("case {offset:#06x} has no value"))),
                }
            }
            Token::Nothing => out.u8(0x0B),
            Token::LabelTable(labels) => {
                out.u8(0x0C)?;
                for Label { name, offset } in labels {
                    out.compact(*name)?;
                    out.i32(*offset)?;
                }
                Ok(())
            }
            Token::GotoLabel(t) => { out.u8(0x0D)?; self.write_token(out, t) }
            Token::EatString(t) => { out.u8(0x0E)?; self.write_token(out, t) }
            Token::Let { target, value }     => self.write_pair(out, 0x0F, target, value),
            Token::DynArrayElement { index, array } => self.write_pair(out, 0x10, index, array),
            Token::New { outer, name, flags, class } => {
                out.u8(0x11)?;
                for t in [outer, name, flags, class] {
                    self.write_token(out, t)?;
                }
                Ok(())
            }
            Token::ClassContext { object, skip, size, member } => {
                self.write_context(out, 0x12, object, *skip, *size, member)
            }
            Token::Metacast { class, value } => {
                out.u8(0x13)?;
                out.object(*class)?;
                self.write_token(out, value)
            }
            Token::LetBool { target, value } => self.write_pair(out, 0x14, target, value),
            Token::EndFunctionParams => out.u8(END_FUNCTION_PARAMS),
            Token::SelfObject => out.u8(0x17),
            Token::Skip { size, expr } => {
                out.u8(0x18)?;
                out.u16(*size)?;
                self.write_token(out, expr)
            }
            Token::Context { object, skip, size, member } => {
                self.write_context(out, 0x19, object, *skip, *size, member)
            }
            Token::ArrayElement { index, array } => self.write_pair(out, 0x1A, index, array),
            Token::VirtualFunction { name, params } => {
                out.u8(0x1B)?;
                out.compact(*name)?;
                self.write_params(out, params)
            }
            Token::FinalFunction { function, params } => {
                out.u8(0x1C)?;
                out.object(*function)?;
                self.write_params(out, params)
            }
            Token::IntConst(v)   => { out.u8(0x1D)?; out.i32(*v) }
            Token::FloatConst(v) => { out.u8(0x1E)?; out.f32(*v) }
            Token::StringConst(s) => {
                out.u8(0x1F)?;
                let (bytes, _, _) = self.encoding.encode(s);
                for b in bytes.iter() {
                    out.u8(*b)?;
                }
                out.u8(0)
            }
            Token::ObjectConst(r) => { out.u8(0x20)?; out.object(*r) }
            Token::NameConst(n)   => { out.u8(0x21)?; out.compact(*n) }
            Token::RotatorConst { pitch, yaw, roll } => {
                out.u8(0x22)?;
                out.i32(*pitch)?;
                out.i32(*yaw)?;
                out.i32(*roll)
            }
            Token::VectorConst { x, y, z } => {
                out.u8(0x23)?;
                out.f32(*x)?;
                out.f32(*y)?;
                out.f32(*z)
            }
            Token::ByteConst(b)    => { out.u8(0x24)?; out.u8(*b) }
            Token::IntZero         => out.u8(0x25),
            Token::IntOne          => out.u8(0x26),
            Token::True            => out.u8(0x27),
            Token::False           => out.u8(0x28),
            Token::NativeParam(r)  => { out.u8(0x29)?; out.object(*r) }
            Token::NoObject        => out.u8(0x2A),
            Token::IntConstByte(b) => { out.u8(0x2C)?; out.u8(*b) }
            Token::BoolVariable(t) => { out.u8(0x2D)?; self.write_token(out, t) }
            Token::DynamicCast { class, value } => {
                out.u8(0x2E)?;
                out.object(*class)?;
                self.write_token(out, value)
            }
            Token::Iterator { expr, end } => {
                out.u8(0x2F)?;
                self.write_token(out, expr)?;
                out.u16(*end)
            }
            Token::IteratorPop  => out.u8(0x30),
            Token::IteratorNext => out.u8(0x31),
            Token::StructCmpEq { struct_ref, lhs, rhs } => {
                out.u8(0x32)?;
                out.object(*struct_ref)?;
                self.write_token(out, lhs)?;
                self.write_token(out, rhs)
            }
            Token::StructCmpNe { struct_ref, lhs, rhs } => {
                out.u8(0x33)?;
                out.object(*struct_ref)?;
                self.write_token(out, lhs)?;
                self.write_token(out, rhs)
            }
            Token::UnicodeStringConst(s) => {
                out.u8(0x34)?;
                for unit in s.encode_utf16() {
                    out.u16(unit)?;
                }
                out.u16(0)
            }
            Token::StructMember { property, expr } => {
                out.u8(0x36)?;
                out.object(*property)?;
                self.write_token(out, expr)
            }
            Token::Length(t) => { out.u8(0x37)?; self.write_token(out, t) }
            Token::GlobalFunction { name, params } => {
                out.u8(0x38)?;
                out.compact(*name)?;
                self.write_params(out, params)
            }
            Token::Conversion(t) => { out.u8(CONVERSION)?; self.write_token(out, t) }
            Token::Cast { opcode, operand, .. } => {
                out.u8(*opcode)?;
                self.write_token(out, operand)
            }
            Token::Remove { array, index, count } => {
                out.u8(REMOVE)?;
                self.write_token(out, array)?;
                self.write_token(out, index)?;
                self.write_token(out, count)
            }
            Token::NativeCall { function, params } => {
                let index = function.index;
                if index < FIRST_NATIVE || index > 0xFFF {
                    return Err(Error::Format(format!("native index {index} cannot be encoded")));
                }
                if index > 0xFF {
                    out.u8(EXTENDED_NATIVE + ((index >> 8) & 0x0F) as u8)?;
                    out.u8((index & 0xFF) as u8)?;
                } else {
                    out.u8(index as u8)?;
                }
                self.write_params(out, params)
            }
        }
    }

    fn write_pair<W: Write>(&self, out: &mut Counted<'_, W>, opcode: u8, a: &Token, b: &Token) -> Result<()> {
        out.u8(opcode)?;
        self.write_token(out, a)?;
        self.write_token(out, b)
    }

    fn write_context<W: Write>(
        &self,
        out:    &mut Counted<'_, W>,
        opcode: u8,
        object: &Token,
        skip:   u16,
        size:   u8,
        member: &Token,
    ) -> Result<()> {
        out.u8(opcode)?;
        self.write_token(out, object)?;
        out.u16(skip)?;
        out.u8(size)?;
        self.write_token(out, member)
    }

    fn write_params<W: Write>(&self, out: &mut Counted<'_, W>, params: &[Token]) -> Result<()> {
        for param in params {
            self.write_token(out, param)?;
        }
        out.u8(END_FUNCTION_PARAMS)
    }
}
