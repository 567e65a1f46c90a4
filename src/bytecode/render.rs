//! UnrealScript-like text for decoded tokens.
//!
//! Rendering is one line per top-level token.  Object operands are shown
//! by object name, so the output is for reading rather than recompiling.

use crate::bytecode::{CallShape, NativeFunction, Token};
use crate::error::Result;
use crate::resolve::{ObjectRef, NONE_NAME};
use crate::tables::PackageTables;

/// Renders each top-level token of a script as one line.
///
/// Omitted optional arguments (`Nothing`) are dropped from the end of a
/// call's argument list.  One omitted before a supplied argument keeps its
/// position as an empty slot, so `f(a, , c)` is the rendering of
/// `f(a, Nothing, c)`.
pub fn render_tokens(tables: &PackageTables, tokens: &[Token]) -> Result<Vec<String>> {
    let renderer = Renderer { tables };
    tokens.iter().map(|t| renderer.render(t)).collect()
}

struct Renderer<'a> {
    tables: &'a PackageTables,
}

impl Renderer<'_> {
    fn object(&self, reference: ObjectRef) -> Result<String> {
        Ok(self.tables.object_name(reference)?.to_string())
    }

    fn name(&self, index: i32) -> Result<String> {
        Ok(self.tables.name(index)?.to_string())
    }

    fn render(&self, token: &Token) -> Result<String> {
        let text = match token {
            Token::LocalVariable(r) | Token::InstanceVariable(r) | Token::NativeParam(r) => self.object(*r)?,
            Token::DefaultVariable(r) => format!("Default.{}", self.object(*r)?),
            Token::Return(t) if t.is_nothing() => "return".to_string(),
            Token::Return(t) => format!("return {}", self.render(t)?),
            Token::Switch { value, .. } => format!("switch ({})", self.render(value)?),
            Token::Jump { offset } => format!("goto {offset:04x}"),
            Token::JumpIfNot { offset, condition } => {
                format!("if (!{}) goto {offset:04x}", self.render(condition)?)
            }
            Token::Stop => "stop".to_string(),
            Token::Assert { condition, .. } => format!("assert({})", self.render(condition)?),
            Token::Case { value: Some(v), .. } => format!("case {}:", self.render(v)?),
            Token::Case { value: None, .. } => "default:".to_string(),
            Token::Nothing | Token::EndFunctionParams => String::new(),
            Token::LabelTable(labels) => {
                let mut parts = Vec::with_capacity(labels.len());
                for label in labels {
                    let name = self.name(label.name)?;
                    if name.eq_ignore_ascii_case(NONE_NAME) {
                        break;
                    }
                    parts.push(format!("{name}@{:04x}", label.offset));
                }
                format!("labels {}", parts.join(", "))
            }
            Token::GotoLabel(t) => format!("goto {}", self.render(t)?),
            Token::EatString(t) | Token::BoolVariable(t) | Token::Conversion(t) => self.render(t)?,
            Token::Skip { expr, .. } => self.render(expr)?,
            Token::Let { target, value } | Token::LetBool { target, value } => {
                format!("{} = {}", self.render(target)?, self.render(value)?)
            }
            Token::DynArrayElement { index, array } | Token::ArrayElement { index, array } => {
                format!("{}[{}]", self.render(array)?, self.render(index)?)
            }
            Token::New { outer, name, flags, class } => {
                let args = self.arg_refs(&[&**outer, &**name, &**flags])?;
                let class = self.render(class)?;
                if args.is_empty() {
                    format!("new {class}")
                } else {
                    format!("new({args}) {class}")
                }
            }
            Token::ClassContext { object, member, .. } | Token::Context { object, member, .. } => {
                format!("{}.{}", self.render(object)?, self.render(member)?)
            }
            Token::Metacast { class, value } => {
                format!("class<{}>({})", self.object(*class)?, self.render(value)?)
            }
            Token::SelfObject => "self".to_string(),
            Token::VirtualFunction { name, params } => format!("{}({})", self.name(*name)?, self.args(params)?),
            Token::GlobalFunction { name, params } => {
                format!("global.{}({})", self.name(*name)?, self.args(params)?)
            }
            Token::FinalFunction { function, params } => {
                format!("{}({})", self.object(*function)?, self.args(params)?)
            }
            Token::IntConst(v) => v.to_string(),
            Token::FloatConst(v) => format!("{v:?}"),
            Token::StringConst(s) | Token::UnicodeStringConst(s) => format!("{s:?}"),
            Token::ObjectConst(r) => format!(
                "{}'{}'",
                self.tables.object_class_name(*r)?,
                self.tables.object_full_name(*r)?
            ),
            Token::NameConst(n) => format!("'{}'", self.name(*n)?),
            Token::RotatorConst { pitch, yaw, roll } => format!("rot({pitch}, {yaw}, {roll})"),
            Token::VectorConst { x, y, z } => format!("vect({x:?}, {y:?}, {z:?})"),
            Token::ByteConst(b) | Token::IntConstByte(b) => b.to_string(),
            Token::IntZero => "0".to_string(),
            Token::IntOne => "1".to_string(),
            Token::True => "true".to_string(),
            Token::False => "false".to_string(),
            Token::NoObject => "none".to_string(),
            Token::DynamicCast { class, value } => format!("{}({})", self.object(*class)?, self.render(value)?),
            Token::Iterator { expr, .. } => format!("foreach {}", self.render(expr)?),
            Token::IteratorPop => "pop iterator".to_string(),
            Token::IteratorNext => "next iterator".to_string(),
            Token::StructCmpEq { lhs, rhs, .. } => format!("{} == {}", self.render(lhs)?, self.render(rhs)?),
            Token::StructCmpNe { lhs, rhs, .. } => format!("{} != {}", self.render(lhs)?, self.render(rhs)?),
            Token::StructMember { property, expr } => {
                format!("{}.{}", self.render(expr)?, self.object(*property)?)
            }
            Token::Length(t) => format!("{}.Length", self.render(t)?),
            Token::Cast { name, operand, .. } => format!("{}({})", cast_target(name), self.render(operand)?),
            Token::Remove { array, index, count } => format!(
                "{}.Remove({}, {})",
                self.render(array)?,
                self.render(index)?,
                self.render(count)?
            ),
            Token::NativeCall { function, params } => self.native(function, params)?,
        };
        Ok(text)
    }

    /// Argument list with trailing omitted arguments dropped.  Omitted
    /// arguments in the middle keep their slot as an empty string.
    fn args(&self, params: &[Token]) -> Result<String> {
        self.arg_refs(&params.iter().collect::<Vec<_>>())
    }

    fn arg_refs(&self, params: &[&Token]) -> Result<String> {
        let used = params.iter().rposition(|p| !p.is_nothing()).map_or(0, |i| i + 1);
        let rendered = params[..used]
            .iter()
            .map(|p| self.render(p))
            .collect::<Result<Vec<_>>>()?;
        Ok(rendered.join(", "))
    }

    fn native(&self, function: &NativeFunction, params: &[Token]) -> Result<String> {
        let name = &function.name;
        match (function.shape(), params) {
            (CallShape::Prefix, [operand]) => {
                let operand = self.operand(operand)?;
                Ok(if is_word(name) { format!("{name} {operand}") } else { format!("{name}{operand}") })
            }
            (CallShape::Postfix, [operand]) => {
                let operand = self.operand(operand)?;
                Ok(if is_word(name) { format!("{operand} {name}") } else { format!("{operand}{name}") })
            }
            (CallShape::Binary, [lhs, rhs]) => {
                let lhs = self.binary_side(lhs, function.precedence, false)?;
                let rhs = self.binary_side(rhs, function.precedence, true)?;
                Ok(format!("{lhs} {name} {rhs}"))
            }
            _ => Ok(format!("{name}({})", self.args(params)?)),
        }
    }

    /// Operand of a unary operator; any binary expression is bracketed.
    fn operand(&self, token: &Token) -> Result<String> {
        let text = self.render(token)?;
        Ok(if binary_precedence(token).is_some() { format!("({text})") } else { text })
    }

    fn binary_side(&self, token: &Token, parent: u8, right: bool) -> Result<String> {
        let text = self.render(token)?;
        let wrap = match binary_precedence(token) {
            Some(child) => child > parent || (right && child == parent),
            None        => false,
        };
        Ok(if wrap { format!("({text})") } else { text })
    }
}

fn binary_precedence(token: &Token) -> Option<u8> {
    match token {
        Token::NativeCall { function, .. } if function.shape() == CallShape::Binary => {
            Some(function.precedence)
        }
        Token::Conversion(inner) => binary_precedence(inner),
        _ => None,
    }
}

fn is_word(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
}

/// `IntToString` renders as `string(...)`, `IntToINT64` as `int64(...)`.
fn cast_target(name: &str) -> String {
    name.rsplit_once("To").map_or(name, |(_, target)| target).to_ascii_lowercase()
}
