//! Text rendering of the lowered IR.
//!
//! The format is stable and line-oriented, in the spirit of MIR dumps:
//!
//! ```text
//! module Mod
//!
//! type Point {
//!     variant _classVariant { x: i32, y: i32 }
//! }
//!
//! fn Point__Sum(_param0 (this): *Point) -> i32 {
//!     let _returnValue: i32;
//!
//!     bb0: {
//!         _returnValue = (*_param0).x + (*_param0).y;
//!         goto -> bb1;
//!     }
//!
//!     bb1: {
//!         return;
//!     }
//! }
//! ```
//!
//! Fields read through a variant other than `_classVariant` are written
//! `(place as Variant).field`.

use std::fmt;

use kelp_ir::{Name, StringInterner};

use crate::ir::{
    Assign, BasicBlock, Body, Callee, ConcreteType, Constant, DataType, FunctionRef, Local,
    LoweredModule, LoweredType, Method, MethodLocal, Operand, Place, Rvalue, StaticField,
    Terminator, Variant,
};

const INDENT: &str = "    ";

/// Display adapter resolving interned names.
pub struct Pretty<'a, T: ?Sized> {
    value: &'a T,
    interner: &'a StringInterner,
}

/// Wrap `value` for display.
pub fn pretty<'a, T: ?Sized>(value: &'a T, interner: &'a StringInterner) -> Pretty<'a, T> {
    Pretty { value, interner }
}

/// Render a whole module.
pub fn module(module: &LoweredModule, interner: &StringInterner) -> String {
    pretty(module, interner).to_string()
}

/// Render one method.
pub fn method(method: &Method, interner: &StringInterner) -> String {
    pretty(method, interner).to_string()
}

impl<'a, T: ?Sized> Pretty<'a, T> {
    fn name(&self, name: Name) -> &'a str {
        self.interner.lookup_static(name)
    }

    fn with<U: ?Sized>(&self, value: &'a U) -> Pretty<'a, U> {
        Pretty {
            value,
            interner: self.interner,
        }
    }
}

fn comma_list<'a, T>(
    f: &mut fmt::Formatter<'_>,
    items: &'a [T],
    interner: &'a StringInterner,
) -> fmt::Result
where
    Pretty<'a, T>: fmt::Display,
{
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", pretty(item, interner))?;
    }
    Ok(())
}

fn type_args<'a>(
    f: &mut fmt::Formatter<'_>,
    args: &'a [LoweredType],
    interner: &'a StringInterner,
) -> fmt::Result {
    if args.is_empty() {
        return Ok(());
    }
    f.write_str("<")?;
    comma_list(f, args, interner)?;
    f.write_str(">")
}

// ── Declarations ────────────────────────────────────────────────────

impl fmt::Display for Pretty<'_, LoweredModule> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "module {}", self.name(self.value.id))?;
        for data_type in &self.value.data_types {
            writeln!(f)?;
            write!(f, "{}", self.with(data_type))?;
        }
        for method in &self.value.methods {
            writeln!(f)?;
            write!(f, "{}", self.with(method))?;
        }
        Ok(())
    }
}

impl fmt::Display for Pretty<'_, DataType> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ty = self.value;
        write!(f, "type {}", self.name(ty.name))?;
        if !ty.type_params.is_empty() {
            let params: Vec<&str> = ty.type_params.iter().map(|p| self.name(p.name)).collect();
            write!(f, "<{}>", params.join(", "))?;
        }
        writeln!(f, " {{")?;
        for variant in &ty.variants {
            writeln!(f, "{INDENT}{}", self.with(variant))?;
        }
        for field in &ty.static_fields {
            write!(f, "{}", self.with(field))?;
        }
        writeln!(f, "}}")
    }
}

impl fmt::Display for Pretty<'_, Variant> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "variant {}", self.name(self.value.name))?;
        if self.value.fields.is_empty() {
            return Ok(());
        }
        f.write_str(" { ")?;
        for (i, field) in self.value.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", self.name(field.name), self.with(&field.ty))?;
        }
        f.write_str(" }")
    }
}

impl fmt::Display for Pretty<'_, StaticField> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let field = self.value;
        writeln!(
            f,
            "{INDENT}static {}: {} = {{",
            self.name(field.name),
            self.with(&field.ty)
        )?;
        write_body(f, &field.body, self.interner, 2)?;
        writeln!(f, "{INDENT}}}")
    }
}

impl fmt::Display for Pretty<'_, Method> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let method = self.value;
        write!(f, "fn {}", self.name(method.name))?;
        if !method.type_params.is_empty() {
            let params: Vec<&str> = method
                .type_params
                .iter()
                .map(|p| self.name(p.name))
                .collect();
            write!(f, "<{}>", params.join(", "))?;
        }
        f.write_str("(")?;
        for (i, param) in method.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", self.with(param))?;
        }
        writeln!(f, ") -> {} {{", self.with(&method.body.return_type))?;
        write_body(f, &method.body, self.interner, 1)?;
        writeln!(f, "}}")
    }
}

impl fmt::Display for Pretty<'_, MethodLocal> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.with(&self.value.local))?;
        if let Some(user_name) = self.value.user_name {
            write!(f, " ({})", self.name(user_name))?;
        }
        write!(f, ": {}", self.with(&self.value.ty))
    }
}

fn write_body(
    f: &mut fmt::Formatter<'_>,
    body: &Body,
    interner: &StringInterner,
    depth: usize,
) -> fmt::Result {
    let indent = INDENT.repeat(depth);
    writeln!(
        f,
        "{indent}let _returnValue: {};",
        pretty(&body.return_type, interner)
    )?;
    for local in &body.locals {
        writeln!(f, "{indent}let {};", pretty(local, interner))?;
    }
    for block in &body.blocks {
        writeln!(f)?;
        write_block(f, block, interner, &indent)?;
    }
    Ok(())
}

fn write_block(
    f: &mut fmt::Formatter<'_>,
    block: &BasicBlock,
    interner: &StringInterner,
    indent: &str,
) -> fmt::Result {
    writeln!(f, "{indent}bb{}: {{", block.id.raw())?;
    for statement in &block.statements {
        writeln!(f, "{indent}{INDENT}{};", pretty(statement, interner))?;
    }
    writeln!(
        f,
        "{indent}{INDENT}{};",
        pretty(&block.terminator, interner)
    )?;
    writeln!(f, "{indent}}}")
}

// ── Statements ──────────────────────────────────────────────────────

impl fmt::Display for Pretty<'_, Assign> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} = {}",
            self.with(&self.value.place),
            self.with(&self.value.value)
        )
    }
}

impl fmt::Display for Pretty<'_, Rvalue> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            Rvalue::Use(operand) => write!(f, "{}", self.with(operand)),
            Rvalue::Binary { op, lhs, rhs } => write!(
                f,
                "{} {} {}",
                self.with(lhs),
                op.as_symbol(),
                self.with(rhs)
            ),
            Rvalue::Unary { op, operand } => {
                write!(f, "{}{}", op.as_symbol(), self.with(operand))
            }
            Rvalue::CreateObject(ty) => write!(f, "new {}", self.with(ty)),
            Rvalue::CreateArray(ty) => write!(f, "new {}", self.with(ty)),
            Rvalue::Fill { value, count } => write!(f, "[{}; {count}]", self.with(value)),
        }
    }
}

impl fmt::Display for Pretty<'_, Terminator> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            Terminator::GoTo(target) => write!(f, "goto -> bb{}", target.raw()),
            Terminator::SwitchInt {
                operand,
                cases,
                otherwise,
            } => {
                write!(f, "switchInt({}) -> [", self.with(operand))?;
                for (value, target) in cases {
                    write!(f, "{value}: bb{}, ", target.raw())?;
                }
                write!(f, "otherwise: bb{}]", otherwise.raw())
            }
            Terminator::Return => f.write_str("return"),
            Terminator::MethodCall {
                function,
                args,
                destination,
                target,
            } => {
                write!(f, "{} = ", self.with(destination))?;
                match function {
                    Callee::Direct(reference) => write!(f, "{}", self.with(reference))?,
                    Callee::Indirect(operand) => write!(f, "({})", self.with(operand))?,
                }
                f.write_str("(")?;
                comma_list(f, args, self.interner)?;
                write!(f, ") -> bb{}", target.raw())
            }
            Terminator::Assert { condition, target } => {
                write!(f, "assert({}) -> bb{}", self.with(condition), target.raw())
            }
        }
    }
}

// ── Values ──────────────────────────────────────────────────────────

impl fmt::Display for Pretty<'_, Local> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            Local::ReturnValue => f.write_str("_returnValue"),
            Local::Param(n) => write!(f, "_param{n}"),
            Local::Var(n) => write!(f, "_local{n}"),
            Local::LocalsObject => f.write_str("_localsObject"),
        }
    }
}

impl fmt::Display for Pretty<'_, Place> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            Place::Local(local) => write!(f, "{}", self.with(local)),
            Place::Deref(base) => write!(f, "(*{})", self.with(&**base)),
            Place::Field {
                base,
                field,
                variant,
            } => {
                let variant = self.name(*variant);
                if variant == "_classVariant" {
                    write!(f, "{}.{}", self.with(&**base), self.name(*field))
                } else {
                    write!(
                        f,
                        "({} as {variant}).{}",
                        self.with(&**base),
                        self.name(*field)
                    )
                }
            }
            Place::StaticField { owner, field } => {
                write!(f, "{}::{}", self.with(owner), self.name(*field))
            }
            Place::Index { base, index } => {
                write!(f, "{}[{}]", self.with(&**base), self.with(&**index))
            }
        }
    }
}

impl fmt::Display for Pretty<'_, Operand> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            Operand::Copy(place) => write!(f, "{}", self.with(place)),
            Operand::Constant(constant) => write!(f, "{}", self.with(constant)),
        }
    }
}

impl fmt::Display for Pretty<'_, Constant> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            Constant::Int { value, bytes } => write!(f, "{value}_i{}", u32::from(*bytes) * 8),
            Constant::UInt { value, bytes } => write!(f, "{value}_u{}", u32::from(*bytes) * 8),
            Constant::Bool(value) => write!(f, "{value}"),
            Constant::String(value) => write!(f, "\"{}\"", self.name(*value).escape_debug()),
            Constant::Function(reference) => write!(f, "const {}", self.with(reference)),
            Constant::Unit => f.write_str("()"),
        }
    }
}

impl fmt::Display for Pretty<'_, FunctionRef> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name(self.value.name))?;
        type_args(f, &self.value.type_args, self.interner)
    }
}

// ── Types ───────────────────────────────────────────────────────────

impl fmt::Display for Pretty<'_, ConcreteType> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name(self.value.name))?;
        type_args(f, &self.value.args, self.interner)
    }
}

impl fmt::Display for Pretty<'_, LoweredType> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            LoweredType::Primitive(primitive) => write!(f, "{primitive}"),
            LoweredType::Concrete(concrete) => write!(f, "{}", self.with(concrete)),
            LoweredType::Generic(placeholder) => f.write_str(self.name(placeholder.name)),
            LoweredType::Pointer(inner) => write!(f, "*{}", self.with(&**inner)),
            LoweredType::Array { element, length } => {
                write!(f, "[{}; {length}]", self.with(&**element))
            }
            LoweredType::FunctionPointer { params, ret } => {
                f.write_str("fn(")?;
                comma_list(f, params, self.interner)?;
                write!(f, ") -> {}", self.with(&**ret))
            }
        }
    }
}

#[cfg(test)]
mod tests;
