//! Checked AST.
//!
//! The input of the lowering pass: a module whose names are resolved and
//! whose expressions are fully typed. Nothing here is validated again
//! downstream.
//!
//! # Layout
//!
//! - [`CheckedModule`]: declarations plus the module's top-level statements.
//! - [`ExprArena`]: flat storage for every expression of the module.
//! - Declarations ([`ClassDecl`], [`UnionDecl`], [`FunctionDecl`]) own their
//!   bodies as [`Block`]s of statements pointing into the arena.

mod expr;
mod operators;
mod pattern;
mod ty;

pub use expr::{
    Binding, Block, Expr, ExprId, ExprKind, FieldInit, MatchArm, Stmt, VarDecl, VarId,
};
pub use operators::{BinaryOp, UnaryOp};
pub use pattern::{CaseFields, Pattern};
pub use ty::{Boxing, Builtin, DeclPath, DeclRef, FunctionRef, IntKind, Type, TypeRef};

use crate::{Name, Span};

/// Flat storage for the expressions of one module.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct ExprArena {
    exprs: Vec<Expr>,
}

impl ExprArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an expression and return its id.
    #[expect(
        clippy::cast_possible_truncation,
        reason = "expression counts never exceed u32"
    )]
    pub fn alloc(&mut self, expr: Expr) -> ExprId {
        let id = ExprId::new(self.exprs.len() as u32);
        self.exprs.push(expr);
        id
    }

    /// Look up an expression.
    ///
    /// # Panics
    /// Panics if `id` was not allocated by this arena.
    #[inline]
    pub fn get_expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id.index()]
    }

    pub fn len(&self) -> usize {
        self.exprs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty()
    }
}

/// A checked module: the unit the lowering pass consumes.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct CheckedModule {
    /// Module identifier; prefixes every qualified name.
    pub id: Name,
    pub arena: ExprArena,
    pub unions: Vec<UnionDecl>,
    pub classes: Vec<ClassDecl>,
    pub functions: Vec<FunctionDecl>,
    /// Top-level statements, run by the module entry point.
    pub main: Block,
}

impl CheckedModule {
    pub fn new(id: Name) -> Self {
        CheckedModule {
            id,
            arena: ExprArena::new(),
            unions: Vec::new(),
            classes: Vec::new(),
            functions: Vec::new(),
            main: Block::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct ClassDecl {
    pub name: Name,
    pub type_params: Vec<Name>,
    pub fields: Vec<FieldDecl>,
    pub static_fields: Vec<StaticFieldDecl>,
    pub methods: Vec<FunctionDecl>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct FieldDecl {
    pub name: Name,
    pub ty: Type,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct StaticFieldDecl {
    pub name: Name,
    pub ty: Type,
    pub init: ExprId,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct UnionDecl {
    pub name: Name,
    pub type_params: Vec<Name>,
    pub cases: Vec<CaseDecl>,
    pub methods: Vec<FunctionDecl>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct CaseDecl {
    pub name: Name,
    pub kind: CaseKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum CaseKind {
    Unit,
    /// Positional payload.
    Tuple(Vec<Type>),
    /// Named payload fields.
    Class(Vec<FieldDecl>),
}

impl CaseKind {
    /// True for cases that store data beyond the discriminant.
    pub fn has_payload(&self) -> bool {
        match self {
            CaseKind::Unit => false,
            CaseKind::Tuple(items) => !items.is_empty(),
            CaseKind::Class(fields) => !fields.is_empty(),
        }
    }
}

/// Module function, method, or nested function.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct FunctionDecl {
    pub name: Name,
    pub type_params: Vec<Name>,
    pub params: Vec<ParamDecl>,
    pub return_type: Type,
    /// False for instance methods of a class or union.
    pub is_static: bool,
    pub body: Block,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct ParamDecl {
    pub var: VarId,
    pub name: Name,
    pub ty: Type,
}
