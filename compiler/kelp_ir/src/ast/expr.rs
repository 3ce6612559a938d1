//! Expressions, statements and blocks of the checked AST.
//!
//! Expressions live in an [`ExprArena`](super::ExprArena) and refer to their
//! children by [`ExprId`]. Every expression carries its resolved [`Type`].

use crate::{Name, Span};

use super::pattern::Pattern;
use super::ty::{FunctionRef, Type, TypeRef};
use super::{BinaryOp, FunctionDecl, UnaryOp};

/// Index of an expression in its module's arena.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct ExprId(u32);

impl ExprId {
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identity of a parameter or local variable, unique within a module.
///
/// Assigned by the checker; a reference to a variable declared by an
/// enclosing function uses the same id as the declaration.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct VarId(u32);

impl VarId {
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// What an identifier expression resolved to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum Binding {
    /// Parameter or local variable.
    Var(VarId),
    /// The receiver of the enclosing instance method.
    This,
    /// Instance field of the enclosing class, accessed without `this.`.
    Field(Name),
}

/// A typed expression node.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: Type,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum ExprKind {
    // ── Literals ──────────────────────────────────────────────
    /// Integer literal; signedness and width come from the expression type.
    Int(u64),
    Bool(bool),
    String(Name),
    Unit,

    // ── Names ─────────────────────────────────────────────────
    Variable(Binding),
    /// A function named directly: module function, static or instance
    /// method of the enclosing type, or nested function.
    Function(FunctionRef),
    /// `receiver.Method` used as a value or callee.
    MemberFunction {
        receiver: ExprId,
        function: FunctionRef,
    },
    /// `object.field`, including tuple `Item{n}` fields.
    Field { object: ExprId, field: Name },
    /// `Type::field`.
    StaticField { owner: TypeRef, field: Name },
    /// `Union::Case`: a unit case value, or a tuple case constructor.
    UnionCase { union: TypeRef, case: Name },

    // ── Construction ──────────────────────────────────────────
    Call { callee: ExprId, args: Vec<ExprId> },
    /// `new Class { field = value, .. }`.
    New {
        class: TypeRef,
        fields: Vec<FieldInit>,
    },
    /// `new Union::Case { field = value, .. }` for class-like cases.
    NewCase {
        union: TypeRef,
        case: Name,
        fields: Vec<FieldInit>,
    },
    Tuple(Vec<ExprId>),
    /// `[a, b, c]`.
    Array(Vec<ExprId>),
    /// `[value; count]`.
    ArrayFill { value: ExprId, count: u64 },

    // ── Operators ─────────────────────────────────────────────
    Index { array: ExprId, index: ExprId },
    Binary {
        op: BinaryOp,
        lhs: ExprId,
        rhs: ExprId,
    },
    Unary { op: UnaryOp, operand: ExprId },
    Assign { target: ExprId, value: ExprId },
    /// Postfix `?` on a `result` value.
    Propagate(ExprId),

    // ── Control flow ──────────────────────────────────────────
    If {
        cond: ExprId,
        then_branch: ExprId,
        else_branch: Option<ExprId>,
    },
    While { cond: ExprId, body: ExprId },
    Break,
    Continue,
    Return(Option<ExprId>),
    Block(Block),
    Match {
        scrutinee: ExprId,
        arms: Vec<MatchArm>,
    },
    /// `value matches Pattern`.
    Matches { value: ExprId, pattern: Pattern },
}

/// `name = value` inside an object initializer.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct FieldInit {
    pub name: Name,
    pub value: ExprId,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct MatchArm {
    pub pattern: Pattern,
    pub body: ExprId,
}

/// Statement list with an optional value-producing tail.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub tail: Option<ExprId>,
}

impl Block {
    pub fn is_empty(&self) -> bool {
        self.stmts.is_empty() && self.tail.is_none()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum Stmt {
    Expr(ExprId),
    Var(VarDecl),
    /// Nested function declaration.
    Function(Box<FunctionDecl>),
}

/// `var name: ty = init`.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct VarDecl {
    pub var: VarId,
    pub name: Name,
    pub ty: Type,
    pub init: Option<ExprId>,
    pub span: Span,
}
