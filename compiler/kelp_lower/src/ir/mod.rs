//! Lowered IR: the module-level control-flow graph produced by lowering.
//!
//! # Architecture
//!
//! - **[`LoweredModule`]**: ordered [`DataType`]s and ordered [`Method`]s.
//! - **[`Method`]** / **[`StaticField`]**: a [`Body`] of [`BasicBlock`]s plus
//!   the locals it declares.
//! - **[`BasicBlock`]**: straight-line [`Assign`] statements ending in one
//!   [`Terminator`]. Block 0 is the entry; there is no fallthrough.
//! - **[`Place`]** / **[`Operand`]** / **[`Rvalue`]**: the storage-location,
//!   value, and computation vocabulary of statements.
//!
//! Every declaration is named by a [`DefId`]; generic parameters by
//! [`GenericPlaceholder`] (owner id plus parameter name).
//!
//! The IR is immutable once [`lower`](crate::lower) returns.

use std::fmt;

use kelp_ir::ast::IntKind;
use kelp_ir::{BinaryOp, Name, UnaryOp};
use smallvec::SmallVec;

// ── Identity ────────────────────────────────────────────────────────

/// Qualified identifier: module plus dotted path, e.g. `Mod.MyClass__MyFn`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct DefId {
    pub module: Name,
    pub path: Name,
}

impl DefId {
    #[inline]
    pub const fn new(module: Name, path: Name) -> Self {
        DefId { module, path }
    }
}

/// A generic parameter, identified by its declaring definition and name.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct GenericPlaceholder {
    pub owner: DefId,
    pub name: Name,
}

// ── Types ───────────────────────────────────────────────────────────

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum PrimitiveType {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    Bool,
    String,
    Unit,
}

impl PrimitiveType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::U64 => "u64",
            Self::Bool => "bool",
            Self::String => "string",
            Self::Unit => "unit",
        }
    }
}

impl From<IntKind> for PrimitiveType {
    fn from(kind: IntKind) -> Self {
        match kind {
            IntKind::I8 => Self::I8,
            IntKind::I16 => Self::I16,
            IntKind::I32 => Self::I32,
            IntKind::I64 => Self::I64,
            IntKind::U8 => Self::U8,
            IntKind::U16 => Self::U16,
            IntKind::U32 => Self::U32,
            IntKind::U64 => Self::U64,
        }
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Instantiation of a named data type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct ConcreteType {
    pub name: Name,
    pub def: DefId,
    pub args: Vec<LoweredType>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum LoweredType {
    Primitive(PrimitiveType),
    /// Class, union, tuple record (`Tuple`N`) or function object
    /// (`Function`N`).
    Concrete(ConcreteType),
    Generic(GenericPlaceholder),
    Pointer(Box<LoweredType>),
    Array {
        element: Box<LoweredType>,
        length: u64,
    },
    /// Type of a `FunctionReference` field.
    FunctionPointer {
        params: Vec<LoweredType>,
        ret: Box<LoweredType>,
    },
}

impl LoweredType {
    pub const UNIT: LoweredType = LoweredType::Primitive(PrimitiveType::Unit);
    pub const BOOL: LoweredType = LoweredType::Primitive(PrimitiveType::Bool);
    pub const U16: LoweredType = LoweredType::Primitive(PrimitiveType::U16);

    /// Wrap in a pointer.
    #[must_use]
    pub fn pointer(self) -> Self {
        LoweredType::Pointer(Box::new(self))
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, LoweredType::Pointer(_))
    }

    /// Target of a pointer type.
    pub fn pointee(&self) -> Option<&LoweredType> {
        match self {
            LoweredType::Pointer(inner) => Some(inner),
            _ => None,
        }
    }
}

// ── Places, operands, values ────────────────────────────────────────

/// Basic block ID within a body. Allocated sequentially from 0.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct BlockId(u32);

impl BlockId {
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

/// Storage slot of a method.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum Local {
    /// `_returnValue`.
    ReturnValue,
    /// `_param{n}`.
    Param(u32),
    /// `_local{n}`; `n` is the slot's position in the method's local list.
    Var(u32),
    /// `_localsObject`, the method's captured-variable record.
    LocalsObject,
}

impl Local {
    /// `_param{position}`.
    #[expect(
        clippy::cast_possible_truncation,
        reason = "parameter counts never exceed u32"
    )]
    #[inline]
    pub fn param(position: usize) -> Self {
        Local::Param(position as u32)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum Place {
    Local(Local),
    Deref(Box<Place>),
    /// Field of `base` viewed as `variant`.
    Field {
        base: Box<Place>,
        field: Name,
        variant: Name,
    },
    StaticField {
        owner: ConcreteType,
        field: Name,
    },
    Index {
        base: Box<Place>,
        index: Box<Operand>,
    },
}

impl Place {
    #[inline]
    pub fn local(local: Local) -> Self {
        Place::Local(local)
    }

    #[must_use]
    pub fn deref(self) -> Self {
        Place::Deref(Box::new(self))
    }

    #[must_use]
    pub fn field(self, field: Name, variant: Name) -> Self {
        Place::Field {
            base: Box::new(self),
            field,
            variant,
        }
    }

    #[must_use]
    pub fn index(self, index: Operand) -> Self {
        Place::Index {
            base: Box::new(self),
            index: Box::new(index),
        }
    }

    #[must_use]
    pub fn copy(self) -> Operand {
        Operand::Copy(self)
    }
}

/// Instantiated reference to a method.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct FunctionRef {
    pub name: Name,
    pub def: DefId,
    pub type_args: Vec<LoweredType>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum Constant {
    Int { value: i64, bytes: u8 },
    UInt { value: u64, bytes: u8 },
    Bool(bool),
    String(Name),
    /// Pointer to a fully instantiated method.
    Function(FunctionRef),
    Unit,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum Operand {
    Copy(Place),
    Constant(Constant),
}

impl Operand {
    pub const UNIT: Operand = Operand::Constant(Constant::Unit);

    #[inline]
    pub fn bool(value: bool) -> Self {
        Operand::Constant(Constant::Bool(value))
    }

    #[inline]
    pub fn uint(value: u64, bytes: u8) -> Self {
        Operand::Constant(Constant::UInt { value, bytes })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum Rvalue {
    Use(Operand),
    Binary {
        op: BinaryOp,
        lhs: Operand,
        rhs: Operand,
    },
    Unary {
        op: UnaryOp,
        operand: Operand,
    },
    /// Fresh object. Fields read as zero until written; a null pointer
    /// switches as `0`.
    CreateObject(ConcreteType),
    /// Fresh array of the given array type.
    CreateArray(LoweredType),
    /// Array with every element set to `value`.
    Fill { value: Operand, count: u64 },
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct Assign {
    pub place: Place,
    pub value: Rvalue,
}

// ── Control flow ────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum Callee {
    Direct(FunctionRef),
    /// Call through a function pointer value.
    Indirect(Operand),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum Terminator {
    GoTo(BlockId),
    SwitchInt {
        operand: Operand,
        cases: SmallVec<[(u64, BlockId); 2]>,
        otherwise: BlockId,
    },
    Return,
    /// Call, store the result in `destination`, continue at `target`.
    MethodCall {
        function: Callee,
        args: Vec<Operand>,
        destination: Place,
        target: BlockId,
    },
    /// Abort unless `condition` holds, then continue at `target`.
    Assert { condition: Operand, target: BlockId },
}

impl Terminator {
    /// Blocks control may continue to, in terminator order.
    pub fn successors(&self) -> SmallVec<[BlockId; 2]> {
        match self {
            Terminator::GoTo(target)
            | Terminator::MethodCall { target, .. }
            | Terminator::Assert { target, .. } => smallvec::smallvec![*target],
            Terminator::SwitchInt {
                cases, otherwise, ..
            } => cases
                .iter()
                .map(|&(_, block)| block)
                .chain(std::iter::once(*otherwise))
                .collect(),
            Terminator::Return => SmallVec::new(),
        }
    }

    /// Rewrite every successor in place.
    pub(crate) fn map_successors(&mut self, mut f: impl FnMut(BlockId) -> BlockId) {
        match self {
            Terminator::GoTo(target)
            | Terminator::MethodCall { target, .. }
            | Terminator::Assert { target, .. } => *target = f(*target),
            Terminator::SwitchInt {
                cases, otherwise, ..
            } => {
                for (_, block) in cases.iter_mut() {
                    *block = f(*block);
                }
                *otherwise = f(*otherwise);
            }
            Terminator::Return => {}
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct BasicBlock {
    pub id: BlockId,
    pub statements: Vec<Assign>,
    pub terminator: Terminator,
}

// ── Declarations ────────────────────────────────────────────────────

/// A parameter or local slot with its type.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct MethodLocal {
    pub local: Local,
    /// Source name; `None` for compiler temporaries.
    pub user_name: Option<Name>,
    pub ty: LoweredType,
}

/// Blocks and locals computing a value into `_returnValue`.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct Body {
    pub blocks: Vec<BasicBlock>,
    pub locals: Vec<MethodLocal>,
    pub return_type: LoweredType,
}

impl Body {
    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.get(id.index())
    }

    /// Every statement of every block, in block order.
    pub fn statements(&self) -> impl Iterator<Item = &Assign> {
        self.blocks.iter().flat_map(|block| block.statements.iter())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct Method {
    pub id: DefId,
    pub name: Name,
    /// Own parameters, then those of enclosing functions, then the owner
    /// type's.
    pub type_params: Vec<GenericPlaceholder>,
    pub params: Vec<MethodLocal>,
    pub body: Body,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct Field {
    pub name: Name,
    pub ty: LoweredType,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct Variant {
    pub name: Name,
    pub fields: Vec<Field>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct StaticField {
    pub id: DefId,
    pub name: Name,
    pub ty: LoweredType,
    /// Initializer computing the value into `_returnValue`.
    pub body: Body,
}

/// Class (one `_classVariant` variant), union (one variant per case), or
/// variant-less placeholder.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct DataType {
    pub id: DefId,
    pub name: Name,
    pub type_params: Vec<GenericPlaceholder>,
    pub variants: Vec<Variant>,
    pub static_fields: Vec<StaticField>,
}

impl DataType {
    pub fn variant(&self, name: Name) -> Option<&Variant> {
        self.variants.iter().find(|variant| variant.name == name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct LoweredModule {
    pub id: Name,
    pub data_types: Vec<DataType>,
    pub methods: Vec<Method>,
}

impl LoweredModule {
    pub fn data_type(&self, name: Name) -> Option<&DataType> {
        self.data_types.iter().find(|ty| ty.name == name)
    }

    pub fn method(&self, name: Name) -> Option<&Method> {
        self.methods.iter().find(|method| method.name == name)
    }
}
