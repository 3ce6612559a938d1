//! Resolved types and declaration references.
//!
//! The checker has already resolved every type and every reference to a
//! declaration; lowering only reads these values. Declarations are referred
//! to by their path from the module root ([`DeclPath`]) or, for the handful
//! of language-provided declarations, by [`Builtin`].

use crate::Name;

/// Fixed-width integer kinds.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum IntKind {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
}

impl IntKind {
    /// Storage size in bytes.
    pub const fn byte_width(self) -> u8 {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 => 4,
            Self::I64 | Self::U64 => 8,
        }
    }

    pub const fn is_signed(self) -> bool {
        matches!(self, Self::I8 | Self::I16 | Self::I32 | Self::I64)
    }
}

/// Whether a value lives behind a heap pointer.
///
/// Values are boxed unless the source requested `unboxed` storage.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum Boxing {
    #[default]
    Boxed,
    Unboxed,
}

/// Path of a declaration from the module root, e.g. `MyClass.MyFn.InnerFn`.
///
/// Never empty.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct DeclPath(Vec<Name>);

impl DeclPath {
    /// Path of a top-level declaration.
    pub fn root(name: Name) -> Self {
        DeclPath(vec![name])
    }

    /// Build a path from its segments, outermost first.
    pub fn from_segments(segments: impl IntoIterator<Item = Name>) -> Self {
        let segments: Vec<Name> = segments.into_iter().collect();
        debug_assert!(!segments.is_empty(), "declaration paths are never empty");
        DeclPath(segments)
    }

    /// Path of a declaration nested directly inside this one.
    #[must_use]
    pub fn child(&self, name: Name) -> Self {
        let mut segments = self.0.clone();
        segments.push(name);
        DeclPath(segments)
    }

    /// Enclosing declaration, if any.
    pub fn parent(&self) -> Option<DeclPath> {
        match self.0.split_last() {
            Some((_, rest)) if !rest.is_empty() => Some(DeclPath(rest.to_vec())),
            _ => None,
        }
    }

    /// Innermost segment.
    pub fn last(&self) -> Name {
        self.0.last().copied().unwrap_or(Name::EMPTY)
    }

    pub fn segments(&self) -> &[Name] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Declarations provided by the language rather than the module.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum Builtin {
    /// `result<TValue, TError>` with cases `Ok` and `Error`.
    Result,
    /// `printf(string)`.
    Printf,
}

/// Reference to a type or function declaration.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum DeclRef {
    Path(DeclPath),
    Builtin(Builtin),
}

/// Instantiated reference to a class or union.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct TypeRef {
    pub decl: DeclRef,
    pub args: Vec<Type>,
}

/// Instantiated reference to a function or method.
///
/// `type_args` instantiate the function's own generic parameters;
/// `owner_args` instantiate the parameters of the type that declares it.
/// Parameters inherited from enclosing functions are always in scope at the
/// reference site and are not listed.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct FunctionRef {
    pub decl: DeclRef,
    pub type_args: Vec<Type>,
    pub owner_args: Vec<Type>,
}

impl FunctionRef {
    /// Reference to a non-generic function.
    pub fn plain(decl: DeclRef) -> Self {
        FunctionRef {
            decl,
            type_args: Vec::new(),
            owner_args: Vec::new(),
        }
    }
}

/// Fully resolved type of an expression, binding, or field.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum Type {
    Int(IntKind),
    Bool,
    String,
    Unit,
    /// Instance of a class or union.
    Named {
        decl: DeclRef,
        args: Vec<Type>,
        boxing: Boxing,
    },
    /// Generic parameter `name` declared by `owner`.
    Generic { owner: DeclRef, name: Name },
    Array {
        element: Box<Type>,
        length: u64,
        boxing: Boxing,
    },
    Tuple { elements: Vec<Type>, boxing: Boxing },
    /// First-class function value.
    Function { params: Vec<Type>, ret: Box<Type> },
}

impl Type {
    /// Boxed instance of a module-level class or union.
    pub fn named(path: DeclPath, args: Vec<Type>) -> Self {
        Type::Named {
            decl: DeclRef::Path(path),
            args,
            boxing: Boxing::Boxed,
        }
    }

    /// `result<value, error>`.
    pub fn result(value: Type, error: Type) -> Self {
        Type::Named {
            decl: DeclRef::Builtin(Builtin::Result),
            args: vec![value, error],
            boxing: Boxing::Boxed,
        }
    }

    pub fn is_unit(&self) -> bool {
        matches!(self, Type::Unit)
    }

    /// Storage class of values of this type.
    ///
    /// Function values are always heap records.
    pub fn boxing(&self) -> Boxing {
        match self {
            Type::Named { boxing, .. } | Type::Array { boxing, .. } | Type::Tuple { boxing, .. } => {
                *boxing
            }
            Type::Function { .. } => Boxing::Boxed,
            Type::Int(_) | Type::Bool | Type::String | Type::Unit | Type::Generic { .. } => {
                Boxing::Unboxed
            }
        }
    }
}
