//! Match patterns.

use crate::Name;

use super::expr::VarId;
use super::ty::{Type, TypeRef};

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum Pattern {
    /// `_`
    Discard,
    /// Binds the matched value to a new local.
    Binding { var: VarId, name: Name, ty: Type },
    /// `Union::Case`, `Union::Case(p0, p1)` or `Union::Case { field: p }`.
    Case {
        union: TypeRef,
        case: Name,
        fields: CaseFields,
    },
}

impl Pattern {
    /// Matches every value without inspecting it.
    pub fn is_irrefutable(&self) -> bool {
        matches!(self, Pattern::Discard | Pattern::Binding { .. })
    }
}

/// Sub-patterns of a case pattern.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum CaseFields {
    None,
    /// Positional sub-patterns of a tuple case.
    Tuple(Vec<Pattern>),
    /// Named sub-patterns of a class-like case; unlisted fields are not tested.
    Named(Vec<(Name, Pattern)>),
}
