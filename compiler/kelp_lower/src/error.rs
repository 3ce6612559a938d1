//! Lowering failures and the diagnostics channel.
//!
//! A [`LowerError`] means the checked AST broke an invariant the checker is
//! supposed to guarantee. It aborts lowering of the whole module; it is a
//! compiler defect, not a user-facing diagnostic.

use std::fmt;

use kelp_ir::Span;

/// Where in the module a failure happened.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeclContext {
    /// Qualified name of the declaration being lowered, e.g. `Mod.MyClass__MyFn`.
    pub decl: String,
    pub span: Span,
}

impl fmt::Display for DeclContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.decl, self.span)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum LowerError {
    #[error("{context}: unknown declaration `{name}`")]
    UnknownDeclaration { context: DeclContext, name: String },

    #[error("{context}: `{name}` is not reachable from this function")]
    UnresolvedCapture { context: DeclContext, name: String },

    #[error("{context}: generic parameter `{name}` has no binding in scope")]
    UnboundGeneric { context: DeclContext, name: String },

    #[error("{context}: function value takes {params} parameters, the limit is {max}")]
    ArityOverflow {
        context: DeclContext,
        params: usize,
        max: usize,
    },

    #[error("{context}: `{keyword}` outside of a loop")]
    OutsideLoop {
        context: DeclContext,
        keyword: &'static str,
    },

    #[error("{context}: `?` in a function that does not return a result")]
    PropagateOutsideResult { context: DeclContext },

    #[error("{context}: expression is not assignable")]
    NotAPlace { context: DeclContext },

    #[error("{context}: expression is not callable")]
    NotCallable { context: DeclContext },

    #[error("{context}: expected a value of {expected} type")]
    TypeMismatch {
        context: DeclContext,
        expected: &'static str,
    },

    #[error("{context}: `this` used outside of an instance method")]
    NoReceiver { context: DeclContext },

    #[error("{context}: `{owner}` has no member `{name}`")]
    UnknownMember {
        context: DeclContext,
        owner: String,
        name: String,
    },

    #[error("{context}: match over `{union}` leaves cases unhandled")]
    NonExhaustiveMatch { context: DeclContext, union: String },
}

impl LowerError {
    /// Declaration and span the failure is attributed to.
    pub fn context(&self) -> &DeclContext {
        match self {
            LowerError::UnknownDeclaration { context, .. }
            | LowerError::UnresolvedCapture { context, .. }
            | LowerError::UnboundGeneric { context, .. }
            | LowerError::ArityOverflow { context, .. }
            | LowerError::OutsideLoop { context, .. }
            | LowerError::PropagateOutsideResult { context }
            | LowerError::NotAPlace { context }
            | LowerError::NotCallable { context }
            | LowerError::TypeMismatch { context, .. }
            | LowerError::NoReceiver { context }
            | LowerError::UnknownMember { context, .. }
            | LowerError::NonExhaustiveMatch { context, .. } => context,
        }
    }
}

/// Non-fatal diagnostic slot of [`lower`](crate::lower).
///
/// Lowering performs no validation of its own, so checked input never
/// produces one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LowerProblem {
    pub context: DeclContext,
    pub message: String,
}
