//! Kelp IR - shared front-end types for the Kelp compiler.
//!
//! - [`Name`] and [`StringInterner`]: interned identifiers.
//! - [`Span`]: source locations.
//! - [`ast`]: the checked AST handed to the lowering pass.
//! - [`visitor`]: read-only traversal of the AST.

/// Compile-time assertion that a type has a specific size.
#[macro_export]
macro_rules! static_assert_size {
    ($ty:ty, $size:expr) => {
        const _: [(); $size] = [(); ::std::mem::size_of::<$ty>()];
    };
}

pub mod ast;
mod interner;
mod name;
mod span;
pub mod visitor;

pub use ast::{BinaryOp, UnaryOp};
pub use interner::{InternError, StringInterner};
pub use name::Name;
pub use span::Span;
