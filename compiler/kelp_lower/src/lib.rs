//! Lowering of the checked Kelp AST into the module-level CFG IR.
//!
//! One pass turns a [`CheckedModule`] into a [`LoweredModule`](ir::LoweredModule):
//!
//! - **Identity**: every type, method, nested function, static initializer
//!   and generic parameter gets a qualified [`DefId`](ir::DefId).
//! - **Types**: checked types become lowered types; boxed values are
//!   pointers, tuples and function values become built-in records.
//! - **Closure conversion**: variables read by nested functions move into
//!   per-scope `Locals` records; nested functions receive a `Closure` record
//!   pointing at the ancestors' records they need.
//! - **Layout**: classes get one `_classVariant` variant, unions one variant
//!   per case tagged with `_variantIdentifier`, payload cases a factory.
//! - **Bodies**: every function, `_Main` and static initializer becomes a
//!   CFG of basic blocks over places.
//! - **Function values**: named functions used as values become
//!   ``Function`N`` objects.
//!
//! # Crate Dependencies
//!
//! `kelp_lower` depends on `kelp_ir` for the checked AST and interned names
//! and on `kelp_stack` for deep recursion. It has no backend dependency.

mod builtins;
mod closure;
mod context;
mod error;
mod function_object;
mod identity;
pub mod ir;
mod layout;
mod lower;
mod module;
pub mod pretty;
mod statics;
mod types;

#[cfg(test)]
mod test_helpers;
#[cfg(test)]
mod tests;

use std::sync::Once;

use kelp_ir::ast::CheckedModule;
use kelp_ir::StringInterner;

pub use error::{DeclContext, LowerError, LowerProblem};

/// Lower a checked module.
///
/// Returns the lowered module and the diagnostics vector, which is empty
/// for checked input. An error means the input broke an invariant the
/// checker guarantees.
pub fn lower(
    module: &CheckedModule,
    interner: &StringInterner,
    config: &LowerConfig,
) -> Result<(ir::LoweredModule, Vec<LowerProblem>), LowerError> {
    module::lower_module(module, interner, config)
}

/// Lowering options.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LowerConfig {
    /// Largest parameter count of a function value (``Function`N`` with
    /// `N = max_function_arity + 1`).
    pub max_function_arity: usize,
    /// Name of the method holding the module's top-level statements.
    pub entry_point: String,
}

impl LowerConfig {
    #[must_use]
    pub fn with_max_function_arity(mut self, arity: usize) -> Self {
        self.max_function_arity = arity;
        self
    }

    #[must_use]
    pub fn with_entry_point(mut self, name: impl Into<String>) -> Self {
        self.entry_point = name.into();
        self
    }
}

impl Default for LowerConfig {
    fn default() -> Self {
        LowerConfig {
            max_function_arity: 6,
            entry_point: String::from("_Main"),
        }
    }
}

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for the lowering pass.
///
/// Reads the filter from `KELP_LOG`, falling back to `RUST_LOG`; does nothing
/// when neither is set. With `KELP_LOG_TREE` set, events are rendered as a
/// tree of nested spans. Safe to call more than once.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        let directives = std::env::var("KELP_LOG").or_else(|_| std::env::var("RUST_LOG"));
        let Ok(directives) = directives else {
            return;
        };
        let filter = EnvFilter::new(directives);

        let (flat, tree) = if std::env::var_os("KELP_LOG_TREE").is_some() {
            let tree = tracing_tree::HierarchicalLayer::new(2)
                .with_targets(true)
                .with_bracketed_fields(true);
            (None, Some(tree))
        } else {
            (Some(fmt::layer().with_target(true).with_level(true)), None)
        };
        // A subscriber installed by the host wins.
        let _ = tracing_subscriber::registry()
            .with(flat)
            .with(tree)
            .with(filter)
            .try_init();
    });
}
