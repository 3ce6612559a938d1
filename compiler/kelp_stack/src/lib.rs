//! Stack growth for the recursive walks of the lowering pass.
//!
//! Lowering recurses once per nested expression, block, and nested function
//! declaration. Source with pathological nesting would otherwise exhaust the
//! host thread's stack; wrapping each recursive entry point in
//! [`ensure_sufficient_stack`] grows a fresh stack segment instead.
//!
//! # Platform Support
//!
//! - **Native targets**: delegates to `stacker::maybe_grow`.
//! - **WASM targets**: calls the closure directly.

/// Remaining stack below which a new segment is allocated.
const RED_ZONE: usize = 128 * 1024;

/// Size of each newly allocated stack segment.
const SEGMENT_SIZE: usize = 2 * 1024 * 1024;

/// Run `f`, first growing the stack if less than the red zone remains.
///
/// ```text
/// fn lower_expr(&mut self, id: ExprId) -> Result<Operand, LowerError> {
///     ensure_sufficient_stack(|| self.lower_expr_inner(id))
/// }
/// ```
#[inline]
#[cfg(not(target_arch = "wasm32"))]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, SEGMENT_SIZE, f)
}

/// WASM manages its own stack.
#[inline]
#[cfg(target_arch = "wasm32")]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}
