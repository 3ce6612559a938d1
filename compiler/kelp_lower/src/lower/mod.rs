//! Checked AST → CFG lowering of one scope.
//!
//! Converts the expression tree of a function, `_Main` or static
//! initializer (implicit control flow) into basic blocks (explicit control
//! flow) writing through places.
//!
//! # Architecture
//!
//! - [`BodyBuilder`]: owns the in-progress body, provides block and local
//!   allocation and statement emission.
//! - [`FnLowerer`]: walks the expression tree and calls builder methods.
//!   Split by concern over `expr.rs`, `control_flow.rs`, `calls.rs`,
//!   `collections.rs`, `patterns.rs` and `scope.rs`.
//!
//! # Conventions
//!
//! Every expression lowers either *into* a destination place
//! ([`FnLowerer::lower_into`]) or to an operand
//! ([`FnLowerer::lower_operand`]), which spills into a fresh temporary when
//! the expression is not a constant or a place. A method's result is written
//! to `_returnValue`; the last block returns.

mod calls;
mod collections;
mod control_flow;
mod expr;
mod patterns;
mod scope;

use kelp_ir::ast::{ExprId, Type, VarId};
use kelp_ir::Name;
use rustc_hash::FxHashMap;

use crate::closure::{ClosureRecord, LocalsRecord};
use crate::context::{LowerCx, Site};
use crate::error::LowerError;
use crate::identity::{ScopeId, ScopeKind};
use crate::ir::{
    Assign, BasicBlock, BlockId, Body, Callee, Local, LoweredType, MethodLocal, Operand, Place,
    Rvalue, Terminator,
};

// ── BodyBuilder ─────────────────────────────────────────────────────

/// In-progress basic block.
struct BlockBuilder {
    id: BlockId,
    statements: Vec<Assign>,
    terminator: Option<Terminator>,
}

impl BlockBuilder {
    fn new(id: BlockId) -> Self {
        Self {
            id,
            statements: Vec::new(),
            terminator: None,
        }
    }
}

/// Builder for an in-progress method body.
///
/// Position at a block, emit statements, terminate. Jumps to
/// [`BodyBuilder::RETURN`] are resolved to the returning block by
/// [`finish`](BodyBuilder::finish).
///
/// Emission into a block that already has a terminator is dropped.
pub(crate) struct BodyBuilder {
    blocks: Vec<BlockBuilder>,
    current_block: BlockId,
    locals: Vec<MethodLocal>,
}

impl BodyBuilder {
    /// Placeholder target of jumps to the returning block.
    pub(crate) const RETURN: BlockId = BlockId::new(u32::MAX);

    /// Create a builder with the entry block already allocated.
    pub(crate) fn new() -> Self {
        Self {
            blocks: vec![BlockBuilder::new(BlockId::new(0))],
            current_block: BlockId::new(0),
            locals: Vec::new(),
        }
    }

    // Block management

    /// Allocate a new empty block and return its ID.
    #[expect(
        clippy::cast_possible_truncation,
        reason = "block indices never exceed u32"
    )]
    pub(crate) fn new_block(&mut self) -> BlockId {
        let id = BlockId::new(self.blocks.len() as u32);
        self.blocks.push(BlockBuilder::new(id));
        id
    }

    /// Set the current insertion point to the given block.
    pub(crate) fn position_at(&mut self, block: BlockId) {
        debug_assert!(
            block.index() < self.blocks.len(),
            "BlockId {} out of bounds (have {} blocks)",
            block.raw(),
            self.blocks.len(),
        );
        self.current_block = block;
    }

    /// Check whether the current block already has a terminator.
    #[inline]
    pub(crate) fn is_terminated(&self) -> bool {
        self.blocks[self.current_block.index()].terminator.is_some()
    }

    // Locals

    /// Declare `_localsObject`. Must precede every other local.
    pub(crate) fn declare_locals_object(&mut self, ty: LoweredType) {
        debug_assert!(self.locals.is_empty(), "_localsObject must be declared first");
        self.locals.push(MethodLocal {
            local: Local::LocalsObject,
            user_name: None,
            ty,
        });
    }

    /// Declare a local slot; `user_name` is `None` for temporaries.
    #[expect(
        clippy::cast_possible_truncation,
        reason = "local counts never exceed u32"
    )]
    pub(crate) fn declare_local(&mut self, user_name: Option<Name>, ty: LoweredType) -> Local {
        let local = Local::Var(self.locals.len() as u32);
        self.locals.push(MethodLocal {
            local,
            user_name,
            ty,
        });
        local
    }

    // Emission

    pub(crate) fn assign(&mut self, place: Place, value: Rvalue) {
        let block = &mut self.blocks[self.current_block.index()];
        if block.terminator.is_some() {
            tracing::trace!(block = block.id.raw(), "dropped statement after terminator");
            return;
        }
        block.statements.push(Assign { place, value });
    }

    pub(crate) fn terminate(&mut self, terminator: Terminator) {
        let block = &mut self.blocks[self.current_block.index()];
        if block.terminator.is_some() {
            tracing::trace!(block = block.id.raw(), "dropped terminator after terminator");
            return;
        }
        block.terminator = Some(terminator);
    }

    pub(crate) fn goto(&mut self, target: BlockId) {
        self.terminate(Terminator::GoTo(target));
    }

    /// Call `function`, storing into `destination`, and continue in a fresh
    /// block.
    pub(crate) fn call(&mut self, function: Callee, args: Vec<Operand>, destination: Place) {
        let next = self.new_block();
        self.terminate(Terminator::MethodCall {
            function,
            args,
            destination,
            target: next,
        });
        self.position_at(next);
    }

    /// Abort unless `condition` holds; continue in a fresh block.
    pub(crate) fn assert(&mut self, condition: Operand) {
        let next = self.new_block();
        self.terminate(Terminator::Assert {
            condition,
            target: next,
        });
        self.position_at(next);
    }

    // Finalization

    /// Consume the builder and produce the finished [`Body`].
    ///
    /// The current block falls through to a returning block: itself when it
    /// is the last block and still empty, otherwise a block appended for
    /// the purpose. Jumps to [`BodyBuilder::RETURN`] are redirected there.
    /// Any other unterminated block also jumps there (with a tracing
    /// warning).
    pub(crate) fn finish(mut self, return_type: LoweredType) -> Body {
        let current = self.current_block.index();
        let last = self.blocks.len() - 1;
        let current_open = self.blocks[current].terminator.is_none();

        let return_block = if current_open && current == last && self.blocks[last].statements.is_empty()
        {
            self.blocks[last].terminator = Some(Terminator::Return);
            self.blocks[last].id
        } else {
            let block = self.new_block();
            self.blocks[block.index()].terminator = Some(Terminator::Return);
            if current_open {
                self.blocks[current].terminator = Some(Terminator::GoTo(block));
            }
            block
        };

        let mut blocks = Vec::with_capacity(self.blocks.len());
        for bb in self.blocks {
            let mut terminator = match bb.terminator {
                Some(terminator) => terminator,
                None => {
                    tracing::warn!(
                        block = bb.id.raw(),
                        "unterminated block in lowered body, adding goto to return block"
                    );
                    Terminator::GoTo(return_block)
                }
            };
            terminator.map_successors(|target| {
                if target == Self::RETURN {
                    return_block
                } else {
                    target
                }
            });
            blocks.push(BasicBlock {
                id: bb.id,
                statements: bb.statements,
                terminator,
            });
        }

        Body {
            blocks,
            locals: self.locals,
            return_type,
        }
    }
}

// ── FnLowerer ───────────────────────────────────────────────────────

/// Enclosing loop, for `break` and `continue`.
#[derive(Copy, Clone, Debug)]
pub(crate) struct LoopContext {
    pub exit: BlockId,
    pub continue_block: BlockId,
}

/// Lowered parameters and body of one scope.
pub(crate) struct LoweredScope {
    pub params: Vec<MethodLocal>,
    pub body: Body,
}

/// Expression lowerer for one scope.
pub(crate) struct FnLowerer<'c, 'a> {
    pub(crate) cx: &'c mut LowerCx<'a>,
    pub(crate) scope: ScopeId,
    pub(crate) site: Site,
    pub(crate) builder: BodyBuilder,
    /// Non-promoted variables and their slots.
    pub(crate) vars: FxHashMap<VarId, Local>,
    pub(crate) loops: Vec<LoopContext>,
    /// Checked return type of the scope.
    pub(crate) return_type: Type,
    pub(crate) locals_record: Option<LocalsRecord>,
    pub(crate) closure_record: Option<ClosureRecord>,
}

/// Lower the body of `scope` into a CFG.
pub(crate) fn lower_scope(cx: &mut LowerCx<'_>, scope: ScopeId) -> Result<LoweredScope, LowerError> {
    let info = cx.index.scope(scope);
    let site = Site {
        def: info.id,
        span: info.span,
    };
    let kind = info.kind;
    tracing::debug!(scope = cx.name(info.name), "lowering scope");

    let mut lowerer = FnLowerer::new(cx, scope, site);
    let params = lowerer.bind_params()?;
    lowerer.emit_prologue(&params)?;
    lowerer.declare_user_locals()?;
    lowerer.lower_root(kind)?;

    let return_type = lowerer.cx.lower_type(&lowerer.return_type, site)?;
    Ok(LoweredScope {
        params,
        body: lowerer.builder.finish(return_type),
    })
}

impl<'c, 'a> FnLowerer<'c, 'a> {
    fn new(cx: &'c mut LowerCx<'a>, scope: ScopeId, site: Site) -> Self {
        let return_type = match cx.index.scope(scope).kind {
            ScopeKind::Main(_) => Type::Unit,
            ScopeKind::Function(decl) => decl.return_type.clone(),
            ScopeKind::StaticInit(field) => field.ty.clone(),
        };
        let locals_record = cx.plan.locals(scope).cloned();
        let closure_record = cx.plan.closure(scope).cloned();
        FnLowerer {
            cx,
            scope,
            site,
            builder: BodyBuilder::new(),
            vars: FxHashMap::default(),
            loops: Vec::new(),
            return_type,
            locals_record,
            closure_record,
        }
    }

    /// Lowered type of an expression.
    pub(crate) fn expr_type(&mut self, id: ExprId) -> Result<LoweredType, LowerError> {
        let expr = self.cx.index.module.arena.get_expr(id);
        self.cx.lower_type(&expr.ty, self.site)
    }

    /// Fresh compiler temporary.
    pub(crate) fn temp(&mut self, ty: LoweredType) -> Place {
        Place::local(self.builder.declare_local(None, ty))
    }

    /// `allocate<ty>()` into `dest`.
    pub(crate) fn allocate(&mut self, ty: LoweredType, dest: Place) {
        let allocate = self.cx.allocate_ref(ty);
        self.builder.call(Callee::Direct(allocate), Vec::new(), dest);
    }

    /// Site of an expression in this scope.
    pub(crate) fn site_of(&self, id: ExprId) -> Site {
        Site {
            def: self.site.def,
            span: self.cx.index.module.arena.get_expr(id).span,
        }
    }
}
