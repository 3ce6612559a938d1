//! Control flow lowering: `if`, `while`, `break`, `continue`, `return`,
//! short-circuit operators and `?`.
//!
//! Conditions are tested with `SwitchInt` on the `bool` value: case `0`
//! is the false edge, `otherwise` the true edge.

use kelp_ir::ast::{Builtin, DeclRef, ExprId, ExprKind, Type};
use kelp_ir::BinaryOp;
use smallvec::smallvec;

use crate::error::LowerError;
use crate::ir::{BlockId, Callee, Local, Operand, Place, Rvalue, Terminator};

use super::expr::unbox;
use super::{BodyBuilder, FnLowerer, LoopContext};

impl FnLowerer<'_, '_> {
    /// Branch on `cond`; false goes to `if_false`, true to `if_true`.
    fn switch_bool(&mut self, cond: Operand, if_false: BlockId, if_true: BlockId) {
        self.builder.terminate(Terminator::SwitchInt {
            operand: cond,
            cases: smallvec![(0, if_false)],
            otherwise: if_true,
        });
    }

    /// `&&` / `||` into `dest`; `rhs` is only evaluated when needed.
    pub(super) fn lower_short_circuit(
        &mut self,
        op: BinaryOp,
        lhs: ExprId,
        rhs: ExprId,
        dest: Place,
    ) -> Result<(), LowerError> {
        let cond = self.lower_operand(lhs)?;
        let rhs_bb = self.builder.new_block();
        let short_bb = self.builder.new_block();
        let join = self.builder.new_block();

        let short_value = match op {
            BinaryOp::And => {
                self.switch_bool(cond, short_bb, rhs_bb);
                false
            }
            _ => {
                self.switch_bool(cond, rhs_bb, short_bb);
                true
            }
        };

        self.builder.position_at(rhs_bb);
        self.lower_into(rhs, dest.clone())?;
        self.builder.goto(join);

        self.builder.position_at(short_bb);
        self.builder
            .assign(dest, Rvalue::Use(Operand::bool(short_value)));
        self.builder.goto(join);

        self.builder.position_at(join);
        Ok(())
    }

    pub(super) fn lower_if(
        &mut self,
        cond: ExprId,
        then_branch: ExprId,
        else_branch: Option<ExprId>,
        dest: Option<Place>,
    ) -> Result<(), LowerError> {
        let cond = self.lower_operand(cond)?;
        let then_bb = self.builder.new_block();
        let else_bb = else_branch.map(|_| self.builder.new_block());
        let join = self.builder.new_block();
        self.switch_bool(cond, else_bb.unwrap_or(join), then_bb);

        self.builder.position_at(then_bb);
        self.lower_branch(then_branch, dest.clone())?;
        self.builder.goto(join);

        if let (Some(else_bb), Some(else_branch)) = (else_bb, else_branch) {
            self.builder.position_at(else_bb);
            self.lower_branch(else_branch, dest)?;
            self.builder.goto(join);
        }

        self.builder.position_at(join);
        Ok(())
    }

    fn lower_branch(&mut self, branch: ExprId, dest: Option<Place>) -> Result<(), LowerError> {
        match dest {
            Some(dest) => self.lower_into(branch, dest),
            None => self.lower_discard(branch),
        }
    }

    pub(super) fn lower_while(&mut self, cond: ExprId, body: ExprId) -> Result<(), LowerError> {
        let cond_bb = self.builder.new_block();
        let body_bb = self.builder.new_block();
        let exit = self.builder.new_block();
        self.builder.goto(cond_bb);

        self.builder.position_at(cond_bb);
        let cond = self.lower_operand(cond)?;
        self.switch_bool(cond, exit, body_bb);

        self.builder.position_at(body_bb);
        self.loops.push(LoopContext {
            exit,
            continue_block: cond_bb,
        });
        let result = self.lower_discard(body);
        self.loops.pop();
        result?;
        self.builder.goto(cond_bb);

        self.builder.position_at(exit);
        Ok(())
    }

    pub(super) fn lower_break(&mut self) -> Result<(), LowerError> {
        let target = self.enclosing_loop("break")?.exit;
        self.builder.goto(target);
        Ok(())
    }

    pub(super) fn lower_continue(&mut self) -> Result<(), LowerError> {
        let target = self.enclosing_loop("continue")?.continue_block;
        self.builder.goto(target);
        Ok(())
    }

    fn enclosing_loop(&self, keyword: &'static str) -> Result<LoopContext, LowerError> {
        self.loops
            .last()
            .copied()
            .ok_or_else(|| LowerError::OutsideLoop {
                context: self.cx.context(self.site),
                keyword,
            })
    }

    /// `return value`. A returned call stores straight into `_returnValue`
    /// and continues at the returning block.
    pub(super) fn lower_return(&mut self, value: Option<ExprId>) -> Result<(), LowerError> {
        let ret = Place::local(Local::ReturnValue);
        if let Some(value) = value {
            let expr = self.cx.index.module.arena.get_expr(value);
            match &expr.kind {
                ExprKind::Call { callee, args } => {
                    return self.lower_call(*callee, args, ret, true);
                }
                _ if expr.ty.is_unit() => self.lower_discard(value)?,
                _ => self.lower_into(value, ret)?,
            }
        }
        self.builder.goto(BodyBuilder::RETURN);
        Ok(())
    }

    /// `inner?`: continue with the `Ok` payload, or return the `Error`
    /// payload rewrapped in the enclosing function's result type.
    pub(super) fn lower_propagate(
        &mut self,
        id: ExprId,
        inner: ExprId,
        dest: Place,
    ) -> Result<(), LowerError> {
        let return_args = match &self.return_type {
            Type::Named {
                decl: DeclRef::Builtin(Builtin::Result),
                args,
                ..
            } => args.clone(),
            _ => {
                return Err(LowerError::PropagateOutsideResult {
                    context: self.cx.context(self.site_of(id)),
                })
            }
        };
        let site = self.site_of(id);
        let return_args = self.cx.lower_types(&return_args, site)?;

        let boxing = self.cx.index.module.arena.get_expr(inner).ty.boxing();
        let ty = self.expr_type(inner)?;
        let result = self.temp(ty);
        self.lower_into(inner, result.clone())?;
        let value = unbox(result, boxing);

        let err_bb = self.builder.new_block();
        let ok_bb = self.builder.new_block();
        let (ok, error) = (self.cx.names.ok, self.cx.names.error);
        let item0 = self.cx.item(0);
        self.builder.terminate(Terminator::SwitchInt {
            operand: value.clone().field(self.cx.names.variant_id, ok).copy(),
            cases: smallvec![(0, ok_bb)],
            otherwise: err_bb,
        });

        self.builder.position_at(err_bb);
        let rewrap = self.cx.result_factory(error, return_args);
        self.builder.terminate(Terminator::MethodCall {
            function: Callee::Direct(rewrap),
            args: vec![value.clone().field(item0, error).copy()],
            destination: Place::local(Local::ReturnValue),
            target: BodyBuilder::RETURN,
        });

        self.builder.position_at(ok_bb);
        self.builder
            .assign(dest, Rvalue::Use(value.field(item0, ok).copy()));
        Ok(())
    }
}
