//! Expression lowering: the core dispatch.
//!
//! [`FnLowerer::lower_into`] evaluates an expression into a destination
//! place. [`FnLowerer::lower_operand`] returns constants and places as they
//! are and spills everything else into a temporary.

use kelp_ir::ast::{Binding, Boxing, ExprId, ExprKind, Type};
use kelp_ir::BinaryOp;

use crate::error::LowerError;
use crate::ir::{Constant, LoweredType, Operand, Place, Rvalue};

use super::FnLowerer;

impl FnLowerer<'_, '_> {
    // ── Main dispatch ──────────────────────────────────────────

    /// Evaluate `id` and store the value in `dest`.
    pub(crate) fn lower_into(&mut self, id: ExprId, dest: Place) -> Result<(), LowerError> {
        kelp_stack::ensure_sufficient_stack(|| self.lower_into_inner(id, dest))
    }

    fn lower_into_inner(&mut self, id: ExprId, dest: Place) -> Result<(), LowerError> {
        let expr = self.cx.index.module.arena.get_expr(id);
        match &expr.kind {
            // ── Values without control flow ───────────────────
            ExprKind::Int(_)
            | ExprKind::Bool(_)
            | ExprKind::String(_)
            | ExprKind::Unit
            | ExprKind::Variable(_)
            | ExprKind::Field { .. }
            | ExprKind::StaticField { .. }
            | ExprKind::Index { .. } => {
                let value = self.lower_operand(id)?;
                self.builder.assign(dest, Rvalue::Use(value));
                Ok(())
            }
            ExprKind::Binary { op, lhs, rhs } if op.is_short_circuit() => {
                self.lower_short_circuit(*op, *lhs, *rhs, dest)
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let lhs = self.lower_operand(*lhs)?;
                let rhs = self.lower_operand(*rhs)?;
                self.builder
                    .assign(dest, Rvalue::Binary { op: *op, lhs, rhs });
                Ok(())
            }
            ExprKind::Unary { op, operand } => {
                let operand = self.lower_operand(*operand)?;
                self.builder.assign(dest, Rvalue::Unary { op: *op, operand });
                Ok(())
            }

            // ── Function values ───────────────────────────────
            ExprKind::Function(function) => self.lower_function_value(id, function, dest),
            ExprKind::MemberFunction { receiver, function } => {
                self.lower_member_function_value(id, *receiver, function, dest)
            }
            ExprKind::UnionCase { union, case } => self.lower_case_value(id, union, *case, dest),

            // ── Calls and construction ────────────────────────
            ExprKind::Call { callee, args } => self.lower_call(*callee, args, dest, false),
            ExprKind::New { class, fields } => self.lower_new(id, class, fields, dest),
            ExprKind::NewCase {
                union,
                case,
                fields,
            } => self.lower_new_case(id, union, *case, fields, dest),
            ExprKind::Tuple(items) => self.lower_tuple(id, items, dest),
            ExprKind::Array(items) => self.lower_array(id, items, dest),
            ExprKind::ArrayFill { value, count } => self.lower_array_fill(id, *value, *count, dest),

            // ── Control flow ──────────────────────────────────
            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            } => self.lower_if(*cond, *then_branch, *else_branch, Some(dest)),
            ExprKind::Block(block) => self.lower_block(block, Some(dest)),
            ExprKind::Match { scrutinee, arms } => self.lower_match(id, *scrutinee, arms, Some(dest)),
            ExprKind::Matches { value, pattern } => self.lower_matches(*value, pattern, dest),
            ExprKind::Propagate(inner) => self.lower_propagate(id, *inner, dest),

            // ── Unit-valued ───────────────────────────────────
            ExprKind::Assign { .. }
            | ExprKind::While { .. }
            | ExprKind::Break
            | ExprKind::Continue
            | ExprKind::Return(_) => {
                self.lower_discard(id)?;
                self.builder.assign(dest, Rvalue::Use(Operand::UNIT));
                Ok(())
            }
        }
    }

    /// Evaluate `id` for its effects only.
    pub(crate) fn lower_discard(&mut self, id: ExprId) -> Result<(), LowerError> {
        kelp_stack::ensure_sufficient_stack(|| self.lower_discard_inner(id))
    }

    fn lower_discard_inner(&mut self, id: ExprId) -> Result<(), LowerError> {
        let expr = self.cx.index.module.arena.get_expr(id);
        match &expr.kind {
            ExprKind::Assign { target, value } => self.lower_assign(*target, *value),
            ExprKind::While { cond, body } => self.lower_while(*cond, *body),
            ExprKind::Break => self.lower_break(),
            ExprKind::Continue => self.lower_continue(),
            ExprKind::Return(value) => self.lower_return(*value),
            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            } => self.lower_if(*cond, *then_branch, *else_branch, None),
            ExprKind::Block(block) => self.lower_block(block, None),
            ExprKind::Match { scrutinee, arms } => self.lower_match(id, *scrutinee, arms, None),
            // Reading a variable has no effect.
            ExprKind::Int(_)
            | ExprKind::Bool(_)
            | ExprKind::String(_)
            | ExprKind::Unit
            | ExprKind::Variable(_) => Ok(()),
            _ => self.lower_operand(id).map(drop),
        }
    }

    /// Evaluate `id` to an operand.
    pub(crate) fn lower_operand(&mut self, id: ExprId) -> Result<Operand, LowerError> {
        let expr = self.cx.index.module.arena.get_expr(id);
        match &expr.kind {
            ExprKind::Int(value) => Ok(Operand::Constant(int_constant(*value, &expr.ty))),
            ExprKind::Bool(value) => Ok(Operand::bool(*value)),
            ExprKind::String(value) => Ok(Operand::Constant(Constant::String(*value))),
            ExprKind::Unit => Ok(Operand::UNIT),
            ExprKind::Variable(Binding::This) => Ok(self.this_place()?.copy()),
            ExprKind::Variable(_)
            | ExprKind::Field { .. }
            | ExprKind::StaticField { .. }
            | ExprKind::Index { .. } => Ok(self.lower_place(id)?.copy()),
            ExprKind::Assign { .. }
            | ExprKind::While { .. }
            | ExprKind::Break
            | ExprKind::Continue
            | ExprKind::Return(_) => {
                self.lower_discard(id)?;
                Ok(Operand::UNIT)
            }
            _ => {
                let ty = self.expr_type(id)?;
                let temp = self.temp(ty);
                self.lower_into(id, temp.clone())?;
                Ok(temp.copy())
            }
        }
    }

    /// Place an expression evaluates to, without copying it out.
    pub(crate) fn lower_place(&mut self, id: ExprId) -> Result<Place, LowerError> {
        let expr = self.cx.index.module.arena.get_expr(id);
        let class_variant = self.cx.names.class_variant;
        match &expr.kind {
            ExprKind::Variable(Binding::Var(var)) => self.var_place(*var),
            ExprKind::Variable(Binding::Field(field)) => {
                Ok(self.this_place()?.deref().field(*field, class_variant))
            }
            ExprKind::Field { object, field } => {
                let object_ty = &self.cx.index.module.arena.get_expr(*object).ty;
                let boxing = object_ty.boxing();
                let base = self.lower_base(*object)?;
                Ok(unbox(base, boxing).field(*field, class_variant))
            }
            ExprKind::StaticField { owner, field } => {
                let owner = self
                    .cx
                    .named_type(&owner.decl, &owner.args, self.site_of(id))?;
                Ok(Place::StaticField {
                    owner,
                    field: *field,
                })
            }
            ExprKind::Index { array, index } => self.lower_index(*array, *index),
            _ => Err(LowerError::NotAPlace {
                context: self.cx.context(self.site_of(id)),
            }),
        }
    }

    /// Place holding the value of `id`, spilling non-places to a temporary.
    pub(crate) fn lower_base(&mut self, id: ExprId) -> Result<Place, LowerError> {
        match self.lower_operand(id)? {
            Operand::Copy(place) => Ok(place),
            constant @ Operand::Constant(_) => {
                let ty = self.expr_type(id)?;
                let temp = self.temp(ty);
                self.builder.assign(temp.clone(), Rvalue::Use(constant));
                Ok(temp)
            }
        }
    }

    // ── Operators ──────────────────────────────────────────────

    /// `array[index]`, guarded by `index < length` with the length in the
    /// index's integer type.
    fn lower_index(&mut self, array: ExprId, index: ExprId) -> Result<Place, LowerError> {
        let (length, boxing) = match &self.cx.index.module.arena.get_expr(array).ty {
            Type::Array { length, boxing, .. } => (*length, *boxing),
            _ => {
                return Err(LowerError::TypeMismatch {
                    context: self.cx.context(self.site_of(array)),
                    expected: "array",
                })
            }
        };
        let length = int_constant(length, &self.cx.index.module.arena.get_expr(index).ty);
        let base = self.lower_base(array)?;
        let index = self.lower_operand(index)?;

        let in_bounds = self.temp(LoweredType::BOOL);
        self.builder.assign(
            in_bounds.clone(),
            Rvalue::Binary {
                op: BinaryOp::Lt,
                lhs: index.clone(),
                rhs: Operand::Constant(length),
            },
        );
        self.builder.assert(in_bounds.copy());
        Ok(unbox(base, boxing).index(index))
    }

    fn lower_assign(&mut self, target: ExprId, value: ExprId) -> Result<(), LowerError> {
        let place = self.lower_place(target)?;
        if !self.builds_in_place(value) {
            return self.lower_into(value, place);
        }
        let ty = self.expr_type(value)?;
        let temp = self.temp(ty);
        self.lower_into(value, temp.clone())?;
        self.builder.assign(place, Rvalue::Use(temp.copy()));
        Ok(())
    }
}

/// The value behind `place`: dereferenced when boxed.
pub(crate) fn unbox(place: Place, boxing: Boxing) -> Place {
    match boxing {
        Boxing::Boxed => place.deref(),
        Boxing::Unboxed => place,
    }
}

/// Literal constant; signedness and width come from the literal's type.
fn int_constant(value: u64, ty: &Type) -> Constant {
    match ty {
        Type::Int(kind) if kind.is_signed() => Constant::Int {
            value: i64::from_ne_bytes(value.to_ne_bytes()),
            bytes: kind.byte_width(),
        },
        Type::Int(kind) => Constant::UInt {
            value,
            bytes: kind.byte_width(),
        },
        _ => Constant::UInt { value, bytes: 8 },
    }
}
