//! Call lowering.
//!
//! | Callee                          | Lowered call                                  |
//! |---------------------------------|-----------------------------------------------|
//! | module function / static method | direct                                        |
//! | instance method, implicit `this`| direct, `this` prepended                      |
//! | `receiver.Method`               | direct, receiver pointer prepended            |
//! | nested function                 | direct, its closure prepended when it has one |
//! | `printf`                        | direct to the intrinsic                       |
//! | payload union case              | its factory, or built inline when `unboxed`   |
//! | any other function value        | ``Function`N__Call`` with the object first    |

use kelp_ir::ast::{
    Boxing, Builtin, DeclRef, ExprId, ExprKind, FunctionRef as AstFunctionRef, Type,
};

use crate::context::Site;
use crate::error::LowerError;
use crate::identity::ScopeId;
use crate::ir::{Callee, ConcreteType, FunctionRef, Operand, Place, Terminator};
use crate::types::placeholder_args;

use super::{BodyBuilder, FnLowerer};

impl FnLowerer<'_, '_> {
    /// Call `callee` with `args`, storing the result in `dest`. With `tail`
    /// the call continues straight at the returning block.
    pub(super) fn lower_call(
        &mut self,
        callee: ExprId,
        args: &[ExprId],
        dest: Place,
        tail: bool,
    ) -> Result<(), LowerError> {
        let callee_expr = self.cx.index.module.arena.get_expr(callee);
        let site = self.site_of(callee);
        let (function, mut operands) = match &callee_expr.kind {
            ExprKind::Function(function) => match &function.decl {
                DeclRef::Builtin(Builtin::Printf) => {
                    (Callee::Direct(self.cx.printf_ref()), Vec::new())
                }
                _ => {
                    let (reference, prefix) = self.direct_target(function, None, site)?;
                    (Callee::Direct(reference), prefix)
                }
            },
            ExprKind::MemberFunction { receiver, function } => {
                let receiver = self.lower_receiver(*receiver)?;
                let (reference, prefix) = self.direct_target(function, Some(receiver), site)?;
                (Callee::Direct(reference), prefix)
            }
            ExprKind::UnionCase { union, case } => {
                let boxing = match &callee_expr.ty {
                    Type::Function { ret, .. } => ret.boxing(),
                    _ => return Err(self.not_callable(site)),
                };
                if boxing == Boxing::Unboxed {
                    return self.construct_case(union, *case, boxing, args, dest, site);
                }
                (Callee::Direct(self.cx.factory_ref(union, *case, site)?), Vec::new())
            }
            _ => {
                let object = self.function_object_type(&callee_expr.ty, site)?;
                let object_value = self.lower_operand(callee)?;
                (
                    Callee::Direct(self.cx.function_call_ref(&object)),
                    vec![object_value],
                )
            }
        };

        for arg in args {
            operands.push(self.lower_operand(*arg)?);
        }
        if tail {
            self.builder.terminate(Terminator::MethodCall {
                function,
                args: operands,
                destination: dest,
                target: BodyBuilder::RETURN,
            });
        } else {
            self.builder.call(function, operands, dest);
        }
        Ok(())
    }

    /// Method named by `function` plus the hidden leading arguments its
    /// calls pass: `this` (the explicit `receiver`, else the current one) for
    /// instance methods, the closure for nested functions that have one.
    pub(crate) fn direct_target(
        &mut self,
        function: &AstFunctionRef,
        receiver: Option<Operand>,
        site: Site,
    ) -> Result<(FunctionRef, Vec<Operand>), LowerError> {
        let target = self.resolve_function(function, site)?;
        let reference = self.function_ref(target, function, site)?;
        let mut prefix = Vec::with_capacity(1);
        if self.cx.index.scope(target).is_instance {
            let this = match receiver {
                Some(receiver) => receiver,
                None => self.this_place()?.copy(),
            };
            prefix.push(this);
        } else if let Some(closure) = self.build_closure(target, reference.type_args.clone())? {
            prefix.push(closure);
        }
        Ok((reference, prefix))
    }

    pub(crate) fn resolve_function(
        &self,
        function: &AstFunctionRef,
        site: Site,
    ) -> Result<ScopeId, LowerError> {
        match &function.decl {
            DeclRef::Path(path) => self.cx.index.function_by_path(path),
            DeclRef::Builtin(_) => None,
        }
        .ok_or_else(|| self.cx.unknown_decl(&function.decl, site))
    }

    /// Instantiated reference to `target`: its own arguments as written,
    /// enclosing functions' parameters as themselves, then the owner's
    /// arguments (as themselves when the reference is made from inside the
    /// owner).
    pub(crate) fn function_ref(
        &mut self,
        target: ScopeId,
        function: &AstFunctionRef,
        site: Site,
    ) -> Result<FunctionRef, LowerError> {
        let info = self.cx.index.scope(target);
        let (name, def) = (info.name, info.id);
        let params = info.type_params.clone();
        let own = info.function().map_or(0, |decl| decl.type_params.len());
        let owner_len = info
            .owner
            .map_or(0, |owner| self.cx.index.ty(owner).type_params.len());
        let inherited_end = params.len().saturating_sub(owner_len);

        let mut type_args = self.cx.lower_types(&function.type_args, site)?;
        type_args.extend(placeholder_args(&params[own.min(inherited_end)..inherited_end]));
        if function.owner_args.is_empty() {
            type_args.extend(placeholder_args(&params[inherited_end..]));
        } else {
            type_args.extend(self.cx.lower_types(&function.owner_args, site)?);
        }
        Ok(FunctionRef {
            name,
            def,
            type_args,
        })
    }

    /// Pointer to the receiver of a member call. An unboxed receiver is
    /// copied into a fresh allocation.
    pub(crate) fn lower_receiver(&mut self, receiver: ExprId) -> Result<Operand, LowerError> {
        let boxing = self.cx.index.module.arena.get_expr(receiver).ty.boxing();
        let value = self.lower_operand(receiver)?;
        match boxing {
            Boxing::Boxed => Ok(value),
            Boxing::Unboxed => {
                let ty = self.expr_type(receiver)?;
                Ok(self.box_value(value, ty))
            }
        }
    }

    /// ``Function`N`` record for values of a function type.
    pub(crate) fn function_object_type(
        &mut self,
        ty: &Type,
        site: Site,
    ) -> Result<ConcreteType, LowerError> {
        let Type::Function { params, ret } = ty else {
            return Err(self.not_callable(site));
        };
        let params = self.cx.lower_types(params, site)?;
        let ret = self.cx.lower_type(ret, site)?;
        self.cx.function_type(params, ret, site)
    }

    fn not_callable(&self, site: Site) -> LowerError {
        LowerError::NotCallable {
            context: self.cx.context(site),
        }
    }
}
