//! Function values.
//!
//! Naming a function without calling it produces a heap ``Function`N``
//! object whose `FunctionReference` is the method. Module functions, static
//! methods, nested functions without a closure and the factories of payload
//! union cases leave `FunctionParameter` null. Instance methods store the
//! `this` pointer there, and nested functions with a closure store the
//! closure; ``Function`N__Call`` passes it first.
//!
//! A union case without payload used as a value is not a function; it is
//! the case value itself.

use kelp_ir::ast::{Builtin, DeclRef, ExprId, FunctionRef as AstFunctionRef, TypeRef};
use kelp_ir::Name;

use crate::error::LowerError;
use crate::ir::{Constant, FunctionRef, LoweredType, Operand, Place, Rvalue};
use crate::lower::FnLowerer;

impl FnLowerer<'_, '_> {
    /// A function or method named without a receiver.
    pub(crate) fn lower_function_value(
        &mut self,
        id: ExprId,
        function: &AstFunctionRef,
        dest: Place,
    ) -> Result<(), LowerError> {
        let site = self.site_of(id);
        if let DeclRef::Builtin(Builtin::Printf) = function.decl {
            return Err(self.cx.unknown_decl(&function.decl, site));
        }
        let target = self.resolve_function(function, site)?;
        let reference = self.function_ref(target, function, site)?;
        let bound = if self.cx.index.scope(target).is_instance {
            Some(self.this_place()?.copy())
        } else {
            self.build_closure(target, reference.type_args.clone())?
        };
        self.materialize(id, reference, bound, dest)
    }

    /// `receiver.Method` without a call.
    pub(crate) fn lower_member_function_value(
        &mut self,
        id: ExprId,
        receiver: ExprId,
        function: &AstFunctionRef,
        dest: Place,
    ) -> Result<(), LowerError> {
        let site = self.site_of(id);
        let target = self.resolve_function(function, site)?;
        let receiver = self.lower_receiver(receiver)?;
        let reference = self.function_ref(target, function, site)?;
        let bound = if self.cx.index.scope(target).is_instance {
            Some(receiver)
        } else {
            self.build_closure(target, reference.type_args.clone())?
        };
        self.materialize(id, reference, bound, dest)
    }

    /// `Union::Case` used as a value.
    pub(crate) fn lower_case_value(
        &mut self,
        id: ExprId,
        union: &TypeRef,
        case: Name,
        dest: Place,
    ) -> Result<(), LowerError> {
        let site = self.site_of(id);
        let layout = self.cx.union_case(union, case, site)?;
        if layout.fields.is_empty() {
            let boxing = self.cx.index.module.arena.get_expr(id).ty.boxing();
            return self.construct_case(union, case, boxing, &[], dest, site);
        }
        let factory = self.cx.factory_ref(union, case, site)?;
        self.materialize(id, factory, None, dest)
    }

    /// Allocate the function object for expression `id` into `dest`.
    fn materialize(
        &mut self,
        id: ExprId,
        reference: FunctionRef,
        bound: Option<Operand>,
        dest: Place,
    ) -> Result<(), LowerError> {
        let site = self.site_of(id);
        let ty = &self.cx.index.module.arena.get_expr(id).ty;
        let object_ty = self.function_object_type(ty, site)?;

        self.allocate(LoweredType::Concrete(object_ty.clone()), dest.clone());
        let object = dest.deref();
        self.builder
            .assign(object.clone(), Rvalue::CreateObject(object_ty));

        let class_variant = self.cx.names.class_variant;
        self.builder.assign(
            object.clone().field(self.cx.names.function_reference, class_variant),
            Rvalue::Use(Operand::Constant(Constant::Function(reference))),
        );
        if let Some(bound) = bound {
            self.builder.assign(
                object.field(self.cx.names.function_parameter, class_variant),
                Rvalue::Use(bound),
            );
        }
        Ok(())
    }
}
