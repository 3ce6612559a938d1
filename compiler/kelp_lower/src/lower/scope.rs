//! Parameters, variables and captured state of the scope being lowered.
//!
//! A variable lives in one of three places:
//!
//! - its own slot (`_param{n}` or `_local{n}`), when no nested function
//!   reads it;
//! - a field of `_localsObject`, when it is promoted and declared by this
//!   scope;
//! - a field of an enclosing scope's `Locals` record, reached through this
//!   function's closure (`_param0`), when it is promoted and declared by an
//!   ancestor.

use kelp_ir::ast::{Block, Stmt, Type, VarId};
use kelp_ir::Name;

use crate::error::LowerError;
use crate::identity::{ScopeId, ScopeKind};
use crate::ir::{ConcreteType, Local, LoweredType, MethodLocal, Operand, Place, Rvalue};
use crate::types::placeholder_args;

use super::FnLowerer;

impl FnLowerer<'_, '_> {
    /// Method parameters: the receiver or closure first when present, then
    /// the declared parameters. Records the slot of every non-promoted one.
    pub(super) fn bind_params(&mut self) -> Result<Vec<MethodLocal>, LowerError> {
        let info = self.cx.index.scope(self.scope);
        let Some(decl) = info.function() else {
            return Ok(Vec::new());
        };
        let (is_instance, owner) = (info.is_instance, info.owner);

        let mut params = Vec::with_capacity(decl.params.len() + 1);
        if is_instance {
            if let Some(owner) = owner {
                let owner = self.cx.index.ty(owner);
                let receiver = ConcreteType {
                    name: owner.name,
                    def: owner.id,
                    args: placeholder_args(&owner.type_params),
                };
                params.push(MethodLocal {
                    local: Local::Param(0),
                    user_name: Some(self.cx.names.this),
                    ty: LoweredType::Concrete(receiver).pointer(),
                });
            }
        } else if let Some(closure) = &self.closure_record {
            params.push(MethodLocal {
                local: Local::Param(0),
                user_name: Some(self.cx.names.closure),
                ty: LoweredType::Concrete(closure.ty.clone()).pointer(),
            });
        }

        for param in &decl.params {
            let local = Local::param(params.len());
            params.push(MethodLocal {
                local,
                user_name: Some(param.name),
                ty: self.cx.lower_type(&param.ty, self.site)?,
            });
            if !self.cx.analysis.is_promoted(param.var) {
                self.vars.insert(param.var, local);
            }
        }
        Ok(params)
    }

    /// Allocate `_localsObject` and move promoted parameters into it.
    pub(super) fn emit_prologue(&mut self, params: &[MethodLocal]) -> Result<(), LowerError> {
        let Some(record) = self.locals_record.clone() else {
            return Ok(());
        };
        let record_ty = LoweredType::Concrete(record.ty.clone());
        self.builder.declare_locals_object(record_ty.clone().pointer());

        let object = Place::local(Local::LocalsObject);
        self.allocate(record_ty, object.clone());
        self.builder
            .assign(object.clone().deref(), Rvalue::CreateObject(record.ty.clone()));

        let Some(decl) = self.cx.index.scope(self.scope).function() else {
            return Ok(());
        };
        let offset = params.len() - decl.params.len();
        for (i, param) in decl.params.iter().enumerate() {
            if let Some(&field) = record.fields.get(&param.var) {
                self.builder.assign(
                    object.clone().deref().field(field, self.cx.names.class_variant),
                    Rvalue::Use(Place::local(Local::param(offset + i)).copy()),
                );
            }
        }
        Ok(())
    }

    /// Slots of every non-promoted local and match binding, in source order,
    /// ahead of any temporary.
    pub(super) fn declare_user_locals(&mut self) -> Result<(), LowerError> {
        let locals = self.cx.analysis.scan(self.scope).locals.clone();
        for local in locals {
            if self.cx.analysis.is_promoted(local.var) || self.vars.contains_key(&local.var) {
                continue;
            }
            let ty = self.cx.lower_type(local.ty, self.site)?;
            let slot = self.builder.declare_local(Some(local.name), ty);
            self.vars.insert(local.var, slot);
        }
        Ok(())
    }

    /// Lower the whole scope body into `_returnValue`.
    pub(super) fn lower_root(&mut self, kind: ScopeKind<'_>) -> Result<(), LowerError> {
        let ret = Place::local(Local::ReturnValue);
        match kind {
            ScopeKind::Main(block) => self.lower_block(block, None),
            ScopeKind::Function(decl) => {
                let dest = (!decl.return_type.is_unit()).then_some(ret);
                self.lower_block(&decl.body, dest)
            }
            ScopeKind::StaticInit(field) => self.lower_into(field.init, ret),
        }
    }

    /// Lower a block's statements, then its tail into `dest`.
    ///
    /// Code after a statement that always jumps away is still lowered, into
    /// a block no edge reaches.
    pub(crate) fn lower_block(
        &mut self,
        block: &Block,
        dest: Option<Place>,
    ) -> Result<(), LowerError> {
        for stmt in &block.stmts {
            self.resume_unreachable();
            match stmt {
                Stmt::Expr(id) => self.lower_discard(*id)?,
                Stmt::Var(decl) => {
                    let place = self.declare_var(decl.var, decl.name, &decl.ty)?;
                    if let Some(init) = decl.init {
                        self.lower_into(init, place)?;
                    }
                }
                // Lowered as a method of its own.
                Stmt::Function(_) => {}
            }
        }

        let Some(tail) = block.tail else {
            return Ok(());
        };
        self.resume_unreachable();
        match dest {
            Some(dest) => self.lower_into(tail, dest),
            None => self.lower_discard(tail),
        }
    }

    /// Continue in a fresh block when the current one has jumped away.
    fn resume_unreachable(&mut self) {
        if self.builder.is_terminated() {
            let block = self.builder.new_block();
            self.builder.position_at(block);
        }
    }

    /// Storage for a newly declared variable. Redeclaring a variable (a
    /// pattern binding reached along several paths) reuses its storage.
    pub(crate) fn declare_var(
        &mut self,
        var: VarId,
        name: Name,
        ty: &Type,
    ) -> Result<Place, LowerError> {
        if self.cx.analysis.is_promoted(var) {
            return self.var_place(var);
        }
        if let Some(&local) = self.vars.get(&var) {
            return Ok(Place::local(local));
        }
        let ty = self.cx.lower_type(ty, self.site)?;
        let local = self.builder.declare_local(Some(name), ty);
        self.vars.insert(var, local);
        Ok(Place::local(local))
    }

    /// Storage of a variable visible in this scope.
    pub(crate) fn var_place(&self, var: VarId) -> Result<Place, LowerError> {
        if let Some(&local) = self.vars.get(&var) {
            return Ok(Place::local(local));
        }
        let class_variant = self.cx.names.class_variant;
        let declaring = self.cx.analysis.declaring_scope(var);
        if let Some(declaring) = declaring.filter(|_| self.cx.analysis.is_promoted(var)) {
            let field = self
                .cx
                .plan
                .locals(declaring)
                .and_then(|record| record.fields.get(&var).copied());
            if let Some(field) = field {
                if declaring == self.scope {
                    return Ok(Place::local(Local::LocalsObject)
                        .deref()
                        .field(field, class_variant));
                }
                if let Some(record) = self.captured_locals(declaring) {
                    return Ok(record.deref().field(field, class_variant));
                }
            }
        }
        Err(LowerError::UnresolvedCapture {
            context: self.cx.context(self.site),
            name: self.cx.var_name(var),
        })
    }

    /// Pointer to `ancestor`'s `Locals` record, read from this function's
    /// closure.
    fn captured_locals(&self, ancestor: ScopeId) -> Option<Place> {
        let closure = self.closure_record.as_ref()?;
        if !closure.ancestors.contains(&ancestor) {
            return None;
        }
        let record = self.cx.plan.locals(ancestor)?;
        Some(
            Place::local(Local::Param(0))
                .deref()
                .field(record.ty.name, self.cx.names.class_variant),
        )
    }

    /// Place holding the `this` pointer.
    pub(crate) fn this_place(&self) -> Result<Place, LowerError> {
        let info = self.cx.index.scope(self.scope);
        if info.is_instance {
            return Ok(Place::local(Local::Param(0)));
        }
        match &self.closure_record {
            Some(closure) if closure.captures_this => Ok(Place::local(Local::Param(0))
                .deref()
                .field(self.cx.names.this, self.cx.names.class_variant)),
            _ => Err(LowerError::NoReceiver {
                context: self.cx.context(self.site),
            }),
        }
    }

    /// Build the closure of nested function `target`, instantiated with
    /// `type_args`, from this scope's state.
    pub(crate) fn build_closure(
        &mut self,
        target: ScopeId,
        type_args: Vec<LoweredType>,
    ) -> Result<Option<Operand>, LowerError> {
        let Some(record) = self.cx.plan.closure(target).cloned() else {
            return Ok(None);
        };
        let closure_ty = ConcreteType {
            args: type_args,
            ..record.ty
        };
        let object_ty = LoweredType::Concrete(closure_ty.clone());
        let temp = self.temp(object_ty.clone().pointer());
        self.allocate(object_ty, temp.clone());
        let object = temp.clone().deref();
        self.builder
            .assign(object.clone(), Rvalue::CreateObject(closure_ty));

        let class_variant = self.cx.names.class_variant;
        if record.captures_this {
            let this = self.this_place()?;
            self.builder.assign(
                object.clone().field(self.cx.names.this, class_variant),
                Rvalue::Use(this.copy()),
            );
        }
        for ancestor in record.ancestors {
            let Some(field) = self.cx.plan.locals(ancestor).map(|locals| locals.ty.name) else {
                continue;
            };
            let source = if ancestor == self.scope {
                Some(Place::local(Local::LocalsObject))
            } else {
                self.captured_locals(ancestor)
            };
            let Some(source) = source else {
                return Err(LowerError::UnresolvedCapture {
                    context: self.cx.context(self.site),
                    name: self.cx.name(field).to_owned(),
                });
            };
            self.builder.assign(
                object.clone().field(field, class_variant),
                Rvalue::Use(source.copy()),
            );
        }
        Ok(Some(temp.copy()))
    }

    /// Copy an unboxed value into a fresh allocation; returns the pointer.
    pub(crate) fn box_value(&mut self, value: Operand, ty: LoweredType) -> Operand {
        let temp = self.temp(ty.clone().pointer());
        self.allocate(ty, temp.clone());
        self.builder.assign(temp.clone().deref(), Rvalue::Use(value));
        temp.copy()
    }
}
