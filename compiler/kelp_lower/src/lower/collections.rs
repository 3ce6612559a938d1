//! Object, union case, tuple and array construction.
//!
//! A boxed value is allocated into the destination first and built through
//! the pointer; an unboxed value is built in the destination itself and
//! never allocates. Assigning a constructed value to existing storage builds
//! it in a temporary first, so initializers still read the old value.

use kelp_ir::ast::{Boxing, DeclRef, ExprId, ExprKind, FieldInit, Type, TypeRef};
use kelp_ir::Name;

use crate::context::Site;
use crate::error::LowerError;
use crate::identity::TypeKind;
use crate::ir::{ConcreteType, LoweredType, Operand, Place, Rvalue};

use super::expr::unbox;
use super::FnLowerer;

impl FnLowerer<'_, '_> {
    /// Storage of a new value of `ty`: allocated through `dest` when boxed.
    fn begin_object(&mut self, ty: LoweredType, boxing: Boxing, dest: Place) -> Place {
        if boxing == Boxing::Boxed {
            self.allocate(ty, dest.clone());
        }
        unbox(dest, boxing)
    }

    /// Whether lowering `id` into a place writes the place before every
    /// subexpression has been evaluated.
    pub(super) fn builds_in_place(&self, id: ExprId) -> bool {
        let arena = &self.cx.index.module.arena;
        match &arena.get_expr(id).kind {
            ExprKind::New { .. }
            | ExprKind::NewCase { .. }
            | ExprKind::Tuple(_)
            | ExprKind::Array(_)
            | ExprKind::ArrayFill { .. }
            | ExprKind::MemberFunction { .. } => true,
            ExprKind::Call { callee, .. } => {
                let callee = arena.get_expr(*callee);
                matches!(
                    (&callee.kind, &callee.ty),
                    (ExprKind::UnionCase { .. }, Type::Function { ret, .. })
                        if ret.boxing() == Boxing::Unboxed
                )
            }
            ExprKind::Block(block) => block.tail.is_some_and(|tail| self.builds_in_place(tail)),
            ExprKind::If {
                then_branch,
                else_branch,
                ..
            } => {
                self.builds_in_place(*then_branch)
                    || else_branch.is_some_and(|branch| self.builds_in_place(branch))
            }
            ExprKind::Match { arms, .. } => arms.iter().any(|arm| self.builds_in_place(arm.body)),
            _ => false,
        }
    }

    /// `new Class { .. }`, fields written in declaration order.
    pub(super) fn lower_new(
        &mut self,
        id: ExprId,
        class: &TypeRef,
        inits: &[FieldInit],
        dest: Place,
    ) -> Result<(), LowerError> {
        let site = self.site_of(id);
        let boxing = self.cx.index.module.arena.get_expr(id).ty.boxing();
        let concrete = self.cx.named_type(&class.decl, &class.args, site)?;
        let declared = self.class_fields(class, site)?;

        let object = self.begin_object(LoweredType::Concrete(concrete.clone()), boxing, dest);
        self.builder
            .assign(object.clone(), Rvalue::CreateObject(concrete));
        let class_variant = self.cx.names.class_variant;
        for field in declared {
            if let Some(init) = inits.iter().find(|init| init.name == field) {
                self.lower_into(init.value, object.clone().field(field, class_variant))?;
            }
        }
        Ok(())
    }

    fn class_fields(&self, class: &TypeRef, site: Site) -> Result<Vec<Name>, LowerError> {
        let decl = match &class.decl {
            DeclRef::Path(path) => self
                .cx
                .index
                .type_by_path(path)
                .map(|ty| self.cx.index.ty(ty).kind),
            DeclRef::Builtin(_) => None,
        };
        match decl {
            Some(TypeKind::Class(decl)) => Ok(decl.fields.iter().map(|field| field.name).collect()),
            _ => Err(self.cx.unknown_decl(&class.decl, site)),
        }
    }

    /// `new Union::Case { .. }`, built inline.
    pub(super) fn lower_new_case(
        &mut self,
        id: ExprId,
        union: &TypeRef,
        case: Name,
        inits: &[FieldInit],
        dest: Place,
    ) -> Result<(), LowerError> {
        let site = self.site_of(id);
        let boxing = self.cx.index.module.arena.get_expr(id).ty.boxing();
        let layout = self.cx.union_case(union, case, site)?;
        let mut values = Vec::with_capacity(layout.fields.len());
        for (field, _) in &layout.fields {
            let Some(init) = inits.iter().find(|init| init.name == *field) else {
                return Err(LowerError::UnknownMember {
                    context: self.cx.context(site),
                    owner: self.cx.index.display_ref(&union.decl),
                    name: self.cx.name(*field).to_owned(),
                });
            };
            values.push(init.value);
        }
        self.construct_case(union, case, boxing, &values, dest, site)
    }

    /// Union case value built in place: discriminant, then `values` in the
    /// case's field order.
    pub(crate) fn construct_case(
        &mut self,
        union: &TypeRef,
        case: Name,
        boxing: Boxing,
        values: &[ExprId],
        dest: Place,
        site: Site,
    ) -> Result<(), LowerError> {
        let layout = self.cx.union_case(union, case, site)?;
        let concrete = self.cx.named_type(&union.decl, &union.args, site)?;

        let object = self.begin_object(LoweredType::Concrete(concrete.clone()), boxing, dest);
        self.builder
            .assign(object.clone(), Rvalue::CreateObject(concrete));
        self.builder.assign(
            object.clone().field(self.cx.names.variant_id, case),
            Rvalue::Use(Operand::uint(layout.discriminant, 2)),
        );
        for ((field, _), value) in layout.fields.iter().zip(values) {
            self.lower_into(*value, object.clone().field(*field, case))?;
        }
        Ok(())
    }

    /// `(a, b, ..)` as a ``Tuple`N`` record.
    pub(super) fn lower_tuple(
        &mut self,
        id: ExprId,
        items: &[ExprId],
        dest: Place,
    ) -> Result<(), LowerError> {
        let site = self.site_of(id);
        let (elements, boxing) = match &self.cx.index.module.arena.get_expr(id).ty {
            Type::Tuple { elements, boxing } => (elements, *boxing),
            _ => {
                return Err(LowerError::TypeMismatch {
                    context: self.cx.context(site),
                    expected: "tuple",
                })
            }
        };
        let args = self.cx.lower_types(elements, site)?;
        let tuple: ConcreteType = self.cx.tuple_type(args);

        let object = self.begin_object(LoweredType::Concrete(tuple.clone()), boxing, dest);
        self.builder.assign(object.clone(), Rvalue::CreateObject(tuple));
        let class_variant = self.cx.names.class_variant;
        for (i, item) in items.iter().enumerate() {
            let field = self.cx.item(i);
            self.lower_into(*item, object.clone().field(field, class_variant))?;
        }
        Ok(())
    }

    /// `[a, b, ..]`: create the array, then write each element by index.
    pub(super) fn lower_array(
        &mut self,
        id: ExprId,
        items: &[ExprId],
        dest: Place,
    ) -> Result<(), LowerError> {
        let (array, boxing) = self.array_type(id)?;
        let object = self.begin_object(array.clone(), boxing, dest);
        self.builder.assign(object.clone(), Rvalue::CreateArray(array));
        for (i, item) in items.iter().enumerate() {
            let slot = object.clone().index(Operand::uint(i as u64, 8));
            self.lower_into(*item, slot)?;
        }
        Ok(())
    }

    /// `[value; count]`.
    pub(super) fn lower_array_fill(
        &mut self,
        id: ExprId,
        value: ExprId,
        count: u64,
        dest: Place,
    ) -> Result<(), LowerError> {
        let value = self.lower_operand(value)?;
        let (array, boxing) = self.array_type(id)?;
        let object = self.begin_object(array, boxing, dest);
        self.builder.assign(object, Rvalue::Fill { value, count });
        Ok(())
    }

    /// Unboxed array type of an array expression, with the expression's
    /// storage class.
    fn array_type(&mut self, id: ExprId) -> Result<(LoweredType, Boxing), LowerError> {
        let site = self.site_of(id);
        let Type::Array {
            element, length, ..
        } = &self.cx.index.module.arena.get_expr(id).ty
        else {
            return Err(LowerError::TypeMismatch {
                context: self.cx.context(site),
                expected: "array",
            });
        };
        let boxing = self.cx.index.module.arena.get_expr(id).ty.boxing();
        let element = self.cx.lower_type(element, site)?;
        Ok((
            LoweredType::Array {
                element: Box::new(element),
                length: *length,
            },
            boxing,
        ))
    }
}
